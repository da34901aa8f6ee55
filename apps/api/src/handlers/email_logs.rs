use super::*;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct EmailLogListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_email_logs_handler(
    State(state): State<AppState>,
    Query(query): Query<EmailLogListQuery>,
) -> ApiResult<Json<EmailLogListResponse>> {
    let entries = state
        .queue_service
        .list_logs(query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await?;

    Ok(Json(EmailLogListResponse {
        entries: entries.into_iter().map(EmailLogEntryDto::from).collect(),
    }))
}

pub async fn resend_email_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(log_id): Path<Uuid>,
) -> ApiResult<Json<EmailLogEntryDto>> {
    let trace = state.resend_service.resend(&actor, log_id).await?;
    Ok(Json(trace.into()))
}
