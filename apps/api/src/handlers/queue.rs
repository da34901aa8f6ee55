use super::*;

pub async fn queue_stats_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<QueueStatsResponse>> {
    let stats = state.queue_service.stats().await?;
    Ok(Json(stats.into()))
}
