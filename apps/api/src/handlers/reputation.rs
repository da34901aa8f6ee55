use super::*;
use lettermill_domain::DomainReputation;

#[derive(Debug, Deserialize)]
pub struct ReputationQuery {
    pub include_api: Option<bool>,
}

pub async fn domain_reputation_handler(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<ReputationQuery>,
) -> ApiResult<Json<DomainReputation>> {
    let result = state
        .reputation_service
        .check(domain.as_str(), query.include_api.unwrap_or(true))
        .await?;

    Ok(Json(result))
}
