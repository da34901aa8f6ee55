use super::*;

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1")
        .execute(&state.postgres_pool)
        .await
    {
        Ok(_) => "ok",
        Err(_) => "unreachable",
    };

    Json(HealthResponse {
        status: "ok",
        database,
    })
}
