use super::*;

pub async fn get_email_settings_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<EmailSettingsDto>> {
    let config = state.config_service.load().await?;
    Ok(Json(config.into()))
}

pub async fn put_email_settings_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<EmailSettingsDto>,
) -> ApiResult<Json<EmailSettingsDto>> {
    let config = payload.into();
    state.config_service.save(&actor, &config).await?;
    Ok(Json(config.into()))
}
