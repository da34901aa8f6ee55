use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use lettermill_core::{Actor, ActorRole, AppError};

use crate::error::ApiResult;
use crate::state::AppState;

/// Requires the shared admin bearer token on every admin route.
///
/// Identity management proper is delegated to a managed provider; this
/// guard only gates the operational surface and resolves the caller into
/// an admin [`Actor`] for the role checks inside the services.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_owned()))?;

    if token != state.admin_token {
        return Err(AppError::Unauthorized("invalid bearer token".to_owned()).into());
    }

    request
        .extensions_mut()
        .insert(Actor::new("admin-console", "Admin Console", ActorRole::Admin));
    Ok(next.run(request).await)
}
