use axum::{body::Body, http::Request, middleware::Next, response::Response};

use crate::error::AppError;

/// Header carrying the caller's user id, set by the upstream authentication layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated facilitator identity, inserted into request extensions by [`require_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
}

/// Reject requests without a non-empty `X-User-Id` header and expose the caller as [`AuthUser`].
pub async fn require_user(mut req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Unauthorized("missing user header `X-User-Id`".into()))?;

    req.extensions_mut().insert(AuthUser { id });
    Ok(next.run(req).await)
}
