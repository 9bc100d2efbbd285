//! Bearer-token gate in front of the management socket.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use subtle::ConstantTimeEq;

use crate::{errors::AppError, AppState};

/// Rejects the upgrade before any connection exists unless the request
/// carries the configured token.
pub async fn require_management_token(
    State(state): State<AppState>,
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(TypedHeader(auth)) = auth_header else {
        return Err(AppError::unauthorized(
            "missing_token",
            "missing authorization header",
        ));
    };

    if !tokens_match(auth.token(), &state.api_token) {
        return Err(AppError::unauthorized(
            "invalid_token",
            "invalid management token",
        ));
    }

    Ok(next.run(request).await)
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
