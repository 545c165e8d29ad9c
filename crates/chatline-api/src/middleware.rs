use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};

use chatline_types::api::Claims;
use chatline_types::models::Principal;

use crate::error::ApiError;
use crate::state::AppState;

/// Validate an HS256 bearer token and resolve the caller.
pub fn principal_from_token(token: &str, secret: &str) -> Result<Principal, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthenticated)?;

    let claims = token_data.claims;
    Ok(Principal {
        id: claims.sub,
        name: claims.name,
        role: claims.role,
        class: claims.class,
    })
}

/// Extract and validate the JWT from the Authorization header. The resolved
/// [`Principal`] is stored as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthenticated)?;
    let principal = principal_from_token(bearer.token(), &state.jwt_secret)?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
