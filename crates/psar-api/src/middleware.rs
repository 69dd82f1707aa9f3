use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use psar_types::api::Claims;

use crate::AppState;

/// Extract and validate JWT from Authorization header. The secret comes
/// from app state, loaded once at startup.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = decode_claims(token, &state.jwt_secret).ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    fn token(secret: &str, exp_offset_secs: i64) -> (Uuid, String) {
        let sub = Uuid::new_v4();
        let claims = Claims {
            sub,
            exp: (chrono::Utc::now().timestamp() + exp_offset_secs) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (sub, token)
    }

    #[test]
    fn valid_token_yields_claims() {
        let (sub, token) = token("s3cret", 3600);
        let claims = decode_claims(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, sub);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (_, token) = token("s3cret", 3600);
        assert!(decode_claims(&token, "other").is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let (_, token) = token("s3cret", -3600);
        assert!(decode_claims(&token, "s3cret").is_none());
    }
}
