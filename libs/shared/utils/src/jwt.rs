use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::{JwtClaims, User};

type HmacSha256 = Hmac<Sha256>;

/// Validate a Supabase access token (HS256) and extract the user.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }
    let (header_b64, claims_b64, signature_b64) = (parts[0], parts[1], parts[2]);

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| "Invalid signature encoding".to_string())?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());
    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| "Invalid claims encoding".to_string())?;
    let claims: JwtClaims = serde_json::from_slice(&claims_bytes)
        .map_err(|_| "Invalid claims format".to_string())?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| "Invalid subject claim".to_string())?;

    let created_at = claims
        .iat
        .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single());

    let user = User {
        id: user_id,
        email: claims.email,
        role: claims.role,
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forge_token(claims: serde_json::Value, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{}.{}", header, payload);

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature)
    }

    #[test]
    fn accepts_valid_token() {
        let exp = (Utc::now().timestamp() + 3600) as u64;
        let token = forge_token(
            json!({
                "sub": "550e8400-e29b-41d4-a716-446655440000",
                "exp": exp,
                "role": "secretary"
            }),
            "secret",
        );

        let user = validate_token(&token, "secret").unwrap();
        assert_eq!(
            user.id,
            Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap()
        );
        assert!(user.is_staff());
    }

    #[test]
    fn rejects_bad_signature() {
        let exp = (Utc::now().timestamp() + 3600) as u64;
        let token = forge_token(
            json!({ "sub": "550e8400-e29b-41d4-a716-446655440000", "exp": exp }),
            "other-secret",
        );

        assert!(validate_token(&token, "secret").is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let exp = (Utc::now().timestamp() - 10) as u64;
        let token = forge_token(
            json!({ "sub": "550e8400-e29b-41d4-a716-446655440000", "exp": exp }),
            "secret",
        );

        assert_eq!(validate_token(&token, "secret").unwrap_err(), "Token expired");
    }

    #[test]
    fn rejects_garbage() {
        assert!(validate_token("not-a-token", "secret").is_err());
        assert!(validate_token("a.b.c", "secret").is_err());
    }
}
