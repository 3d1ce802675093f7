use std::{fmt::Display, sync::Arc};

use autofix_core::config::Config;
use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::WebhookEnvelope;

pub const SIGNATURE_HEADER: &str = "Sentry-Hook-Signature";

/// Verify the hex-encoded HMAC-SHA256 signature of a webhook body.
/// An empty or malformed signature never verifies.
pub fn verify_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    if signature.is_empty() {
        return false;
    }
    let Ok(signature) = hex::decode(signature) else {
        return false;
    };
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    // verify_slice is constant-time
    mac.verify_slice(&signature).is_ok()
}

/// Compute the hex-encoded signature for a body. Used by tests and tooling.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify and extract a Sentry webhook payload.
///
/// The extractor buffers the full body to compute the digest, then parses the
/// envelope from that same buffer, so the handler sees every byte that was
/// signed. Rejections never invoke the handler: missing or invalid signature
/// is 401, an unreadable or unparseable body is 400.
#[derive(Clone)]
#[must_use]
pub struct SentryEvent {
    pub envelope: WebhookEnvelope,
}

impl<S> FromRequest<S> for SentryEvent
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync + Clone,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        fn err(status: StatusCode, m: impl Display) -> Response {
            tracing::warn!("{m}");
            (status, m.to_string()).into_response()
        }
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "missing signature"))?;
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|_| err(StatusCode::BAD_REQUEST, "failed to read body"))?;
        let config = <Arc<Config>>::from_ref(state);
        if !verify_signature(&config.webhook.secret, &signature, &body) {
            return Err(err(StatusCode::UNAUTHORIZED, "invalid signature"));
        }
        let envelope: WebhookEnvelope = serde_json::from_slice(&body)
            .map_err(|_| err(StatusCode::BAD_REQUEST, "invalid payload"))?;
        Ok(SentryEvent { envelope })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_signature() {
        let secret = "test-secret-key";
        let body = br#"{"action":"created"}"#;
        let cases: &[(&str, &[u8], String, bool)] = &[
            ("valid signature", body, sign(secret, body), true),
            ("invalid signature", body, "invalid-signature".to_string(), false),
            ("empty signature", body, String::new(), false),
            ("tampered body", br#"{"action":"tampered"}"#, sign(secret, body), false),
            ("wrong secret", body, sign("wrong", body), false),
        ];
        for (name, body, signature, want) in cases {
            assert_eq!(verify_signature(secret, signature, body), *want, "{name}");
        }
    }

    #[test]
    fn test_verify_signature_bit_flip() {
        let secret = "s3cret";
        let body = br#"{"action":"created","data":{}}"#;
        let signature = sign(secret, body);
        assert!(verify_signature(secret, &signature, body));

        // Flip one bit of the body
        let mut mutated = body.to_vec();
        mutated[0] ^= 0x01;
        assert!(!verify_signature(secret, &signature, &mutated));

        // Flip one hex digit of the signature
        let mut mutated = signature.clone().into_bytes();
        mutated[0] = if mutated[0] == b'0' { b'1' } else { b'0' };
        assert!(!verify_signature(secret, std::str::from_utf8(&mutated).unwrap(), body));
    }
}
