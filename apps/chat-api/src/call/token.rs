//! Time-limited media-relay channel tokens.

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::EventError;

/// Minimum token lifetime accepted by the issuer (seconds).
const MIN_TTL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcRole {
    Publisher,
    Subscriber,
}

impl RtcRole {
    fn as_str(self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }
}

/// A signed channel credential handed to one participant.
#[derive(Debug, Clone)]
pub struct RtcToken {
    pub token: String,
    pub channel: String,
    pub uid: String,
    pub expires_in: u64,
    /// Absolute expiry, unix seconds.
    pub expire_at: i64,
}

#[async_trait]
pub trait RtcTokenIssuer: Send + Sync {
    async fn issue_token(
        &self,
        channel: &str,
        uid: &str,
        role: RtcRole,
        ttl_secs: u64,
    ) -> Result<RtcToken, EventError>;
}

/// Issues coturn-style time-limited credentials: HMAC-SHA256 over the
/// channel/uid/role/expiry tuple, keyed by the app certificate.
pub struct HmacTokenIssuer {
    app_id: String,
    app_certificate: String,
}

impl HmacTokenIssuer {
    pub fn new(app_id: impl Into<String>, app_certificate: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_certificate: app_certificate.into(),
        }
    }
}

#[async_trait]
impl RtcTokenIssuer for HmacTokenIssuer {
    async fn issue_token(
        &self,
        channel: &str,
        uid: &str,
        role: RtcRole,
        ttl_secs: u64,
    ) -> Result<RtcToken, EventError> {
        if channel.is_empty() {
            return Err(EventError::invalid_payload("Channel name is required"));
        }
        if uid.is_empty() {
            return Err(EventError::invalid_payload("Uid is required"));
        }
        if ttl_secs < MIN_TTL_SECS {
            return Err(EventError::invalid_payload(
                "Expiration must be at least 60 seconds",
            ));
        }

        let expire_at = chrono::Utc::now().timestamp() + ttl_secs as i64;
        let signed = format!(
            "{}:{}:{}:{}:{}",
            self.app_id,
            channel,
            uid,
            role.as_str(),
            expire_at
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(self.app_certificate.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(signed.as_bytes());
        let token = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Ok(RtcToken {
            token,
            channel: channel.to_string(),
            uid: uid.to_string(),
            expires_in: ttl_secs,
            expire_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn issuer() -> HmacTokenIssuer {
        HmacTokenIssuer::new("app-1", "certificate-secret")
    }

    #[tokio::test]
    async fn issues_signed_token_with_expiry() {
        let token = issuer()
            .issue_token("call:room_1", "usr_a", RtcRole::Publisher, 600)
            .await
            .unwrap();
        assert!(!token.token.is_empty());
        assert_eq!(token.channel, "call:room_1");
        assert_eq!(token.uid, "usr_a");
        assert_eq!(token.expires_in, 600);
        assert!(token.expire_at > chrono::Utc::now().timestamp());
    }

    #[tokio::test]
    async fn tokens_differ_per_uid() {
        let issuer = issuer();
        let a = issuer
            .issue_token("call:room_1", "usr_a", RtcRole::Publisher, 600)
            .await
            .unwrap();
        let b = issuer
            .issue_token("call:room_1", "usr_b", RtcRole::Publisher, 600)
            .await
            .unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn rejects_empty_channel() {
        let err = issuer()
            .issue_token("", "usr_a", RtcRole::Publisher, 600)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPayload);
        assert_eq!(err.message, "Channel name is required");
    }

    #[tokio::test]
    async fn rejects_empty_uid() {
        let err = issuer()
            .issue_token("call:room_1", "", RtcRole::Publisher, 600)
            .await
            .unwrap_err();
        assert_eq!(err.message, "Uid is required");
    }

    #[tokio::test]
    async fn rejects_short_ttl() {
        let err = issuer()
            .issue_token("call:room_1", "usr_a", RtcRole::Subscriber, 59)
            .await
            .unwrap_err();
        assert_eq!(err.message, "Expiration must be at least 60 seconds");
    }
}
