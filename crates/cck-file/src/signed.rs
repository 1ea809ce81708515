use base64::Engine;
use cck_domain::{OpError, OpResult, SignedUrl};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Scheme of locally-issued pseudo URLs; consumers hand them back to the
/// issuing service for verification instead of dereferencing them.
pub const URL_SCHEME: &str = "cck+file://";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedOperation {
    Upload,
    Download,
}

impl SignedOperation {
    fn as_str(self) -> &'static str {
        match self {
            SignedOperation::Upload => "upload",
            SignedOperation::Download => "download",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(SignedOperation::Upload),
            "download" => Some(SignedOperation::Download),
            _ => None,
        }
    }
}

/// What a verified signed URL authorizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlClaims {
    pub operation: SignedOperation,
    pub bucket: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
    pub content_type: Option<String>,
}

// ── UrlSigner ─────────────────────────────────────────────────────────────────

/// Issues and verifies expiring HMAC-SHA256 signed URLs of the form
/// `cck+file://bucket/key?op=...&expires=...&ct=...&sig=...`.
#[derive(Clone)]
pub(crate) struct UrlSigner {
    key: Vec<u8>,
}

impl UrlSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        UrlSigner { key: key.into() }
    }

    fn signature(
        &self,
        operation: SignedOperation,
        bucket: &str,
        key: &str,
        expires_at: i64,
        content_type: Option<&str>,
    ) -> String {
        let payload = format!(
            "{}\n{}\n{}\n{}\n{}",
            operation.as_str(),
            bucket,
            key,
            expires_at,
            content_type.unwrap_or("-"),
        );
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    pub fn issue(
        &self,
        operation: SignedOperation,
        bucket: &str,
        key: &str,
        expires_at: DateTime<Utc>,
        content_type: Option<&str>,
    ) -> SignedUrl {
        let ts = expires_at.timestamp();
        let sig = self.signature(operation, bucket, key, ts, content_type);
        let mut url = format!(
            "{URL_SCHEME}{bucket}/{key}?op={}&expires={ts}",
            operation.as_str()
        );
        if let Some(ct) = content_type {
            url.push_str("&ct=");
            url.push_str(ct);
        }
        url.push_str("&sig=");
        url.push_str(&sig);
        SignedUrl { url, expires_at }
    }

    pub fn verify(&self, url: &str, now: DateTime<Utc>) -> OpResult<SignedUrlClaims> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| OpError::bad_request("unrecognized url scheme"))?;
        let (path, query) = rest
            .split_once('?')
            .ok_or_else(|| OpError::bad_request("signed url has no query"))?;
        let (bucket, key) = path
            .split_once('/')
            .ok_or_else(|| OpError::bad_request("signed url has no object key"))?;

        let mut operation = None;
        let mut expires = None;
        let mut content_type = None;
        let mut sig = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("op", v)) => operation = SignedOperation::parse(v),
                Some(("expires", v)) => expires = v.parse::<i64>().ok(),
                Some(("ct", v)) => content_type = Some(v.to_string()),
                Some(("sig", v)) => sig = Some(v.to_string()),
                _ => {}
            }
        }
        let operation =
            operation.ok_or_else(|| OpError::bad_request("signed url has no operation"))?;
        let expires =
            expires.ok_or_else(|| OpError::bad_request("signed url has no expiry"))?;
        let sig = sig.ok_or_else(|| OpError::bad_request("signed url has no signature"))?;

        let expected = self.signature(operation, bucket, key, expires, content_type.as_deref());
        if sig != expected {
            return Err(OpError::forbidden("signed url signature mismatch"));
        }
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| OpError::bad_request("signed url expiry out of range"))?;
        if now >= expires_at {
            return Err(OpError::forbidden("signed url expired"));
        }

        Ok(SignedUrlClaims {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
            expires_at,
            content_type,
        })
    }
}
