//! Closed error taxonomy for platform publishing.
//!
//! Retryability belongs to the code, never to the raw status, so every path
//! that produces a code agrees on whether the caller may try again.

use serde::{Deserialize, Serialize};

/// Body substrings that turn a 422 into a content-policy rejection.
const POLICY_KEYWORDS: &[&str] = &[
    "policy",
    "community standards",
    "guidelines",
    "prohibited",
    "not allowed",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishErrorCode {
    TokenExpired,
    InsufficientPermissions,
    ContentPolicyViolation,
    RateLimited,
    PlatformError,
    MediaUploadFailed,
    Timeout,
    NetworkError,
    Unknown,
}

impl PublishErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishErrorCode::TokenExpired => "token_expired",
            PublishErrorCode::InsufficientPermissions => "insufficient_permissions",
            PublishErrorCode::ContentPolicyViolation => "content_policy_violation",
            PublishErrorCode::RateLimited => "rate_limited",
            PublishErrorCode::PlatformError => "platform_error",
            PublishErrorCode::MediaUploadFailed => "media_upload_failed",
            PublishErrorCode::Timeout => "timeout",
            PublishErrorCode::NetworkError => "network_error",
            PublishErrorCode::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PublishErrorCode::RateLimited
                | PublishErrorCode::PlatformError
                | PublishErrorCode::MediaUploadFailed
                | PublishErrorCode::NetworkError
        )
    }

    /// Maps a post-creation HTTP status (plus error body) onto a code.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => PublishErrorCode::TokenExpired,
            403 => PublishErrorCode::InsufficientPermissions,
            422 => {
                let lower = body.to_lowercase();
                if POLICY_KEYWORDS.iter().any(|k| lower.contains(k)) {
                    PublishErrorCode::ContentPolicyViolation
                } else {
                    PublishErrorCode::PlatformError
                }
            }
            429 => PublishErrorCode::RateLimited,
            500..=599 => PublishErrorCode::PlatformError,
            _ => PublishErrorCode::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublishResult {
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub post_url: Option<String>,
    pub error_code: Option<PublishErrorCode>,
    pub error_message: Option<String>,
    pub is_retryable: bool,
}

impl PublishResult {
    pub fn published(platform_post_id: String, post_url: Option<String>) -> Self {
        Self {
            success: true,
            platform_post_id: Some(platform_post_id),
            post_url,
            error_code: None,
            error_message: None,
            is_retryable: false,
        }
    }

    pub fn failed(code: PublishErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            platform_post_id: None,
            post_url: None,
            error_code: Some(code),
            error_message: Some(message.into()),
            is_retryable: code.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        let code = PublishErrorCode::from_status(429, "");
        assert_eq!(code, PublishErrorCode::RateLimited);
        assert!(PublishResult::failed(code, "slow down").is_retryable);
    }

    #[test]
    fn test_forbidden_is_not_retryable() {
        let code = PublishErrorCode::from_status(403, "missing scope w_member_social");
        assert_eq!(code, PublishErrorCode::InsufficientPermissions);
        assert!(!PublishResult::failed(code, "forbidden").is_retryable);
    }

    #[test]
    fn test_unprocessable_needs_policy_keyword() {
        assert_eq!(
            PublishErrorCode::from_status(422, "Post violates Community Standards"),
            PublishErrorCode::ContentPolicyViolation
        );
        assert_eq!(
            PublishErrorCode::from_status(422, "text too long"),
            PublishErrorCode::PlatformError
        );
    }

    #[test]
    fn test_status_table_is_closed() {
        assert_eq!(PublishErrorCode::from_status(401, ""), PublishErrorCode::TokenExpired);
        assert_eq!(PublishErrorCode::from_status(502, ""), PublishErrorCode::PlatformError);
        assert_eq!(PublishErrorCode::from_status(404, ""), PublishErrorCode::Unknown);
        assert_eq!(PublishErrorCode::from_status(400, "policy"), PublishErrorCode::Unknown);
    }

    #[test]
    fn test_auth_and_policy_codes_are_final() {
        for code in [
            PublishErrorCode::TokenExpired,
            PublishErrorCode::InsufficientPermissions,
            PublishErrorCode::ContentPolicyViolation,
            PublishErrorCode::Timeout,
            PublishErrorCode::Unknown,
        ] {
            assert!(!code.is_retryable(), "{}", code.as_str());
        }
    }

    #[test]
    fn test_code_serializes_snake_case() {
        let json = serde_json::to_value(PublishResult::failed(
            PublishErrorCode::MediaUploadFailed,
            "put failed",
        ))
        .unwrap();
        assert_eq!(json["error_code"], "media_upload_failed");
        assert_eq!(json["is_retryable"], true);
    }
}
