//! Log Redaction Layer
//!
//! Scrubs crypto keys, bearer tokens, and inline image payloads from strings prior to logging.

use regex::Regex;
use std::sync::LazyLock;

static CRYPTO_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"("?crypto_?[kK]ey"?\s*[:=]\s*"?)[^",}\s]+"#).unwrap());
static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());
static BASE64_BLOB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(data:[\w/+.-]+;base64,)?[A-Za-z0-9+/]{64,}={0,2}").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let mut redacted = CRYPTO_KEY_RE
        .replace_all(input, "${1}[REDACTED_KEY]")
        .to_string();

    redacted = BEARER_RE
        .replace_all(&redacted, "[REDACTED_TOKEN]")
        .to_string();

    // Image payloads are noise in logs even when they are not secret.
    redacted = BASE64_BLOB_RE
        .replace_all(&redacted, "[BASE64_BLOB]")
        .to_string();

    redacted
}

/// Show only the length of a key.
pub fn mask_key(key: &str) -> String {
    format!("[{} chars]", key.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction() {
        let raw = "Sending with Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9"));
    }

    #[test]
    fn redacts_crypto_keys() {
        let raw = r#"{"cryptoKey":"0123456789abcdef","mode":"CBC"}"#;
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("0123456789abcdef"));
        assert!(clean.contains(r#""cryptoKey":"[REDACTED_KEY]"#));
        assert!(clean.contains("CBC"));
    }

    #[test]
    fn collapses_base64_blobs() {
        let blob = "QUJD".repeat(40);
        let raw = format!("payload=data:image/bmp;base64,{blob} done");
        let clean = redact_sensitive_data(&raw);
        assert_eq!(clean, "payload=[BASE64_BLOB] done");
    }

    #[test]
    fn leaves_short_text_alone() {
        assert_eq!(
            redact_sensitive_data("send.u1.encrypt.CBC.photo"),
            "send.u1.encrypt.CBC.photo"
        );
    }

    #[test]
    fn masks_key_to_length() {
        assert_eq!(mask_key("0123456789abcdef"), "[16 chars]");
    }
}
