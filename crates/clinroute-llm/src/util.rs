//! Shared helpers for provider adapters

/// Maximum characters of a vendor error body kept in an error
pub const MAX_ERROR_BODY_CHARS: usize = 300;

/// Minimum key length to display partial key
const MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY: usize = 8;

/// Number of characters to show at start/end of masked key
const KEY_MASK_VISIBLE_CHARS: usize = 4;

/// Placeholder substituted for a leaked key
const REDACTED: &str = "[REDACTED]";

/// Mask API key for safe display in logs
///
/// # Examples
/// ```
/// use clinroute_llm::util::mask_api_key;
/// assert_eq!(mask_api_key("sk-1234567890abcdef"), "sk-1...cdef");
/// assert_eq!(mask_api_key("short"), "****");
/// ```
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY {
        return "****".to_string();
    }
    let head: String = chars[..KEY_MASK_VISIBLE_CHARS].iter().collect();
    let tail: String = chars[chars.len() - KEY_MASK_VISIBLE_CHARS..].iter().collect();
    format!("{head}...{tail}")
}

/// Truncate to at most `max_chars` characters without splitting a code point
#[must_use]
pub fn truncate_safe(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Prepare a vendor error body for inclusion in an error message.
///
/// Occurrences of `api_key` are replaced before truncating to
/// [`MAX_ERROR_BODY_CHARS`].
#[must_use]
pub fn sanitize_error_body(body: &str, api_key: &str) -> String {
    let redacted = if api_key.is_empty() {
        body.trim().to_string()
    } else {
        body.trim().replace(api_key, REDACTED)
    };

    if redacted.chars().count() > MAX_ERROR_BODY_CHARS {
        format!(
            "{}...(truncated)",
            truncate_safe(&redacted, MAX_ERROR_BODY_CHARS)
        )
    } else {
        redacted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key_long() {
        let masked = mask_api_key("sk-1234567890abcdefghij");
        assert_eq!(masked, "sk-1...ghij");
        assert!(!masked.contains("567890"));
    }

    #[test]
    fn test_mask_api_key_short() {
        assert_eq!(mask_api_key("short"), "****");
        assert_eq!(mask_api_key("12345678"), "****");
        assert_eq!(mask_api_key(""), "****");
    }

    #[test]
    fn test_truncate_safe_multibyte() {
        assert_eq!(truncate_safe("héllo", 2), "hé");
        assert_eq!(truncate_safe("血压正常", 3), "血压正");
        assert_eq!(truncate_safe("abc", 10), "abc");
    }

    #[test]
    fn test_sanitize_error_body_redacts_key() {
        let body = r#"{"error":"invalid key sk-secret-123456"}"#;
        let sanitized = sanitize_error_body(body, "sk-secret-123456");
        assert!(!sanitized.contains("sk-secret-123456"));
        assert!(sanitized.contains("[REDACTED]"));
    }

    #[test]
    fn test_sanitize_error_body_truncates() {
        let body = "x".repeat(1000);
        let sanitized = sanitize_error_body(&body, "");
        assert!(sanitized.ends_with("...(truncated)"));
        assert_eq!(sanitized.len(), MAX_ERROR_BODY_CHARS + "...(truncated)".len());
    }
}
