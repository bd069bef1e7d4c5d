//! Common utility functions used across Lemo components

use chrono::Utc;
use uuid::Uuid;

/// Generate an opaque session identifier
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get current UTC timestamp as milliseconds
pub fn current_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Truncate a string to at most `max_chars` characters (not bytes)
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Truncate for log output, appending an ellipsis when shortened
pub fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", truncate_chars(s, max_chars))
    }
}

/// Generate a consistent hash for a string
pub fn string_hash(s: &str) -> u32 {
    let mut hash = 0u32;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as u32);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let id1 = generate_session_id();
        let id2 = generate_session_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("北京天气怎么样", 2), "北京");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("hello world", 5), "hello...");
        assert_eq!(preview("hi", 5), "hi");
    }

    #[test]
    fn test_string_hash_is_stable() {
        assert_eq!(string_hash("abc"), string_hash("abc"));
        assert_ne!(string_hash("abc"), string_hash("abd"));
    }
}
