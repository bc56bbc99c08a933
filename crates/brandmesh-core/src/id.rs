use chrono::Utc;
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Build an identifier of the form `{prefix}-{unix_millis}-{random}`.
///
/// The random part is the first eight hex characters of a v4 UUID, so the
/// prefix stays recoverable with a simple `starts_with` check.
pub fn generate_id(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}-{}", now_millis(), &random[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("content_generation");
        assert!(id.starts_with("content_generation-"));

        let rest = &id["content_generation-".len()..];
        let (millis, random) = rest.split_once('-').unwrap_or(("", ""));
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(random.len(), 8);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id("analytics");
        let b = generate_id("analytics");
        assert_ne!(a, b);
    }
}
