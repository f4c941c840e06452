//! Environment variable parsing helpers

use std::str::FromStr;

/// Parse an environment variable, falling back to `default` when the variable
/// is missing or does not parse.
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    parse_env_optional(key).unwrap_or(default)
}

/// Parse an environment variable, returning None if missing or invalid
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_with_default() {
        let result: u32 = parse_env_with_default("FUTORA_NONEXISTENT_VAR", 42);
        assert_eq!(result, 42);

        std::env::set_var("FUTORA_TEST_PORT", " 8080 ");
        let result: u16 = parse_env_with_default("FUTORA_TEST_PORT", 3000);
        assert_eq!(result, 8080);
        std::env::remove_var("FUTORA_TEST_PORT");
    }

    #[test]
    fn test_parse_env_optional() {
        assert_eq!(parse_env_optional::<u32>("FUTORA_NONEXISTENT_VAR"), None);

        std::env::set_var("FUTORA_TEST_OPT", "abc");
        assert_eq!(parse_env_optional::<u32>("FUTORA_TEST_OPT"), None);
        std::env::set_var("FUTORA_TEST_OPT", "123");
        assert_eq!(parse_env_optional::<u32>("FUTORA_TEST_OPT"), Some(123));
        std::env::remove_var("FUTORA_TEST_OPT");
    }
}
