//! Environment variable helpers for configuration loading

use std::str::FromStr;

/// Read and parse an environment variable
///
/// Returns `None` when the variable is unset, empty or does not parse.
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse().ok())
}

/// Read a boolean flag such as `1`, `true`, `yes`, `on` (or their negatives)
pub fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    parse_flag(&raw)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_env_parse_missing() {
        let value: Option<u32> = env_parse("TRADEFLOW_TEST_SURELY_UNSET_VARIABLE");
        assert!(value.is_none());
        assert!(env_flag("TRADEFLOW_TEST_SURELY_UNSET_VARIABLE").is_none());
    }
}
