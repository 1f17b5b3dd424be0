//! Parsing helpers for environment-style settings.

/// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no` and `on/off`,
/// case-insensitively. Anything else is `None`.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
