/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse a whole percentage (0 - 100). Values above 100 are capped; anything unparseable yields the default.
pub fn parse_percentage(value: Option<&str>, default: u8) -> u8 {
    value.and_then(|v| v.trim().trim_end_matches('%').parse::<u32>().ok()).map(|p| p.min(100) as u8).unwrap_or(default)
}
