/// Number of leading token characters kept when a token appears in logs
const TOKEN_VISIBLE_CHARS: usize = 4;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Redact a bearer token for logging, keeping only a short prefix
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(TOKEN_VISIBLE_CHARS).collect();
    format!("{}… ({} chars)", prefix, token.chars().count())
}
