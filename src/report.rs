// Failure reports - render errors as text safe to hand back to a user

/// Longest message body passed on, in characters.
pub const MAX_REPORT_CHARS: usize = 1500;

/// Escape control characters and quotes, then cap the length.
///
/// The cap is applied on whole escape sequences, so the result never ends
/// in half of one.
pub fn sanitize(message: &str) -> String {
    let mut escaped = String::with_capacity(message.len().min(MAX_REPORT_CHARS * 2));
    let mut count = 0;
    for c in message.chars() {
        let unit = escape_char(c);
        let len = unit.chars().count();
        if count + len > MAX_REPORT_CHARS {
            break;
        }
        escaped.push_str(&unit);
        count += len;
    }
    escaped
}

fn escape_char(c: char) -> String {
    match c {
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        '"' => "\\\"".to_string(),
        '\'' => "\\'".to_string(),
        '`' => "\\`".to_string(),
        c if c.is_control() => c.escape_unicode().to_string(),
        c => c.to_string(),
    }
}

/// User-facing text for a render failure.
pub fn format_failure(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    format!("Render failed: ```{}```", sanitize(&message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;

    #[test]
    fn test_escapes_newlines_and_quotes() {
        assert_eq!(
            sanitize("line one\nsaid \"hi\""),
            "line one\\nsaid \\\"hi\\\""
        );
    }

    #[test]
    fn test_escapes_other_control_characters() {
        assert_eq!(sanitize("a\u{7}b"), "a\\u{7}b");
        assert_eq!(sanitize("```"), "\\`\\`\\`");
    }

    #[test]
    fn test_truncates_long_messages() {
        let long = "é".repeat(MAX_REPORT_CHARS * 2);
        let sanitized = sanitize(&long);
        assert_eq!(sanitized.chars().count(), MAX_REPORT_CHARS);
    }

    #[test]
    fn test_truncation_keeps_escapes_whole() {
        let message = format!("{}\"", "a".repeat(MAX_REPORT_CHARS - 1));
        let sanitized = sanitize(&message);
        assert_eq!(sanitized, "a".repeat(MAX_REPORT_CHARS - 1));

        let report = format_failure(&RenderError::validation(message));
        assert!(report.ends_with("a```"), "{report}");
        assert!(!report.ends_with("\\```"), "{report}");
    }

    #[test]
    fn test_escape_fits_exactly_at_the_cap() {
        let message = format!("{}\"", "a".repeat(MAX_REPORT_CHARS - 2));
        let sanitized = sanitize(&message);
        assert_eq!(sanitized.chars().count(), MAX_REPORT_CHARS);
        assert!(sanitized.ends_with("\\\""));
    }

    #[test]
    fn test_format_failure_wraps_message() {
        let err = RenderError::Compile("shader.frag:1: error: '}' : syntax error".to_string());
        assert_eq!(
            format_failure(&err),
            "Render failed: ```shader compilation failed: shader.frag:1: error: \\'}\\' : syntax error```"
        );
    }
}
