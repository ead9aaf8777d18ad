// Output formatting: terminal display for verdicts, traces, and key health.

pub mod terminal;

/// Single-line preview of `text`, at most `max_chars` characters.
///
/// Newlines and runs of whitespace collapse to one space so a preview never
/// breaks a log line, and the cut respects UTF-8 character boundaries.
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

/// Show the last few characters of a secret, enough to tell keys apart.
///
/// Vendor keys share a fixed prefix (every Google key starts `AIzaSy`), so
/// the tail is the part that differs. Secrets too short to hide anything are
/// masked completely.
pub fn mask_secret(secret: &str) -> String {
    const VISIBLE: usize = 4;
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= VISIBLE * 2 {
        "*".repeat(chars.len().max(3))
    } else {
        let tail: String = chars[chars.len() - VISIBLE..].iter().collect();
        format!("...{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_collapses_whitespace() {
        assert_eq!(preview("hello\n\n  there", 50), "hello there");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 4), "héll...");
    }

    #[test]
    fn short_secret_is_fully_masked() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("12345678"), "********");
    }

    #[test]
    fn keys_with_a_shared_prefix_mask_differently() {
        let first = mask_secret("AIzaSyD-0123456789wxyz");
        let second = mask_secret("AIzaSyD-0123456789abcd");
        assert_eq!(first, "...wxyz");
        assert_eq!(second, "...abcd");
        assert!(!first.contains("AIza"));
    }
}
