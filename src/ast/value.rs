//! Scalar helpers shared by the expression variants.
//!
//! Values are carried as text, the way the tokenizer hands them over. These
//! helpers apply MySQL's loose conversion rules when a value is used as a
//! number, a boolean or a pattern.

use std::cmp::Ordering;

/// Parse the whole of `text` as a number.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let end = numeric_prefix_len(trimmed);
    if end == 0 || end != trimmed.len() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// MySQL string-to-number conversion: the longest numeric prefix, else 0.
pub fn leading_number(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let end = numeric_prefix_len(trimmed);
    trimmed[..end].parse::<f64>().unwrap_or(0.0)
}

fn numeric_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - digits_start;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if digits > 0 || j > frac_start {
            digits += j - frac_start;
            i = j;
        }
    }
    if digits == 0 {
        return 0;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    i
}

/// Numeric reading of a value. Non-string values that fail a full parse
/// still fall back to their numeric prefix.
pub fn as_number(text: &str, is_string: bool) -> f64 {
    if is_string {
        leading_number(text)
    } else {
        parse_number(text).unwrap_or_else(|| leading_number(text))
    }
}

/// Boolean reading of a value: non-zero is true.
pub fn truthy(text: &str, is_string: bool) -> bool {
    as_number(text, is_string) != 0.0
}

/// Render a computed number without a trailing `.0` for integral results.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Compare two values. Two strings compare case-insensitively (MySQL's
/// default collation); anything else compares numerically.
pub fn compare(left: &str, left_is_string: bool, right: &str, right_is_string: bool) -> Ordering {
    if left_is_string && right_is_string {
        return left.to_lowercase().cmp(&right.to_lowercase());
    }
    let l = as_number(left, left_is_string);
    let r = as_number(right, right_is_string);
    l.partial_cmp(&r).unwrap_or(Ordering::Equal)
}

/// SQL `LIKE` with `%`, `_` and backslash escapes, case-insensitive.
///
/// Greedy matching that backtracks only to the most recent `%`, so the cost
/// is bounded by `text.len() * pattern.len()`.
pub fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pieces = like_pieces(&pattern.to_lowercase());

    let (mut t, mut p) = (0, 0);
    // Pattern index after the last `%`, and the text index it resumes from
    let mut resume: Option<(usize, usize)> = None;
    while t < text.len() {
        match pieces.get(p) {
            Some(LikePiece::Any) => {
                resume = Some((p + 1, t));
                p += 1;
            }
            Some(LikePiece::One) => {
                p += 1;
                t += 1;
            }
            Some(LikePiece::Char(c)) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match resume {
                Some((after, from)) => {
                    resume = Some((after, from + 1));
                    p = after;
                    t = from + 1;
                }
                None => return false,
            },
        }
    }
    pieces[p..].iter().all(|piece| *piece == LikePiece::Any)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikePiece {
    Any,
    One,
    Char(char),
}

fn like_pieces(pattern: &str) -> Vec<LikePiece> {
    let mut pieces = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        pieces.push(match c {
            '%' => LikePiece::Any,
            '_' => LikePiece::One,
            // A trailing backslash matches itself
            '\\' => LikePiece::Char(chars.next().unwrap_or('\\')),
            other => LikePiece::Char(other),
        });
    }
    pieces
}

/// True for patterns that match every non-NULL string (`%`, `%%`, ...).
pub fn is_match_all_pattern(pattern: &str) -> bool {
    !pattern.is_empty() && pattern.chars().all(|c| c == '%')
}

/// Decode the payload of `X'..'` / `0x..` into text, lossily.
pub fn decode_hex(hex: &str) -> Option<String> {
    let digits = hex.trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1"), Some(1.0));
        assert_eq!(parse_number(" -2.5 "), Some(-2.5));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("1abc"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("12abc"), 12.0);
        assert_eq!(leading_number("  3.5x"), 3.5);
        assert_eq!(leading_number("abc"), 0.0);
        assert_eq!(leading_number("1e"), 1.0);
        assert_eq!(leading_number(""), 0.0);
    }

    #[test]
    fn test_truthy() {
        assert!(truthy("1", false));
        assert!(!truthy("0", false));
        assert!(truthy("1abc", true));
        assert!(!truthy("abc", true));
        assert!(!truthy("", true));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-1.0), "-1");
        assert_eq!(format_number(0.5), "0.5");
    }

    #[test]
    fn test_compare_mixed_kinds() {
        assert_eq!(compare("1", false, "1.0", false), Ordering::Equal);
        assert_eq!(compare("1", true, "1", false), Ordering::Equal);
        assert_eq!(compare("abc", true, "ABC", true), Ordering::Equal);
        assert_eq!(compare("a", true, "b", true), Ordering::Less);
        assert_eq!(compare("2", false, "10", false), Ordering::Less);
        // String vs number goes numeric: 'abc' is 0
        assert_eq!(compare("abc", true, "0", false), Ordering::Equal);
    }

    #[test]
    fn test_like() {
        assert!(like_matches("admin", "%"));
        assert!(like_matches("admin", "ad%"));
        assert!(like_matches("admin", "_dmin"));
        assert!(like_matches("ADMIN", "admin"));
        assert!(!like_matches("admin", "root%"));
        assert!(like_matches("", "%"));
        assert!(!like_matches("a", ""));
        assert!(like_matches("50%", "50\\%"));
        assert!(!like_matches("505", "50\\%"));
        assert!(like_matches("a_b", "a\\_b"));
        assert!(!like_matches("axb", "a\\_b"));
        assert!(like_matches("abcabd", "%ab_"));
        assert!(like_matches("mississippi", "%iss%pi"));
        assert!(!like_matches("mississippi", "%iss%pix"));
    }

    #[test]
    fn test_like_many_wildcards_stays_fast() {
        let text = "a".repeat(2000);
        let pattern = format!("{}b", "%a".repeat(200));
        let start = std::time::Instant::now();
        assert!(!like_matches(&text, &pattern));
        assert!(like_matches(&text, &"%a".repeat(200)));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_match_all_pattern() {
        assert!(is_match_all_pattern("%"));
        assert!(is_match_all_pattern("%%%"));
        assert!(!is_match_all_pattern(""));
        assert!(!is_match_all_pattern("%a%"));
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("61646d696e").as_deref(), Some("admin"));
        assert_eq!(decode_hex("0x41").as_deref(), Some("A"));
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
    }
}
