use rust_decimal::Decimal;
use std::str::FromStr;

/// Levenshtein edit distance using the two-row O(min(m,n)) space algorithm.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a = s1.as_bytes();
    let b = s2.as_bytes();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Edit-distance similarity in [0.0, 1.0].
pub fn similarity(s1: &str, s2: &str) -> f32 {
    let max_len = s1.len().max(s2.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(s1, s2) as f32 / max_len as f32)
}

/// Header text as compared against field names and synonyms: lowercase,
/// whitespace collapsed, trailing colon dropped, underscores read as spaces.
pub fn normalize_header(s: &str) -> String {
    s.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(':')
        .trim_end()
        .to_lowercase()
}

/// Parse a hand-typed amount: `1,234.50`, `$99.99`, `-50`, `(75.25)`.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let cleaned = s.replace([',', '$', ' '], "");
    if cleaned.is_empty() {
        return None;
    }
    let dec = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -dec } else { dec })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn identical_strings_are_zero() {
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("", ""), 0);
    }

    #[test]
    fn empty_string_is_length_of_other() {
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", ""), 3);
    }

    #[test]
    fn single_edits() {
        assert_eq!(levenshtein_distance("qty", "qtys"), 1);
        assert_eq!(levenshtein_distance("part no", "part #"), 2);
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("quantity", "quantity"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert!(similarity("quantity", "quanity") > 0.8);
        assert!(similarity("quantity", "operation") < 0.5);
    }

    #[test]
    fn normalize_header_collapses() {
        assert_eq!(normalize_header("  Part   Number "), "part number");
        assert_eq!(normalize_header("Qty:"), "qty");
        assert_eq!(normalize_header("extended_cost"), "extended cost");
        assert_eq!(normalize_header("Part\nNumber - Revision"), "part number - revision");
    }

    #[test]
    fn parse_decimal_forms() {
        assert_eq!(parse_decimal("123.45"), Some(dec!(123.45)));
        assert_eq!(parse_decimal("$1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_decimal("-50"), Some(dec!(-50)));
        assert_eq!(parse_decimal("(75.25)"), Some(dec!(-75.25)));
        assert_eq!(parse_decimal("0"), Some(dec!(0)));
    }

    #[test]
    fn parse_decimal_invalid() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal("()"), None);
    }
}
