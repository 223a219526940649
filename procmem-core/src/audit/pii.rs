//! PII-shaped substring detection and reversible tokenization.
//!
//! Detects emails and API-key-shaped tokens (long hex/base64-ish runs
//! prefixed by a recognizable scheme, e.g. `sk-...`, `ghp_...`) and
//! replaces each with a stable placeholder token. `detokenize` reverses
//! the substitution exactly, given the same match list `tokenize`
//! returned — this is the reversible half of the "PII detector" named in
//! the executor's logging surface, not the full external PII-tokenizer
//! product (explicitly out of scope).

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
});

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:sk|ghp|gho|ghu|ghs|xox[baprs])-[A-Za-z0-9_-]{10,}\b").unwrap()
});

/// A detected PII-shaped span and the token it was replaced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiMatch {
    pub token: String,
    pub original: String,
}

/// Find every email- or API-key-shaped substring in `text` and replace it
/// with a `[[PII:n]]` placeholder, in left-to-right order. Returns the
/// redacted text plus the list of matches needed to reverse it.
#[must_use]
pub fn tokenize(text: &str) -> (String, Vec<PiiMatch>) {
    let mut spans: Vec<(usize, usize)> = EMAIL_RE
        .find_iter(text)
        .chain(API_KEY_RE.find_iter(text))
        .map(|m| (m.start(), m.end()))
        .collect();
    spans.sort_unstable();
    dedup_overlapping(&mut spans);

    let mut result = String::with_capacity(text.len());
    let mut matches = Vec::with_capacity(spans.len());
    let mut cursor = 0;
    for (i, &(start, end)) in spans.iter().enumerate() {
        result.push_str(&text[cursor..start]);
        let token = format!("[[PII:{i}]]");
        result.push_str(&token);
        matches.push(PiiMatch { token, original: text[start..end].to_string() });
        cursor = end;
    }
    result.push_str(&text[cursor..]);
    (result, matches)
}

/// Reverse a [`tokenize`] pass: substitute every placeholder back with its
/// original text. Matches are applied in the order given, which must be
/// the order `tokenize` returned them in (tokens don't overlap, so order
/// doesn't otherwise matter).
#[must_use]
pub fn detokenize(redacted: &str, matches: &[PiiMatch]) -> String {
    let mut result = redacted.to_string();
    for m in matches {
        result = result.replacen(&m.token, &m.original, 1);
    }
    result
}

fn dedup_overlapping(spans: &mut Vec<(usize, usize)>) {
    let mut kept: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for &(start, end) in spans.iter() {
        if let Some(&(_, last_end)) = kept.last() {
            if start < last_end {
                continue;
            }
        }
        kept.push((start, end));
    }
    *spans = kept;
}

/// Stateless convenience wrapper bundling a redaction pass, for callers
/// (the executor's trace sink) that only need the redacted text and don't
/// hold onto the match list for a later reverse pass.
pub struct Redactor;

impl Redactor {
    #[must_use]
    pub fn redact(text: &str) -> String {
        tokenize(text).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_detokenize_round_trips_email() {
        let text = "contact me at jane.doe@example.com about the outage";
        let (redacted, matches) = tokenize(text);
        assert!(!redacted.contains("jane.doe@example.com"));
        assert_eq!(detokenize(&redacted, &matches), text);
    }

    #[test]
    fn tokenize_detokenize_round_trips_api_key() {
        let text = "export TOKEN=sk-abcdefghij1234567890 now";
        let (redacted, matches) = tokenize(text);
        assert!(!redacted.contains("sk-abcdefghij1234567890"));
        assert_eq!(detokenize(&redacted, &matches), text);
    }

    #[test]
    fn tokenize_detokenize_round_trips_multiple_matches() {
        let text = "a@b.com leaked alongside ghp_0123456789abcdefghij and c@d.org";
        let (redacted, matches) = tokenize(text);
        assert_eq!(matches.len(), 3);
        assert_eq!(detokenize(&redacted, &matches), text);
    }

    #[test]
    fn text_without_pii_is_unchanged() {
        let text = "nothing sensitive here";
        let (redacted, matches) = tokenize(text);
        assert_eq!(redacted, text);
        assert!(matches.is_empty());
    }

    #[test]
    fn redactor_hides_pii_without_reversibility() {
        let redacted = Redactor::redact("email me at a@b.com");
        assert!(!redacted.contains("a@b.com"));
    }
}
