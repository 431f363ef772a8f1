//! Output sanitization for agent-executed commands.
//!
//! The sanitizer is built from the secret values injected into the
//! child environment.  For every value it computes the raw bytes plus
//! every common re-encoding an exfiltrating command could print:
//! standard and URL-safe base64 (padded and unpadded), lowercase and
//! uppercase hex (with and without a `0x` prefix), and three percent-
//! encoding styles.  Replacements apply longest-first so a longer
//! encoding is never partially shadowed by a shorter one, and short
//! secrets are sanitized like any other — length is not an exemption.

use std::collections::HashSet;

use base64::engine::general_purpose::{
    STANDARD as B64_STD, STANDARD_NO_PAD as B64_STD_NOPAD, URL_SAFE as B64_URL,
    URL_SAFE_NO_PAD as B64_URL_NOPAD,
};
use base64::Engine;

/// Replaces every known encoding of every secret value with a
/// `[REDACTED:<ENV_NAME>]` marker.
pub struct OutputSanitizer {
    /// (token, replacement), sorted longest token first.
    replacements: Vec<(String, String)>,
}

impl OutputSanitizer {
    /// Build the replacement table from `(env_name, value)` pairs.
    pub fn new<'a, I>(secrets: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut replacements = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (env_name, value) in secrets {
            if value.is_empty() {
                continue;
            }
            let marker = format!("[REDACTED:{env_name}]");
            for token in encodings_of(value) {
                if seen.insert(token.clone()) {
                    replacements.push((token, marker.clone()));
                }
            }
        }

        // Longest first so partial overlaps never leave residue.
        replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));

        Self { replacements }
    }

    /// Replace every occurrence of every token.
    pub fn sanitize(&self, input: &str) -> String {
        let mut output = input.to_string();
        for (token, marker) in &self.replacements {
            if output.contains(token.as_str()) {
                output = output.replace(token.as_str(), marker);
            }
        }
        output
    }

    /// Number of distinct tokens being matched (for diagnostics).
    pub fn token_count(&self) -> usize {
        self.replacements.len()
    }
}

/// All encodings of one value that the sanitizer strips.
fn encodings_of(value: &str) -> Vec<String> {
    let bytes = value.as_bytes();
    let hex_lower = hex::encode(bytes);
    let hex_upper = hex::encode_upper(bytes);

    vec![
        value.to_string(),
        B64_STD.encode(bytes),
        B64_STD_NOPAD.encode(bytes),
        B64_URL.encode(bytes),
        B64_URL_NOPAD.encode(bytes),
        format!("0x{hex_lower}"),
        format!("0x{hex_upper}"),
        hex_lower,
        hex_upper,
        percent_encode(value, PercentStyle::Query),
        percent_encode(value, PercentStyle::Path),
        percent_encode(value, PercentStyle::PathLower),
    ]
}

#[derive(Clone, Copy)]
enum PercentStyle {
    /// Query string style: space becomes `+`, hex digits uppercase.
    Query,
    /// Path style: space becomes `%20`, hex digits uppercase.
    Path,
    /// Path style with lowercase hex digits.
    PathLower,
}

/// Percent-encode everything outside the unreserved set
/// (`A-Z a-z 0-9 - _ . ~`).
fn percent_encode(value: &str, style: PercentStyle) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for &byte in value.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' if matches!(style, PercentStyle::Query) => out.push('+'),
            _ => match style {
                PercentStyle::PathLower => out.push_str(&format!("%{byte:02x}")),
                _ => out.push_str(&format!("%{byte:02X}")),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer(value: &str) -> OutputSanitizer {
        OutputSanitizer::new([("X", value)])
    }

    #[test]
    fn raw_value_is_redacted() {
        let s = sanitizer("supersecret123");
        assert_eq!(
            s.sanitize("out: supersecret123\n"),
            "out: [REDACTED:X]\n"
        );
    }

    #[test]
    fn every_encoding_is_covered() {
        let value = "supersecret123";
        let s = sanitizer(value);

        let encodings = [
            value.to_string(),
            B64_STD.encode(value),
            B64_STD_NOPAD.encode(value),
            B64_URL.encode(value),
            B64_URL_NOPAD.encode(value),
            hex::encode(value),
            hex::encode_upper(value),
            format!("0x{}", hex::encode(value)),
            format!("0x{}", hex::encode_upper(value)),
        ];
        for encoding in &encodings {
            let sanitized = s.sanitize(&format!("leak={encoding}!"));
            assert!(
                !sanitized.contains(encoding.as_str()),
                "encoding survived: {encoding}"
            );
            assert!(sanitized.contains("[REDACTED:X]"));
        }
    }

    #[test]
    fn percent_encodings_are_covered() {
        // A value with spaces and symbols exercises all three styles.
        let value = "pa ss/wörd+1";
        let s = sanitizer(value);

        for style in [
            PercentStyle::Query,
            PercentStyle::Path,
            PercentStyle::PathLower,
        ] {
            let encoded = percent_encode(value, style);
            let sanitized = s.sanitize(&format!("url?q={encoded}"));
            assert!(
                !sanitized.contains(&encoded),
                "percent encoding survived: {encoded}"
            );
        }
    }

    #[test]
    fn short_secrets_are_still_sanitized() {
        let s = sanitizer("ab");
        assert_eq!(s.sanitize("x=ab"), "x=[REDACTED:X]");
    }

    #[test]
    fn multiple_occurrences_all_replaced() {
        let s = sanitizer("tok");
        assert_eq!(
            s.sanitize("tok and tok again"),
            "[REDACTED:X] and [REDACTED:X] again"
        );
    }

    #[test]
    fn longest_token_wins_over_substring() {
        // "secret12" is a prefix of "secret123" — the longer value's
        // tokens must be applied first so no residue remains.
        let s = OutputSanitizer::new([("LONG", "secret123"), ("SHORT", "secret12")]);
        assert_eq!(s.sanitize("secret123"), "[REDACTED:LONG]");
        assert_eq!(s.sanitize("secret12"), "[REDACTED:SHORT]");
    }

    #[test]
    fn unrelated_output_is_untouched() {
        let s = sanitizer("supersecret123");
        let input = "nothing to see here";
        assert_eq!(s.sanitize(input), input);
    }

    #[test]
    fn empty_values_are_ignored() {
        let s = OutputSanitizer::new([("EMPTY", "")]);
        assert_eq!(s.token_count(), 0);
        assert_eq!(s.sanitize("anything"), "anything");
    }

    #[test]
    fn multiple_secrets_each_get_their_marker() {
        let s = OutputSanitizer::new([("A", "alpha-value"), ("B", "beta-value")]);
        let out = s.sanitize("alpha-value beta-value");
        assert_eq!(out, "[REDACTED:A] [REDACTED:B]");
    }
}
