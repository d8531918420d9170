//! Phone number normalization
//!
//! Every stored phone number and every phone lookup goes through
//! [`normalize`]. Comparing a normalized value against a raw one silently
//! misses known members, so callers never store or query raw input.

/// Country code assumed for bare national numbers
pub const DEFAULT_COUNTRY_CODE: &str = "1";

/// Canonicalize a raw phone string using [`DEFAULT_COUNTRY_CODE`]
///
/// Pure and total: never fails. Empty or blank input yields empty output;
/// other input without digits yields a bare `+`, which callers reject
/// through [`PhoneKey::has_digits`].
pub fn normalize(raw: &str) -> String {
    normalize_with_country(raw, DEFAULT_COUNTRY_CODE)
}

/// Canonicalize a raw phone string against an explicit default country code
///
/// Rules, first match wins:
/// 1. Ten national digits → `+<cc><digits>`
/// 2. Ten digits preceded by the country code → `+<digits>`
/// 3. Input whose first character is `+` → returned verbatim
/// 4. Anything else → `+<digits>`
pub fn normalize_with_country(raw: &str, country_code: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 10 {
        return format!("+{}{}", country_code, digits);
    }

    if digits.len() == 10 + country_code.len() && digits.starts_with(country_code) {
        return format!("+{}", digits);
    }

    if raw.starts_with('+') {
        return raw.to_string();
    }

    format!("+{}", digits)
}

/// Canonical phone key used for every member and consent lookup
///
/// Only constructible through normalization (or from a value read back from
/// storage, which was normalized on the way in), so a raw carrier string can
/// never reach a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct PhoneKey(String);

impl PhoneKey {
    /// Normalize raw input with the default country code
    pub fn parse(raw: &str) -> Self {
        Self(normalize(raw))
    }

    /// Normalize raw input with an explicit default country code
    pub fn parse_with_country(raw: &str, country_code: &str) -> Self {
        Self(normalize_with_country(raw, country_code))
    }

    /// Wrap a value read back from a phone column
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// False for blank input and for input like `"+"` or `"abc"`
    pub fn has_digits(&self) -> bool {
        self.0.chars().any(|c| c.is_ascii_digit())
    }

    /// Last four digits, used for placeholder identifiers and log redaction
    pub fn last_four(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        chars[chars.len().saturating_sub(4)..].iter().collect()
    }
}

impl std::fmt::Display for PhoneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punctuation_variants_share_one_key() {
        let variants = [
            "5551234567",
            "(555) 123-4567",
            "555.123.4567",
            "+1 555 123 4567",
            "1-555-123-4567",
            "+15551234567",
            "  555-123-4567  ",
        ];
        for raw in variants {
            assert_eq!(normalize(raw), "+15551234567", "input {:?}", raw);
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "5551234567",
            "+44 20 7946 0958",
            "123",
            "+",
            "",
            "15551234567",
            "25551234567",
            "call me",
        ];
        for raw in inputs {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_input_without_digits_yields_bare_plus() {
        assert_eq!(normalize("+"), "+");
        assert_eq!(normalize("abc"), "+");
        assert!(!PhoneKey::parse("+").has_digits());
        assert!(!PhoneKey::parse("abc").has_digits());
        assert!(!PhoneKey::parse("").has_digits());
        assert!(PhoneKey::parse("12345").has_digits());
    }

    #[test]
    fn test_leading_plus_returned_verbatim() {
        assert_eq!(normalize("+44 20 7946 0958"), "+44 20 7946 0958");
    }

    #[test]
    fn test_plus_after_whitespace_is_not_leading() {
        assert_eq!(normalize("  +44 20 7946 0958"), "+442079460958");
    }

    #[test]
    fn test_eleven_digits_with_other_leading_digit_falls_back() {
        assert_eq!(normalize("25551234567"), "+25551234567");
    }

    #[test]
    fn test_short_code_falls_back_to_plus_digits() {
        assert_eq!(normalize("12345"), "+12345");
    }

    #[test]
    fn test_phone_key_normalizes_on_parse() {
        let a = PhoneKey::parse("(555) 123-4567");
        let b = PhoneKey::parse("+1 555.123.4567");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "+15551234567");
        assert_eq!(a.last_four(), "4567");
    }

    #[test]
    fn test_explicit_country_code() {
        assert_eq!(normalize_with_country("2079460958", "44"), "+442079460958");
        assert_eq!(normalize_with_country("442079460958", "44"), "+442079460958");
    }
}
