// --- File: crates/darsly_tamara/src/phone.rs ---
//! Phone number normalization for the gateway.
//!
//! Tamara refuses checkouts without a mobile number in international
//! (E.164-style) format. Normalization is a pure function over the raw
//! stored string plus the market's country calling code, so the same code
//! serves the UAE rollout and any later market by configuration alone.

use thiserror::Error;

/// A phone number in the `+<digits>` form the gateway accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPhone(String);

impl NormalizedPhone {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NormalizedPhone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a raw number could not be normalized.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number '{0}' does not normalize to an international number")]
    Invalid(String),
}

/// E.164 allows at most 15 digits; anything under 8 is not a dialable
/// subscriber number in any market we serve.
const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;

/// Normalize a raw stored phone number to international format.
///
/// Accepted inputs, after stripping spaces, dots, dashes and parentheses:
/// - `+<country><number>` is kept as-is
/// - `00<country><number>` international dialing prefix is rewritten to `+`
/// - `0<number>` national format has the leading trunk zero replaced by
///   `default_country_code`
/// - bare digits are assumed national without trunk zero and prefixed with
///   `default_country_code`
pub fn normalize(raw: &str, default_country_code: &str) -> Result<NormalizedPhone, PhoneError> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if compact.is_empty() {
        return Err(PhoneError::Empty);
    }

    let cc_digits: String = default_country_code
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    let digits = if let Some(rest) = compact.strip_prefix('+') {
        rest.to_string()
    } else if let Some(rest) = compact.strip_prefix("00") {
        rest.to_string()
    } else if let Some(rest) = compact.strip_prefix('0') {
        format!("{}{}", cc_digits, rest)
    } else {
        format!("{}{}", cc_digits, compact)
    };

    if digits.is_empty()
        || !digits.chars().all(|c| c.is_ascii_digit())
        || digits.starts_with('0')
        || digits.len() < MIN_DIGITS
        || digits.len() > MAX_DIGITS
    {
        return Err(PhoneError::Invalid(raw.to_string()));
    }

    Ok(NormalizedPhone(format!("+{}", digits)))
}

/// Pick the first stored number that normalizes.
pub fn first_normalizable<'a, I>(numbers: I, default_country_code: &str) -> Option<NormalizedPhone>
where
    I: IntoIterator<Item = &'a String>,
{
    numbers
        .into_iter()
        .find_map(|raw| normalize(raw, default_country_code).ok())
}
