//! Parsing of size and duration operands.

use std::ffi::OsStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum SizeParseError {
    Empty,
    Negative,
    Invalid,
    TooLarge,
}

/// Parses a byte count such as `4096`, `64K`, `1.5M` or `2MB`.
///
/// A bare suffix letter or `<letter>iB` is a power of 1024, `<letter>B` a
/// power of 1000. Errors are rendered with `flag` for context.
pub(crate) fn parse_size_argument(value: &OsStr, flag: &str) -> Result<u64, String> {
    let text = value.to_string_lossy();
    let trimmed = text.trim();
    let display = if trimmed.is_empty() {
        text.as_ref()
    } else {
        trimmed
    };

    parse_size_spec(trimmed).map_err(|error| match error {
        SizeParseError::Empty => format!("{flag} value must not be empty"),
        SizeParseError::Negative => {
            format!("invalid {flag} '{display}': size must be non-negative")
        }
        SizeParseError::Invalid => format!(
            "invalid {flag} '{display}': expected a size with an optional K/M/G suffix"
        ),
        SizeParseError::TooLarge => {
            format!("invalid {flag} '{display}': size exceeds the supported range")
        }
    })
}

fn parse_size_spec(text: &str) -> Result<u64, SizeParseError> {
    let unsigned = text.strip_prefix('+').unwrap_or(text);
    if unsigned.is_empty() {
        return Err(SizeParseError::Empty);
    }
    if unsigned.starts_with('-') {
        return Err(SizeParseError::Negative);
    }

    let numeric_end = unsigned
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(unsigned.len());
    let (numeric, suffix) = unsigned.split_at(numeric_end);
    if !numeric.bytes().any(|byte| byte.is_ascii_digit()) || numeric.matches('.').count() > 1 {
        return Err(SizeParseError::Invalid);
    }

    let (integer, fraction) = numeric.split_once('.').unwrap_or((numeric, ""));
    let multiplier = suffix_multiplier(suffix)?;

    let integer: u128 = if integer.is_empty() {
        0
    } else {
        integer.parse().map_err(|_| SizeParseError::TooLarge)?
    };
    let mut value = integer
        .checked_mul(u128::from(multiplier))
        .ok_or(SizeParseError::TooLarge)?;

    if !fraction.is_empty() {
        let digits = fraction.len().min(18);
        let numerator: u128 = fraction[..digits]
            .parse()
            .map_err(|_| SizeParseError::Invalid)?;
        let denominator = 10u128.pow(digits as u32);
        value += numerator * u128::from(multiplier) / denominator;
    }

    u64::try_from(value).map_err(|_| SizeParseError::TooLarge)
}

fn suffix_multiplier(suffix: &str) -> Result<u64, SizeParseError> {
    let mut chars = suffix.chars();
    let Some(letter) = chars.next() else {
        return Ok(1);
    };
    let exponent = match letter.to_ascii_lowercase() {
        'b' if chars.as_str().is_empty() => return Ok(1),
        'k' => 1,
        'm' => 2,
        'g' => 3,
        _ => return Err(SizeParseError::Invalid),
    };
    let base: u64 = match chars.as_str() {
        "" => 1024,
        rest if rest.eq_ignore_ascii_case("ib") => 1024,
        rest if rest.eq_ignore_ascii_case("b") => 1000,
        _ => return Err(SizeParseError::Invalid),
    };
    Ok(base.pow(exponent))
}

/// Parses a whole number of `unit`s into a [`Duration`].
pub(crate) fn parse_duration_argument(
    value: &OsStr,
    flag: &str,
    unit: fn(u64) -> Duration,
) -> Result<Duration, String> {
    let text = value.to_string_lossy();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(format!("{flag} value must not be empty"));
    }
    trimmed
        .strip_prefix('+')
        .unwrap_or(trimmed)
        .parse::<u64>()
        .map(unit)
        .map_err(|_| format!("invalid {flag} '{trimmed}': expected a non-negative integer"))
}
