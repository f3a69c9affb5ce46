use crate::error::{AppError, Result};

/// Minimum number of digits in a phone number.
const PHONE_MIN_DIGITS: usize = 10;
/// Maximum number of digits in a phone number (E.164).
const PHONE_MAX_DIGITS: usize = 15;

/// Normalizes a phone number to `+<digits>` or `<digits>`.
///
/// Spaces, dashes, dots and parentheses are dropped. A leading `+` is kept.
///
/// # Arguments
///
/// * `raw` - The phone number as entered.
///
/// # Returns
///
/// A `Result` containing the normalized number.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(AppError::Validation(
                    "Phone number can only contain digits, spaces, dashes and a leading +".to_string(),
                ));
            }
        }
    }

    if digits.len() < PHONE_MIN_DIGITS || digits.len() > PHONE_MAX_DIGITS {
        return Err(AppError::Validation(format!(
            "Phone number must have between {} and {} digits",
            PHONE_MIN_DIGITS, PHONE_MAX_DIGITS
        )));
    }

    Ok(format!("{}{}", plus, digits))
}

/// `garde` adapter for [`normalize_phone`].
#[allow(clippy::ptr_arg)]
pub fn validate_phone(value: &String, _ctx: &()) -> garde::Result {
    normalize_phone(value)
        .map(|_| ())
        .map_err(|e| garde::Error::new(e.to_string()))
}

/// Trims and lowercases an email address; blank becomes `None`.
pub fn normalize_email(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}
