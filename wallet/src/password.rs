//! Password policy (§4.9): at least 12 characters, drawing from at least
//! three of {upper, lower, digit, symbol}.

use crate::error::{Error, Result};

pub const MIN_PASSWORD_LENGTH: usize = 12;

pub fn validate(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::WeakPassword(format!(
            "must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());
    let class_count = [has_upper, has_lower, has_digit, has_symbol]
        .iter()
        .filter(|x| **x)
        .count();
    if class_count < 3 {
        return Err(Error::WeakPassword(
            "must mix at least 3 of uppercase, lowercase, digit, symbol".into(),
        ));
    }
    Ok(())
}
