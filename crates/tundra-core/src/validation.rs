//! Field validators for registration and catalog input.
//!
//! Error texts are part of the public API and are returned to clients verbatim.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ValidationError, ValidationResult};

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("Invalid username regex"));

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("Invalid email regex")
});

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_username(username: &str) -> ValidationResult<()> {
    if username.is_empty() {
        return Err(ValidationError::new("username", "username is required"));
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::new(
            "username",
            "username must be alphanumeric (letters and numbers only, no special characters or spaces)",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> ValidationResult<()> {
    if email.is_empty() {
        return Err(ValidationError::new("email", "email is required"));
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::new(
            "email",
            "email must be a valid email address format (e.g., user@example.com)",
        ));
    }
    Ok(())
}

/// Password strength: at least 8 bytes with an uppercase letter, a lowercase
/// letter, a number and a special character.
///
/// Each character counts towards the first class it matches, so a character
/// is never both a letter and a special character.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "password",
            "password must be at least 8 characters long",
        ));
    }

    let (mut upper, mut lower, mut number, mut special) = (false, false, false, false);
    for c in password.chars() {
        if c.is_uppercase() {
            upper = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if c.is_numeric() {
            number = true;
        } else if is_special(c) {
            special = true;
        }
    }

    if !upper {
        return Err(ValidationError::new(
            "password",
            "password must include at least one uppercase letter (A-Z)",
        ));
    }
    if !lower {
        return Err(ValidationError::new(
            "password",
            "password must include at least one lowercase letter (a-z)",
        ));
    }
    if !number {
        return Err(ValidationError::new(
            "password",
            "password must include at least one number (0-9)",
        ));
    }
    if !special {
        return Err(ValidationError::new(
            "password",
            "password must include at least one special character (e.g., !@#$%^&*)",
        ));
    }
    Ok(())
}

// Punctuation or symbol.
fn is_special(c: char) -> bool {
    c.is_ascii_punctuation()
        || (!c.is_ascii() && !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control())
}

/// Parses a form price. Must be a finite number greater than zero.
pub fn parse_price(raw: &str) -> ValidationResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| ValidationError::new("price", "Price must be a positive number"))
}

/// Parses a form stock level. Must be an integer, zero or greater.
pub fn parse_stock(raw: &str) -> ValidationResult<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|s| *s >= 0)
        .ok_or_else(|| ValidationError::new("stock", "Stock must be a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_passwords() {
        for pw in ["Password123!", "Hello@1234", "Secure#Pass1", "MyP@ssw0rd"] {
            assert!(validate_password(pw).is_ok(), "{pw} should be valid");
        }
    }

    #[test]
    fn test_password_rules_in_order() {
        let cases = [
            ("Pass1!", "password must be at least 8 characters long"),
            (
                "password123!",
                "password must include at least one uppercase letter (A-Z)",
            ),
            (
                "PASSWORD123!",
                "password must include at least one lowercase letter (a-z)",
            ),
            (
                "Password!!!",
                "password must include at least one number (0-9)",
            ),
            (
                "Password123",
                "password must include at least one special character (e.g., !@#$%^&*)",
            ),
        ];
        for (pw, expected) in cases {
            assert_eq!(validate_password(pw).unwrap_err().to_string(), expected);
        }
    }

    #[test]
    fn test_password_symbol_counts_as_special() {
        assert!(validate_password("Password1+").is_ok());
        assert!(validate_password("Password1€").is_ok());
        assert!(validate_password("Password1 ").is_err());
    }

    #[test]
    fn test_username() {
        assert!(validate_username("john123").is_ok());
        assert!(validate_username("JohnDoe").is_ok());
        assert_eq!(
            validate_username("").unwrap_err().to_string(),
            "username is required"
        );
        for bad in ["john_doe", "john doe", "john@doe", "jöhn"] {
            assert!(validate_username(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_email() {
        for ok in [
            "user@example.com",
            "first.last+tag@sub.example.co",
            "a_b%c@d-e.io",
        ] {
            assert!(validate_email(ok).is_ok(), "{ok} should be valid");
        }
        assert_eq!(
            validate_email("").unwrap_err().to_string(),
            "email is required"
        );
        for bad in ["plainaddress", "@example.com", "user@", "user@example", "user@example.c"] {
            assert_eq!(
                validate_email(bad).unwrap_err().to_string(),
                "email must be a valid email address format (e.g., user@example.com)"
            );
        }
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("19.99").unwrap(), 19.99);
        assert_eq!(parse_price(" 5 ").unwrap(), 5.0);
        for bad in ["0", "-1", "abc", "", "NaN", "inf"] {
            assert_eq!(
                parse_price(bad).unwrap_err().to_string(),
                "Price must be a positive number"
            );
        }
    }

    #[test]
    fn test_parse_stock() {
        assert_eq!(parse_stock("0").unwrap(), 0);
        assert_eq!(parse_stock("42").unwrap(), 42);
        for bad in ["-1", "1.5", "ten", ""] {
            assert_eq!(
                parse_stock(bad).unwrap_err().to_string(),
                "Stock must be a non-negative integer"
            );
        }
    }
}
