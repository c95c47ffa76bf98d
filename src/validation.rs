//! Field-shape rules for request bodies.
//!
//! Each check returns the first failing [`Message`] for its field, or `None`.

use crate::locale::Message;
use regex::Regex;
use std::collections::BTreeMap;

/// Field name to message key, rendered as `validationErrors`.
pub type FieldErrors = BTreeMap<&'static str, Message>;

const USERNAME_MIN: usize = 4;
const USERNAME_MAX: usize = 32;
const PASSWORD_MIN: usize = 6;
const HOAX_MIN: usize = 10;
const HOAX_MAX: usize = 5000;

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

#[must_use]
pub fn check_username(username: Option<&str>) -> Option<Message> {
    let Some(username) = username else {
        return Some(Message::UsernameNull);
    };
    let length = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&length) {
        return Some(Message::UsernameSize);
    }
    None
}

#[must_use]
pub fn check_email(email: Option<&str>) -> Option<Message> {
    match email {
        None => Some(Message::EmailNull),
        Some(email) if !valid_email(&normalize_email(email)) => Some(Message::EmailInvalid),
        Some(_) => None,
    }
}

/// Passwords need six characters and one lowercase, uppercase and digit each.
#[must_use]
pub fn check_password(password: Option<&str>) -> Option<Message> {
    let Some(password) = password else {
        return Some(Message::PasswordNull);
    };
    if password.chars().count() < PASSWORD_MIN {
        return Some(Message::PasswordSize);
    }
    let has_lower = password.chars().any(char::is_lowercase);
    let has_upper = password.chars().any(char::is_uppercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if has_lower && has_upper && has_digit {
        None
    } else {
        Some(Message::PasswordPattern)
    }
}

#[must_use]
pub fn check_hoax_content(content: Option<&str>) -> Option<Message> {
    match content {
        Some(content) if (HOAX_MIN..=HOAX_MAX).contains(&content.chars().count()) => None,
        _ => Some(Message::HoaxContentSize),
    }
}

/// Run the registration rules over every field.
#[must_use]
pub fn check_registration(
    username: Option<&str>,
    email: Option<&str>,
    password: Option<&str>,
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if let Some(message) = check_username(username) {
        errors.insert("username", message);
    }
    if let Some(message) = check_email(email) {
        errors.insert("email", message);
    }
    if let Some(message) = check_password(password) {
        errors.insert("password", message);
    }
    errors
}
