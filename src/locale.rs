//! Message keys and their English/Turkish texts.
//!
//! Domain code only ever deals in [`Message`] keys. The HTTP boundary resolves
//! them against the [`Locale`] taken from `Accept-Language`.

use axum::http::{header::ACCEPT_LANGUAGE, HeaderMap};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    En,
    Tr,
}

impl Locale {
    /// Pick the locale from the first language tag of `Accept-Language`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok())
            .map_or(Self::En, Self::from_tag)
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .split(',')
            .next()
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if primary == "tr" || primary.starts_with("tr-") {
            Self::Tr
        } else {
            Self::En
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Message {
    UsernameNull,
    UsernameSize,
    EmailNull,
    EmailInvalid,
    EmailInuse,
    PasswordNull,
    PasswordSize,
    PasswordPattern,
    ValidationFailure,
    UserCreateSuccess,
    EmailFailure,
    AccountActivationSuccess,
    AccountActivationFailure,
    UserNotFound,
    AuthenticationFailure,
    InactiveAuthenticationFailure,
    UnauthorizedUserUpdate,
    UnauthorizedUserDelete,
    UnauthorizedPasswordReset,
    PasswordResetRequestSuccess,
    PasswordUpdateSuccess,
    EmailNotInuse,
    HoaxContentSize,
    HoaxSubmitSuccess,
    UnauthorizedHoaxSubmit,
    UnauthorizedHoaxDelete,
    LogoutSuccess,
    InternalError,
}

impl Message {
    /// Stable key, safe to use in logs and tests.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::UsernameNull => "username_null",
            Self::UsernameSize => "username_size",
            Self::EmailNull => "email_null",
            Self::EmailInvalid => "email_invalid",
            Self::EmailInuse => "email_inuse",
            Self::PasswordNull => "password_null",
            Self::PasswordSize => "password_size",
            Self::PasswordPattern => "password_pattern",
            Self::ValidationFailure => "validation_failure",
            Self::UserCreateSuccess => "user_create_success",
            Self::EmailFailure => "email_failure",
            Self::AccountActivationSuccess => "account_activation_success",
            Self::AccountActivationFailure => "account_activation_failure",
            Self::UserNotFound => "user_not_found",
            Self::AuthenticationFailure => "authentication_failure",
            Self::InactiveAuthenticationFailure => "inactive_authentication_failure",
            Self::UnauthorizedUserUpdate => "unauthorized_user_update",
            Self::UnauthorizedUserDelete => "unauthorized_user_delete",
            Self::UnauthorizedPasswordReset => "unauthorized_password_reset",
            Self::PasswordResetRequestSuccess => "password_reset_request_success",
            Self::PasswordUpdateSuccess => "password_update_success",
            Self::EmailNotInuse => "email_not_inuse",
            Self::HoaxContentSize => "hoax_content_size",
            Self::HoaxSubmitSuccess => "hoax_submit_success",
            Self::UnauthorizedHoaxSubmit => "unauthorized_hoax_submit",
            Self::UnauthorizedHoaxDelete => "unauthorized_hoax_delete",
            Self::LogoutSuccess => "logout_success",
            Self::InternalError => "internal_error",
        }
    }

    #[must_use]
    pub const fn text(self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => self.english(),
            Locale::Tr => self.turkish(),
        }
    }

    const fn english(self) -> &'static str {
        match self {
            Self::UsernameNull => "Username cannot be null",
            Self::UsernameSize => "Must have min 4 and max 32 characters",
            Self::EmailNull => "E-mail cannot be null",
            Self::EmailInvalid => "E-mail is not valid",
            Self::EmailInuse => "E-mail in use",
            Self::PasswordNull => "Password cannot be null",
            Self::PasswordSize => "Password must be at least 6 characters",
            Self::PasswordPattern => {
                "Password must have at least 1 uppercase, 1 lowercase letter and 1 number"
            }
            Self::ValidationFailure => "Validation Failure",
            Self::UserCreateSuccess => "User created",
            Self::EmailFailure => "E-mail Failure",
            Self::AccountActivationSuccess => "Account is activated",
            Self::AccountActivationFailure => "This account is either active or the token is invalid",
            Self::UserNotFound => "User not found",
            Self::AuthenticationFailure => "Incorrect credentials",
            Self::InactiveAuthenticationFailure => "Account is inactive",
            Self::UnauthorizedUserUpdate => "You are not authorized to update user",
            Self::UnauthorizedUserDelete => "You are not authorized to delete user",
            Self::UnauthorizedPasswordReset => {
                "You are not authorized to update your password. Please follow the password reset steps again."
            }
            Self::PasswordResetRequestSuccess => "Check your e-mail for resetting your password",
            Self::PasswordUpdateSuccess => "Password is updated",
            Self::EmailNotInuse => "E-mail is not in use",
            Self::HoaxContentSize => "Hoax must be min 10 and max 5000 characters",
            Self::HoaxSubmitSuccess => "Hoax is saved",
            Self::UnauthorizedHoaxSubmit => "You are not authorized to post hoax",
            Self::UnauthorizedHoaxDelete => "You are not authorized to delete this hoax",
            Self::LogoutSuccess => "Logged out",
            Self::InternalError => "Internal server error",
        }
    }

    const fn turkish(self) -> &'static str {
        match self {
            Self::UsernameNull => "Kullanici adi bos olamaz",
            Self::UsernameSize => "En az 4 en fazla 32 karakter olmali",
            Self::EmailNull => "E-posta bos olamaz",
            Self::EmailInvalid => "E-posta gecerli degil",
            Self::EmailInuse => "Bu e-posta kullanimda",
            Self::PasswordNull => "Sifre bos olamaz",
            Self::PasswordSize => "Sifre en az 6 karakter olmali",
            Self::PasswordPattern => {
                "Sifrede en az 1 buyuk harf, 1 kucuk harf ve 1 sayi bulunmalidir"
            }
            Self::ValidationFailure => "Girilen degerler uygun degil",
            Self::UserCreateSuccess => "Kullanici olusturuldu",
            Self::EmailFailure => "E-posta gonderiminde hata olustu",
            Self::AccountActivationSuccess => "Hesabiniz aktif edildi",
            Self::AccountActivationFailure => "Bu hesap zaten aktif ya da token gecersiz",
            Self::UserNotFound => "Kullanici bulunamadi",
            Self::AuthenticationFailure => "Kullanici bilgileri hatali",
            Self::InactiveAuthenticationFailure => "Hesabiniz aktif degil",
            Self::UnauthorizedUserUpdate => "Kullanici bilgilerini guncellemeye yetkiniz yok",
            Self::UnauthorizedUserDelete => "Bu kullaniciyi silmeye yetkiniz yok",
            Self::UnauthorizedPasswordReset => {
                "Sifrenizi guncellemeye yetkiniz yok. Lutfen sifre sifirlama adimlarini tekrar izleyin."
            }
            Self::PasswordResetRequestSuccess => {
                "Sifrenizi sifirlamak icin e-postanizi kontrol edin"
            }
            Self::PasswordUpdateSuccess => "Sifreniz guncellendi",
            Self::EmailNotInuse => "Bu e-posta kullanimda degil",
            Self::HoaxContentSize => "Hoax en az 10 en fazla 5000 karakter olmali",
            Self::HoaxSubmitSuccess => "Hoax kaydedildi",
            Self::UnauthorizedHoaxSubmit => "Hoax gondermeye yetkiniz yok",
            Self::UnauthorizedHoaxDelete => "Bu hoaxu silmeye yetkiniz yok",
            Self::LogoutSuccess => "Cikis yapildi",
            Self::InternalError => "Sunucu hatasi",
        }
    }
}
