use super::{
    error::{ErrorBody, GenericMessage},
    handlers::{
        auth::session::{self, Credentials, LoginResponse},
        health::{self, Health},
        hoaxes::{self, HoaxSubmission},
        password::{self, PasswordResetRequest, PasswordUpdate},
        user_register::{self, RegisterRequest},
        users::{self, UserUpdate},
        HoaxPage, HoaxView, UserPage, UserView,
    },
};
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Contact, License,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        session::login,
        session::logout,
        user_register::register,
        user_register::activate,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        password::request_reset,
        password::update_password,
        hoaxes::submit,
        hoaxes::list,
        hoaxes::user_hoaxes,
        hoaxes::delete_hoax,
    ),
    components(schemas(
        Health,
        Credentials,
        LoginResponse,
        RegisterRequest,
        UserUpdate,
        PasswordResetRequest,
        PasswordUpdate,
        HoaxSubmission,
        UserView,
        UserPage,
        HoaxView,
        HoaxPage,
        GenericMessage,
        ErrorBody,
    )),
    modifiers(&CargoInfo, &BearerAuth),
    tags(
        (name = "auth", description = "Login and logout with opaque session tokens"),
        (name = "users", description = "Registration, activation and owner-only account changes"),
        (name = "password", description = "Password recovery"),
        (name = "hoaxes", description = "Posts"),
        (name = "health", description = "Service status"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Fill contact and license from Cargo metadata.
struct CargoInfo;

impl Modify for CargoInfo {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = env!("CARGO_PKG_NAME").to_string();
        openapi.info.version = env!("CARGO_PKG_VERSION").to_string();
        openapi.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
        openapi.info.contact = cargo_contact();
        openapi.info.license = cargo_license();
    }
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some("Session token returned by POST /api/1.0/auth"))
                    .build(),
            ),
        );
    }
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(value: &str) -> Option<&str> {
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    match author.find('<') {
        Some(start) => (
            non_empty(author[..start].trim()),
            non_empty(author[start + 1..].trim_end_matches('>').trim()),
        ),
        None => (non_empty(author.trim()), None),
    }
}
