//! Route handlers and the JSON shapes they share.

pub mod auth;
pub mod health;
pub mod hoaxes;
pub mod password;
pub mod root;
pub mod user_register;
pub mod users;

use crate::store::{Hoax, HoaxId, Page, PageRequest, User, UserId};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Public view of an account; never carries secrets.
#[derive(ToSchema, Serialize, Debug, PartialEq, Eq)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct HoaxView {
    pub id: HoaxId,
    pub content: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub user: UserView,
}

impl From<Hoax> for HoaxView {
    fn from(hoax: Hoax) -> Self {
        Self {
            id: hoax.id,
            content: hoax.content,
            timestamp: hoax.timestamp,
            user: UserView {
                id: hoax.author.id,
                username: hoax.author.username,
                email: hoax.author.email,
            },
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub content: Vec<UserView>,
    pub page: u32,
    pub size: u32,
    pub total_pages: u32,
}

impl From<Page<User>> for UserPage {
    fn from(page: Page<User>) -> Self {
        let page = page.map(UserView::from);
        Self {
            content: page.content,
            page: page.page,
            size: page.size,
            total_pages: page.total_pages,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HoaxPage {
    pub content: Vec<HoaxView>,
    pub page: u32,
    pub size: u32,
    pub total_pages: u32,
}

impl From<Page<Hoax>> for HoaxPage {
    fn from(page: Page<Hoax>) -> Self {
        let page = page.map(HoaxView::from);
        Self {
            content: page.content,
            page: page.page,
            size: page.size,
            total_pages: page.total_pages,
        }
    }
}

/// Raw `page`/`size` query values; junk is clamped rather than rejected.
#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Zero-based page index, defaults to 0.
    page: Option<String>,
    /// Page size in `1..=10`, defaults to 10.
    size: Option<String>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        Self::from_query(params.page.as_deref(), params.size.as_deref())
    }
}

/// Path ids arrive as text so a malformed id gets the route's own error.
pub(crate) fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}
