//! User-action facade.
//!
//! One function (or state-holder method) per screen action. Every failure is
//! logged here and turned into a [`Notice`] carrying a message fit for the
//! person at the till; nothing propagates as a raw [`BooksError`].

use serde::Serialize;
use tracing::{error, warn};

use crate::error::BooksError;

pub mod auth;
pub mod costs;
pub mod reports;
pub mod sales;
pub mod users;

pub const CONFIG_ERROR_MESSAGE: &str = "Server configuration error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// A toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn success(title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            variant: NoticeVariant::Default,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
            variant: NoticeVariant::Destructive,
        }
    }

    pub fn is_error(&self) -> bool {
        self.variant == NoticeVariant::Destructive
    }
}

pub type CommandResult<T> = Result<T, Notice>;

/// Log `err` under `action` and pick the message to show.
///
/// Backend and transport failures collapse to `generic`; input, session and
/// permission problems keep their own wording so the user can act on them.
pub(crate) fn notice_for(action: &str, generic: &str, err: BooksError) -> Notice {
    match &err {
        BooksError::Validation(_) | BooksError::Unauthenticated | BooksError::Forbidden { .. } => {
            warn!(action, error = %err, "action rejected");
        }
        _ => error!(action, error = %err, "action failed"),
    }

    match err {
        BooksError::Config(_) => Notice::error(CONFIG_ERROR_MESSAGE),
        BooksError::Validation(_) => Notice::error(err.to_string()),
        BooksError::Unauthenticated => Notice::error("Please sign in to continue."),
        BooksError::Forbidden { .. } => {
            Notice::error("You do not have permission to perform this action.")
        }
        _ => Notice::error(generic),
    }
}

/// `map_err` adapter around [`notice_for`].
pub(crate) fn fail<'a>(action: &'a str, generic: &'a str) -> impl FnOnce(BooksError) -> Notice + 'a {
    move |err| notice_for(action, generic, err)
}
