use tracing::warn;

use super::{fail, notice_for, CommandResult, Notice};
use crate::auth::{self, Credentials};
use crate::error::BooksError;
use crate::models::Profile;
use crate::{users, Books};

/// Sign in and load the role. Identity-service rejections (wrong password,
/// unconfirmed email) are shown as the service worded them.
pub async fn login(books: &Books, email: &str, password: &str) -> CommandResult<(Profile, Notice)> {
    let creds = Credentials::new(email, password);
    match auth::sign_in(&books.identity, &books.store, &books.session, &creds).await {
        Ok(profile) => Ok((profile, Notice::success("Success", "Logged in successfully"))),
        Err(BooksError::Remote { status, message }) if status < 500 => {
            warn!(status, %message, "sign-in rejected");
            Err(Notice::error(message))
        }
        Err(err) if err.is_not_found() => Err(notice_for(
            "login",
            "Failed to fetch user role. Please try again.",
            err,
        )),
        Err(err) => Err(notice_for(
            "login",
            "Failed to sign in. Please try again.",
            err,
        )),
    }
}

pub async fn logout(books: &Books) -> CommandResult<()> {
    auth::sign_out(&books.identity, &books.session)
        .await
        .map_err(fail("logout", "Failed to sign out. Please try again."))
}

pub async fn register(books: &Books, email: &str, password: &str) -> CommandResult<Notice> {
    let creds = Credentials::new(email, password);
    users::sign_up(&books.identity, &creds)
        .await
        .map_err(fail("sign_up", "Failed to create account. Please try again."))?;
    Ok(Notice::success(
        "Success",
        "Account created. Check your email to confirm it.",
    ))
}

/// Keep the session alive; a failed refresh signs the user out.
pub async fn keep_alive(books: &Books) -> CommandResult<bool> {
    auth::refresh_if_needed(&books.identity, &books.session)
        .await
        .map_err(fail(
            "refresh_session",
            "Your session has expired. Please sign in again.",
        ))
}
