use serde::Serialize;

use super::{fail, CommandResult, Notice};
use crate::auth::Credentials;
use crate::models::Profile;
use crate::{users, Books};

/// The user management screen's list of profiles.
#[derive(Debug, Default, Clone, Serialize)]
pub struct UserDirectory {
    profiles: Vec<Profile>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub async fn load(&mut self, books: &Books) -> CommandResult<()> {
        self.profiles = users::list_profiles(&books.store, &books.session)
            .await
            .map_err(fail("list_profiles", "Failed to fetch users. Please try again."))?;
        Ok(())
    }

    pub async fn add_user(
        &mut self,
        books: &Books,
        email: &str,
        password: &str,
    ) -> CommandResult<Notice> {
        let creds = Credentials::new(email, password);
        let profile = users::create_user(&books.identity, &books.store, &books.session, &creds)
            .await
            .map_err(fail("create_user", "Failed to add user. Please try again."))?;
        self.profiles.push(profile);
        self.profiles.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(Notice::success("Success", "User added successfully."))
    }

    pub async fn toggle_role(&mut self, books: &Books, index: usize) -> CommandResult<Notice> {
        let Some(current) = self.profiles.get(index).cloned() else {
            return Err(Notice::error("User not found."));
        };
        let updated = users::toggle_role(&books.store, &books.session, &current)
            .await
            .map_err(fail(
                "toggle_role",
                "Failed to update user role. Please try again.",
            ))?;
        self.profiles[index] = updated;
        Ok(Notice::success("Success", "User role updated successfully."))
    }
}
