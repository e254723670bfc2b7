//! Role-based user management.
//!
//! Listing profiles, changing roles and creating users all require the
//! `ManageUsers` capability. User creation goes through the identity
//! service's admin API (service role key) and then writes the matching
//! `profiles` row with the `user` role.

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{AuthUser, Capability, Credentials, IdentityClient, SessionContext};
use crate::error::{BooksError, Result};
use crate::models::{Profile, Role};
use crate::store::{Query, StoreClient};

const PROFILES_TABLE: &str = "profiles";

#[derive(Serialize)]
struct RolePatch {
    role: Role,
}

pub async fn list_profiles(store: &StoreClient, ctx: &SessionContext) -> Result<Vec<Profile>> {
    let actor = ctx.require(Capability::ManageUsers)?;
    store
        .select(
            &actor.token,
            PROFILES_TABLE,
            &Query::new().select("id, email, role").order("email", true),
        )
        .await
}

/// Set a user's role. Changing the acting admin's own role also updates
/// the session context.
pub async fn set_role(
    store: &StoreClient,
    ctx: &SessionContext,
    user_id: Uuid,
    role: Role,
) -> Result<Profile> {
    let actor = ctx.require(Capability::ManageUsers)?;
    let updated: Vec<Profile> = store
        .update(
            &actor.token,
            PROFILES_TABLE,
            &Query::new().eq("id", user_id),
            &RolePatch { role },
        )
        .await?;
    let profile = updated
        .into_iter()
        .next()
        .ok_or(BooksError::NotFound { entity: "profile" })?;
    info!(
        by = %actor.user_id,
        user_id = %profile.id,
        role = %profile.role,
        "user role updated"
    );
    ctx.update_role(profile.id, profile.role);
    Ok(profile)
}

/// Flip between `admin` and `user`.
pub async fn toggle_role(
    store: &StoreClient,
    ctx: &SessionContext,
    profile: &Profile,
) -> Result<Profile> {
    set_role(store, ctx, profile.id, profile.role.toggled()).await
}

/// Create a confirmed account and its `user` profile.
pub async fn create_user(
    identity: &IdentityClient,
    store: &StoreClient,
    ctx: &SessionContext,
    creds: &Credentials,
) -> Result<Profile> {
    let actor = ctx.require(Capability::ManageUsers)?;
    // Configuration problems win over input problems.
    identity.require_admin_api()?;
    creds.validate()?;

    let user: AuthUser = identity.admin_create_user(creds).await?;
    let profile = Profile {
        id: user.id,
        email: user.email.unwrap_or_else(|| creds.email.clone()),
        role: Role::User,
    };
    let stored: Profile = store
        .insert(&actor.token, PROFILES_TABLE, &profile)
        .await
        .inspect_err(|e| error!(user_id = %profile.id, error = %e, "profile insert failed"))?;
    info!(by = %actor.user_id, user_id = %stored.id, "user created");
    Ok(stored)
}

/// Self-service registration; no capability needed.
pub async fn sign_up(identity: &IdentityClient, creds: &Credentials) -> Result<AuthUser> {
    let user = identity.sign_up(creds).await?;
    info!(user_id = %user.id, "user signed up");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::signed_in_context;
    use crate::auth::AuthEvent;
    use crate::config::AppConfig;
    use mockito::Matcher;
    use std::sync::{Arc, Mutex};

    fn clients(url: &str, service_key: Option<&str>) -> (IdentityClient, StoreClient) {
        let mut config = AppConfig::new(url, "anon-key").unwrap();
        if let Some(key) = service_key {
            config = config.with_service_role_key(key);
        }
        let config = Arc::new(config);
        (
            IdentityClient::new(Arc::clone(&config)).unwrap(),
            StoreClient::new(config).unwrap(),
        )
    }

    #[tokio::test]
    async fn plain_users_cannot_list_profiles() {
        let server = mockito::Server::new_async().await;
        let (_, store) = clients(&server.url(), None);
        let (ctx, _) = signed_in_context(Role::User);
        let err = list_profiles(&store, &ctx).await.unwrap_err();
        assert!(matches!(err, BooksError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn create_user_without_service_key_is_config_error() {
        let mut server = mockito::Server::new_async().await;
        let admin_api = server
            .mock("POST", "/auth/v1/admin/users")
            .expect(0)
            .create_async()
            .await;
        let (identity, store) = clients(&server.url(), None);
        let (ctx, _) = signed_in_context(Role::Admin);

        let err = create_user(&identity, &store, &ctx, &Credentials::new("bad", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BooksError::Config(_)));
        admin_api.assert_async().await;
    }

    #[tokio::test]
    async fn create_user_validates_before_calling_out() {
        let server = mockito::Server::new_async().await;
        let (identity, store) = clients(&server.url(), Some("service-key"));
        let (ctx, _) = signed_in_context(Role::Admin);

        let err = create_user(&identity, &store, &ctx, &Credentials::new("bad", "short"))
            .await
            .unwrap_err();
        assert_eq!(err.field_errors().len(), 2);
    }

    #[tokio::test]
    async fn create_user_writes_profile_with_user_role() {
        let mut server = mockito::Server::new_async().await;
        let new_id = Uuid::new_v4();
        let admin_api = server
            .mock("POST", "/auth/v1/admin/users")
            .match_header("authorization", "Bearer service-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "email": "clerk@esanga.co.tz",
                "email_confirm": true
            })))
            .with_status(200)
            .with_body(serde_json::json!({ "id": new_id, "email": "clerk@esanga.co.tz" }).to_string())
            .create_async()
            .await;
        let profile_insert = server
            .mock("POST", "/rest/v1/profiles")
            .match_body(Matcher::Json(serde_json::json!({
                "id": new_id,
                "email": "clerk@esanga.co.tz",
                "role": "user"
            })))
            .with_status(201)
            .with_body(
                serde_json::json!({ "id": new_id, "email": "clerk@esanga.co.tz", "role": "user" })
                    .to_string(),
            )
            .create_async()
            .await;

        let (identity, store) = clients(&server.url(), Some("service-key"));
        let (ctx, _) = signed_in_context(Role::Admin);
        let profile = create_user(
            &identity,
            &store,
            &ctx,
            &Credentials::new("clerk@esanga.co.tz", "password123"),
        )
        .await
        .expect("create user");
        assert_eq!(profile.role, Role::User);
        admin_api.assert_async().await;
        profile_insert.assert_async().await;
    }

    #[tokio::test]
    async fn demoting_yourself_updates_the_context() {
        let mut server = mockito::Server::new_async().await;
        let (ctx, admin_id) = signed_in_context(Role::Admin);
        let _m = server
            .mock("PATCH", "/rest/v1/profiles")
            .match_query(Matcher::UrlEncoded("id".into(), format!("eq.{admin_id}")))
            .match_body(Matcher::Json(serde_json::json!({ "role": "user" })))
            .with_status(200)
            .with_body(
                serde_json::json!([{ "id": admin_id, "email": "owner@esanga.co.tz", "role": "user" }])
                    .to_string(),
            )
            .create_async()
            .await;

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        ctx.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        let (_, store) = clients(&server.url(), None);
        let me = ctx.profile().unwrap();
        let updated = toggle_role(&store, &ctx, &me).await.expect("toggle");
        assert_eq!(updated.role, Role::User);
        assert!(!ctx.can(Capability::ManageUsers));
        assert_eq!(
            *events.lock().unwrap(),
            vec![AuthEvent::RoleChanged { role: Role::User }]
        );
    }

    #[tokio::test]
    async fn role_change_for_unknown_user_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("PATCH", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let (_, store) = clients(&server.url(), None);
        let (ctx, _) = signed_in_context(Role::Admin);
        let err = set_role(&store, &ctx, Uuid::new_v4(), Role::Admin)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
