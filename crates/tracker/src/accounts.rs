//! Registration, login, and bearer sessions.
//!
//! Passwords are stored as `salt$digest` where digest is SHA-256 over the
//! salt followed by the password, both hex encoded. Session tokens are 32
//! random bytes, hex encoded, and held in memory only.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::error::{Result, TrackerError};
use crate::rbac::{Actor, Permission, Role};
use crate::store::TaskStore;
use crate::types::{Tenant, TenantId, User, UserId};

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum tenant name length in characters.
pub const MAX_TENANT_NAME_LEN: usize = 100;

const SALT_LEN: usize = 16;

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").ok());
const TOKEN_LEN: usize = 32;

/// Registration input.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub password: String,
    /// Tenant to create or join.
    pub tenant: String,
}

/// Login input.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// An issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Validate and normalize an email address.
///
/// # Errors
///
/// Returns a validation error for malformed addresses.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() {
        return Err(TrackerError::validation("email", "must not be empty"));
    }
    let email_regex = EMAIL_RE
        .as_ref()
        .ok_or_else(|| TrackerError::validation("email", "failed to compile validation regex"))?;
    if !email_regex.is_match(&email) {
        return Err(TrackerError::validation(
            "email",
            format!("'{email}' is not a valid address"),
        ));
    }
    Ok(email)
}

/// Hash a password with a fresh random salt.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    format!("{}${}", hex::encode(salt), digest(&salt, password))
}

/// Check a password against a stored `salt$digest`.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, expected)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let actual = digest(&salt, password);
    // Compare without an early exit
    actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Live bearer tokens.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: TimeDelta,
}

impl SessionRegistry {
    /// Create a registry issuing tokens valid for `ttl`.
    #[must_use]
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Issue a token for `user`.
    pub async fn issue(&self, user: UserId, now: DateTime<Utc>) -> Session {
        let mut bytes = [0u8; TOKEN_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        let session = Session {
            token: hex::encode(bytes),
            user_id: user,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());
        session
    }

    /// The user behind `token`. Expired tokens are dropped on lookup.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Unauthorized`] for unknown or expired tokens.
    pub async fn resolve(&self, token: &str, now: DateTime<Utc>) -> Result<UserId> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(token) {
            Some(session) if session.expires_at > now => Ok(session.user_id),
            Some(_) => {
                sessions.remove(token);
                Err(TrackerError::Unauthorized("session expired".to_string()))
            }
            None => Err(TrackerError::Unauthorized("invalid token".to_string())),
        }
    }

    /// Revoke `token`. Returns whether it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drop every expired token, returning how many were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before.saturating_sub(sessions.len())
    }
}

/// User accounts and sessions.
pub struct Accounts {
    store: Arc<dyn TaskStore>,
    sessions: SessionRegistry,
    clock: Arc<dyn Clock>,
}

impl Accounts {
    /// Create the account service.
    pub fn new(
        store: Arc<dyn TaskStore>,
        sessions: SessionRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            sessions,
            clock,
        }
    }

    /// Register a user. The first user of a new tenant becomes its admin;
    /// later users join as members.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input and a conflict if the email
    /// is taken.
    pub async fn register(&self, req: RegisterRequest) -> Result<User> {
        let email = normalize_email(&req.email)?;
        if req.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(TrackerError::validation(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        let tenant_name = req.tenant.trim();
        if tenant_name.is_empty() || tenant_name.chars().count() > MAX_TENANT_NAME_LEN {
            return Err(TrackerError::validation(
                "tenant",
                format!("must be 1 to {MAX_TENANT_NAME_LEN} characters"),
            ));
        }
        if self.store.user_by_email(&email).await?.is_some() {
            return Err(TrackerError::Conflict(format!(
                "email '{email}' is already registered"
            )));
        }

        let now = self.clock.now();
        let display_name = req
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        let user = User {
            id: UserId::new(),
            tenant_id: TenantId::new(),
            email,
            display_name,
            role: Role::Member,
            password_hash: hash_password(&req.password),
            created_at: now,
        };

        let user = self.join_or_found(tenant_name, user, now).await?;
        tracing::info!(
            user_id = %user.id,
            tenant_id = %user.tenant_id,
            role = %user.role,
            "User registered"
        );
        Ok(user)
    }

    /// Join an existing tenant as a member, or create the tenant with `user`
    /// as its admin in one store call.
    async fn join_or_found(&self, name: &str, mut user: User, now: DateTime<Utc>) -> Result<User> {
        if let Some(existing) = self.store.tenant_by_name(name).await? {
            return self.join(existing.id, user).await;
        }
        let tenant = Tenant {
            id: user.tenant_id,
            name: name.to_string(),
            created_at: now,
        };
        user.role = Role::Admin;
        match self.store.create_tenant(tenant, user.clone()).await {
            Ok(()) => Ok(user),
            Err(TrackerError::Conflict(reason)) => {
                // Lost a race with another registration for the same tenant
                match self.store.tenant_by_name(name).await? {
                    Some(existing) => self.join(existing.id, user).await,
                    None => Err(TrackerError::Conflict(reason)),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn join(&self, tenant: TenantId, mut user: User) -> Result<User> {
        user.tenant_id = tenant;
        user.role = Role::Member;
        self.store.insert_user(user.clone()).await?;
        Ok(user)
    }

    /// Check credentials and issue a session.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Unauthorized`] without saying whether the
    /// email or the password was wrong.
    pub async fn login(&self, req: LoginRequest) -> Result<(Session, User)> {
        let invalid = || TrackerError::Unauthorized("invalid email or password".to_string());
        let email = normalize_email(&req.email).map_err(|_| invalid())?;
        let user = self
            .store
            .user_by_email(&email)
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(&req.password, &user.password_hash) {
            tracing::debug!(user_id = %user.id, "Rejected login");
            return Err(invalid());
        }
        let session = self.sessions.issue(user.id, self.clock.now()).await;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok((session, user))
    }

    /// Revoke a token.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Unauthorized`] if the token is unknown.
    pub async fn logout(&self, token: &str) -> Result<()> {
        if self.sessions.revoke(token).await {
            Ok(())
        } else {
            Err(TrackerError::Unauthorized("invalid token".to_string()))
        }
    }

    /// Resolve a bearer token to the acting user with their current role.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Unauthorized`] for bad tokens or users that no
    /// longer exist.
    pub async fn authenticate(&self, token: &str) -> Result<Actor> {
        let user_id = self.sessions.resolve(token, self.clock.now()).await?;
        let user = self
            .store
            .get_user(user_id)
            .await
            .map_err(|_| TrackerError::Unauthorized("user no longer exists".to_string()))?;
        Ok(Actor::from_user(&user))
    }

    /// The actor's own account.
    ///
    /// # Errors
    ///
    /// Returns not-found if the account has vanished.
    pub async fn me(&self, actor: &Actor) -> Result<User> {
        self.store.get_user(actor.user_id).await
    }

    /// Users in the actor's tenant.
    ///
    /// # Errors
    ///
    /// Requires [`Permission::UserRead`].
    pub async fn list_users(&self, actor: &Actor) -> Result<Vec<User>> {
        actor.require(Permission::UserRead)?;
        self.store.list_users(actor.tenant_id).await
    }

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// Requires [`Permission::UserManage`]; the target must be in the actor's
    /// tenant; the tenant's last admin cannot be demoted.
    pub async fn change_role(&self, actor: &Actor, target: UserId, role: Role) -> Result<User> {
        actor.require(Permission::UserManage)?;
        let user = self.store.get_user(target).await?;
        if user.tenant_id != actor.tenant_id {
            return Err(TrackerError::not_found("user", target));
        }
        // The store refuses to demote the last admin under its write lock
        let updated = self.store.update_user_role(target, role).await?;
        tracing::info!(
            actor = %actor.user_id,
            user_id = %target,
            role = %role,
            "Role changed"
        );
        Ok(updated)
    }

    /// Purge expired sessions.
    pub async fn purge_sessions(&self) -> usize {
        self.sessions.purge_expired(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::clock::FixedClock;
    use crate::store::InMemoryTaskStore;
    use chrono::TimeZone;
    use std::time::Duration;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 10, 0, 0).unwrap()
    }

    fn accounts() -> (Accounts, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(start()));
        let accounts = Accounts::new(
            InMemoryTaskStore::new_arc(),
            SessionRegistry::new(Duration::from_secs(3600)),
            clock.clone(),
        );
        (accounts, clock)
    }

    fn register_req(email: &str, tenant: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            display_name: None,
            password: "correct horse".to_string(),
            tenant: tenant.to_string(),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let stored = hash_password("hunter22");
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
        assert!(!verify_password("hunter22", "garbage"));
        // Salted: same password, different hash
        assert_ne!(stored, hash_password("hunter22"));
    }

    #[test]
    fn test_email_pattern_compiles() {
        assert!(EMAIL_RE.is_some());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ann@Example.COM ").unwrap(), "ann@example.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("").is_err());
    }

    #[tokio::test]
    async fn test_first_user_is_admin_then_members() {
        let (accounts, _) = accounts();
        let first = accounts.register(register_req("a@acme.io", "Acme")).await.unwrap();
        let second = accounts.register(register_req("b@acme.io", "acme")).await.unwrap();
        assert_eq!(first.role, Role::Admin);
        assert_eq!(second.role, Role::Member);
        assert_eq!(first.tenant_id, second.tenant_id);
        assert_eq!(first.display_name, "a");
    }

    #[tokio::test]
    async fn test_register_rejects_short_password_and_duplicates() {
        let (accounts, _) = accounts();
        let mut short = register_req("a@acme.io", "Acme");
        short.password = "short".to_string();
        assert!(matches!(
            accounts.register(short).await,
            Err(TrackerError::Validation { .. })
        ));

        accounts.register(register_req("a@acme.io", "Acme")).await.unwrap();
        assert!(matches!(
            accounts.register(register_req("A@acme.io", "Other")).await,
            Err(TrackerError::Conflict(_))
        ));
        // A failed registration never leaves an empty tenant behind
        assert!(accounts.store.tenant_by_name("Other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_and_authenticate() {
        let (accounts, _) = accounts();
        let user = accounts.register(register_req("a@acme.io", "Acme")).await.unwrap();

        let bad = LoginRequest {
            email: "a@acme.io".to_string(),
            password: "wrong password".to_string(),
        };
        assert!(matches!(accounts.login(bad).await, Err(TrackerError::Unauthorized(_))));

        let good = LoginRequest {
            email: "A@ACME.IO".to_string(),
            password: "correct horse".to_string(),
        };
        let (session, _) = accounts.login(good).await.unwrap();
        assert_eq!(session.token.len(), TOKEN_LEN * 2);

        let actor = accounts.authenticate(&session.token).await.unwrap();
        assert_eq!(actor.user_id, user.id);
        assert_eq!(actor.role, Role::Admin);

        accounts.logout(&session.token).await.unwrap();
        assert!(accounts.authenticate(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_sessions_expire() {
        let (accounts, clock) = accounts();
        accounts.register(register_req("a@acme.io", "Acme")).await.unwrap();
        let (session, _) = accounts
            .login(LoginRequest {
                email: "a@acme.io".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap();

        clock.advance(TimeDelta::hours(2));
        let err = accounts.authenticate(&session.token).await.unwrap_err();
        assert_eq!(err, TrackerError::Unauthorized("session expired".to_string()));
    }

    #[tokio::test]
    async fn test_purge_expired_sessions() {
        let registry = SessionRegistry::new(Duration::from_secs(60));
        registry.issue(UserId::new(), start()).await;
        registry.issue(UserId::new(), start() + TimeDelta::minutes(5)).await;
        assert_eq!(registry.purge_expired(start() + TimeDelta::minutes(2)).await, 1);
    }

    #[tokio::test]
    async fn test_change_role_rules() {
        let (accounts, _) = accounts();
        let admin = accounts.register(register_req("a@acme.io", "Acme")).await.unwrap();
        let member = accounts.register(register_req("b@acme.io", "Acme")).await.unwrap();
        let outsider = accounts.register(register_req("c@other.io", "Other")).await.unwrap();
        let admin_actor = Actor::from_user(&admin);

        // Members cannot manage users
        assert!(matches!(
            accounts
                .change_role(&Actor::from_user(&member), admin.id, Role::Member)
                .await,
            Err(TrackerError::Forbidden { .. })
        ));

        // Cannot reach into another tenant
        assert!(matches!(
            accounts.change_role(&admin_actor, outsider.id, Role::Manager).await,
            Err(TrackerError::NotFound { .. })
        ));

        // Last admin stays admin
        assert!(matches!(
            accounts.change_role(&admin_actor, admin.id, Role::Member).await,
            Err(TrackerError::NotAllowed { .. })
        ));

        let promoted = accounts
            .change_role(&admin_actor, member.id, Role::Admin)
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);
        let demoted = accounts
            .change_role(&admin_actor, admin.id, Role::Manager)
            .await
            .unwrap();
        assert_eq!(demoted.role, Role::Manager);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_self_demotions_keep_one_admin() {
        let (accounts, _) = accounts();
        let first = accounts.register(register_req("a@acme.io", "Acme")).await.unwrap();
        let second = accounts.register(register_req("b@acme.io", "Acme")).await.unwrap();
        let second = accounts
            .change_role(&Actor::from_user(&first), second.id, Role::Admin)
            .await
            .unwrap();

        let first_actor = Actor::from_user(&first);
        let second_actor = Actor::from_user(&second);
        let (a, b) = tokio::join!(
            accounts.change_role(&first_actor, first.id, Role::Member),
            accounts.change_role(&second_actor, second.id, Role::Member),
        );
        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        assert!(
            [a, b]
                .into_iter()
                .any(|r| matches!(r, Err(TrackerError::NotAllowed { .. })))
        );

        let admins = accounts
            .store
            .list_users(first.tenant_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|u| u.role == Role::Admin)
            .count();
        assert_eq!(admins, 1);
    }

    #[tokio::test]
    async fn test_authenticate_sees_current_role() {
        let (accounts, _) = accounts();
        let admin = accounts.register(register_req("a@acme.io", "Acme")).await.unwrap();
        accounts.register(register_req("b@acme.io", "Acme")).await.unwrap();
        let (session, member) = accounts
            .login(LoginRequest {
                email: "b@acme.io".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap();

        accounts
            .change_role(&Actor::from_user(&admin), member.id, Role::Manager)
            .await
            .unwrap();
        let actor = accounts.authenticate(&session.token).await.unwrap();
        assert_eq!(actor.role, Role::Manager);
    }
}
