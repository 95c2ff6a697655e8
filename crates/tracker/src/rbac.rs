//! Role-based access control.
//!
//! Roles map to permission strings through a static table. Task-level checks
//! layer ownership on top: an `*:own` permission covers tasks the actor
//! created or is assigned, an `*:any` permission covers every task in the
//! actor's tenant. Nothing ever crosses a tenant boundary.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::types::{Task, TenantId, User, UserId};

/// A user's role within their tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Role {
    Admin,
    Manager,
    Member,
}

impl Role {
    /// All roles, most privileged first.
    pub const ALL: [Self; 3] = [Self::Admin, Self::Manager, Self::Member];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Member => "member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "member" => Ok(Self::Member),
            other => Err(TrackerError::validation(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

impl From<Role> for &'static str {
    fn from(role: Role) -> Self {
        role.as_str()
    }
}

impl TryFrom<String> for Role {
    type Error = TrackerError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A permission string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Permission {
    TaskCreate,
    TaskReadOwn,
    TaskReadAny,
    TaskUpdateOwn,
    TaskUpdateAny,
    TaskDeleteOwn,
    TaskDeleteAny,
    TaskAssign,
    RecurrenceManage,
    UserRead,
    UserManage,
    ReportViewOwn,
    ReportViewTenant,
    NotificationRead,
}

impl Permission {
    /// Every permission, in table order.
    pub const ALL: [Self; 14] = [
        Self::TaskCreate,
        Self::TaskReadOwn,
        Self::TaskReadAny,
        Self::TaskUpdateOwn,
        Self::TaskUpdateAny,
        Self::TaskDeleteOwn,
        Self::TaskDeleteAny,
        Self::TaskAssign,
        Self::RecurrenceManage,
        Self::UserRead,
        Self::UserManage,
        Self::ReportViewOwn,
        Self::ReportViewTenant,
        Self::NotificationRead,
    ];

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreate => "task:create",
            Self::TaskReadOwn => "task:read:own",
            Self::TaskReadAny => "task:read:any",
            Self::TaskUpdateOwn => "task:update:own",
            Self::TaskUpdateAny => "task:update:any",
            Self::TaskDeleteOwn => "task:delete:own",
            Self::TaskDeleteAny => "task:delete:any",
            Self::TaskAssign => "task:assign",
            Self::RecurrenceManage => "recurrence:manage",
            Self::UserRead => "user:read",
            Self::UserManage => "user:manage",
            Self::ReportViewOwn => "report:view:own",
            Self::ReportViewTenant => "report:view:tenant",
            Self::NotificationRead => "notification:read",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| TrackerError::validation("permission", format!("unknown permission '{s}'")))
    }
}

impl From<Permission> for &'static str {
    fn from(p: Permission) -> Self {
        p.as_str()
    }
}

impl TryFrom<String> for Permission {
    type Error = TrackerError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

const MEMBER: &[Permission] = &[
    Permission::TaskCreate,
    Permission::TaskReadOwn,
    Permission::TaskUpdateOwn,
    Permission::TaskDeleteOwn,
    Permission::UserRead,
    Permission::ReportViewOwn,
    Permission::NotificationRead,
];

const MANAGER: &[Permission] = &[
    Permission::TaskCreate,
    Permission::TaskReadOwn,
    Permission::TaskReadAny,
    Permission::TaskUpdateOwn,
    Permission::TaskUpdateAny,
    Permission::TaskDeleteOwn,
    Permission::TaskAssign,
    Permission::RecurrenceManage,
    Permission::UserRead,
    Permission::ReportViewOwn,
    Permission::ReportViewTenant,
    Permission::NotificationRead,
];

const ADMIN: &[Permission] = &Permission::ALL;

/// The permissions granted to `role`.
#[must_use]
pub const fn permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => ADMIN,
        Role::Manager => MANAGER,
        Role::Member => MEMBER,
    }
}

/// Whether `role` holds `permission`.
#[must_use]
pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions(role).contains(&permission)
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: Role,
}

impl Actor {
    /// The actor acting as `user`.
    #[must_use]
    pub const fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            tenant_id: user.tenant_id,
            role: user.role,
        }
    }

    /// Whether this actor holds `permission`.
    #[must_use]
    pub fn can(&self, permission: Permission) -> bool {
        has_permission(self.role, permission)
    }

    /// Require `permission`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Forbidden`] naming the missing permission.
    pub fn require(&self, permission: Permission) -> Result<()> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(TrackerError::forbidden(permission))
        }
    }
}

/// What the actor wants to do with an existing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Read,
    Update,
    Delete,
}

impl TaskAction {
    /// The (own, any) permission pair covering this action.
    #[must_use]
    pub const fn permissions(self) -> (Permission, Permission) {
        match self {
            Self::Read => (Permission::TaskReadOwn, Permission::TaskReadAny),
            Self::Update => (Permission::TaskUpdateOwn, Permission::TaskUpdateAny),
            Self::Delete => (Permission::TaskDeleteOwn, Permission::TaskDeleteAny),
        }
    }
}

/// Check `actor` may perform `action` on `task`.
///
/// # Errors
///
/// A task in another tenant is reported as not found so its id does not
/// leak. Otherwise returns [`TrackerError::Forbidden`] with the broader
/// permission the actor would need.
pub fn authorize(actor: &Actor, action: TaskAction, task: &Task) -> Result<()> {
    if task.tenant_id != actor.tenant_id {
        return Err(TrackerError::not_found("task", task.id));
    }
    let (own, any) = action.permissions();
    if actor.can(any) || (actor.can(own) && task.involves(actor.user_id)) {
        return Ok(());
    }
    // Hide tasks the actor cannot even read
    if action == TaskAction::Read || !can_read(actor, task) {
        return Err(TrackerError::not_found("task", task.id));
    }
    Err(TrackerError::forbidden(any))
}

fn can_read(actor: &Actor, task: &Task) -> bool {
    actor.can(Permission::TaskReadAny)
        || (actor.can(Permission::TaskReadOwn) && task.involves(actor.user_id))
}

/// Check `actor` may assign a task to `assignee` (`None` means unassigned).
///
/// # Errors
///
/// Assigning to anyone but yourself requires [`Permission::TaskAssign`].
pub fn authorize_assignment(actor: &Actor, assignee: Option<UserId>) -> Result<()> {
    match assignee {
        Some(user) if user != actor.user_id => actor.require(Permission::TaskAssign),
        _ => Ok(()),
    }
}
