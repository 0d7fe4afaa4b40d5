//! Permissions and the authorization policy for media paths.
//!
//! Authorization is additive: a policy asks each handler in order and the
//! request is approved as soon as one of them grants it. Handlers never
//! deny; withholding a grant is the only way to refuse.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::file::{FileStore, FolderLayout};

/// Manage media settings and the whole media library.
pub const MANAGE_MEDIA: &str = "manage media";

/// Manage media uploaded by oneself.
pub const MANAGE_OWN_MEDIA: &str = "manage own media";

/// Access the media fields folder (temp, trash, and committed field files).
pub const MANAGE_MEDIA_FIELDS_FOLDER: &str = "manage media fields folder";

/// Every permission defined here.
pub const ALL_PERMISSIONS: &[&str] = &[MANAGE_MEDIA, MANAGE_OWN_MEDIA, MANAGE_MEDIA_FIELDS_FOLDER];

/// The acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub is_admin: bool,
}

impl User {
    /// A regular user.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            is_admin: false,
        }
    }

    /// A user holding every permission.
    pub fn admin(id: Uuid) -> Self {
        Self { id, is_admin: true }
    }

    /// The anonymous user.
    pub fn anonymous() -> Self {
        Self::new(Uuid::nil())
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_nil()
    }
}

/// Permission service with fast DashMap-based lookups.
#[derive(Clone, Default)]
pub struct PermissionService {
    inner: Arc<PermissionServiceInner>,
}

#[derive(Default)]
struct PermissionServiceInner {
    /// user_id -> granted permissions.
    grants: DashMap<Uuid, HashSet<String>>,
}

impl PermissionService {
    /// Create an empty permission service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a permission to a user.
    pub fn grant(&self, user_id: Uuid, permission: &str) {
        self.inner
            .grants
            .entry(user_id)
            .or_default()
            .insert(permission.to_string());
    }

    /// Revoke a permission from a user.
    pub fn revoke(&self, user_id: Uuid, permission: &str) {
        if let Some(mut granted) = self.inner.grants.get_mut(&user_id) {
            granted.remove(permission);
        }
    }

    /// Check if a user has a specific permission.
    ///
    /// Admin users always return true.
    pub fn user_has_permission(&self, user: &User, permission: &str) -> bool {
        if user.is_admin {
            return true;
        }

        self.inner
            .grants
            .get(&user.id)
            .is_some_and(|granted| granted.contains(permission))
    }

    /// Drop every grant held by a user.
    pub fn invalidate_user(&self, user_id: Uuid) {
        self.inner.grants.remove(&user_id);
    }

    /// Drop every grant.
    pub fn invalidate_all(&self) {
        self.inner.grants.clear();
    }

    /// Number of users with grants (for monitoring).
    pub fn cache_size(&self) -> usize {
        self.inner.grants.len()
    }
}

impl std::fmt::Debug for PermissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionService")
            .field("users", &self.cache_size())
            .finish()
    }
}

/// A handler's answer to an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Grant,
    Abstain,
}

/// An authorization question: may `user` exercise `permission` on `resource`?
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    pub user: &'a User,
    pub permission: &'a str,
    /// Store path the request is about, if any.
    pub resource: Option<&'a str>,
}

/// One vote in an [`AuthorizationPolicy`].
pub trait AuthorizationHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Vote on a request.
    fn handle(&self, request: &AuthorizationRequest<'_>) -> Vote;
}

/// Ordered handler chain with OR semantics.
#[derive(Default)]
pub struct AuthorizationPolicy {
    handlers: Vec<Box<dyn AuthorizationHandler>>,
}

impl AuthorizationPolicy {
    /// Create a policy with no handlers (denies everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard policy for media paths: the media fields folder guard,
    /// then plain permission grants.
    pub fn for_media(
        permissions: PermissionService,
        store: Arc<dyn FileStore>,
        layout: &FolderLayout,
    ) -> Self {
        Self::new()
            .with_handler(MediaFieldsFolderHandler::new(store, layout))
            .with_handler(PermissionGrantHandler::new(permissions))
    }

    /// Append a handler.
    pub fn with_handler(mut self, handler: impl AuthorizationHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Approve the request if any handler grants it.
    pub fn authorize(&self, request: &AuthorizationRequest<'_>) -> bool {
        for handler in &self.handlers {
            if handler.handle(request) == Vote::Grant {
                debug!(
                    handler = handler.name(),
                    user_id = %request.user.id,
                    permission = request.permission,
                    resource = ?request.resource,
                    "authorization granted"
                );
                return true;
            }
        }
        debug!(
            user_id = %request.user.id,
            permission = request.permission,
            resource = ?request.resource,
            "authorization not granted"
        );
        false
    }
}

impl std::fmt::Debug for AuthorizationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("AuthorizationPolicy")
            .field("handlers", &names)
            .finish()
    }
}

/// Grants requests for permissions the user holds directly.
#[derive(Debug, Clone)]
pub struct PermissionGrantHandler {
    permissions: PermissionService,
}

impl PermissionGrantHandler {
    pub fn new(permissions: PermissionService) -> Self {
        Self { permissions }
    }
}

impl AuthorizationHandler for PermissionGrantHandler {
    fn name(&self) -> &'static str {
        "permission_grant"
    }

    fn handle(&self, request: &AuthorizationRequest<'_>) -> Vote {
        if self
            .permissions
            .user_has_permission(request.user, request.permission)
        {
            Vote::Grant
        } else {
            Vote::Abstain
        }
    }
}

/// Waives [`MANAGE_MEDIA_FIELDS_FOLDER`] for paths outside the media fields
/// folder; paths inside still need the permission itself.
pub struct MediaFieldsFolderHandler {
    store: Arc<dyn FileStore>,
    guarded_root: String,
}

impl MediaFieldsFolderHandler {
    pub fn new(store: Arc<dyn FileStore>, layout: &FolderLayout) -> Self {
        Self {
            store,
            guarded_root: layout.root().to_string(),
        }
    }

    /// Whether `path` lies in the media fields folder (or is the folder).
    pub fn is_within_guarded_folder(&self, path: &str) -> bool {
        is_descendant_of(self.store.as_ref(), path, &self.guarded_root)
    }
}

impl AuthorizationHandler for MediaFieldsFolderHandler {
    fn name(&self) -> &'static str {
        "media_fields_folder"
    }

    fn handle(&self, request: &AuthorizationRequest<'_>) -> Vote {
        if request.permission != MANAGE_MEDIA_FIELDS_FOLDER {
            return Vote::Abstain;
        }
        let Some(path) = request.resource.filter(|p| !p.is_empty()) else {
            return Vote::Abstain;
        };

        if self.is_within_guarded_folder(path) {
            Vote::Abstain
        } else {
            Vote::Grant
        }
    }
}

impl std::fmt::Debug for MediaFieldsFolderHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaFieldsFolderHandler")
            .field("guarded_root", &self.guarded_root)
            .finish()
    }
}

/// Segment-wise, case-insensitive prefix test of `child` against `parent`.
///
/// The separator is discovered from the store rather than assumed.
pub fn is_descendant_of(store: &dyn FileStore, child: &str, parent: &str) -> bool {
    let separator = if store.combine(&["a", "b"]).contains('/') {
        "/"
    } else {
        "\\"
    };

    let child = store.normalize_path(child);
    let parent = store.normalize_path(parent);
    let child_segments: Vec<&str> = child.split(separator).filter(|s| !s.is_empty()).collect();
    let parent_segments: Vec<&str> = parent.split(separator).filter(|s| !s.is_empty()).collect();

    if parent_segments.len() > child_segments.len() {
        return false;
    }

    parent_segments
        .iter()
        .zip(&child_segments)
        .all(|(p, c)| p.to_lowercase() == c.to_lowercase())
}
