//! Route guard: which viewers may see which routes.
//!
//! Pure policy over [`SessionFlags`]. Rules are evaluated in order and the
//! first match wins:
//!
//! 1. Session not initialized: [`GuardDecision::Loading`], no redirect.
//! 2. Route requires auth, viewer unauthenticated: redirect to login.
//! 3. Auth-only route (login, register), viewer authenticated: redirect to
//!    the admin or user home by role.
//! 4. Route requires admin, viewer not admin: redirect to the user home.
//! 5. Otherwise render.

use hirelane_settings::RouteSettings;

use crate::session::SessionFlags;

/// Access requirements of a route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteAccess {
    /// Viewer must be signed in.
    pub requires_auth: bool,
    /// Only for signed-out viewers (login, register).
    pub auth_only: bool,
    /// Viewer must be an administrator. Implies `requires_auth`.
    pub requires_admin: bool,
}

impl RouteAccess {
    /// Anyone may view.
    pub const fn public() -> Self {
        Self {
            requires_auth: false,
            auth_only: false,
            requires_admin: false,
        }
    }

    /// Signed-in viewers only.
    pub const fn protected() -> Self {
        Self {
            requires_auth: true,
            auth_only: false,
            requires_admin: false,
        }
    }

    /// Signed-out viewers only.
    pub const fn auth_only() -> Self {
        Self {
            requires_auth: false,
            auth_only: true,
            requires_admin: false,
        }
    }

    /// Administrators only.
    pub const fn admin() -> Self {
        Self {
            requires_auth: true,
            auth_only: false,
            requires_admin: true,
        }
    }
}

/// What the view layer should do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Show a neutral loading state; take no action yet.
    Loading,
    /// Navigate elsewhere without rendering the route.
    Redirect(String),
    /// Render the route.
    Render,
}

/// Evaluates routes against session flags.
#[derive(Clone, Debug, Default)]
pub struct SessionGuard {
    routes: RouteSettings,
}

impl SessionGuard {
    /// Guard redirecting to `routes`.
    pub fn new(routes: RouteSettings) -> Self {
        Self { routes }
    }

    /// Decide for a route with the given requirements.
    pub fn evaluate(&self, access: RouteAccess, flags: SessionFlags) -> GuardDecision {
        if !flags.is_initialized {
            return GuardDecision::Loading;
        }
        if (access.requires_auth || access.requires_admin) && !flags.is_authenticated {
            return GuardDecision::Redirect(self.routes.login.clone());
        }
        if access.auth_only && flags.is_authenticated {
            let home = if flags.is_admin {
                &self.routes.admin_home
            } else {
                &self.routes.user_home
            };
            return GuardDecision::Redirect(home.clone());
        }
        if access.requires_admin && !flags.is_admin {
            return GuardDecision::Redirect(self.routes.user_home.clone());
        }
        GuardDecision::Render
    }
}

/// Prefix-matched route requirements. The longest matching prefix wins;
/// unmatched paths are public.
#[derive(Clone, Debug)]
pub struct RouteTable {
    entries: Vec<(String, RouteAccess)>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
            .with("/login", RouteAccess::auth_only())
            .with("/register", RouteAccess::auth_only())
            .with("/admin", RouteAccess::admin())
            .with("/dashboard", RouteAccess::protected())
            .with("/jobs", RouteAccess::protected())
            .with("/scraper", RouteAccess::protected())
    }
}

impl RouteTable {
    /// Empty table: every path is public.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add or replace a prefix.
    #[must_use]
    pub fn with(mut self, prefix: &str, access: RouteAccess) -> Self {
        let prefix = normalize(prefix).to_string();
        self.entries.retain(|(p, _)| *p != prefix);
        self.entries.push((prefix, access));
        self
    }

    /// Requirements for `path`. Query strings and fragments are ignored.
    pub fn lookup(&self, path: &str) -> RouteAccess {
        let path = normalize(path);
        self.entries
            .iter()
            .filter(|(prefix, _)| matches_prefix(path, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or_else(RouteAccess::public, |(_, access)| *access)
    }
}

fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
