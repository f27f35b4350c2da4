//! Route targets used by the session guard.

use serde::{Deserialize, Serialize};

/// Redirect targets for the session guard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteSettings {
    /// Where unauthenticated viewers are sent.
    pub login: String,
    /// Home for authenticated administrators.
    pub admin_home: String,
    /// Home for authenticated non-admin viewers.
    pub user_home: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            admin_home: "/admin".to_string(),
            user_home: "/dashboard".to_string(),
        }
    }
}
