//! Bearer-token authentication with role-based permissions.
//!
//! Access tokens carry only the user's UUID. The user, their active flag and
//! their roles are loaded from the database on every request, and
//! `guard::can_access_action` decides every permission check.

mod errors;
mod extractors;
pub mod guard;
mod header;
mod ip;
mod state;
mod types;

pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{
    Authenticated, Authorize, authenticate_request, load_identity, require_identity,
};
pub use guard::{PermissionConstraint, can_access_action};
pub use header::bearer_token;
pub use ip::extract_client_ip;
pub use state::HasAuthBackend;
pub use types::{Action, Identity, Permission, Role};
