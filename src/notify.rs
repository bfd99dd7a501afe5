//! Delivery of password reset links.

use tracing::info;
use url::Url;

use crate::db::User;

/// Delivers a freshly issued password reset token to its owner.
pub trait ResetNotifier: Send + Sync {
    fn send_reset(&self, user: &User, token: &str, expires_at: u64);
}

/// Writes the reset link to the log. Used when no mail transport is configured.
pub struct LogResetNotifier {
    public_url: Url,
    base: String,
}

impl LogResetNotifier {
    pub fn new(public_url: Url, base: Option<&str>) -> Self {
        Self {
            public_url,
            base: base.unwrap_or("").to_string(),
        }
    }

    /// Link the user follows to choose a new password.
    pub fn reset_link(&self, token: &str) -> String {
        let origin = self.public_url.as_str().trim_end_matches('/');
        format!("{}{}/reset-password/{}", origin, self.base, token)
    }
}

impl ResetNotifier for LogResetNotifier {
    fn send_reset(&self, user: &User, token: &str, expires_at: u64) {
        info!(
            email = %user.email,
            link = %self.reset_link(token),
            expires_at,
            "Password reset requested"
        );
    }
}
