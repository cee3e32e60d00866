//! Role-based write restrictions.
//!
//! Reads are open to any caller that reached the handler (the identity layer in front of it has
//! already authenticated them). Every write, including issuing an upload link, requires the
//! configured write role somewhere in the caller's group claims.

use crate::error::{ApiError, ApiResult};
use crate::request::CallerIdentity;
use crate::routing::Operation;

#[derive(Debug, Clone)]
pub struct AccessGuard {
    write_role: String,
}

impl AccessGuard {
    pub fn new(write_role: impl Into<String>) -> Self {
        Self {
            write_role: write_role.into(),
        }
    }

    /// Decides whether `caller` may perform `operation`.
    ///
    /// # Errors
    /// Returns `ApiError::Forbidden` for a write without the write role. The error carries no
    /// detail about which role was missing.
    pub fn authorize(&self, operation: &Operation, caller: &CallerIdentity) -> ApiResult<()> {
        if !operation.is_write() || caller.has_group(&self.write_role) {
            return Ok(());
        }

        tracing::warn!(
            operation = operation.name(),
            subject = caller.subject().unwrap_or("-"),
            "write denied: caller lacks required role"
        );
        Err(ApiError::Forbidden)
    }
}
