//! The ban/capability gate.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{AdmissionError, Rejection, StoreError};
use crate::store::UserStore;

use super::policy::ActionPolicy;
use super::record::{ban_reason, is_banned, BanRecord, UserRecord};

/// Checks a user's active bans against the action they are attempting.
///
/// Nothing is cached: every call goes to the store, so a ban imposed a
/// moment ago applies to the very next request.
pub struct BanGate<S: UserStore> {
    store: Arc<S>,
    policy: Arc<ActionPolicy>,
    clock: Arc<dyn Clock>,
    lookup_timeout: Option<Duration>,
}

impl<S: UserStore> BanGate<S> {
    pub fn new(store: Arc<S>, policy: Arc<ActionPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
            lookup_timeout: None,
        }
    }

    /// Fail the lookup with a retryable error when the store is slower than `timeout`.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    pub fn policy(&self) -> &ActionPolicy {
        &self.policy
    }

    /// Reject if `user_id` is banned from `action`.
    pub async fn authorize(&self, user_id: &str, action: &str) -> Result<(), AdmissionError> {
        let (_, bans) = self.load(user_id).await?;
        let now = self.clock.wall_now();

        for &ban_type in self.policy.ban_types_for(action) {
            if !is_banned(&bans, ban_type, now) {
                continue;
            }

            let display = self.policy.display_name(action);
            let message = match ban_reason(&bans, ban_type, now) {
                Some(reason) => format!(
                    "You are banned from {} due to a {} ban. Reason: {}",
                    display, ban_type, reason
                ),
                None => format!("You are banned from {} due to a {} ban", display, ban_type),
            };
            debug!(
                user_id = %user_id,
                action = %action,
                ban_type = %ban_type,
                "Rejected banned user"
            );
            return Err(Rejection::forbidden(message).into());
        }

        Ok(())
    }

    /// Reject if `user_id` has any active ban at all.
    pub async fn ensure_not_banned(&self, user_id: &str) -> Result<(), AdmissionError> {
        let (_, bans) = self.load(user_id).await?;
        let now = self.clock.wall_now();

        if let Some(ban) = bans.iter().find(|ban| ban.is_active(now)) {
            let message = match ban.reason.as_deref().filter(|r| !r.is_empty()) {
                Some(reason) => format!(
                    "You are banned from {}. Reason: {}",
                    ban.ban_type.activity(),
                    reason
                ),
                None => format!("You are banned from {}", ban.ban_type.activity()),
            };
            debug!(user_id = %user_id, ban_type = %ban.ban_type, "Rejected banned user");
            return Err(Rejection::forbidden(message).into());
        }

        Ok(())
    }

    /// Fetch the user and their bans, rejecting missing and deleted accounts.
    async fn load(&self, user_id: &str) -> Result<(UserRecord, Vec<BanRecord>), AdmissionError> {
        let lookup = self.store.fetch_user_with_bans(user_id);
        let result = match self.lookup_timeout {
            Some(timeout) => tokio::time::timeout(timeout, lookup)
                .await
                .unwrap_or(Err(StoreError::Cancelled)),
            None => lookup.await,
        };
        let snapshot = result.map_err(|e| {
            warn!(user_id = %user_id, error = %e, "Ban lookup failed");
            e
        })?;

        let Some(user) = snapshot.user else {
            return Err(Rejection::not_found("User not found").into());
        };
        if user.deleted {
            return Err(Rejection::forbidden("Your account has been deleted").into());
        }

        Ok((user, snapshot.bans))
    }
}
