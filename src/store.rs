//! The user/ban store interface and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::ban::{BanRecord, BanType, UserRecord, UserSnapshot};
use crate::error::StoreError;

/// Read access to users and their bans.
///
/// Implementations fetch the user record and the user's active bans in a
/// single round trip. The ban gate re-checks activity against its own clock,
/// so a store may return records that expired moments ago.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn fetch_user_with_bans(&self, user_id: &str) -> Result<UserSnapshot, StoreError>;
}

/// In-memory store for tests and simulations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserRecord>>,
    bans: RwLock<HashMap<String, Vec<BanRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users.write().insert(user.id.clone(), user);
    }

    /// Mark a user as deleted. Returns false when the user does not exist.
    pub fn delete_user(&self, user_id: &str) -> bool {
        match self.users.write().get_mut(user_id) {
            Some(user) => {
                user.deleted = true;
                true
            }
            None => false,
        }
    }

    pub fn impose_ban(&self, ban: BanRecord) {
        self.bans
            .write()
            .entry(ban.user_id.clone())
            .or_default()
            .push(ban);
    }

    /// Lift every open ban of `ban_type` on a user. Returns how many were lifted.
    pub fn lift_bans(
        &self,
        user_id: &str,
        ban_type: BanType,
        at: chrono::DateTime<chrono::Utc>,
    ) -> usize {
        let mut bans = self.bans.write();
        let Some(records) = bans.get_mut(user_id) else {
            return 0;
        };
        let mut lifted = 0;
        for ban in records
            .iter_mut()
            .filter(|ban| ban.ban_type == ban_type && ban.ended_at.is_none())
        {
            ban.ended_at = Some(at);
            lifted += 1;
        }
        lifted
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn fetch_user_with_bans(&self, user_id: &str) -> Result<UserSnapshot, StoreError> {
        let user = self.users.read().get(user_id).cloned();
        let bans = self
            .bans
            .read()
            .get(user_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|ban| ban.ended_at.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(UserSnapshot { user, bans })
    }
}
