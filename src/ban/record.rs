//! User and ban records as read from the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A category of restriction that can be imposed on a user independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanType {
    /// Creating or editing content: markets, comments, answers.
    Posting,
    /// Anything that moves funds: bets, trades, liquidity, transfers.
    Trading,
    /// Direct messages.
    Messaging,
    /// Whole-account ban. Blocks every action.
    Full,
}

impl BanType {
    /// The activity this ban type blocks, as used in rejection messages.
    pub fn activity(&self) -> &'static str {
        match self {
            BanType::Posting => "posting",
            BanType::Trading => "trading",
            BanType::Messaging => "messaging",
            BanType::Full => "using this site",
        }
    }
}

impl fmt::Display for BanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BanType::Posting => "posting",
            BanType::Trading => "trading",
            BanType::Messaging => "messaging",
            BanType::Full => "full",
        };
        f.write_str(name)
    }
}

/// A standing restriction on a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub user_id: String,
    pub ban_type: BanType,
    pub started_at: DateTime<Utc>,
    /// Scheduled end. `None` means indefinite.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Set when a moderator lifted the ban early.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BanRecord {
    /// An indefinite ban starting at `started_at`.
    pub fn new(user_id: impl Into<String>, ban_type: BanType, started_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            ban_type,
            started_at,
            end_time: None,
            ended_at: None,
            reason: None,
        }
    }

    pub fn until(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn lifted_at(mut self, ended_at: DateTime<Utc>) -> Self {
        self.ended_at = Some(ended_at);
        self
    }

    /// Active iff not lifted and either indefinite or not yet past `end_time`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.ended_at.is_none() && self.end_time.map_or(true, |end| end > now)
    }
}

/// The user fields the gate consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub deleted: bool,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            deleted: false,
        }
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }
}

/// Result of one store round trip: the user, if any, and their bans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSnapshot {
    pub user: Option<UserRecord>,
    pub bans: Vec<BanRecord>,
}

/// Whether any active ban of `ban_type` is present.
pub fn is_banned(bans: &[BanRecord], ban_type: BanType, now: DateTime<Utc>) -> bool {
    bans.iter()
        .any(|ban| ban.ban_type == ban_type && ban.is_active(now))
}

/// The first moderator-supplied reason among active bans of `ban_type`.
pub fn ban_reason(bans: &[BanRecord], ban_type: BanType, now: DateTime<Utc>) -> Option<&str> {
    bans.iter()
        .filter(|ban| ban.ban_type == ban_type && ban.is_active(now))
        .find_map(|ban| ban.reason.as_deref().filter(|reason| !reason.is_empty()))
}
