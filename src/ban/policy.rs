//! Action → ban-type policy table.
//!
//! Which ban categories block an action, and how the action is named in a
//! rejection. The table is plain data so deployments can replace it
//! without touching the gate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::record::BanType;

const POSTING: &[BanType] = &[BanType::Posting, BanType::Full];
const TRADING: &[BanType] = &[BanType::Trading, BanType::Full];
const MESSAGING: &[BanType] = &[BanType::Messaging, BanType::Full];

/// Built-in actions: (action, display name, blocking ban types).
const BUILTIN_ACTIONS: &[(&str, &str, &[BanType])] = &[
    ("comment", "commenting", POSTING),
    ("post", "posting", POSTING),
    ("createMarket", "creating markets", POSTING),
    ("updateMarket", "editing markets", POSTING),
    ("resolveMarket", "resolving markets", POSTING),
    ("editAnswer", "editing answers", POSTING),
    ("createAnswer", "creating answers", POSTING),
    ("hideComment", "hiding comments", POSTING),
    ("review", "leaving reviews", POSTING),
    ("addTopic", "adding topics", POSTING),
    ("pollVote", "voting in polls", POSTING),
    ("trade", "trading", TRADING),
    ("bet", "betting", TRADING),
    ("managram", "sending managrams", TRADING),
    ("addLiquidity", "adding liquidity", TRADING),
    ("removeLiquidity", "removing liquidity", TRADING),
    ("boost", "boosting markets", TRADING),
    ("message", "messaging", MESSAGING),
];

/// Policy for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRule {
    /// Any active ban of one of these types blocks the action.
    pub ban_types: Vec<BanType>,
    /// Name used in "You are banned from ..." messages.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// The full action table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPolicy {
    pub actions: HashMap<String, ActionRule>,
    /// Ban types applied to actions missing from `actions`.
    pub default_ban_types: Vec<BanType>,
}

impl ActionPolicy {
    /// A table with no actions; unknown actions are blocked only by
    /// `default_ban_types`.
    pub fn empty() -> Self {
        Self {
            actions: HashMap::new(),
            default_ban_types: vec![BanType::Full],
        }
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        let actions = BUILTIN_ACTIONS
            .iter()
            .map(|(action, display, ban_types)| {
                (
                    action.to_string(),
                    ActionRule {
                        ban_types: ban_types.to_vec(),
                        display_name: Some(display.to_string()),
                    },
                )
            })
            .collect();
        Self {
            actions,
            default_ban_types: vec![BanType::Full],
        }
    }

    /// Add or replace one action.
    pub fn with_action(
        mut self,
        action: impl Into<String>,
        ban_types: &[BanType],
        display_name: Option<&str>,
    ) -> Self {
        self.actions.insert(
            action.into(),
            ActionRule {
                ban_types: ban_types.to_vec(),
                display_name: display_name.map(str::to_string),
            },
        );
        self
    }

    /// Ban types that block `action`.
    pub fn ban_types_for(&self, action: &str) -> &[BanType] {
        self.actions
            .get(action)
            .map(|rule| rule.ban_types.as_slice())
            .unwrap_or(&self.default_ban_types)
    }

    /// Human-readable name for `action`, or the raw name when unknown.
    pub fn display_name<'a>(&'a self, action: &'a str) -> &'a str {
        self.actions
            .get(action)
            .and_then(|rule| rule.display_name.as_deref())
            .unwrap_or(action)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}
