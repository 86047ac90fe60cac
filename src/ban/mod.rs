//! Ban records, the action policy table and the gate that applies them.

mod gate;
mod policy;
mod record;

pub use gate::BanGate;
pub use policy::{ActionPolicy, ActionRule};
pub use record::{ban_reason, is_banned, BanRecord, BanType, UserRecord, UserSnapshot};
