//! Rate limiting logic and state management.

mod counter;
mod descriptor;
mod limiter;
mod rules;
mod sliding;
mod sweeper;

pub use counter::WindowCounter;
pub use descriptor::{LimitKey, GLOBAL_SCOPE};
pub use limiter::WindowRegistry;
pub use rules::{
    Decision, EndpointLimit, KeyBy, LimitRule, Strategy, DEFAULT_GLOBAL_MAX_REQUESTS,
    DEFAULT_GLOBAL_WINDOW_MS, DEFAULT_SLIDING_MAX_CALLS, DEFAULT_SLIDING_WINDOW_MS,
};
pub use sliding::SlidingLogRegistry;
pub use sweeper::{Sweep, Sweeper, SweeperHandle};
