//! The admission pipeline.
//!
//! Every request walks the same stages in order:
//!
//! ```text
//! Start -> IdentityResolved -> EndpointLimitChecked -> GlobalLimitChecked
//!       -> BanChecked -> HandlerInvoked
//! ```
//!
//! Any check may end the walk with a [`Rejection`]. Stages after a
//! rejection do not run and touch no state, so a rejected request never
//! consumes quota it was not charged for.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info_span, trace, Instrument};
use uuid::Uuid;

use crate::ban::BanGate;
use crate::clock::Clock;
use crate::error::{AdmissionError, Rejection, Stage};
use crate::policy::{AdmissionPolicy, BanCheck};
use crate::ratelimit::{
    EndpointLimit, KeyBy, LimitKey, SlidingLogRegistry, Strategy, WindowRegistry,
};
use crate::store::UserStore;

/// Who is calling, as resolved by the identity layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    pub remote_addr: Option<IpAddr>,
}

impl Caller {
    /// An unauthenticated caller seen at `addr`.
    pub fn anonymous(addr: IpAddr) -> Self {
        Self {
            remote_addr: Some(addr),
            ..Self::default()
        }
    }

    /// A caller authenticated as `user_id`.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// The identity rate limits are charged to: API key, else user id.
    pub fn identity(&self) -> Option<&str> {
        self.api_key.as_deref().or(self.user_id.as_deref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }

    /// Limiter key for the caller's network address. The `ip:` prefix keeps
    /// addresses out of the identity namespace, so a user id that happens to
    /// look like an address never shares its window.
    fn address(&self) -> Option<String> {
        self.remote_addr.map(|addr| format!("ip:{}", addr))
    }
}

/// A request that passed every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub request_id: Uuid,
}

/// The business operation the pipeline guards.
///
/// Handler errors are returned untouched; admission failures are converted
/// into the handler's error type through `From<AdmissionError>`.
#[async_trait]
pub trait Handler: Send + Sync {
    type Params: Send;
    type Response: Send;
    type Error: From<AdmissionError> + Send;

    async fn call(&self, params: Self::Params, caller: &Caller) -> Result<Self::Response, Self::Error>;
}

/// Runs rate limits and ban checks in front of a handler.
pub struct AdmissionPipeline<S: UserStore> {
    policy: Arc<AdmissionPolicy>,
    windows: Arc<WindowRegistry>,
    logs: Arc<SlidingLogRegistry>,
    gate: BanGate<S>,
}

impl<S: UserStore> AdmissionPipeline<S> {
    /// A pipeline with its own, empty registries.
    pub fn new(policy: Arc<AdmissionPolicy>, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let windows = Arc::new(WindowRegistry::new(Arc::clone(&clock)));
        let logs = Arc::new(SlidingLogRegistry::new(Arc::clone(&clock)));
        Self::with_registries(policy, store, clock, windows, logs)
    }

    /// A pipeline sharing registries that are owned elsewhere.
    pub fn with_registries(
        policy: Arc<AdmissionPolicy>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        windows: Arc<WindowRegistry>,
        logs: Arc<SlidingLogRegistry>,
    ) -> Self {
        let gate = BanGate::new(store, Arc::new(policy.actions.clone()), clock);
        Self {
            policy,
            windows,
            logs,
            gate,
        }
    }

    /// Replace the ban gate, e.g. to add a store lookup timeout.
    pub fn with_gate(mut self, gate: BanGate<S>) -> Self {
        self.gate = gate;
        self
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    pub fn windows(&self) -> &Arc<WindowRegistry> {
        &self.windows
    }

    pub fn logs(&self) -> &Arc<SlidingLogRegistry> {
        &self.logs
    }

    pub fn gate(&self) -> &BanGate<S> {
        &self.gate
    }

    /// Run every admission check for a call to `endpoint`.
    pub async fn admit(&self, endpoint: &str, caller: &Caller) -> Result<Admitted, AdmissionError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("admission", %request_id, endpoint = %endpoint);

        self.run_checks(endpoint, caller).instrument(span).await?;
        Ok(Admitted { request_id })
    }

    /// Admit the call, then invoke `handler`.
    pub async fn run<H: Handler>(
        &self,
        endpoint: &str,
        caller: &Caller,
        params: H::Params,
        handler: &H,
    ) -> Result<H::Response, H::Error> {
        let admitted = self.admit(endpoint, caller).await?;
        trace!(
            request_id = %admitted.request_id,
            stage = %Stage::HandlerInvoked,
            endpoint = %endpoint,
            "Invoking handler"
        );
        handler.call(params, caller).await
    }

    async fn run_checks(&self, endpoint: &str, caller: &Caller) -> Result<(), AdmissionError> {
        trace!(stage = %Stage::Start, "Admission started");

        trace!(
            stage = %Stage::IdentityResolved,
            authenticated = caller.is_authenticated(),
            "Identity resolved"
        );

        if let Some(limit) = self.policy.endpoint_limit(endpoint) {
            self.check_endpoint_limit(endpoint, limit, caller)?;
        }
        trace!(stage = %Stage::EndpointLimitChecked, "Endpoint limit passed");

        self.check_global_limit(caller)?;
        trace!(stage = %Stage::GlobalLimitChecked, "Global limit passed");

        if let Some(check) = self.policy.ban_check(endpoint) {
            self.check_bans(check, caller).await?;
        }
        trace!(stage = %Stage::BanChecked, "Ban check passed");

        Ok(())
    }

    fn check_endpoint_limit(
        &self,
        endpoint: &str,
        limit: &EndpointLimit,
        caller: &Caller,
    ) -> Result<(), AdmissionError> {
        let rule = limit.rule();

        let identity = match (limit.key_by, limit.strategy) {
            (KeyBy::Address, _) => caller.address(),
            (KeyBy::Identity, Strategy::SlidingLog) => caller.identity().map(str::to_string),
            // Unauthenticated callers of a fixed-window endpoint are charged per address.
            (KeyBy::Identity, Strategy::FixedWindow) => caller
                .identity()
                .map(str::to_string)
                .or_else(|| caller.address()),
        };

        let decision = match limit.strategy {
            Strategy::SlidingLog => self.logs.check(identity.as_deref(), endpoint, &rule),
            Strategy::FixedWindow => {
                let Some(identity) = identity else {
                    error!(
                        endpoint = %endpoint,
                        key_by = ?limit.key_by,
                        "Endpoint limit has no identity to key by, allowing"
                    );
                    return Ok(());
                };
                self.windows.check(&LimitKey::new(identity, endpoint), &rule)
            }
        };

        if decision.allowed {
            return Ok(());
        }

        let retry_after = decision.retry_after_secs();
        let message = match limit.strategy {
            Strategy::FixedWindow => format!(
                "Rate limit exceeded for {}. Retry after {} seconds.",
                endpoint, retry_after
            ),
            Strategy::SlidingLog => format!(
                "Rate limit exceeded. Please wait {} seconds before trying again.",
                retry_after
            ),
        };
        debug!(endpoint = %endpoint, retry_after, "Rejected by endpoint limit");
        Err(Rejection::rate_limited(Stage::EndpointLimitChecked, message, retry_after).into())
    }

    fn check_global_limit(&self, caller: &Caller) -> Result<(), AdmissionError> {
        let Some(identity) = caller.identity() else {
            return Ok(());
        };

        let rule = &self.policy.global;
        let decision = self.windows.check(&LimitKey::global(identity), rule);
        if decision.allowed {
            return Ok(());
        }

        let retry_after = decision.retry_after_secs();
        debug!(retry_after, "Rejected by global limit");
        Err(Rejection::rate_limited(
            Stage::GlobalLimitChecked,
            format!(
                "Rate limit exceeded. {} requests per {} seconds. Retry after {} seconds.",
                rule.max_requests,
                rule.window_secs(),
                retry_after
            ),
            retry_after,
        )
        .into())
    }

    async fn check_bans(&self, check: &BanCheck, caller: &Caller) -> Result<(), AdmissionError> {
        let Some(user_id) = caller.user_id.as_deref() else {
            debug!("Ban-checked endpoint called without a user");
            return Err(Rejection::not_found("User not found").into());
        };

        match check {
            BanCheck::NotBanned => self.gate.ensure_not_banned(user_id).await,
            BanCheck::Action { action } => self.gate.authorize(user_id, action).await,
        }
    }
}
