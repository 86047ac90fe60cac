//! Replay a scripted sequence of calls through the admission pipeline.
//!
//! Time is driven by a [`ManualClock`], so a scenario spanning hours runs
//! instantly and produces the same decisions every time.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::ban::{BanGate, BanRecord, BanType, UserRecord};
use crate::clock::{Clock, ManualClock};
use crate::config::TurnstileConfig;
use crate::error::{AdmissionError, Rejection, Result, TurnstileError};
use crate::pipeline::{AdmissionPipeline, Admitted, Caller};
use crate::policy::AdmissionPolicy;
use crate::ratelimit::Sweeper;
use crate::store::MemoryStore;

/// A ban imposed when the scenario starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioBan {
    pub user_id: String,
    pub ban_type: BanType,
    /// Milliseconds after the start at which the ban runs out; indefinite if unset
    #[serde(default)]
    pub ends_after_ms: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// One call at a point in scenario time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCall {
    pub at_ms: u64,
    pub endpoint: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub remote_addr: Option<IpAddr>,
}

impl ScenarioCall {
    fn caller(&self) -> Caller {
        Caller {
            user_id: self.user_id.clone(),
            api_key: self.api_key.clone(),
            remote_addr: self.remote_addr,
        }
    }
}

/// A scripted scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub bans: Vec<ScenarioBan>,
    #[serde(default)]
    pub calls: Vec<ScenarioCall>,
}

/// What happened to one call.
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome {
    pub at_ms: u64,
    pub endpoint: String,
    pub admitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub outcomes: Vec<CallOutcome>,
    /// Limiter entries still expired at the end and removed by a final sweep
    pub swept: usize,
}

impl SimulationReport {
    pub fn admitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.admitted).count()
    }
}

impl Scenario {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse scenario: {}", e)))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading scenario");
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Run every call in time order against a fresh pipeline.
    pub async fn run(
        &self,
        policy: Arc<AdmissionPolicy>,
        config: &TurnstileConfig,
    ) -> Result<SimulationReport> {
        let clock = ManualClock::new();
        let start = clock.wall_now();
        let store = Arc::new(MemoryStore::new());

        for user in &self.users {
            store.insert_user(user.clone());
        }
        for ban in &self.bans {
            let mut record = BanRecord::new(&ban.user_id, ban.ban_type, start);
            if let Some(ms) = ban.ends_after_ms {
                let millis = i64::try_from(ms).map_err(|_| {
                    TurnstileError::Config(format!("ban end {}ms is out of range", ms))
                })?;
                record = record.until(start + chrono::Duration::milliseconds(millis));
            }
            if let Some(reason) = &ban.reason {
                record = record.with_reason(reason.clone());
            }
            store.impose_ban(record);
        }

        let clock_handle: Arc<dyn Clock> = Arc::new(clock.clone());
        let gate = BanGate::new(
            Arc::clone(&store),
            Arc::new(policy.actions.clone()),
            Arc::clone(&clock_handle),
        )
        .with_lookup_timeout(config.admission.store_timeout());
        let pipeline = AdmissionPipeline::new(policy, store, clock_handle).with_gate(gate);
        let sweeper = sweeper_for(&pipeline, config.sweeper.interval()).start()?;

        let mut calls: Vec<&ScenarioCall> = self.calls.iter().collect();
        calls.sort_by_key(|call| call.at_ms);

        let mut elapsed_ms = 0;
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            clock.advance(Duration::from_millis(call.at_ms - elapsed_ms));
            elapsed_ms = call.at_ms;

            let result = pipeline.admit(&call.endpoint, &call.caller()).await;
            outcomes.push(CallOutcome::new(call, result));
        }

        sweeper.shutdown().await?;
        let swept = sweeper_for(&pipeline, config.sweeper.interval()).sweep_now();

        info!(
            calls = outcomes.len(),
            admitted = outcomes.iter().filter(|o| o.admitted).count(),
            swept,
            "Scenario finished"
        );

        Ok(SimulationReport { outcomes, swept })
    }
}

fn sweeper_for(pipeline: &AdmissionPipeline<MemoryStore>, period: Duration) -> Sweeper {
    Sweeper::new(period)
        .with_target(pipeline.windows().clone())
        .with_target(pipeline.logs().clone())
}

impl CallOutcome {
    fn new(call: &ScenarioCall, result: std::result::Result<Admitted, AdmissionError>) -> Self {
        let mut outcome = Self {
            at_ms: call.at_ms,
            endpoint: call.endpoint.clone(),
            admitted: false,
            request_id: None,
            rejection: None,
            error: None,
        };
        match result {
            Ok(admitted) => {
                outcome.admitted = true;
                outcome.request_id = Some(admitted.request_id);
            }
            Err(AdmissionError::Rejected(rejection)) => outcome.rejection = Some(rejection),
            Err(err) => outcome.error = Some(err.to_string()),
        }
        outcome
    }
}
