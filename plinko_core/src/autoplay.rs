use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{drop_once, DropOutcome, DropRequest, EngineParams};
use crate::state::GameState;

/// Shared stop flag. Checked between drops only, never during one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoplayPlan {
    pub drops: u32,
    #[serde(default)]
    pub request: DropRequest,
    /// Stop once net winnings reach this amount.
    #[serde(default)]
    pub stop_on_profit: Option<f64>,
    /// Stop once net losses reach this amount.
    #[serde(default)]
    pub stop_on_loss: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StopReason {
    Completed,
    Cancelled,
    ProfitTarget,
    LossLimit,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoplayStep {
    Dropped(DropOutcome),
    Finished(StopReason),
}

/// A sequence of drops played one at a time. Each `step` fully commits its
/// drop before returning, so callers may release locks between steps.
#[derive(Debug)]
pub struct Autoplay {
    plan: AutoplayPlan,
    cancel: CancelToken,
    played: u32,
    net: f64,
    finished: Option<StopReason>,
}

impl Autoplay {
    pub fn new(plan: AutoplayPlan, cancel: CancelToken) -> Self {
        Self {
            plan,
            cancel,
            played: 0,
            net: 0.0,
            finished: None,
        }
    }

    pub fn played(&self) -> u32 {
        self.played
    }

    pub fn net(&self) -> f64 {
        self.net
    }

    pub fn finished(&self) -> Option<&StopReason> {
        self.finished.as_ref()
    }

    pub fn step(&mut self, state: &mut GameState, params: &EngineParams) -> AutoplayStep {
        if let Some(reason) = &self.finished {
            return AutoplayStep::Finished(reason.clone());
        }
        if let Some(reason) = self.stop_reason() {
            return self.finish(reason);
        }
        match drop_once(state, params, &self.plan.request) {
            Ok(outcome) => {
                self.played += 1;
                self.net += outcome.win - outcome.bet;
                AutoplayStep::Dropped(outcome)
            }
            Err(err) => {
                warn!(error = %err, played = self.played, "autoplay drop failed");
                self.finish(StopReason::Failed(err.to_string()))
            }
        }
    }

    fn stop_reason(&self) -> Option<StopReason> {
        if self.cancel.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        if self.played >= self.plan.drops {
            return Some(StopReason::Completed);
        }
        if let Some(target) = self.plan.stop_on_profit {
            if self.net >= target {
                return Some(StopReason::ProfitTarget);
            }
        }
        if let Some(limit) = self.plan.stop_on_loss {
            if -self.net >= limit {
                return Some(StopReason::LossLimit);
            }
        }
        None
    }

    fn finish(&mut self, reason: StopReason) -> AutoplayStep {
        info!(played = self.played, net = self.net, ?reason, "autoplay finished");
        self.finished = Some(reason.clone());
        AutoplayStep::Finished(reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoplayReport {
    pub outcomes: Vec<DropOutcome>,
    pub stop: StopReason,
}

/// Runs a whole plan synchronously.
pub fn run_autoplay(
    state: &mut GameState,
    params: &EngineParams,
    plan: AutoplayPlan,
    cancel: CancelToken,
) -> AutoplayReport {
    let mut autoplay = Autoplay::new(plan, cancel);
    let mut outcomes = Vec::new();
    loop {
        match autoplay.step(state, params) {
            AutoplayStep::Dropped(outcome) => outcomes.push(outcome),
            AutoplayStep::Finished(stop) => return AutoplayReport { outcomes, stop },
        }
    }
}
