use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::message::MessageTemplate;
use crate::model::{Decision, Evaluation, PairKey};
use crate::notifier::{MessageHandle, Notifier};

/// Alert lifecycle of one pair. An active alert always owns the handle of the
/// message that raised it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AlertState {
    #[default]
    Idle,
    Active { handle: MessageHandle },
}

impl AlertState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn handle(&self) -> Option<&MessageHandle> {
        match self {
            Self::Idle => None,
            Self::Active { handle } => Some(handle),
        }
    }
}

/// What happens to an active pair that received no evaluation this tick
/// because one of its quotes was missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDataPolicy {
    /// Leave the alert standing until fresh data says otherwise.
    #[default]
    Hold,
    /// Retract the alert as soon as its data goes missing.
    Retract,
}

/// Counts of what one `apply` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub raised: usize,
    pub retracted: usize,
    pub suppressed: usize,
    pub send_failures: usize,
    pub delete_failures: usize,
}

/// Owns the per-pair alert states and turns evaluations into send/delete
/// calls on a [`Notifier`].
pub struct AlertStateMachine {
    states: HashMap<PairKey, AlertState>,
    template: MessageTemplate,
    missing_data_policy: MissingDataPolicy,
}

impl AlertStateMachine {
    pub fn new(template: MessageTemplate, missing_data_policy: MissingDataPolicy) -> Self {
        Self {
            states: HashMap::new(),
            template,
            missing_data_policy,
        }
    }

    /// Current state of `pair`; pairs never observed are idle.
    #[cfg(test)]
    pub fn state(&self, pair: &PairKey) -> AlertState {
        self.states.get(pair).cloned().unwrap_or_default()
    }

    pub fn active_count(&self) -> usize {
        self.states.values().filter(|s| s.is_active()).count()
    }

    /// Apply one tick's evaluations. Notifier calls are issued one pair at a
    /// time in evaluation order; a failed call leaves that pair's state
    /// unchanged so the next tick retries it. A delete rejected with
    /// [`NotifyError::Gone`] is not retried.
    pub async fn apply(&mut self, evaluations: &[Evaluation], notifier: &dyn Notifier) -> ApplySummary {
        let mut summary = ApplySummary::default();

        for evaluation in evaluations {
            let pair = &evaluation.pair;
            let current = self.states.entry(pair.clone()).or_default();

            match (evaluation.decision, &*current) {
                (Decision::AboveThreshold, AlertState::Idle) => {
                    let text = self.template.alert(evaluation);
                    match notifier.send(&text).await {
                        Ok(handle) => {
                            info!(
                                pair = %pair,
                                differential = evaluation.differential,
                                handle = %handle,
                                "alert raised"
                            );
                            *current = AlertState::Active { handle };
                            summary.raised += 1;
                        }
                        Err(report) => {
                            warn!(pair = %pair, error = ?report, "alert send failed, will retry next tick");
                            summary.send_failures += 1;
                        }
                    }
                }
                (Decision::AboveThreshold, AlertState::Active { .. }) => {
                    debug!(pair = %pair, differential = evaluation.differential, "alert already active");
                    summary.suppressed += 1;
                }
                (Decision::BelowOrEqual, AlertState::Active { handle }) => {
                    let handle = handle.clone();
                    if retract(pair, &handle, notifier).await {
                        *current = AlertState::Idle;
                        summary.retracted += 1;
                    } else {
                        summary.delete_failures += 1;
                    }
                }
                (Decision::BelowOrEqual, AlertState::Idle) => {}
            }
        }

        if self.missing_data_policy == MissingDataPolicy::Retract {
            self.retract_unobserved(evaluations, notifier, &mut summary).await;
        }

        summary
    }

    async fn retract_unobserved(
        &mut self,
        evaluations: &[Evaluation],
        notifier: &dyn Notifier,
        summary: &mut ApplySummary,
    ) {
        let observed: HashSet<&PairKey> = evaluations.iter().map(|e| &e.pair).collect();
        let mut stale: Vec<(PairKey, MessageHandle)> = self
            .states
            .iter()
            .filter(|(pair, _)| !observed.contains(pair))
            .filter_map(|(pair, state)| state.handle().map(|h| (pair.clone(), h.clone())))
            .collect();
        stale.sort_by(|a, b| a.0.cmp(&b.0));

        for (pair, handle) in stale {
            debug!(pair = %pair, "pair unobserved this tick, retracting");
            if retract(&pair, &handle, notifier).await {
                self.states.insert(pair, AlertState::Idle);
                summary.retracted += 1;
            } else {
                summary.delete_failures += 1;
            }
        }
    }
}

/// Delete the alert message. Returns whether the pair is now retracted; a
/// message the channel reports as gone counts as retracted.
async fn retract(pair: &PairKey, handle: &MessageHandle, notifier: &dyn Notifier) -> bool {
    match notifier.delete(handle).await {
        Ok(()) => {
            info!(pair = %pair, handle = %handle, "alert retracted");
            true
        }
        Err(report) if matches!(report.current_context(), NotifyError::Gone) => {
            warn!(pair = %pair, handle = %handle, error = ?report, "alert message already gone, marking retracted");
            true
        }
        Err(report) => {
            warn!(pair = %pair, handle = %handle, error = ?report, "alert delete failed, will retry next tick");
            false
        }
    }
}
