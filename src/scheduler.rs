use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::aggregator::RateAggregator;
use crate::alert::{AlertStateMachine, ApplySummary};
use crate::evaluator::evaluate;
use crate::model::Watchlist;
use crate::notifier::Notifier;

/// What one tick observed and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub quotes_present: usize,
    pub quotes_missing: usize,
    pub evaluations: usize,
    pub alerts: ApplySummary,
}

/// Drives aggregate → evaluate → apply on a fixed period.
///
/// Ticks run sequentially on the task that calls [`Scheduler::run`], so alert
/// state is only ever touched by one tick at a time. A tick that overruns the
/// period delays the next one instead of overlapping with it.
pub struct Scheduler {
    aggregator: RateAggregator,
    watchlist: Watchlist,
    alerts: AlertStateMachine,
    notifier: Arc<dyn Notifier>,
    period: Duration,
}

impl Scheduler {
    pub fn new(
        aggregator: RateAggregator,
        watchlist: Watchlist,
        alerts: AlertStateMachine,
        notifier: Arc<dyn Notifier>,
        period: Duration,
    ) -> Self {
        Self {
            aggregator,
            watchlist,
            alerts,
            notifier,
            period,
        }
    }

    #[cfg(test)]
    pub fn alerts(&self) -> &AlertStateMachine {
        &self.alerts
    }

    /// Run one full cycle.
    pub async fn tick(&mut self) -> TickReport {
        let sources = self.watchlist.all_sources();
        let snapshot = self.aggregator.aggregate(&sources).await;

        let evaluations = evaluate(
            &snapshot,
            &self.watchlist.targets,
            &self.watchlist.comparatives,
            self.watchlist.threshold,
        );
        for evaluation in &evaluations {
            debug!(
                pair = %evaluation.pair,
                differential = evaluation.differential,
                decision = ?evaluation.decision,
                "pair evaluated"
            );
        }

        let alerts = self.alerts.apply(&evaluations, self.notifier.as_ref()).await;

        TickReport {
            quotes_present: snapshot.present_count(),
            quotes_missing: snapshot.len() - snapshot.present_count(),
            evaluations: evaluations.len(),
            alerts,
        }
    }

    /// Tick immediately, then once per period until `cancel` fires. An
    /// in-flight tick always completes before this returns.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(period = ?self.period, "scheduler started");

        let started = Instant::now();
        self.logged_tick().await;

        let mut interval = tokio::time::interval_at(started + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.logged_tick().await;
                }
            }
        }

        info!(
            active_alerts = self.alerts.active_count(),
            "scheduler stopped"
        );
    }

    async fn logged_tick(&mut self) {
        let span = info_span!("tick", tick_id = %Uuid::new_v4());
        async {
            let report = self.tick().await;
            info!(
                present = report.quotes_present,
                missing = report.quotes_missing,
                evaluations = report.evaluations,
                raised = report.alerts.raised,
                retracted = report.alerts.retracted,
                suppressed = report.alerts.suppressed,
                send_failures = report.alerts.send_failures,
                delete_failures = report.alerts.delete_failures,
                active = self.alerts.active_count(),
                "tick complete"
            );
        }
        .instrument(span)
        .await;
    }
}
