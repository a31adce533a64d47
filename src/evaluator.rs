use tracing::warn;

use crate::model::{Decision, Evaluation, PairKey, Snapshot, SourceId};

/// Evaluate every (target, comparative) pair that has both quotes in `snapshot`.
///
/// Targets are critical: a missing target drops all of its pairs. Comparatives
/// are best-effort: a missing comparative drops only its own pairs. When every
/// comparative is missing the whole tick yields no evaluations.
///
/// Output order is targets in the given order, then comparatives in the given
/// order.
pub fn evaluate(
    snapshot: &Snapshot,
    targets: &[SourceId],
    comparatives: &[SourceId],
    threshold: f64,
) -> Vec<Evaluation> {
    let comparative_quotes: Vec<_> = comparatives
        .iter()
        .filter_map(|id| snapshot.quote(id))
        .collect();

    if comparative_quotes.is_empty() {
        warn!(
            comparatives = comparatives.len(),
            "all comparative sources missing, skipping evaluation"
        );
        return Vec::new();
    }

    let mut evaluations = Vec::with_capacity(targets.len() * comparative_quotes.len());
    let mut targets_present = 0;

    for target_id in targets {
        let Some(target) = snapshot.quote(target_id) else {
            warn!(target = %target_id, "target quote missing, skipping its pairs");
            continue;
        };
        targets_present += 1;
        let reference_price = target.reference_price();

        for comparative in &comparative_quotes {
            let differential = reference_price - comparative.ask;
            let decision = if differential > threshold {
                Decision::AboveThreshold
            } else {
                Decision::BelowOrEqual
            };

            evaluations.push(Evaluation {
                pair: PairKey::new(target_id.clone(), comparative.source.clone()),
                decision,
                reference_price,
                comparative_ask: comparative.ask,
                differential,
            });
        }
    }

    if targets_present == 0 && !targets.is_empty() {
        warn!(targets = targets.len(), "all target sources missing");
    }

    evaluations
}
