use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{Evaluation, SourceId};

/// Renders alert and status texts. Rounding happens only here.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    display_names: HashMap<SourceId, String>,
    notional: f64,
}

impl MessageTemplate {
    pub fn new(display_names: HashMap<SourceId, String>, notional: f64) -> Self {
        Self {
            display_names,
            notional,
        }
    }

    fn name_of<'a>(&'a self, source: &'a SourceId) -> &'a str {
        self.display_names
            .get(source)
            .map(String::as_str)
            .unwrap_or(source.as_str())
    }

    /// Buy on the comparative at its ask, sell on the target at its
    /// reference price.
    pub fn alert(&self, evaluation: &Evaluation) -> String {
        let profit = evaluation.differential * self.notional;
        let invested = evaluation.comparative_ask * self.notional;
        format!(
            "🚨 Buy on {} at {:.3} and sell on {} at {:.3}: profit {:.1} per {:.0} invested",
            self.name_of(&evaluation.pair.comparative),
            evaluation.comparative_ask,
            self.name_of(&evaluation.pair.target),
            evaluation.reference_price,
            profit,
            invested,
        )
    }

    pub fn startup(&self, at: DateTime<Utc>) -> String {
        format!("spread-notifier started at {}", at.format("%Y-%m-%d %H:%M:%S UTC"))
    }

    pub fn heartbeat(&self, at: DateTime<Utc>) -> String {
        format!("spread-notifier still running at {}", at.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}
