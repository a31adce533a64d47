use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a quote provider (e.g. `"binancep2p"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub source: SourceId,
    pub ask: f64,
    pub bid: f64,
    pub obtained_at: DateTime<Utc>,
}

impl Quote {
    /// Conservative execution price when this source is an alert target.
    pub fn reference_price(&self) -> f64 {
        self.ask.min(self.bid)
    }
}

/// Per-source quote results for one tick. Holds exactly one entry per
/// requested source; `None` marks a source whose fetch failed.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: BTreeMap<SourceId, Option<Quote>>,
}

impl Snapshot {
    pub fn from_entries(entries: impl IntoIterator<Item = (SourceId, Option<Quote>)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn quote(&self, source: &SourceId) -> Option<&Quote> {
        self.entries.get(source).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn present_count(&self) -> usize {
        self.entries.values().filter(|q| q.is_some()).count()
    }

    pub fn missing(&self) -> impl Iterator<Item = &SourceId> {
        self.entries
            .iter()
            .filter(|(_, q)| q.is_none())
            .map(|(id, _)| id)
    }
}

/// Ordered (target, comparative) pair. Alert state is keyed by this identity,
/// never by the quoted values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub target: SourceId,
    pub comparative: SourceId,
}

impl PairKey {
    pub fn new(target: SourceId, comparative: SourceId) -> Self {
        Self {
            target,
            comparative,
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.comparative)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AboveThreshold,
    BelowOrEqual,
}

/// Outcome of evaluating one pair, with the prices that produced it so the
/// alert text can be rendered without going back to the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub pair: PairKey,
    pub decision: Decision,
    pub reference_price: f64,
    pub comparative_ask: f64,
    pub differential: f64,
}

/// Which sources play which role, and the threshold applied to every pair.
#[derive(Debug, Clone)]
pub struct Watchlist {
    pub targets: Vec<SourceId>,
    pub comparatives: Vec<SourceId>,
    pub threshold: f64,
}

impl Watchlist {
    /// Every source that has to be fetched each tick: targets first, then
    /// comparatives.
    pub fn all_sources(&self) -> Vec<SourceId> {
        self.targets
            .iter()
            .chain(self.comparatives.iter())
            .cloned()
            .collect()
    }
}
