use std::sync::Arc;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::model::{Quote, Snapshot, SourceId};
use crate::source::QuoteSource;

/// Fetches every requested source concurrently and folds the results into a
/// [`Snapshot`]. A failed or timed-out fetch becomes a missing entry; nothing
/// here aborts the tick.
pub struct RateAggregator {
    source: Arc<dyn QuoteSource>,
    fetch_timeout: Duration,
}

impl RateAggregator {
    pub fn new(source: Arc<dyn QuoteSource>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            fetch_timeout,
        }
    }

    pub async fn aggregate(&self, sources: &[SourceId]) -> Snapshot {
        let fetches = sources.iter().map(|id| async move {
            let result = self.fetch_bounded(id).await;
            let quote = match result {
                Ok(quote) => Some(quote),
                Err(report) => {
                    warn!(source = %id, error = ?report, "quote unavailable this tick");
                    None
                }
            };
            (id.clone(), quote)
        });

        // Suspends until every fetch has settled.
        let snapshot = Snapshot::from_entries(join_all(fetches).await);

        debug!(
            requested = sources.len(),
            present = snapshot.present_count(),
            missing = ?snapshot.missing().collect::<Vec<_>>(),
            "snapshot built"
        );
        snapshot
    }

    async fn fetch_bounded(&self, id: &SourceId) -> Result<Quote, Report<SourceError>> {
        tokio::time::timeout(self.fetch_timeout, self.source.fetch(id))
            .await
            .change_context(SourceError::Timeout {
                source_id: id.to_string(),
            })
            .attach_with(|| format!("timeout: {:?}", self.fetch_timeout))?
    }
}
