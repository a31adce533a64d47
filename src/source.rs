pub mod criptoya;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::SourceError;
use crate::model::{Quote, SourceId};

/// A provider that can quote any configured source on demand.
///
/// Uses `BoxFuture` instead of `async fn` in trait to keep the trait
/// object-safe (`dyn QuoteSource`).
pub trait QuoteSource: Send + Sync {
    fn fetch(&self, source: &SourceId) -> BoxFuture<'_, Result<Quote, Report<SourceError>>>;
}
