//! Concatenates a run's pages into one [`RecordSet`].
//!
//! A failed page request does not throw the already fetched pages away: they
//! are returned together with [`Termination::Aborted`], so the caller decides
//! what a truncated fetch means instead of mistaking it for a drained window.

use crate::error::EtlError;
use crate::fetch::Paginator;
use crate::models::RecordSet;

#[derive(Debug)]
pub enum Termination {
    /// The API reported the end of the window (short or empty page).
    Drained,
    /// A page request failed; later pages were never requested.
    Aborted(EtlError),
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub records: RecordSet,
    /// Page requests issued, including the failed one.
    pub pages: usize,
    pub termination: Termination,
}

impl FetchOutcome {
    pub fn is_drained(&self) -> bool {
        matches!(self.termination, Termination::Drained)
    }
}

/// Drain `paginator`, keeping arrival order.
pub async fn accumulate(mut paginator: Paginator<'_>) -> FetchOutcome {
    let mut records = RecordSet::new();
    let mut termination = Termination::Drained;

    while let Some(item) = paginator.next_batch().await {
        match item {
            Ok(batch) => records.extend(batch),
            Err(e) => {
                debug_assert!(e.is_fetch_failure());
                termination = Termination::Aborted(e);
                break;
            }
        }
    }
    debug_assert!(paginator.state().is_terminal());

    match &termination {
        Termination::Drained => log::info!(
            "Fetched {} records in {} pages",
            records.len(),
            paginator.pages()
        ),
        Termination::Aborted(e) => log::warn!(
            "Fetch aborted after {} pages with {} records kept: {e}",
            paginator.pages(),
            records.len()
        ),
    }

    FetchOutcome {
        records,
        pages: paginator.pages(),
        termination,
    }
}
