use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ExplorerError, Result};

/// Handed out for one navigation intent. Only the latest ticket may land its
/// result in the explorer state.
#[derive(Debug, Clone)]
pub struct ListingTicket {
    generation: u64,
    token: CancellationToken,
}

impl ListingTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingOutcome<T> {
    Completed(T),
    /// A newer navigation superseded this listing; nothing was applied.
    Discarded,
}

impl<T> ListingOutcome<T> {
    pub fn is_discarded(&self) -> bool {
        matches!(self, ListingOutcome::Discarded)
    }
}

struct Current {
    generation: u64,
    token: CancellationToken,
    /// What the outstanding listing is loading, when it said so.
    target: Option<String>,
}

pub struct AbortCoordinator {
    current: Mutex<Current>,
}

impl Default for AbortCoordinator {
    fn default() -> Self {
        AbortCoordinator {
            current: Mutex::new(Current {
                generation: 0,
                token: CancellationToken::new(),
                target: None,
            }),
        }
    }
}

impl AbortCoordinator {
    fn lock(&self) -> MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels the outstanding listing, if any, and returns a fresh ticket.
    pub fn issue_abort(&self) -> ListingTicket {
        self.issue(None)
    }

    /// Like [`issue_abort`](Self::issue_abort), recording what the new
    /// listing loads so a superseded one can tell it was replaced by a
    /// listing of the same thing.
    pub fn issue_abort_for(&self, target: impl Into<String>) -> ListingTicket {
        self.issue(Some(target.into()))
    }

    fn issue(&self, target: Option<String>) -> ListingTicket {
        let mut current = self.lock();
        current.token.cancel();
        current.generation += 1;
        current.token = CancellationToken::new();
        current.target = target;
        debug!(generation = current.generation, target = ?current.target, "issued listing ticket");
        ListingTicket {
            generation: current.generation,
            token: current.token.clone(),
        }
    }

    /// Whether the outstanding listing was issued for `target`.
    pub fn is_loading(&self, target: &str) -> bool {
        let current = self.lock();
        !current.token.is_cancelled() && current.target.as_deref() == Some(target)
    }

    /// Cancels the outstanding listing without starting a new one.
    pub fn abort(&self) {
        let _ = self.issue_abort();
    }

    pub fn is_current(&self, ticket: &ListingTicket) -> bool {
        let current = self.lock();
        current.generation == ticket.generation && !ticket.token.is_cancelled()
    }

    /// Races `listing` against the ticket's cancellation. A result that
    /// finishes after the ticket was superseded is dropped as `Aborted`.
    pub async fn run<T, F>(&self, ticket: &ListingTicket, listing: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let result = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => return Err(ExplorerError::Aborted),
            result = listing => result,
        };
        if !self.is_current(ticket) {
            debug!(generation = ticket.generation, "discarding stale listing");
            return Err(ExplorerError::Aborted);
        }
        Ok(result?)
    }
}
