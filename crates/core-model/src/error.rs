//! Soft-failure kinds of the extraction engine.
//!
//! Every variant aborts the current extraction attempt and is retried under
//! the outer budget. Inconsistent internal data is not represented here; the
//! engine panics on broken invariants.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BugError {
    /// The walker cannot find enough eligible threads/lines at the chosen
    /// cursor.
    #[error("no available injection position")]
    NoPosition,

    /// The simulated interleaving reached a scheduled entry inside a skipped
    /// region.
    #[error("interleaving entered a region the injected control flow skips")]
    CantFollowOrder,

    /// The checker pass completed without the crash firing.
    #[error("checker pass finished without triggering the crash")]
    CantTrigger,

    /// Lock acquire/release mismatch in the abstract execution.
    #[error("lock acquire/release mismatch in abstract execution")]
    Lock,

    /// Variable pool exhausted under the current constraints.
    #[error("no variable satisfies the requested constraints")]
    NoAvailableVariable,

    /// External post-check: the bug fires under a naive random schedule.
    #[error("bug triggers under a naive schedule")]
    TooEasy,

    /// External post-check: the generated order does not reproduce.
    #[error("generated order does not reproduce under a real run")]
    CantReproduce,

    /// Insertion bookkeeping failed while planning the injection.
    #[error("injection planning failed: {0}")]
    Inject(String),
}
