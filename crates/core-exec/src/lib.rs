//! Abstract execution of injected pieces.
//!
//! Two layers: [`PieceExecutor`] evaluates individual pieces against a
//! [`core_ir::State`], and [`InterleaveExec`] walks a schedule, advancing
//! per-thread positions and feeding every piece crossed to a sink.

pub mod eval;
pub mod interleave;

pub use eval::{ExecMode, PieceExecutor, eval_op};
pub use interleave::{InterleaveExec, PieceSink};
