//! Injected-code IR: expressions, code pieces, their lazy (reserved) forms,
//! and the abstract machine state they evaluate against.
//!
//! Everything injected into a target source tree is first built out of these
//! nodes. A piece renders to exactly one C statement or block delimiter, so
//! line accounting in the injection planner stays trivial. The reserved layer
//! exists because some operands (notably "the value this variable is expected
//! to hold") can only be decided while simulating the chosen interleaving;
//! build time records a description, simulation time materializes it.

pub mod expr;
pub mod lazy;
pub mod piece;
pub mod state;

pub use expr::{DEFAULT_VALUE, ExprArg, ExprOp, Expression, InputValue, Word};
pub use lazy::{LazyPiece, Reserved, ReservedArg, ReservedExpr};
pub use piece::{Piece, bug_macro, render_indented};
pub use state::State;
