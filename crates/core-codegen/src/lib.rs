//! Per-bug variable registry and randomized assignment generation.

pub mod generator;
pub mod variable;

pub use generator::{CodeGenerator, SLEEP_TIME_US, VarData};
pub use variable::{VarKind, Variable, state_name};
