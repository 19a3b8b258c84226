//! Source injection: eligibility checking, pre-line insertion with stable
//! line accounting, and emission of the injected C runtime.

pub mod checker;
pub mod injector;
pub mod rbcode;

pub use checker::InjectChecker;
pub use injector::{InsertionSet, Injector};
pub use rbcode::{RuntimeEmitter, prepend_state_include};
