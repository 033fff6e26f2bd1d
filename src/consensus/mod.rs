//! Per-community chain state and the pure transaction validator that guards
//! it.

pub mod chain;
pub mod validator;

pub use chain::{Chain, ChainNode, LogRecord};
pub use validator::validate;
