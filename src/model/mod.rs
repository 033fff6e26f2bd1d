mod block;
mod transaction;

pub use block::{Block, BlockKind};
pub use transaction::{Input, Output, Transaction, TransactionParseError};
