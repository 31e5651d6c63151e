pub mod transaction;
pub mod value;

pub use transaction::{Transaction, TransactionError};
pub use value::Value;
