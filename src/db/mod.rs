//! Named connections, their pools and transactions.

mod dialect;
mod handle;
mod registry;
mod transaction;

pub use dialect::{DbPool, DialectKind};
pub use handle::ConnectionHandle;
pub use registry::{dynamic_name, DatabaseRegistry};
pub use transaction::TransactionHandle;
