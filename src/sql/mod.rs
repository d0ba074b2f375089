//! Safe SQL builder: identifiers from table metadata only, values as parameters.

mod builder;
pub mod params;
pub mod rows;
pub use builder::*;
pub use params::BindValue;
pub use rows::{normalize_row, Row};
