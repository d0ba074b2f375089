//! Filter/search language and its compiler into validated predicates.

pub mod compiler;
pub mod expr;
pub mod options;

pub use compiler::{pagination, CmpOp, CompiledQuery, FilterCompiler, Predicate, DEFAULT_LIMIT, DEFAULT_OFFSET};
pub use expr::{FieldFilter, FilterExpression, FreeText, Operator, Search, SearchQuery};
pub use options::{Direction, MutationOptions, OrderSpec, QueryOptions, Selection};
