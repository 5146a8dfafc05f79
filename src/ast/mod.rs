//! Request model: criteria, filter trees and population instructions.

pub mod criteria;
pub mod instruction;
pub mod predicate;

pub use criteria::{Criteria, SortDirection};
pub use instruction::{Association, Instruction, JoinSpec, Strategy};
pub use predicate::{Operator, Predicate};

/// A result row, keyed by column name in projection order.
pub type Row = serde_json::Map<String, serde_json::Value>;
