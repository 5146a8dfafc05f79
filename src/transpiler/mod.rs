//! Criteria compiler.
//!
//! Turns normalized criteria into dialect-correct SQL with bound parameters.
//! The compiler is inert: a [`Statement`] does nothing until it is handed to
//! an [`Executor`](crate::engine::Executor).

pub mod conditions;
pub mod dml;
pub mod fanout;
pub mod joins;
pub mod normalize;
pub mod values;

use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::AssocResult;
use crate::schema::{Collection, Registry};

pub use conditions::ParamContext;
pub use fanout::{FanoutQuery, FanoutStatement, Link};
pub use joins::{AliasRegistry, JoinedAssociation};

/// Separator between an alias prefix and the child column it carries.
pub const ALIAS_SEPARATOR: &str = "___";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// A compiled statement: SQL text plus positional parameters in textual order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(kind: StatementKind, sql: String, params: Vec<Value>) -> Self {
        Self { sql, params, kind }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Compiles criteria for one connection's dialect and collection registry.
#[derive(Clone, Copy)]
pub struct Compiler<'a> {
    dialect: &'a dyn Dialect,
    registry: &'a Registry,
}

impl<'a> Compiler<'a> {
    pub fn new(dialect: &'a dyn Dialect, registry: &'a Registry) -> Self {
        Self { dialect, registry }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn collection(&self, name: &str) -> AssocResult<&'a Collection> {
        self.registry.collection(name)
    }

    /// Physical table name after identifier formatting, unquoted.
    pub fn table_name(&self, collection: &Collection) -> String {
        self.dialect.format_identifier(collection.table_name())
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn qualified(&self, table: &str, column: &str) -> String {
        format!("{}.{}", self.quote(table), self.quote(column))
    }

    /// Column reference, qualified when `table` is given.
    fn column_ref(&self, table: Option<&str>, column: &str) -> String {
        match table {
            Some(table) => self.qualified(table, column),
            None => self.quote(column),
        }
    }
}
