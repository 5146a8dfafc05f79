//! # sqlassoc
//!
//! Criteria-to-SQL compiler and association population engine for
//! relational adapters.
//!
//! A [`Criteria`](ast::Criteria) object (filter tree, projection, sort,
//! pagination, aggregates and population instructions) is compiled into
//! dialect-correct SQL with bound parameters. Join requests are resolved with
//! one parent query plus one batched `UNION ALL` fan-out per to-many
//! association, and the children are spliced back onto their parents.
//!
//! ## Quick Example
//!
//! ```rust
//! use sqlassoc::prelude::*;
//!
//! let registry = Registry::new([CollectionDef::new(
//!     "users",
//!     vec![
//!         AttributeDef::new("id", AttributeType::Integer),
//!         AttributeDef::new("age", AttributeType::Integer),
//!     ],
//! )])
//! .unwrap();
//! let dialect = MysqlDialect::new();
//! let compiler = Compiler::new(&dialect, &registry);
//!
//! let criteria = Criteria::new()
//!     .filter(Predicate::compare("age", Operator::Gt, 18))
//!     .limit(10);
//! let stmt = compiler.compile_select("users", &criteria, false).unwrap();
//! assert_eq!(stmt.sql, "SELECT * FROM `users` WHERE `age` > ? LIMIT 10");
//! ```
//!
//! ## Layout
//!
//! | Module        | Role                                              |
//! |---------------|---------------------------------------------------|
//! | `ast`         | Criteria, predicates and population instructions |
//! | `schema`      | Collection definitions and introspected schemas   |
//! | `dialect`     | Vendor capabilities and lifecycle hooks           |
//! | `transpiler`  | SELECT/INSERT/UPDATE/DELETE and fan-out compilers |
//! | `populate`    | The join protocol                                 |
//! | `engine`      | Executor seam and the sqlx-backed executor        |
//! | `connection`  | Per-identity state and CRUD operations            |

pub mod ast;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod parser;
pub mod populate;
pub mod schema;
pub mod transpiler;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::config::ConnectionConfig;
    pub use crate::connection::Connection;
    pub use crate::dialect::{
        Dialect, DialectKind, GenericDialect, MysqlDialect, OracleDialect, SqliteDialect,
    };
    pub use crate::engine::{Executor, MutationOutcome, SqlxExecutor};
    pub use crate::error::*;
    pub use crate::populate::{populate, JoinRequest};
    pub use crate::schema::{
        AttributeDef, AttributeType, CollectionDef, Registry, TableSchema,
    };
    pub use crate::transpiler::{Compiler, Statement, StatementKind};
}

pub use connection::Connection;
pub use error::{AssocError, AssocResult};
