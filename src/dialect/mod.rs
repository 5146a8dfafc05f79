//! Dialect strategy: everything vendor specific the compiler consults.
//!
//! The compiler never inspects which vendor it talks to; it only calls the
//! capabilities below. Each connection builds its own dialect from its
//! `db_type` tag, so per-connection state (the identifier-shortening map)
//! lives exactly as long as the connection.

use std::str::FromStr;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ast::{Criteria, Row};
use crate::engine::Executor;
use crate::error::{AssocError, AssocResult};
use crate::schema::{AttributeType, Collection, TableSchema};

pub mod generic;
pub mod mysql;
pub mod oracle;
pub mod sqlite;

pub use generic::GenericDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use sqlite::SqliteDialect;

/// Connection-time vendor tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Generic,
    MySql,
    Oracle,
    Sqlite,
}

impl DialectKind {
    pub fn name(&self) -> &'static str {
        match self {
            DialectKind::Generic => "generic",
            DialectKind::MySql => "mysql",
            DialectKind::Oracle => "oracle",
            DialectKind::Sqlite => "sqlite",
        }
    }

    /// Build a fresh dialect instance for one connection.
    pub fn build(&self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Generic => Box::new(GenericDialect),
            DialectKind::MySql => Box::new(MysqlDialect::new()),
            DialectKind::Oracle => Box::new(OracleDialect::new()),
            DialectKind::Sqlite => Box::new(SqliteDialect),
        }
    }
}

impl FromStr for DialectKind {
    type Err = AssocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" | "" => Ok(DialectKind::Generic),
            "mysql" | "mariadb" => Ok(DialectKind::MySql),
            "oracle" | "oracledb" => Ok(DialectKind::Oracle),
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            other => Err(AssocError::Config(format!("unknown db_type '{other}'"))),
        }
    }
}

/// What a hook is operating on.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub collection: &'a Collection,
    /// Formatted physical table name.
    pub table: &'a str,
}

/// Input of the update hooks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateParams {
    pub criteria: Criteria,
    pub values: Row,
}

#[async_trait]
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }
        sql
    }

    /// `table AS alias` as this vendor spells it in a FROM / JOIN clause.
    fn table_alias(&self, table: &str, alias: &str) -> String {
        format!(
            "{} AS {}",
            self.quote_identifier(table),
            self.quote_identifier(alias)
        )
    }

    /// Wrap one SELECT so it can appear as a UNION ALL branch.
    fn wrap_union_branch(&self, sql: &str) -> String {
        format!("({})", sql)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        None
    }

    /// Identifiers longer than the vendor limit are shortened deterministically.
    fn format_identifier(&self, identifier: &str) -> String {
        identifier.to_string()
    }

    fn escape_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Whether columns of this type may appear in a projection.
    fn is_projectable(&self, _kind: AttributeType) -> bool {
        true
    }

    /// Statements run once when a connection is established.
    fn session_init(&self) -> &'static [&'static str] {
        &[]
    }

    /// Introspection statements for `table`, run in order.
    fn describe_queries(&self, _table: &str) -> Vec<String> {
        Vec::new()
    }

    async fn describe_table(
        &self,
        executor: &dyn Executor,
        table: &str,
    ) -> AssocResult<Vec<Vec<Row>>> {
        let queries = self.describe_queries(table);
        if queries.is_empty() {
            return Err(AssocError::Unsupported {
                dialect: self.kind().name(),
                operation: "schema introspection",
            });
        }
        let mut results = Vec::with_capacity(queries.len());
        for query in &queries {
            tracing::debug!(%query, "introspecting {}", table);
            results.push(executor.raw_query(query).await?);
        }
        Ok(results)
    }

    /// Fold introspection results into a schema. `None` means the table does not exist.
    fn normalize_schema(
        &self,
        _table: &str,
        _results: Vec<Vec<Row>>,
        _collection: &Collection,
    ) -> AssocResult<Option<TableSchema>> {
        Err(AssocError::Unsupported {
            dialect: self.kind().name(),
            operation: "schema normalization",
        })
    }

    fn before_find(&self, _ctx: &HookContext<'_>, criteria: Criteria) -> AssocResult<Criteria> {
        Ok(criteria)
    }

    fn after_find(&self, _ctx: &HookContext<'_>, rows: Vec<Row>) -> AssocResult<Vec<Row>> {
        Ok(rows)
    }

    fn before_create(&self, _ctx: &HookContext<'_>, values: Row) -> AssocResult<Row> {
        Ok(values)
    }

    fn after_create(&self, _ctx: &HookContext<'_>, record: Row) -> AssocResult<Row> {
        Ok(record)
    }

    fn before_update(
        &self,
        _ctx: &HookContext<'_>,
        params: UpdateParams,
    ) -> AssocResult<UpdateParams> {
        Ok(params)
    }

    fn after_update(&self, _ctx: &HookContext<'_>, rows: Vec<Row>) -> AssocResult<Vec<Row>> {
        Ok(rows)
    }

    fn before_destroy(&self, _ctx: &HookContext<'_>, criteria: Criteria) -> AssocResult<Criteria> {
        Ok(criteria)
    }

    fn after_destroy(&self, _ctx: &HookContext<'_>, rows: Vec<Row>) -> AssocResult<Vec<Row>> {
        Ok(rows)
    }
}

/// Over-length identifier shortening, memoized per connection.
#[derive(Debug)]
pub struct IdentifierMap {
    max_len: usize,
    shortened: DashMap<String, String>,
}

/// Hex digits of hash appended to a shortened identifier.
const HASH_LEN: usize = 10;

impl IdentifierMap {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            shortened: DashMap::new(),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn format(&self, identifier: &str) -> String {
        if identifier.chars().count() <= self.max_len {
            return identifier.to_string();
        }
        self.shortened
            .entry(identifier.to_string())
            .or_insert_with(|| shorten(identifier, self.max_len))
            .value()
            .clone()
    }
}

fn shorten(identifier: &str, max_len: usize) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    let hash: String = digest
        .iter()
        .take(HASH_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect();
    let keep = max_len.saturating_sub(HASH_LEN + 1);
    let prefix: String = identifier.chars().take(keep).collect();
    format!("{}_{}", prefix, hash)
}

/// String value of a column in an introspection row.
pub(crate) fn row_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(|v| v.as_str())
}
