//! SQLite dialect.

use super::{row_str, Dialect, DialectKind};
use crate::ast::Row;
use crate::error::AssocResult;
use crate::parser::parse_column_type;
use crate::schema::{Collection, ColumnSchema, TableSchema};

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    /// SQLite rejects parenthesized compound-select operands.
    fn wrap_union_branch(&self, sql: &str) -> String {
        format!("SELECT * FROM ({})", sql)
    }

    fn describe_queries(&self, table: &str) -> Vec<String> {
        vec![format!("PRAGMA table_info({})", self.quote_identifier(table))]
    }

    fn normalize_schema(
        &self,
        table: &str,
        results: Vec<Vec<Row>>,
        _collection: &Collection,
    ) -> AssocResult<Option<TableSchema>> {
        let fields = results.into_iter().next().unwrap_or_default();
        if fields.is_empty() {
            return Ok(None);
        }

        let flag = |row: &Row, key: &str| row.get(key).and_then(|v| v.as_i64()).unwrap_or(0) != 0;

        let mut columns = Vec::with_capacity(fields.len());
        for field in &fields {
            let Some(name) = row_str(field, "name") else {
                continue;
            };
            let ty = parse_column_type(row_str(field, "type").unwrap_or("text"))?;
            let primary_key = flag(field, "pk");
            columns.push(ColumnSchema {
                name: name.to_string(),
                auto_increment: primary_key && ty.base == "integer",
                data_type: ty.base,
                size: ty.size,
                scale: ty.scale,
                unsigned: ty.unsigned,
                primary_key,
                unique: false,
                required: flag(field, "notnull"),
                indexed: primary_key,
                default: field.get("dflt_value").filter(|v| !v.is_null()).cloned(),
            });
        }

        Ok(Some(TableSchema {
            table: table.to_string(),
            columns,
        }))
    }
}
