//! MySQL / MariaDB dialect.

use super::{row_str, Dialect, DialectKind, IdentifierMap};
use crate::ast::Row;
use crate::error::AssocResult;
use crate::parser::parse_column_type;
use crate::schema::{Collection, ColumnSchema, TableSchema};

/// MySQL identifiers are limited to 64 characters.
const MAX_IDENTIFIER: usize = 64;

#[derive(Debug)]
pub struct MysqlDialect {
    identifiers: IdentifierMap,
}

impl MysqlDialect {
    pub fn new() -> Self {
        Self {
            identifiers: IdentifierMap::new(MAX_IDENTIFIER),
        }
    }
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MysqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn escape_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(self.identifiers.max_len())
    }

    fn format_identifier(&self, identifier: &str) -> String {
        self.identifiers.format(identifier)
    }

    fn describe_queries(&self, table: &str) -> Vec<String> {
        let table = self.quote_identifier(table);
        vec![format!("DESCRIBE {}", table), format!("SHOW INDEX FROM {}", table)]
    }

    fn normalize_schema(
        &self,
        table: &str,
        results: Vec<Vec<Row>>,
        _collection: &Collection,
    ) -> AssocResult<Option<TableSchema>> {
        let mut results = results.into_iter();
        let fields = results.next().unwrap_or_default();
        let indexes = results.next().unwrap_or_default();
        if fields.is_empty() {
            return Ok(None);
        }

        let mut columns = Vec::with_capacity(fields.len());
        for field in &fields {
            let Some(name) = row_str(field, "Field") else {
                continue;
            };
            let ty = parse_column_type(row_str(field, "Type").unwrap_or("text"))?;
            let key = row_str(field, "Key").unwrap_or_default();
            let extra = row_str(field, "Extra").unwrap_or_default();
            columns.push(ColumnSchema {
                name: name.to_string(),
                data_type: ty.base,
                size: ty.size,
                scale: ty.scale,
                unsigned: ty.unsigned,
                primary_key: key == "PRI",
                auto_increment: extra.to_ascii_lowercase().contains("auto_increment"),
                unique: key == "UNI",
                required: row_str(field, "Null") == Some("NO"),
                indexed: indexes
                    .iter()
                    .any(|index| row_str(index, "Column_name") == Some(name)),
                default: field.get("Default").filter(|v| !v.is_null()).cloned(),
            });
        }

        Ok(Some(TableSchema {
            table: table.to_string(),
            columns,
        }))
    }
}
