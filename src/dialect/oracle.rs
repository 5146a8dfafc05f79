//! Oracle dialect.
//!
//! Oracle differs from the generic path in several places the compiler
//! has to honor:
//!
//! - positional `:n` placeholders and `OFFSET .. ROWS FETCH NEXT .. ROWS ONLY`
//! - table aliases are written without `AS`
//! - identifiers are capped at 30 characters
//! - binary, array and json columns cannot be projected, so reads strip
//!   them from the select list and writes hex-encode binary payloads
//! - each session needs NLS settings so dates round-trip as text and
//!   comparisons are case-insensitive

use super::{row_str, Dialect, DialectKind, HookContext, IdentifierMap, UpdateParams};
use crate::ast::{Criteria, Row};
use crate::error::AssocResult;
use crate::parser::parse_column_type;
use crate::schema::{AttributeType, Collection, ColumnSchema, TableSchema};
use crate::transpiler::normalize::restrict_projection;
use crate::transpiler::values::hex_encode;

const MAX_IDENTIFIER: usize = 30;

const SESSION_INIT: &[&str] = &[
    "ALTER SESSION SET NLS_TIMESTAMP_FORMAT = 'yyyy-mm-dd hh24:mi:ss'",
    "ALTER SESSION SET NLS_DATE_FORMAT = 'yyyy-mm-dd hh24:mi:ss'",
    "ALTER SESSION SET NLS_COMP=LINGUISTIC",
    "ALTER SESSION SET NLS_SORT=BINARY_CI",
];

#[derive(Debug)]
pub struct OracleDialect {
    identifiers: IdentifierMap,
}

impl OracleDialect {
    pub fn new() -> Self {
        Self {
            identifiers: IdentifierMap::new(MAX_IDENTIFIER),
        }
    }

    fn encode_binary(&self, collection: &Collection, mut values: Row) -> Row {
        for attr in collection.stored_attributes() {
            if attr.kind != AttributeType::Binary {
                continue;
            }
            let key = if values.contains_key(&attr.name) {
                attr.name.as_str()
            } else {
                attr.column_name()
            };
            if let Some(value) = values.get_mut(key) {
                *value = hex_encode(value);
            }
        }
        values
    }
}

impl Default for OracleDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for OracleDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        if limit.is_some() || offset.is_some() {
            sql.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
        }
        if let Some(n) = limit {
            sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", n));
        }
        sql
    }

    fn table_alias(&self, table: &str, alias: &str) -> String {
        format!(
            "{} {}",
            self.quote_identifier(table),
            self.quote_identifier(alias)
        )
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(self.identifiers.max_len())
    }

    fn format_identifier(&self, identifier: &str) -> String {
        self.identifiers.format(identifier)
    }

    fn is_projectable(&self, kind: AttributeType) -> bool {
        !matches!(
            kind,
            AttributeType::Binary | AttributeType::Array | AttributeType::Json
        )
    }

    fn session_init(&self) -> &'static [&'static str] {
        SESSION_INIT
    }

    fn describe_queries(&self, table: &str) -> Vec<String> {
        let table = self.escape_string(table);
        vec![
            format!(
                "SELECT COLUMN_NAME, DATA_TYPE, NULLABLE FROM USER_TAB_COLUMNS WHERE TABLE_NAME = {}",
                table
            ),
            format!(
                "SELECT INDEX_NAME, COLUMN_NAME FROM USER_IND_COLUMNS WHERE TABLE_NAME = {}",
                table
            ),
            format!(
                "SELECT cols.TABLE_NAME, cols.COLUMN_NAME, cols.POSITION, cons.STATUS, cons.OWNER \
                 FROM ALL_CONSTRAINTS cons, ALL_CONS_COLUMNS cols \
                 WHERE cols.TABLE_NAME = {} AND cons.CONSTRAINT_TYPE = 'P' \
                 AND cons.CONSTRAINT_NAME = cols.CONSTRAINT_NAME AND cons.OWNER = cols.OWNER \
                 ORDER BY cols.TABLE_NAME, cols.POSITION",
                table
            ),
        ]
    }

    fn normalize_schema(
        &self,
        table: &str,
        results: Vec<Vec<Row>>,
        collection: &Collection,
    ) -> AssocResult<Option<TableSchema>> {
        let mut results = results.into_iter();
        let fields = results.next().unwrap_or_default();
        let indexes = results.next().unwrap_or_default();
        let primary_keys = results.next().unwrap_or_default();
        if fields.is_empty() {
            return Ok(None);
        }

        let mut columns = Vec::with_capacity(fields.len());
        for field in &fields {
            let Some(raw_name) = row_str(field, "COLUMN_NAME") else {
                continue;
            };
            // Oracle folds unquoted names to upper case.
            let name = collection
                .stored_attributes()
                .map(|a| a.column_name())
                .find(|c| c.eq_ignore_ascii_case(raw_name))
                .unwrap_or(raw_name)
                .to_string();

            let data_type = row_str(field, "DATA_TYPE").unwrap_or("VARCHAR2");
            let ty = parse_column_type(data_type)?;
            let primary_key = primary_keys
                .iter()
                .any(|pk| row_str(pk, "COLUMN_NAME") == Some(raw_name));

            columns.push(ColumnSchema {
                name,
                auto_increment: primary_key && ty.base == "number",
                data_type: ty.base,
                size: ty.size,
                scale: ty.scale,
                unsigned: false,
                primary_key,
                unique: false,
                required: row_str(field, "NULLABLE") == Some("N"),
                indexed: indexes
                    .iter()
                    .any(|index| row_str(index, "COLUMN_NAME") == Some(raw_name)),
                default: None,
            });
        }

        Ok(Some(TableSchema {
            table: table.to_string(),
            columns,
        }))
    }

    fn before_find(&self, ctx: &HookContext<'_>, criteria: Criteria) -> AssocResult<Criteria> {
        Ok(restrict_projection(criteria, ctx.collection, self))
    }

    fn before_create(&self, ctx: &HookContext<'_>, values: Row) -> AssocResult<Row> {
        Ok(self.encode_binary(ctx.collection, values))
    }

    fn before_update(
        &self,
        ctx: &HookContext<'_>,
        params: UpdateParams,
    ) -> AssocResult<UpdateParams> {
        Ok(UpdateParams {
            criteria: restrict_projection(params.criteria, ctx.collection, self),
            values: self.encode_binary(ctx.collection, params.values),
        })
    }

    fn before_destroy(&self, ctx: &HookContext<'_>, criteria: Criteria) -> AssocResult<Criteria> {
        Ok(restrict_projection(criteria, ctx.collection, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDef, CollectionDef};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn documents() -> Collection {
        Collection::resolve(CollectionDef::new(
            "documents",
            vec![
                AttributeDef::new("id", AttributeType::Integer),
                AttributeDef::new("title", AttributeType::String),
                AttributeDef::new("payload", AttributeType::Binary),
                AttributeDef::new("tags", AttributeType::Array),
            ],
        ))
        .unwrap()
    }

    #[test]
    fn test_pagination() {
        let d = OracleDialect::new();
        assert_eq!(d.limit_offset(Some(10), None), " OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY");
        assert_eq!(d.limit_offset(None, Some(5)), " OFFSET 5 ROWS");
        assert_eq!(d.limit_offset(None, None), "");
        assert_eq!(d.placeholder(3), ":3");
        assert_eq!(d.table_alias("pets", "_pet"), "\"pets\" \"_pet\"");
    }

    #[test]
    fn test_identifier_cap() {
        let d = OracleDialect::new();
        let alias = d.format_identifier("p0___preferred_notification_channel");
        assert_eq!(alias.len(), 30);
        assert_eq!(d.format_identifier("p0___name"), "p0___name");
    }

    #[test]
    fn test_find_drops_unprojectable_columns() {
        let docs = documents();
        let ctx = HookContext { collection: &docs, table: "documents" };
        let criteria = OracleDialect::new().before_find(&ctx, Criteria::new()).unwrap();
        assert_eq!(criteria.select, Some(vec!["id".to_string(), "title".to_string()]));
    }

    #[test]
    fn test_create_hex_encodes_binary() {
        let docs = documents();
        let ctx = HookContext { collection: &docs, table: "documents" };
        let values = row(json!({"title": "a", "payload": "hi"}));
        let values = OracleDialect::new().before_create(&ctx, values).unwrap();
        assert_eq!(values["payload"], json!("6869"));
        assert_eq!(values["title"], json!("a"));
    }

    #[test]
    fn test_normalize_matches_attribute_case() {
        let docs = documents();
        let fields = vec![
            row(json!({"COLUMN_NAME": "ID", "DATA_TYPE": "NUMBER", "NULLABLE": "N"})),
            row(json!({"COLUMN_NAME": "TITLE", "DATA_TYPE": "VARCHAR2", "NULLABLE": "Y"})),
        ];
        let indexes = vec![row(json!({"INDEX_NAME": "DOC_TITLE", "COLUMN_NAME": "TITLE"}))];
        let pks = vec![row(json!({"COLUMN_NAME": "ID", "POSITION": 1}))];

        let schema = OracleDialect::new()
            .normalize_schema("documents", vec![fields, indexes, pks], &docs)
            .unwrap()
            .unwrap();

        let id = schema.column("id").unwrap();
        assert!(id.primary_key && id.auto_increment && id.required);
        assert!(schema.column("title").unwrap().indexed);
    }

    #[test]
    fn test_unknown_table() {
        let schema = OracleDialect::new()
            .normalize_schema("missing", vec![vec![], vec![], vec![]], &documents())
            .unwrap();
        assert_eq!(schema, None);
    }
}
