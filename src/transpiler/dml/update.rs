//! UPDATE SQL generation.

use crate::ast::{Criteria, Row};
use crate::error::AssocResult;
use crate::transpiler::conditions::ParamContext;
use crate::transpiler::normalize::normalize_criteria;
use crate::transpiler::{Compiler, Statement, StatementKind};

impl<'a> Compiler<'a> {
    /// Generate an UPDATE of the rows matching `criteria`.
    ///
    /// SET parameters precede WHERE parameters.
    pub fn compile_update(&self, collection: &str, criteria: &Criteria, values: &Row) -> AssocResult<Statement> {
        let collection = self.collection(collection)?;
        let normalized = normalize_criteria(criteria, collection)?;
        let mut params = ParamContext::new();

        let mut assignments = Vec::with_capacity(values.len());
        for (name, value) in values {
            let column = self.quote(collection.column_for(name)?);
            assignments.push(format!("{} = {}", column, params.add_param(value, self.dialect)));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.quote(&self.table_name(collection)),
            assignments.join(", ")
        );
        if let Some(filter) = &normalized.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.compile_predicate(filter, None, &mut params));
        }

        Ok(Statement::new(StatementKind::Update, sql, params.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Predicate;
    use crate::dialect::GenericDialect;
    use crate::schema::{AttributeDef, AttributeType, CollectionDef, Registry};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_update_param_order() {
        let registry = Registry::new([CollectionDef::new(
            "users",
            vec![
                AttributeDef::new("id", AttributeType::Integer),
                AttributeDef::new("name", AttributeType::String),
                AttributeDef::new("seen_at", AttributeType::DateTime),
            ],
        )])
        .unwrap();
        let mut values = Row::new();
        values.insert("name".into(), json!("bo"));
        values.insert("seen_at".into(), json!("2024-01-02T03:04:05Z"));

        let stmt = Compiler::new(&GenericDialect, &registry)
            .compile_update(
                "users",
                &Criteria::new().filter(Predicate::is_in("id", vec![json!(1), json!(2)])),
                &values,
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"users\" SET \"name\" = ?, \"seen_at\" = ? WHERE \"id\" IN (?, ?)"
        );
        assert_eq!(
            stmt.params,
            vec![json!("bo"), json!("2024-01-02 03:04:05"), json!(1), json!(2)]
        );
    }
}
