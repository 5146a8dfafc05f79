//! SELECT SQL generation.

use crate::ast::{Criteria, Predicate};
use crate::error::AssocResult;
use crate::schema::Collection;
use crate::transpiler::conditions::ParamContext;
use crate::transpiler::joins::AliasRegistry;
use crate::transpiler::normalize::normalize_criteria;
use crate::transpiler::{Compiler, Statement, StatementKind};

/// A SELECT under construction. Clauses are rendered fragments except the
/// filters, which are compiled at render time so placeholders are numbered
/// in textual order.
#[derive(Debug, Default)]
pub(crate) struct SelectPlan {
    pub table: String,
    pub columns: Vec<String>,
    pub joins: Vec<String>,
    /// Predicates over physical columns, each with its qualifying table.
    pub filters: Vec<(Predicate, Option<String>)>,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectPlan {
    pub fn render(&self, compiler: &Compiler<'_>, params: &mut ParamContext) -> String {
        let mut sql = String::from("SELECT ");
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.columns.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&compiler.quote(&self.table));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.filters.is_empty() {
            let rendered: Vec<String> = self
                .filters
                .iter()
                .map(|(predicate, table)| compiler.compile_predicate(predicate, table.as_deref(), params))
                .collect();
            sql.push_str(" WHERE ");
            if let [only] = rendered.as_slice() {
                sql.push_str(only);
            } else {
                let wrapped: Vec<String> = rendered.iter().map(|r| format!("({})", r)).collect();
                sql.push_str(&wrapped.join(" AND "));
            }
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        sql.push_str(&compiler.dialect().limit_offset(self.limit, self.offset));
        sql
    }
}

impl<'a> Compiler<'a> {
    /// Compile a SELECT for `collection`.
    ///
    /// One-to-one instructions in `criteria` become LEFT OUTER JOINs. With
    /// `for_subquery` the statement is shaped as a union branch: instructions
    /// are ignored, columns are qualified and ORDER BY is kept only when the
    /// branch is paginated.
    pub fn compile_select(
        &self,
        collection: &str,
        criteria: &Criteria,
        for_subquery: bool,
    ) -> AssocResult<Statement> {
        let collection = self.collection(collection)?;
        let normalized = normalize_criteria(criteria, collection)?;
        let (plan, _) = self.plan_select(collection, &normalized, for_subquery)?;
        let mut params = ParamContext::new();
        let sql = plan.render(self, &mut params);
        Ok(Statement::new(StatementKind::Select, sql, params.params))
    }

    /// Compile the parent query of a population request, returning the
    /// alias registry needed to split joined columns back out.
    pub fn compile_joined_select(
        &self,
        collection: &Collection,
        normalized: &Criteria,
    ) -> AssocResult<(Statement, AliasRegistry)> {
        let (plan, aliases) = self.plan_select(collection, normalized, false)?;
        let mut params = ParamContext::new();
        let sql = plan.render(self, &mut params);
        Ok((Statement::new(StatementKind::Select, sql, params.params), aliases))
    }

    pub(crate) fn plan_select(
        &self,
        collection: &Collection,
        criteria: &Criteria,
        for_subquery: bool,
    ) -> AssocResult<(SelectPlan, AliasRegistry)> {
        let table = self.table_name(collection);
        let mut aliases = AliasRegistry::default();

        let (joins, joined_columns) = if for_subquery {
            (Vec::new(), Vec::new())
        } else {
            self.plan_one_to_one(collection, &table, &criteria.instructions, &mut aliases)?
        };

        let qualifier = (for_subquery || !joins.is_empty()).then_some(table.as_str());

        let mut columns: Vec<String> = match &criteria.select {
            Some(list) if !list.is_empty() || criteria.has_aggregates() => {
                let mut list = list.clone();
                for association in aliases.associations() {
                    if !list.contains(&association.parent_key) {
                        list.push(association.parent_key.clone());
                    }
                }
                list.iter().map(|c| self.column_ref(qualifier, c)).collect()
            }
            _ if qualifier.is_some() => vec![format!("{}.*", self.quote(&table))],
            _ => Vec::new(),
        };
        columns.extend(joined_columns);

        let aggregates = [
            ("SUM", &criteria.sum),
            ("AVG", &criteria.average),
            ("MIN", &criteria.min),
            ("MAX", &criteria.max),
        ];
        for (function, targets) in aggregates {
            for column in targets.iter() {
                columns.push(format!(
                    "{}({}) AS {}",
                    function,
                    self.column_ref(qualifier, column),
                    self.quote(column)
                ));
            }
        }

        let group_by = criteria
            .group_by
            .iter()
            .map(|c| self.column_ref(qualifier, c))
            .collect();

        let order_by = if for_subquery && !criteria.is_paginated() {
            Vec::new()
        } else {
            criteria
                .sort
                .iter()
                .map(|(column, dir)| format!("{} {}", self.qualified(&table, column), dir.as_sql()))
                .collect()
        };

        let plan = SelectPlan {
            filters: criteria
                .filter
                .iter()
                .map(|p| (p.clone(), qualifier.map(str::to_string)))
                .collect(),
            table,
            columns,
            joins,
            group_by,
            order_by,
            limit: criteria.limit,
            offset: criteria.skip,
        };
        Ok((plan, aliases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Instruction, JoinSpec, Operator, SortDirection};
    use crate::dialect::{Dialect, GenericDialect, MysqlDialect, OracleDialect};
    use crate::error::AssocError;
    use crate::schema::{AttributeDef, AttributeType, CollectionDef, Registry};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::new([
            CollectionDef::new(
                "users",
                vec![
                    AttributeDef::new("id", AttributeType::Integer),
                    AttributeDef::new("name", AttributeType::String),
                    AttributeDef::new("age", AttributeType::Integer),
                    AttributeDef::new("pet", AttributeType::Integer),
                ],
            ),
            CollectionDef::new(
                "pets",
                vec![
                    AttributeDef::new("id", AttributeType::Integer),
                    AttributeDef::new("name", AttributeType::String),
                ],
            ),
        ])
        .unwrap()
    }

    fn pet_join() -> Instruction {
        Instruction::one_to_one(
            "pet",
            JoinSpec {
                parent: "users".into(),
                parent_key: "pet".into(),
                child: "pets".into(),
                child_key: "id".into(),
                ..Default::default()
            },
        )
    }

    fn select(dialect: &dyn Dialect, criteria: &Criteria, for_subquery: bool) -> Statement {
        let registry = registry();
        Compiler::new(dialect, &registry)
            .compile_select("users", criteria, for_subquery)
            .unwrap()
    }

    #[test]
    fn test_plain_select() {
        let stmt = select(&GenericDialect, &Criteria::new(), false);
        assert_eq!(stmt.sql, "SELECT * FROM \"users\"");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_clause_order() {
        let criteria = Criteria::new()
            .select(["id", "name"])
            .filter(Predicate::compare("age", Operator::Gt, 18))
            .sort_by("name", SortDirection::Asc)
            .limit(10)
            .skip(20);
        let stmt = select(&GenericDialect, &criteria, false);
        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"name\" FROM \"users\" WHERE \"age\" > ? ORDER BY \"users\".\"name\" ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(stmt.params, vec![json!(18)]);
    }

    #[test]
    fn test_aggregates() {
        let criteria: Criteria =
            serde_json::from_value(json!({"groupBy": "name", "sum": "age", "max": "id"})).unwrap();
        let stmt = select(&MysqlDialect::new(), &criteria, false);
        assert_eq!(
            stmt.sql,
            "SELECT `name`, SUM(`age`) AS `age`, MAX(`id`) AS `id` FROM `users` GROUP BY `name`"
        );
    }

    #[test]
    fn test_group_by_without_aggregate_issues_nothing() {
        let registry = registry();
        let mut criteria = Criteria::new();
        criteria.group_by = vec!["name".into()];
        let err = Compiler::new(&GenericDialect, &registry)
            .compile_select("users", &criteria, false)
            .unwrap_err();
        assert!(matches!(err, AssocError::InvalidAggregateRequest(_)));
    }

    #[test]
    fn test_subquery_drops_sort_without_pagination() {
        let criteria = Criteria::new().sort_by("name", SortDirection::Desc);
        let stmt = select(&GenericDialect, &criteria, true);
        assert_eq!(stmt.sql, "SELECT \"users\".* FROM \"users\"");

        let stmt = select(&GenericDialect, &criteria.limit(1), true);
        assert_eq!(
            stmt.sql,
            "SELECT \"users\".* FROM \"users\" ORDER BY \"users\".\"name\" DESC LIMIT 1"
        );
    }

    #[test]
    fn test_one_to_one_join() {
        let criteria = Criteria::new()
            .select(["name"])
            .filter(Predicate::eq("id", 1))
            .populate(pet_join());
        let stmt = select(&GenericDialect, &criteria, false);
        assert_eq!(
            stmt.sql,
            "SELECT \"users\".\"name\", \"users\".\"pet\", \"_pet\".\"id\" AS \"p0___id\", \"_pet\".\"name\" AS \"p0___name\" \
             FROM \"users\" LEFT OUTER JOIN \"pets\" AS \"_pet\" ON \"users\".\"pet\" = \"_pet\".\"id\" \
             WHERE \"users\".\"id\" = ?"
        );
    }

    #[test]
    fn test_oracle_join_and_paging() {
        let criteria = Criteria::new().populate(pet_join()).limit(5);
        let stmt = select(&OracleDialect::new(), &criteria, false);
        assert_eq!(
            stmt.sql,
            "SELECT \"users\".*, \"_pet\".\"id\" AS \"p0___id\", \"_pet\".\"name\" AS \"p0___name\" \
             FROM \"users\" LEFT OUTER JOIN \"pets\" \"_pet\" ON \"users\".\"pet\" = \"_pet\".\"id\" \
             OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn test_unknown_collection() {
        let registry = registry();
        let err = Compiler::new(&GenericDialect, &registry)
            .compile_select("ghosts", &Criteria::new(), false)
            .unwrap_err();
        assert!(matches!(err, AssocError::UnknownCollection(_)));
    }
}
