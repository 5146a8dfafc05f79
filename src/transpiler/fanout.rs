//! Batched fan-out for one-to-many and many-to-many associations.
//!
//! Instead of one query per parent, every parent id gets its own branch and
//! the branches are glued with UNION ALL. Per-branch LIMIT/OFFSET therefore
//! caps each parent's child list independently, while the global ordering
//! is applied once on the outer union by select-list position.

use std::collections::HashSet;

use serde_json::Value;

use crate::ast::{Association, Criteria, Instruction, Predicate, SortDirection};
use crate::error::{AssocError, AssocResult};
use crate::schema::Collection;

use super::conditions::ParamContext;
use super::dml::SelectPlan;
use super::normalize::normalize_criteria;
use super::values::key_string;
use super::{Compiler, Statement, StatementKind, ALIAS_SEPARATOR};

/// How child rows point back at their parent.
#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    /// Child column holding the parent's key.
    ForeignKey { column: String },
    /// Junction table between parent and child.
    Junction {
        table: String,
        parent_fk: String,
        child_fk: String,
        child_pk: String,
    },
}

/// Everything needed to fetch the children of one association for a batch
/// of parents. Built once per instruction and consumed by [`Compiler::compile_fanout`].
#[derive(Debug, Clone, PartialEq)]
pub struct FanoutQuery {
    pub attribute: String,
    /// Child collection identity.
    pub child: String,
    /// Parent column whose value identifies the owner.
    pub parent_key: String,
    /// Distinct, non-null parent key values.
    pub parent_ids: Vec<Value>,
    pub criteria: Criteria,
    pub link: Link,
}

impl FanoutQuery {
    /// Describe the fan-out for a to-many instruction of `parent`.
    pub fn new(
        instruction: &Instruction,
        parent: &Collection,
        parent_ids: impl IntoIterator<Item = Value>,
    ) -> AssocResult<Self> {
        let (spec, link) = match &instruction.association {
            Association::OneToOne(_) => {
                return Err(AssocError::InvalidCriteria(format!(
                    "`{}` is a one-to-one association and is resolved by a join",
                    instruction.attribute
                )));
            }
            Association::OneToMany(spec) => (
                spec,
                Link::ForeignKey {
                    column: spec.child_key.clone(),
                },
            ),
            Association::ManyToMany { owner, target } => (
                target,
                Link::Junction {
                    table: owner.child.clone(),
                    parent_fk: owner.child_key.clone(),
                    child_fk: target.parent_key.clone(),
                    child_pk: target.child_key.clone(),
                },
            ),
        };

        let mut seen = HashSet::new();
        let parent_ids = parent_ids
            .into_iter()
            .filter(|id| key_string(id).is_some_and(|key| seen.insert(key)))
            .collect();

        Ok(Self {
            attribute: instruction.attribute.clone(),
            child: spec.child.clone(),
            parent_key: parent
                .column_for(instruction.association.parent_key())?
                .to_string(),
            parent_ids,
            criteria: spec.criteria.clone().unwrap_or_default(),
            link,
        })
    }
}

/// A compiled fan-out union.
#[derive(Debug, Clone, PartialEq)]
pub struct FanoutStatement {
    /// Formatted child table name, for the executor.
    pub table: String,
    pub statement: Statement,
    /// Result column holding the owning parent's key.
    pub owner_column: String,
    /// Helper columns to drop from child rows before attaching them.
    pub hidden_columns: Vec<String>,
}

impl<'a> Compiler<'a> {
    /// Compile the union for `query`, or `None` when there are no parent ids.
    pub fn compile_fanout(&self, query: &FanoutQuery) -> AssocResult<Option<FanoutStatement>> {
        let child = self.collection(&query.child)?;
        let criteria = normalize_criteria(&query.criteria, child)?;
        let link = self.resolve_link(&query.link, child)?;
        if query.parent_ids.is_empty() {
            return Ok(None);
        }

        let child_table = self.table_name(child);

        let mut sort = criteria.sort.clone();
        if let (true, ResolvedLink::Junction { child_pk, .. }) = (sort.is_empty(), &link) {
            sort.push((child_pk.clone(), SortDirection::Asc));
        }

        // Projection: requested columns, then helper columns the assembler needs.
        let mut selected: Vec<String> = match &criteria.select {
            Some(list) if !list.is_empty() => list.clone(),
            _ => child
                .stored_attributes()
                .filter(|a| self.dialect.is_projectable(a.kind))
                .map(|a| a.column_name().to_string())
                .collect(),
        };
        let mut hidden = Vec::new();
        if let ResolvedLink::ForeignKey { column } = &link {
            if !selected.contains(column) {
                selected.push(column.clone());
                hidden.push(column.clone());
            }
        }
        for (column, _) in &sort {
            if !selected.contains(column) {
                selected.push(column.clone());
                hidden.push(column.clone());
            }
        }

        let mut columns: Vec<String> = selected
            .iter()
            .map(|c| self.qualified(&child_table, c))
            .collect();
        let owner_column = match &link {
            ResolvedLink::Junction { table: junction, parent_fk, .. } => {
                let marker = self
                    .dialect
                    .format_identifier(&format!("{}{}", ALIAS_SEPARATOR, parent_fk));
                columns.push(format!(
                    "{} AS {}",
                    self.qualified(junction, parent_fk),
                    self.quote(&marker)
                ));
                hidden.push(marker.clone());
                marker
            }
            ResolvedLink::ForeignKey { column } => column.clone(),
        };

        let branch_order: Vec<String> = if criteria.is_paginated() {
            sort.iter()
                .map(|(c, dir)| format!("{} {}", self.qualified(&child_table, c), dir.as_sql()))
                .collect()
        } else {
            Vec::new()
        };

        let mut params = ParamContext::new();
        let mut branches = Vec::with_capacity(query.parent_ids.len());
        for id in &query.parent_ids {
            let mut filters: Vec<(Predicate, Option<String>)> = Vec::new();
            let mut joins = Vec::new();
            match &link {
                ResolvedLink::ForeignKey { column } => {
                    let owner = Predicate::eq(column.clone(), id.clone());
                    let predicate = match &criteria.filter {
                        Some(filter) => filter.clone().and_also(owner),
                        None => owner,
                    };
                    filters.push((predicate, Some(child_table.clone())));
                }
                ResolvedLink::Junction { table: junction, parent_fk, child_fk, child_pk } => {
                    joins.push(format!(
                        "INNER JOIN {} ON {} = {}",
                        self.quote(junction),
                        self.qualified(junction, child_fk),
                        self.qualified(&child_table, child_pk)
                    ));
                    if let Some(filter) = &criteria.filter {
                        filters.push((filter.clone(), Some(child_table.clone())));
                    }
                    filters.push((
                        Predicate::eq(parent_fk.clone(), id.clone()),
                        Some(junction.clone()),
                    ));
                }
            }

            let branch = SelectPlan {
                table: child_table.clone(),
                columns: columns.clone(),
                joins,
                filters,
                group_by: Vec::new(),
                order_by: branch_order.clone(),
                limit: criteria.limit,
                offset: criteria.skip,
            };
            branches.push(self.dialect.wrap_union_branch(&branch.render(self, &mut params)));
        }

        let mut sql = branches.join(" UNION ALL ");
        if !sort.is_empty() {
            let positions: Vec<String> = sort
                .iter()
                .filter_map(|(column, dir)| {
                    selected
                        .iter()
                        .position(|c| c == column)
                        .map(|i| format!("{} {}", i + 1, dir.as_sql()))
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&positions.join(", "));
        }

        Ok(Some(FanoutStatement {
            table: child_table,
            statement: Statement::new(StatementKind::Select, sql, params.params),
            owner_column,
            hidden_columns: hidden,
        }))
    }
}

/// A link with every name resolved to a physical column or formatted table.
enum ResolvedLink {
    ForeignKey {
        column: String,
    },
    Junction {
        table: String,
        parent_fk: String,
        child_fk: String,
        child_pk: String,
    },
}

impl<'a> Compiler<'a> {
    fn resolve_link(&self, link: &Link, child: &Collection) -> AssocResult<ResolvedLink> {
        Ok(match link {
            Link::ForeignKey { column } => ResolvedLink::ForeignKey {
                column: child.column_for(column)?.to_string(),
            },
            Link::Junction {
                table,
                parent_fk,
                child_fk,
                child_pk,
            } => {
                let junction = self.collection(table)?;
                ResolvedLink::Junction {
                    table: self.table_name(junction),
                    parent_fk: junction.column_for(parent_fk)?.to_string(),
                    child_fk: junction.column_for(child_fk)?.to_string(),
                    child_pk: child.column_for(child_pk)?.to_string(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::JoinSpec;
    use crate::dialect::{Dialect, GenericDialect, OracleDialect, SqliteDialect};
    use crate::schema::{AttributeDef, AttributeType, CollectionDef, Registry};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::new([
            CollectionDef::new(
                "users",
                vec![
                    AttributeDef::new("id", AttributeType::Integer),
                    AttributeDef::new("pets", AttributeType::String).via("pets"),
                    AttributeDef::new("groups", AttributeType::String).via("groups"),
                ],
            ),
            CollectionDef::new(
                "pets",
                vec![
                    AttributeDef::new("id", AttributeType::Integer),
                    AttributeDef::new("name", AttributeType::String),
                    AttributeDef::new("owner", AttributeType::Integer),
                ],
            ),
            CollectionDef::new(
                "groups",
                vec![
                    AttributeDef::new("id", AttributeType::Integer),
                    AttributeDef::new("name", AttributeType::String),
                ],
            ),
            CollectionDef::new(
                "users_groups",
                vec![
                    AttributeDef::new("id", AttributeType::Integer),
                    AttributeDef::new("user_id", AttributeType::Integer),
                    AttributeDef::new("group_id", AttributeType::Integer),
                ],
            ),
        ])
        .unwrap()
    }

    fn pets(criteria: Option<Criteria>) -> Instruction {
        Instruction::one_to_many(
            "pets",
            JoinSpec {
                parent: "users".into(),
                parent_key: "id".into(),
                child: "pets".into(),
                child_key: "owner".into(),
                criteria,
                ..Default::default()
            },
        )
    }

    fn groups() -> Instruction {
        Instruction::many_to_many(
            "groups",
            JoinSpec {
                parent: "users".into(),
                parent_key: "id".into(),
                child: "users_groups".into(),
                child_key: "user_id".into(),
                ..Default::default()
            },
            JoinSpec {
                parent: "users_groups".into(),
                parent_key: "group_id".into(),
                child: "groups".into(),
                child_key: "id".into(),
                ..Default::default()
            },
        )
    }

    fn compile(dialect: &dyn Dialect, instruction: &Instruction, ids: Vec<Value>) -> Option<FanoutStatement> {
        let registry = registry();
        let users = registry.collection("users").unwrap();
        let query = FanoutQuery::new(instruction, users, ids).unwrap();
        Compiler::new(dialect, &registry).compile_fanout(&query).unwrap()
    }

    #[test]
    fn test_no_parents_no_statement() {
        assert_eq!(compile(&GenericDialect, &pets(None), vec![]), None);
        assert_eq!(compile(&GenericDialect, &pets(None), vec![Value::Null]), None);
    }

    #[test]
    fn test_parent_ids_are_distinct() {
        let registry = registry();
        let users = registry.collection("users").unwrap();
        let query = FanoutQuery::new(&pets(None), users, vec![json!(1), json!(2), json!(1)]).unwrap();
        assert_eq!(query.parent_ids, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_one_to_many_with_per_parent_limit() {
        let criteria = Criteria::new().sort_by("id", SortDirection::Desc).limit(1);
        let fanout = compile(&GenericDialect, &pets(Some(criteria)), vec![json!(1), json!(2)]).unwrap();
        let branch = "SELECT \"pets\".\"id\", \"pets\".\"name\", \"pets\".\"owner\" FROM \"pets\" \
                      WHERE \"pets\".\"owner\" = ? ORDER BY \"pets\".\"id\" DESC LIMIT 1";
        assert_eq!(
            fanout.statement.sql,
            format!("({branch}) UNION ALL ({branch}) ORDER BY 1 DESC")
        );
        assert_eq!(fanout.statement.params, vec![json!(1), json!(2)]);
        assert_eq!(fanout.owner_column, "owner");
        assert!(fanout.hidden_columns.is_empty());
    }

    #[test]
    fn test_unpaginated_branches_are_unordered() {
        let criteria = Criteria::new()
            .select(["name"])
            .filter(Predicate::eq("name", "rex"))
            .sort_by("id", SortDirection::Asc);
        let fanout = compile(&GenericDialect, &pets(Some(criteria)), vec![json!(1)]).unwrap();
        assert_eq!(
            fanout.statement.sql,
            "(SELECT \"pets\".\"name\", \"pets\".\"owner\", \"pets\".\"id\" FROM \"pets\" \
             WHERE \"pets\".\"name\" = ? AND \"pets\".\"owner\" = ?) ORDER BY 3 ASC"
        );
        assert_eq!(fanout.hidden_columns, vec!["owner", "id"]);
    }

    #[test]
    fn test_many_to_many_branches() {
        let fanout = compile(&GenericDialect, &groups(), vec![json!(1), json!(2)]).unwrap();
        let branch = "SELECT \"groups\".\"id\", \"groups\".\"name\", \"users_groups\".\"user_id\" AS \"___user_id\" \
                      FROM \"groups\" INNER JOIN \"users_groups\" ON \"users_groups\".\"group_id\" = \"groups\".\"id\" \
                      WHERE \"users_groups\".\"user_id\" = ?";
        assert_eq!(
            fanout.statement.sql,
            format!("({branch}) UNION ALL ({branch}) ORDER BY 1 ASC")
        );
        assert_eq!(fanout.owner_column, "___user_id");
        assert_eq!(fanout.hidden_columns, vec!["___user_id"]);
    }

    #[test]
    fn test_placeholders_run_across_branches() {
        let fanout = compile(&OracleDialect::new(), &groups(), vec![json!(1), json!(2)]).unwrap();
        assert!(fanout.statement.sql.contains("\"user_id\" = :1"));
        assert!(fanout.statement.sql.contains("\"user_id\" = :2"));
    }

    #[test]
    fn test_sqlite_branches_are_subselects() {
        let fanout = compile(&SqliteDialect, &pets(None), vec![json!(1), json!(2)]).unwrap();
        assert!(fanout.statement.sql.starts_with("SELECT * FROM (SELECT"));
        assert!(fanout.statement.sql.contains(") UNION ALL SELECT * FROM (SELECT"));
    }

    #[test]
    fn test_one_to_one_is_not_fanned_out() {
        let registry = registry();
        let users = registry.collection("users").unwrap();
        let instruction = Instruction::one_to_one("pet", JoinSpec::default());
        assert!(FanoutQuery::new(&instruction, users, vec![json!(1)]).is_err());
    }
}
