//! One-to-one join planning and the alias registry used to split joined
//! columns back into nested records.

use std::collections::HashMap;

use serde_json::Value;

use crate::ast::{Association, Instruction, Row};
use crate::error::AssocResult;
use crate::schema::{AttributeDef, Collection};

use super::values::key_string;
use super::{Compiler, ALIAS_SEPARATOR};

/// A one-to-one association embedded in a parent SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedAssociation {
    /// Parent attribute the nested record is attached under.
    pub attribute: String,
    /// Parent column holding the join value.
    pub parent_key: String,
    /// Child column matched against `parent_key`.
    pub child_key: String,
}

/// Maps each projected alias to the association and child column it carries.
///
/// Aliases are `p<n>___<column>`, `n` being the association's ordinal among
/// the one-to-one joins, so two associations on the same child table never
/// collide.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    associations: Vec<JoinedAssociation>,
    aliases: HashMap<String, (usize, String)>,
}

impl AliasRegistry {
    pub fn is_empty(&self) -> bool {
        self.associations.is_empty()
    }

    pub fn associations(&self) -> &[JoinedAssociation] {
        &self.associations
    }

    /// Association and child column behind a projected alias.
    pub fn resolve(&self, alias: &str) -> Option<(&JoinedAssociation, &str)> {
        self.aliases
            .get(alias)
            .map(|(index, column)| (&self.associations[*index], column.as_str()))
    }

    fn add_association(&mut self, association: JoinedAssociation) -> usize {
        self.associations.push(association);
        self.associations.len() - 1
    }

    fn add_alias(&mut self, alias: String, association: usize, column: String) {
        self.aliases.insert(alias, (association, column));
    }

    /// Split a flat joined row into the parent record with one nested
    /// object (or null) per association.
    ///
    /// The nested object is null when every joined column is null or when its
    /// key does not match the parent's join value.
    pub fn split(&self, row: Row) -> Row {
        if self.associations.is_empty() {
            return row;
        }

        let mut parent = Row::new();
        let mut nested = vec![Row::new(); self.associations.len()];
        for (key, value) in row {
            match self.aliases.get(&key) {
                Some((index, column)) => {
                    nested[*index].insert(column.clone(), value);
                }
                None => {
                    parent.insert(key, value);
                }
            }
        }

        let resolved: Vec<Value> = self
            .associations
            .iter()
            .zip(nested)
            .map(|(association, child)| {
                let parent_value = parent.get(&association.parent_key).and_then(key_string);
                let child_value = child.get(&association.child_key).and_then(key_string);
                let joined = child.values().any(|v| !v.is_null())
                    && parent_value.is_some()
                    && parent_value == child_value;
                if joined {
                    Value::Object(child)
                } else {
                    Value::Null
                }
            })
            .collect();

        for (association, value) in self.associations.iter().zip(resolved) {
            parent.insert(association.attribute.clone(), value);
        }
        parent
    }
}

impl<'a> Compiler<'a> {
    /// Plan LEFT OUTER JOINs for the one-to-one instructions.
    ///
    /// Returns the join clauses and the aliased child columns to project.
    pub(crate) fn plan_one_to_one(
        &self,
        parent: &Collection,
        table: &str,
        instructions: &[Instruction],
        aliases: &mut AliasRegistry,
    ) -> AssocResult<(Vec<String>, Vec<String>)> {
        let mut joins = Vec::new();
        let mut columns = Vec::new();

        for instruction in instructions {
            let Association::OneToOne(spec) = &instruction.association else {
                continue;
            };
            let child = self.collection(&spec.child)?;
            let child_table = self.table_name(child);
            let alias = self.dialect.format_identifier(&format!(
                "_{}",
                spec.alias.as_deref().unwrap_or(&instruction.attribute)
            ));
            let parent_key = parent.column_for(&spec.parent_key)?.to_string();
            let child_key = child.column_for(&spec.child_key)?.to_string();

            joins.push(format!(
                "LEFT OUTER JOIN {} ON {} = {}",
                self.dialect.table_alias(&child_table, &alias),
                self.qualified(table, &parent_key),
                self.qualified(&alias, &child_key),
            ));

            let requested = spec
                .select
                .as_ref()
                .or_else(|| spec.criteria.as_ref().and_then(|c| c.select.as_ref()));
            let mut child_columns: Vec<String> = match requested {
                Some(list) => list
                    .iter()
                    .filter(|name| !child.attribute(name).is_some_and(AttributeDef::is_virtual))
                    .map(|name| child.column_for(name).map(str::to_string))
                    .collect::<AssocResult<_>>()?,
                None => child
                    .stored_attributes()
                    .filter(|a| self.dialect.is_projectable(a.kind))
                    .map(|a| a.column_name().to_string())
                    .collect(),
            };
            if !child_columns.contains(&child_key) {
                child_columns.push(child_key.clone());
            }

            let index = aliases.add_association(JoinedAssociation {
                attribute: instruction.attribute.clone(),
                parent_key,
                child_key,
            });
            for column in child_columns {
                let output = self
                    .dialect
                    .format_identifier(&format!("p{}{}{}", index, ALIAS_SEPARATOR, column));
                columns.push(format!(
                    "{} AS {}",
                    self.qualified(&alias, &column),
                    self.quote(&output)
                ));
                aliases.add_alias(output, index, column);
            }
        }

        Ok((joins, columns))
    }
}
