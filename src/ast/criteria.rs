//! Criteria: the data-store-agnostic request object.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::instruction::{Instruction, RawInstruction};
use super::predicate::Predicate;
use crate::error::AssocError;

/// Sort direction. `1` is ascending, `-1` descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn from_json(key: &str, value: &Value) -> Result<Self, AssocError> {
        match value {
            Value::Number(n) if n.as_i64() == Some(1) => Ok(SortDirection::Asc),
            Value::Number(n) if n.as_i64() == Some(-1) => Ok(SortDirection::Desc),
            Value::String(s) if s.eq_ignore_ascii_case("asc") => Ok(SortDirection::Asc),
            Value::String(s) if s.eq_ignore_ascii_case("desc") => Ok(SortDirection::Desc),
            other => Err(AssocError::InvalidCriteria(format!(
                "invalid sort direction {other} for `{key}`"
            ))),
        }
    }
}

/// A find / populate request.
///
/// Deserializes from the ODM request shape:
///
/// ```
/// use sqlassoc::ast::Criteria;
/// use serde_json::json;
///
/// let criteria: Criteria = serde_json::from_value(json!({
///     "where": {"age": {">": 18}},
///     "sort": {"name": 1},
///     "limit": 10
/// })).unwrap();
/// assert_eq!(criteria.limit, Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawCriteria")]
pub struct Criteria {
    pub select: Option<Vec<String>>,
    pub filter: Option<Predicate>,
    pub sort: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub group_by: Vec<String>,
    pub sum: Vec<String>,
    pub average: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
    pub instructions: Vec<Instruction>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Add a filter, conjoined with any existing one.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_also(predicate),
            None => predicate,
        });
        self
    }

    pub fn sort_by(mut self, attribute: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((attribute.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn populate(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// True when any of sum/average/min/max is requested.
    pub fn has_aggregates(&self) -> bool {
        !(self.sum.is_empty() && self.average.is_empty() && self.min.is_empty() && self.max.is_empty())
    }

    /// Reject groupBy without an aggregate function.
    pub fn validate_aggregates(&self) -> Result<(), AssocError> {
        if !self.group_by.is_empty() && !self.has_aggregates() {
            return Err(AssocError::InvalidAggregateRequest(format!(
                "groupBy on {} requires at least one of sum, average, min or max",
                self.group_by.join(", ")
            )));
        }
        Ok(())
    }

    pub fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.skip.is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCriteria {
    #[serde(default)]
    select: Option<Vec<String>>,
    #[serde(default, rename = "where")]
    filter: Option<Value>,
    #[serde(default)]
    sort: Option<Map<String, Value>>,
    #[serde(default)]
    limit: Option<u64>,
    #[serde(default)]
    skip: Option<u64>,
    #[serde(default)]
    group_by: Option<OneOrMany>,
    #[serde(default)]
    sum: Option<OneOrMany>,
    #[serde(default)]
    average: Option<OneOrMany>,
    #[serde(default)]
    min: Option<OneOrMany>,
    #[serde(default)]
    max: Option<OneOrMany>,
    #[serde(default)]
    instructions: Option<Map<String, Value>>,
}

impl TryFrom<RawCriteria> for Criteria {
    type Error = AssocError;

    fn try_from(raw: RawCriteria) -> Result<Self, Self::Error> {
        let filter = match raw.filter {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(value) => Some(Predicate::from_json(&value)?),
        };

        let sort = raw
            .sort
            .unwrap_or_default()
            .iter()
            .map(|(key, dir)| Ok((key.clone(), SortDirection::from_json(key, dir)?)))
            .collect::<Result<Vec<_>, AssocError>>()?;

        let mut instructions = Vec::new();
        for (attribute, value) in raw.instructions.unwrap_or_default() {
            let raw_instruction: RawInstruction = serde_json::from_value(value).map_err(|e| {
                AssocError::InvalidCriteria(format!("population of `{attribute}`: {e}"))
            })?;
            instructions.push(raw_instruction.into_instruction(attribute)?);
        }

        let list = |field: Option<OneOrMany>| field.map(Vec::from).unwrap_or_default();

        Ok(Criteria {
            select: raw.select,
            filter,
            sort,
            limit: raw.limit,
            skip: raw.skip,
            group_by: list(raw.group_by),
            sum: list(raw.sum),
            average: list(raw.average),
            min: list(raw.min),
            max: list(raw.max),
            instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Strategy;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_aggregate_shorthand_is_coerced() {
        let criteria: Criteria =
            serde_json::from_value(json!({"groupBy": "type", "sum": "age", "max": ["age", "size"]}))
                .unwrap();
        assert_eq!(criteria.group_by, vec!["type"]);
        assert_eq!(criteria.sum, vec!["age"]);
        assert_eq!(criteria.max, vec!["age", "size"]);
        assert!(criteria.has_aggregates());
    }

    #[test]
    fn test_group_by_without_aggregate_is_rejected() {
        let criteria: Criteria = serde_json::from_value(json!({"groupBy": ["type"]})).unwrap();
        let err = criteria.validate_aggregates().unwrap_err();
        assert!(matches!(err, AssocError::InvalidAggregateRequest(_)));
    }

    #[test]
    fn test_sort_keeps_declaration_order() {
        let criteria: Criteria =
            serde_json::from_value(json!({"sort": {"name": 1, "age": -1, "id": "desc"}})).unwrap();
        assert_eq!(
            criteria.sort,
            vec![
                ("name".to_string(), SortDirection::Asc),
                ("age".to_string(), SortDirection::Desc),
                ("id".to_string(), SortDirection::Desc),
            ]
        );
    }

    #[test]
    fn test_bad_sort_direction() {
        let result: Result<Criteria, _> = serde_json::from_value(json!({"sort": {"name": 2}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_where_is_no_filter() {
        let criteria: Criteria = serde_json::from_value(json!({"where": {}})).unwrap();
        assert_eq!(criteria.filter, None);
    }

    #[test]
    fn test_instructions_in_declaration_order() {
        let criteria: Criteria = serde_json::from_value(json!({
            "instructions": {
                "pet": {"strategy": {"strategy": 1}, "instructions": [
                    {"parent": "users", "parentKey": "pet", "child": "pets", "childKey": "id", "alias": "pet"}
                ]},
                "toys": {"strategy": {"strategy": 2}, "instructions": [
                    {"parent": "users", "parentKey": "id", "child": "toys", "childKey": "owner",
                     "criteria": {"sort": {"id": -1}, "limit": 1}}
                ]}
            }
        }))
        .unwrap();
        let strategies: Vec<_> = criteria.instructions.iter().map(|i| i.strategy()).collect();
        assert_eq!(strategies, vec![Strategy::OneToOne, Strategy::OneToMany]);
        assert_eq!(criteria.instructions[1].attribute, "toys");
    }
}
