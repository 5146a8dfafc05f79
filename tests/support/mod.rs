//! Scripted executor shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use sqlassoc::engine::{Executor, MutationOutcome};
use sqlassoc::prelude::*;

/// A statement the executor was handed.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub table: String,
    pub sql: String,
    pub params: Vec<Value>,
}

/// Answers statements by substring match, first rule wins.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, Vec<Row>)>,
    failures: Vec<String>,
    last_insert_id: Option<i64>,
    seen: Mutex<Vec<Recorded>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, rows: Value) -> Self {
        let rows = match rows {
            Value::Array(items) => items.into_iter().map(row).collect(),
            other => vec![row(other)],
        };
        self.rules.push((needle.to_string(), rows));
        self
    }

    pub fn fail_on(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_string());
        self
    }

    pub fn insert_id(mut self, id: i64) -> Self {
        self.last_insert_id = Some(id);
        self
    }

    pub fn seen(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.seen().into_iter().map(|r| r.sql).collect()
    }

    fn answer(&self, table: &str, sql: &str, params: &[Value]) -> AssocResult<Vec<Row>> {
        self.seen.lock().unwrap().push(Recorded {
            table: table.to_string(),
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if self.failures.iter().any(|needle| sql.contains(needle.as_str())) {
            return Err(AssocError::vendor(format!("scripted failure: {sql}")));
        }
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn select(&self, table: &str, statement: &Statement) -> AssocResult<Vec<Row>> {
        self.answer(table, &statement.sql, &statement.params)
    }

    async fn mutate(&self, table: &str, statement: &Statement) -> AssocResult<MutationOutcome> {
        self.answer(table, &statement.sql, &statement.params)?;
        Ok(MutationOutcome {
            rows_affected: 1,
            last_insert_id: self.last_insert_id,
        })
    }

    async fn raw_query(&self, sql: &str) -> AssocResult<Vec<Row>> {
        self.answer("", sql, &[])
    }
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

/// users (id, name, pet) with pets, groups and the users_groups junction.
pub fn registry() -> Registry {
    Registry::new([
        CollectionDef::new(
            "users",
            vec![
                AttributeDef::new("id", AttributeType::Integer),
                AttributeDef::new("name", AttributeType::String),
                AttributeDef::new("pet", AttributeType::Integer),
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

pub fn pets(criteria: Option<Criteria>) -> Instruction {
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

pub fn pet() -> Instruction {
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

pub fn groups() -> Instruction {
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
