//! Association population: run the parent query, fan out to-many
//! associations in one batch per instruction and splice children back onto
//! their parents.

use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::Value;

use crate::ast::{Criteria, Instruction, Row, Strategy};
use crate::engine::Executor;
use crate::error::AssocResult;
use crate::schema::Collection;
use crate::transpiler::normalize::normalize_criteria;
use crate::transpiler::values::key_string;
use crate::transpiler::{Compiler, FanoutQuery, FanoutStatement};

/// A join request: parent collection plus criteria carrying the instructions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinRequest {
    pub collection: String,
    #[serde(default)]
    pub criteria: Criteria,
}

impl JoinRequest {
    pub fn new(collection: impl Into<String>, criteria: Criteria) -> Self {
        Self {
            collection: collection.into(),
            criteria,
        }
    }
}

/// Parent records under assembly, keyed by primary key.
struct Buffers {
    records: Vec<Row>,
}

impl Buffers {
    /// One buffer per distinct primary key, in row order.
    fn new(rows: Vec<Row>, primary_key: &str) -> Self {
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(key) = row.get(primary_key).and_then(key_string) {
                if !seen.insert(key) {
                    continue;
                }
            }
            records.push(row);
        }
        Self { records }
    }

    /// Buffer positions by the text form of `column`.
    fn index_by(&self, column: &str) -> HashMap<String, Vec<usize>> {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, record) in self.records.iter().enumerate() {
            if let Some(key) = record.get(column).and_then(key_string) {
                index.entry(key).or_default().push(position);
            }
        }
        index
    }

    /// Parent key values of every buffer.
    fn values_of(&self, column: &str) -> Vec<Value> {
        self.records
            .iter()
            .filter_map(|record| record.get(column).cloned())
            .collect()
    }

    /// Attach the children of one instruction.
    ///
    /// Runs only once the instruction's complete result set is available.
    fn attach(&mut self, attribute: &str, parent_key: &str, fanout: &FanoutStatement, children: Vec<Row>) {
        let index = self.index_by(parent_key);
        for mut child in children {
            let owner = child.get(&fanout.owner_column).and_then(key_string);
            for hidden in &fanout.hidden_columns {
                child.remove(hidden);
            }
            let Some(positions) = owner.and_then(|key| index.get(&key)) else {
                continue;
            };
            for &position in positions {
                if let Some(Value::Array(list)) = self.records[position].get_mut(attribute) {
                    list.push(Value::Object(child.clone()));
                }
            }
        }
    }
}

/// Run a join request end to end.
///
/// All criteria are validated before the first statement is issued. Fan-out
/// queries run concurrently; the first failure aborts the request and no
/// partial result is returned.
pub async fn populate(
    compiler: &Compiler<'_>,
    executor: &dyn Executor,
    request: &JoinRequest,
) -> AssocResult<Vec<Row>> {
    let parent = compiler.collection(&request.collection)?;
    let mut criteria = normalize_criteria(&request.criteria, parent)?;
    validate_instructions(compiler, parent, &criteria.instructions)?;
    include_keys(&mut criteria, parent)?;

    let (statement, aliases) = compiler.compile_joined_select(parent, &criteria)?;
    let table = compiler.table_name(parent);
    let rows = executor.select(&table, &statement).await?;

    let to_many: Vec<&Instruction> = criteria
        .instructions
        .iter()
        .filter(|i| i.strategy() != Strategy::OneToOne)
        .collect();

    let rows = rows
        .into_iter()
        .map(|row| {
            let mut record = aliases.split(row);
            for instruction in &to_many {
                record.insert(instruction.attribute.clone(), Value::Array(Vec::new()));
            }
            record
        })
        .collect();
    let mut buffers = Buffers::new(rows, parent.primary_key().column_name());

    let mut pending = Vec::with_capacity(to_many.len());
    for instruction in &to_many {
        let parent_key = parent.column_for(instruction.association.parent_key())?;
        let query = FanoutQuery::new(instruction, parent, buffers.values_of(parent_key))?;
        if let Some(fanout) = compiler.compile_fanout(&query)? {
            pending.push((query, fanout));
        }
    }

    let results = try_join_all(
        pending
            .iter()
            .map(|(_, fanout)| executor.select(&fanout.table, &fanout.statement)),
    )
    .await?;

    for ((query, fanout), children) in pending.iter().zip(results) {
        tracing::debug!(
            attribute = %query.attribute,
            parents = query.parent_ids.len(),
            children = children.len(),
            "attaching children"
        );
        buffers.attach(&query.attribute, &query.parent_key, fanout, children);
    }

    Ok(buffers.records)
}

/// Check every child criteria up front so a bad instruction fails before any
/// statement reaches the executor.
fn validate_instructions(
    compiler: &Compiler<'_>,
    parent: &Collection,
    instructions: &[Instruction],
) -> AssocResult<()> {
    for instruction in instructions {
        parent.column_for(instruction.association.parent_key())?;
        if instruction.strategy() == Strategy::OneToOne {
            continue;
        }
        let query = FanoutQuery::new(instruction, parent, Vec::new())?;
        compiler.compile_fanout(&query)?;
    }
    Ok(())
}

/// Make sure the parent projection carries the primary key and every
/// association's parent key.
fn include_keys(criteria: &mut Criteria, parent: &Collection) -> AssocResult<()> {
    let Some(select) = criteria.select.as_mut() else {
        return Ok(());
    };
    if select.is_empty() {
        return Ok(());
    }
    let mut keys = vec![parent.primary_key().column_name().to_string()];
    for instruction in &criteria.instructions {
        keys.push(parent.column_for(instruction.association.parent_key())?.to_string());
    }
    for key in keys {
        if !select.contains(&key) {
            select.push(key);
        }
    }
    Ok(())
}
