//! Predicate compilation.

use serde_json::Value;

use crate::ast::{Operator, Predicate};
use crate::dialect::Dialect;

use super::values::prepare_value;
use super::Compiler;

/// Context for parameterized statement building.
#[derive(Debug, Default)]
pub struct ParamContext {
    /// Current parameter index (1-based)
    pub index: usize,
    /// Collected parameter values in order
    pub params: Vec<Value>,
}

impl ParamContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value and return the placeholder for it.
    pub fn add_param(&mut self, value: &Value, dialect: &dyn Dialect) -> String {
        self.index += 1;
        self.params.push(prepare_value(value));
        dialect.placeholder(self.index)
    }
}

impl<'a> Compiler<'a> {
    /// Compile a normalized predicate tree to a boolean SQL expression.
    ///
    /// Leaves reference physical columns, qualified with `table` when given.
    /// Composite children of AND/OR are parenthesized so nesting survives
    /// rendering: `a AND (b OR c)` never becomes `(a AND b) OR c`.
    pub fn compile_predicate(
        &self,
        predicate: &Predicate,
        table: Option<&str>,
        params: &mut ParamContext,
    ) -> String {
        match predicate {
            Predicate::Compare { attribute, op, value } => {
                self.compile_leaf(&self.column_ref(table, attribute), *op, value, params)
            }
            Predicate::And(children) => self.compile_group(children, " AND ", "1 = 1", table, params),
            Predicate::Or(children) => self.compile_group(children, " OR ", "1 = 0", table, params),
            Predicate::Not(child) => {
                format!("NOT ({})", self.compile_predicate(child, table, params))
            }
        }
    }

    fn compile_group(
        &self,
        children: &[Predicate],
        joiner: &str,
        empty: &str,
        table: Option<&str>,
        params: &mut ParamContext,
    ) -> String {
        match children {
            [] => empty.to_string(),
            [only] => self.compile_predicate(only, table, params),
            _ => children
                .iter()
                .map(|child| {
                    let sql = self.compile_predicate(child, table, params);
                    if is_compound(child) {
                        format!("({})", sql)
                    } else {
                        sql
                    }
                })
                .collect::<Vec<_>>()
                .join(joiner),
        }
    }

    fn compile_leaf(&self, column: &str, op: Operator, value: &Value, params: &mut ParamContext) -> String {
        match (op, value) {
            (Operator::Eq, Value::Null) => format!("{} IS NULL", column),
            (Operator::Ne, Value::Null) => format!("{} IS NOT NULL", column),
            (Operator::In | Operator::NotIn, Value::Array(items)) => {
                if items.is_empty() {
                    // Nothing is in the empty set.
                    let always = if op == Operator::In { "1 = 0" } else { "1 = 1" };
                    return always.to_string();
                }
                let placeholders: Vec<String> = items
                    .iter()
                    .map(|item| params.add_param(item, self.dialect))
                    .collect();
                format!("{} {} ({})", column, op.as_sql(), placeholders.join(", "))
            }
            (Operator::In | Operator::NotIn, scalar) => {
                format!("{} {} ({})", column, op.as_sql(), params.add_param(scalar, self.dialect))
            }
            (op, value) => format!("{} {} {}", column, op.as_sql(), params.add_param(value, self.dialect)),
        }
    }
}

/// Whether `predicate` renders as a bare AND/OR chain. Single-child groups
/// render as their child, so look through them.
fn is_compound(predicate: &Predicate) -> bool {
    match predicate {
        Predicate::And(children) | Predicate::Or(children) => match children.as_slice() {
            [only] => is_compound(only),
            [] => false,
            _ => true,
        },
        _ => false,
    }
}
