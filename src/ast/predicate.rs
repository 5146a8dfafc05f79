//! Filter expression trees.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{AssocError, AssocResult};

/// Comparison operator of a predicate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
    In,
    NotIn,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }
}

/// A node of the filter tree: a comparison leaf or a logical combinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        attribute: String,
        op: Operator,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// `attribute = value`
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Operator::Eq, value)
    }

    /// `attribute IN (values)`
    pub fn is_in(attribute: impl Into<String>, values: Vec<Value>) -> Self {
        Self::compare(attribute, Operator::In, Value::Array(values))
    }

    pub fn compare(attribute: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::And(children)
    }

    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Predicate) -> Self {
        Predicate::Not(Box::new(child))
    }

    /// Conjoin another predicate, flattening when `self` is already a conjunction.
    pub fn and_also(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut children) => {
                children.push(other);
                Predicate::And(children)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Every attribute referenced by a leaf, in tree order.
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { attribute, .. } => out.push(attribute),
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_attributes(out);
                }
            }
            Predicate::Not(child) => child.collect_attributes(out),
        }
    }

    /// Decode the ODM where-syntax.
    ///
    /// ```
    /// use sqlassoc::ast::Predicate;
    /// use serde_json::json;
    ///
    /// let pred = Predicate::from_json(&json!({"age": {">": 18}, "or": [{"name": "a"}, {"name": "b"}]})).unwrap();
    /// assert_eq!(pred.attributes(), vec!["age", "name", "name"]);
    /// ```
    pub fn from_json(value: &Value) -> AssocResult<Predicate> {
        let Value::Object(map) = value else {
            return Err(AssocError::InvalidCriteria(format!(
                "where clause must be an object, got {value}"
            )));
        };

        let mut parts = Vec::with_capacity(map.len());
        for (key, operand) in map {
            let part = match key.as_str() {
                "or" => Predicate::Or(Self::from_json_list(key, operand)?),
                "and" => Predicate::And(Self::from_json_list(key, operand)?),
                "not" => Predicate::not(Self::from_json(operand)?),
                attribute => Self::leaf_from_json(attribute, operand)?,
            };
            parts.push(part);
        }

        Ok(collapse(parts))
    }

    fn from_json_list(key: &str, value: &Value) -> AssocResult<Vec<Predicate>> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_json).collect(),
            other => Err(AssocError::InvalidCriteria(format!(
                "`{key}` expects a list of conditions, got {other}"
            ))),
        }
    }

    fn leaf_from_json(attribute: &str, value: &Value) -> AssocResult<Predicate> {
        match value {
            Value::Array(items) => Ok(Predicate::is_in(attribute, items.clone())),
            Value::Object(ops) => {
                let mut parts = Vec::with_capacity(ops.len());
                for (op, operand) in ops {
                    parts.push(modifier(attribute, op, operand)?);
                }
                Ok(collapse(parts))
            }
            scalar => Ok(Predicate::eq(attribute, scalar.clone())),
        }
    }
}

fn collapse(mut parts: Vec<Predicate>) -> Predicate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Predicate::And(parts)
    }
}

fn modifier(attribute: &str, op: &str, operand: &Value) -> AssocResult<Predicate> {
    let pattern = |wrap: fn(&str) -> String| -> AssocResult<Predicate> {
        match operand {
            Value::String(s) => Ok(Predicate::compare(attribute, Operator::Like, wrap(s))),
            other => Err(AssocError::InvalidCriteria(format!(
                "`{op}` on `{attribute}` expects a string, got {other}"
            ))),
        }
    };

    let pred = match op {
        "<" | "lessThan" => Predicate::compare(attribute, Operator::Lt, operand.clone()),
        "<=" | "lessThanOrEqual" => Predicate::compare(attribute, Operator::Lte, operand.clone()),
        ">" | "greaterThan" => Predicate::compare(attribute, Operator::Gt, operand.clone()),
        ">=" | "greaterThanOrEqual" => {
            Predicate::compare(attribute, Operator::Gte, operand.clone())
        }
        "!" | "not" | "!=" => match operand {
            Value::Array(_) => Predicate::compare(attribute, Operator::NotIn, operand.clone()),
            _ => Predicate::compare(attribute, Operator::Ne, operand.clone()),
        },
        "in" => match operand {
            Value::Array(_) => Predicate::compare(attribute, Operator::In, operand.clone()),
            other => Predicate::is_in(attribute, vec![other.clone()]),
        },
        "nin" => match operand {
            Value::Array(_) => Predicate::compare(attribute, Operator::NotIn, operand.clone()),
            other => Predicate::compare(attribute, Operator::NotIn, vec![other.clone()]),
        },
        "like" => pattern(|s| s.to_string())?,
        "contains" => pattern(|s| format!("%{s}%"))?,
        "startsWith" => pattern(|s| format!("{s}%"))?,
        "endsWith" => pattern(|s| format!("%{s}"))?,
        unknown => {
            return Err(AssocError::InvalidCriteria(format!(
                "unsupported operator `{unknown}` on `{attribute}`"
            )));
        }
    };
    Ok(pred)
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Predicate::from_json(&value).map_err(serde::de::Error::custom)
    }
}
