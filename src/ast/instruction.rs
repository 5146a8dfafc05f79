//! Association population directives.

use serde::Deserialize;

use super::criteria::Criteria;
use crate::error::AssocError;

/// How an association is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Single-valued, resolved with a LEFT OUTER JOIN in the parent query.
    OneToOne = 1,
    /// Child rows carry a foreign key to the parent.
    OneToMany = 2,
    /// Children reached through a junction table.
    ManyToMany = 3,
}

impl TryFrom<u8> for Strategy {
    type Error = AssocError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Strategy::OneToOne),
            2 => Ok(Strategy::OneToMany),
            3 => Ok(Strategy::ManyToMany),
            other => Err(AssocError::InvalidCriteria(format!(
                "unknown population strategy {other}"
            ))),
        }
    }
}

/// One hop of an association: `parent.parent_key = child.child_key`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    pub parent: String,
    pub parent_key: String,
    pub child: String,
    pub child_key: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub criteria: Option<Criteria>,
    #[serde(default)]
    pub select: Option<Vec<String>>,
}

/// Association shape, one variant per strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Association {
    OneToOne(JoinSpec),
    OneToMany(JoinSpec),
    /// `owner` links parent to junction, `target` links junction to child.
    ManyToMany { owner: JoinSpec, target: JoinSpec },
}

impl Association {
    pub fn strategy(&self) -> Strategy {
        match self {
            Association::OneToOne(_) => Strategy::OneToOne,
            Association::OneToMany(_) => Strategy::OneToMany,
            Association::ManyToMany { .. } => Strategy::ManyToMany,
        }
    }

    /// Parent-side column whose value identifies the owning parent row.
    pub fn parent_key(&self) -> &str {
        match self {
            Association::OneToOne(spec) | Association::OneToMany(spec) => &spec.parent_key,
            Association::ManyToMany { owner, .. } => &owner.parent_key,
        }
    }
}

/// A population request for one attribute of the parent collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub attribute: String,
    pub association: Association,
}

impl Instruction {
    pub fn new(attribute: impl Into<String>, association: Association) -> Self {
        Self {
            attribute: attribute.into(),
            association,
        }
    }

    pub fn one_to_one(attribute: impl Into<String>, spec: JoinSpec) -> Self {
        Self::new(attribute, Association::OneToOne(spec))
    }

    pub fn one_to_many(attribute: impl Into<String>, spec: JoinSpec) -> Self {
        Self::new(attribute, Association::OneToMany(spec))
    }

    pub fn many_to_many(attribute: impl Into<String>, owner: JoinSpec, target: JoinSpec) -> Self {
        Self::new(attribute, Association::ManyToMany { owner, target })
    }

    pub fn strategy(&self) -> Strategy {
        self.association.strategy()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawStrategy {
    Tag(u8),
    Nested { strategy: u8 },
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawInstruction {
    pub strategy: RawStrategy,
    pub instructions: Vec<JoinSpec>,
}

impl RawInstruction {
    pub(crate) fn into_instruction(self, attribute: String) -> Result<Instruction, AssocError> {
        let tag = match self.strategy {
            RawStrategy::Tag(tag) | RawStrategy::Nested { strategy: tag } => tag,
        };
        let strategy = Strategy::try_from(tag)?;
        let mut specs = self.instructions.into_iter();
        let missing = |attribute: &str| {
            AssocError::InvalidCriteria(format!("population of `{attribute}` has no join spec"))
        };

        let association = match strategy {
            Strategy::OneToOne => {
                Association::OneToOne(specs.next().ok_or_else(|| missing(&attribute))?)
            }
            Strategy::OneToMany => {
                Association::OneToMany(specs.next().ok_or_else(|| missing(&attribute))?)
            }
            Strategy::ManyToMany => {
                let owner = specs.next().ok_or_else(|| missing(&attribute))?;
                let target = specs.next().ok_or_else(|| {
                    AssocError::InvalidCriteria(format!(
                        "many-to-many population of `{attribute}` needs a junction and a child spec"
                    ))
                })?;
                Association::ManyToMany { owner, target }
            }
        };

        Ok(Instruction {
            attribute,
            association,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_strategy_tag() {
        let raw: RawInstruction = serde_json::from_value(json!({
            "strategy": {"strategy": 2},
            "instructions": [{"parent": "users", "parentKey": "id", "child": "pets", "childKey": "owner"}]
        }))
        .unwrap();
        let instruction = raw.into_instruction("pets".into()).unwrap();
        assert_eq!(instruction.strategy(), Strategy::OneToMany);
        assert_eq!(instruction.association.parent_key(), "id");
    }

    #[test]
    fn test_many_to_many_requires_two_specs() {
        let raw: RawInstruction = serde_json::from_value(json!({
            "strategy": 3,
            "instructions": [{"parent": "users", "parentKey": "id", "child": "users_groups", "childKey": "user_id"}]
        }))
        .unwrap();
        assert!(raw.into_instruction("groups".into()).is_err());
    }

    #[test]
    fn test_unknown_strategy() {
        assert!(Strategy::try_from(7).is_err());
    }
}
