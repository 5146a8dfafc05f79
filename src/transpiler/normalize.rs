//! Criteria normalization: attribute names to physical columns.

use crate::ast::{Criteria, Predicate};
use crate::dialect::Dialect;
use crate::error::AssocResult;
use crate::schema::{AttributeDef, Collection};

use super::Compiler;

impl<'a> Compiler<'a> {
    /// Normalize `criteria` against a registered collection.
    pub fn normalize_criteria(&self, collection: &str, criteria: &Criteria) -> AssocResult<Criteria> {
        normalize_criteria(criteria, self.collection(collection)?)
    }
}

/// Map every attribute reference in `criteria` to its physical column.
///
/// Fails with `InvalidAggregateRequest` for a groupBy without aggregates and
/// with `UnknownAttribute` for references the collection does not define.
/// Virtual to-many attributes are dropped from the select list. When
/// aggregates are requested the projection becomes the groupBy columns.
/// Normalizing already normalized criteria is a no-op.
pub fn normalize_criteria(criteria: &Criteria, collection: &Collection) -> AssocResult<Criteria> {
    criteria.validate_aggregates()?;

    let columns = |names: &[String]| -> AssocResult<Vec<String>> {
        names
            .iter()
            .map(|name| collection.column_for(name).map(str::to_string))
            .collect()
    };

    let group_by = columns(&criteria.group_by)?;
    let select = if criteria.has_aggregates() {
        Some(group_by.clone())
    } else {
        match &criteria.select {
            Some(list) => {
                let stored: Vec<String> = list
                    .iter()
                    .filter(|name| !collection.attribute(name).is_some_and(AttributeDef::is_virtual))
                    .cloned()
                    .collect();
                Some(columns(&stored)?)
            }
            None => None,
        }
    };

    let filter = criteria
        .filter
        .as_ref()
        .map(|predicate| rename_predicate(predicate, collection))
        .transpose()?;

    let sort = criteria
        .sort
        .iter()
        .map(|(name, dir)| Ok((collection.column_for(name)?.to_string(), *dir)))
        .collect::<AssocResult<Vec<_>>>()?;

    Ok(Criteria {
        select,
        filter,
        sort,
        limit: criteria.limit,
        skip: criteria.skip,
        group_by,
        sum: columns(&criteria.sum)?,
        average: columns(&criteria.average)?,
        min: columns(&criteria.min)?,
        max: columns(&criteria.max)?,
        instructions: criteria.instructions.clone(),
    })
}

fn rename_predicate(predicate: &Predicate, collection: &Collection) -> AssocResult<Predicate> {
    Ok(match predicate {
        Predicate::Compare { attribute, op, value } => Predicate::Compare {
            attribute: collection.column_for(attribute)?.to_string(),
            op: *op,
            value: value.clone(),
        },
        Predicate::And(children) => Predicate::And(
            children
                .iter()
                .map(|child| rename_predicate(child, collection))
                .collect::<AssocResult<_>>()?,
        ),
        Predicate::Or(children) => Predicate::Or(
            children
                .iter()
                .map(|child| rename_predicate(child, collection))
                .collect::<AssocResult<_>>()?,
        ),
        Predicate::Not(child) => Predicate::not(rename_predicate(child, collection)?),
    })
}

/// Restrict the projection to attributes the dialect can select.
///
/// An absent select list is expanded to every stored attribute first, so the
/// result always names its columns explicitly.
pub fn restrict_projection(mut criteria: Criteria, collection: &Collection, dialect: &dyn Dialect) -> Criteria {
    let requested = criteria.select.take().unwrap_or_else(|| {
        collection
            .stored_attributes()
            .map(|a| a.name.clone())
            .collect()
    });

    let kept = requested
        .into_iter()
        .filter(|name| {
            match collection
                .attribute(name)
                .or_else(|| collection.attribute_by_column(name))
            {
                Some(attr) => !attr.is_virtual() && dialect.is_projectable(attr.kind),
                // Unknown names are reported by normalization.
                None => true,
            }
        })
        .collect();

    criteria.select = Some(kept);
    criteria
}
