//! DELETE SQL generation.

use crate::ast::Criteria;
use crate::error::AssocResult;
use crate::transpiler::conditions::ParamContext;
use crate::transpiler::normalize::normalize_criteria;
use crate::transpiler::{Compiler, Statement, StatementKind};

impl<'a> Compiler<'a> {
    /// Generate a DELETE of the rows matching `criteria`.
    pub fn compile_delete(&self, collection: &str, criteria: &Criteria) -> AssocResult<Statement> {
        let collection = self.collection(collection)?;
        let normalized = normalize_criteria(criteria, collection)?;
        let mut params = ParamContext::new();

        let mut sql = format!("DELETE FROM {}", self.quote(&self.table_name(collection)));
        if let Some(filter) = &normalized.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.compile_predicate(filter, None, &mut params));
        }

        Ok(Statement::new(StatementKind::Delete, sql, params.params))
    }
}
