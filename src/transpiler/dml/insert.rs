//! INSERT SQL generation.

use crate::ast::Row;
use crate::error::AssocResult;
use crate::transpiler::conditions::ParamContext;
use crate::transpiler::{Compiler, Statement, StatementKind};

impl<'a> Compiler<'a> {
    /// Generate an INSERT of one record. Keys may be attribute or column names.
    pub fn compile_insert(&self, collection: &str, values: &Row) -> AssocResult<Statement> {
        let collection = self.collection(collection)?;
        let mut sql = String::from("INSERT INTO ");
        sql.push_str(&self.quote(&self.table_name(collection)));

        if values.is_empty() {
            sql.push_str(" DEFAULT VALUES");
            return Ok(Statement::new(StatementKind::Insert, sql, Vec::new()));
        }

        let mut params = ParamContext::new();
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        for (name, value) in values {
            columns.push(self.quote(collection.column_for(name)?));
            placeholders.push(params.add_param(value, self.dialect));
        }

        sql.push_str(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ));
        Ok(Statement::new(StatementKind::Insert, sql, params.params))
    }
}
