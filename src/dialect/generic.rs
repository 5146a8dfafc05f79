//! Pass-through dialect used when no vendor tag is configured.

use super::{Dialect, DialectKind};

/// ANSI quoting, `?` placeholders, LIMIT/OFFSET, no introspection, no-op hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let d = GenericDialect;
        assert_eq!(d.quote_identifier("order"), "\"order\"");
        assert_eq!(d.escape_string("O'Brien"), "'O''Brien'");
        assert_eq!(d.limit_offset(Some(10), Some(5)), " LIMIT 10 OFFSET 5");
        assert_eq!(d.table_alias("pets", "_pet"), "\"pets\" AS \"_pet\"");
        assert_eq!(d.wrap_union_branch("SELECT 1"), "(SELECT 1)");
    }
}
