//! Collection definitions, the per-connection registry and the introspected schema cache.
//!
//! Registries load from TOML (or JSON):
//!
//! ```
//! use sqlassoc::schema::Registry;
//!
//! let registry = Registry::from_toml_str(r#"
//!     [[collections]]
//!     identity = "users"
//!     attributes = [
//!         { name = "id", type = "integer", primary_key = true, auto_increment = true },
//!         { name = "email", type = "string", column_name = "email_address" },
//!     ]
//! "#).unwrap();
//!
//! let users = registry.collection("users").unwrap();
//! assert_eq!(users.column_for("email").unwrap(), "email_address");
//! ```

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{AssocError, AssocResult};

/// Logical attribute type as declared by the ODM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    #[default]
    String,
    Text,
    MediumText,
    LongText,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "double")]
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
    Binary,
    Array,
    Json,
}

impl AttributeType {
    /// Types stored as serialized text rather than a native column type.
    pub fn is_structured(&self) -> bool {
        matches!(self, AttributeType::Array | AttributeType::Json)
    }
}

/// One attribute of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(default)]
    pub column_name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: AttributeType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub index: bool,
    /// Set on virtual to-many attributes; these have no column.
    #[serde(default)]
    pub collection: Option<String>,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            column_name: None,
            kind,
            primary_key: false,
            auto_increment: false,
            unique: false,
            required: false,
            index: false,
            collection: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column_name = Some(column.into());
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Mark as a virtual to-many attribute pointing at `collection`.
    pub fn via(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Physical column name.
    pub fn column_name(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_virtual(&self) -> bool {
        self.collection.is_some()
    }
}

/// Collection definition as declared by the ODM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDef {
    pub identity: String,
    #[serde(default)]
    pub table_name: Option<String>,
    pub attributes: Vec<AttributeDef>,
}

impl CollectionDef {
    pub fn new(identity: impl Into<String>, attributes: Vec<AttributeDef>) -> Self {
        Self {
            identity: identity.into(),
            table_name: None,
            attributes,
        }
    }
}

/// A registered collection with its primary key resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    def: CollectionDef,
    primary_key: usize,
}

impl Collection {
    /// Resolve the primary key: the flagged attribute, else one named `id`.
    pub fn resolve(def: CollectionDef) -> AssocResult<Self> {
        let flagged: Vec<usize> = def
            .attributes
            .iter()
            .enumerate()
            .filter(|(_, a)| a.primary_key)
            .map(|(i, _)| i)
            .collect();

        let primary_key = match flagged.as_slice() {
            [index] => *index,
            [] => def
                .attributes
                .iter()
                .position(|a| a.name == "id" && !a.is_virtual())
                .ok_or_else(|| AssocError::PrimaryKeyResolution {
                    collection: def.identity.clone(),
                    reason: "no attribute is flagged primary_key and there is no `id` attribute"
                        .into(),
                })?,
            _ => {
                return Err(AssocError::PrimaryKeyResolution {
                    collection: def.identity.clone(),
                    reason: "more than one attribute is flagged primary_key".into(),
                });
            }
        };

        Ok(Self { def, primary_key })
    }

    pub fn identity(&self) -> &str {
        &self.def.identity
    }

    /// Physical table name, before dialect identifier formatting.
    pub fn table_name(&self) -> &str {
        self.def.table_name.as_deref().unwrap_or(&self.def.identity)
    }

    pub fn attributes(&self) -> &[AttributeDef] {
        &self.def.attributes
    }

    pub fn primary_key(&self) -> &AttributeDef {
        &self.def.attributes[self.primary_key]
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.def.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_by_column(&self, column: &str) -> Option<&AttributeDef> {
        self.def
            .attributes
            .iter()
            .find(|a| !a.is_virtual() && a.column_name() == column)
    }

    /// Map an attribute name (or an already physical column name) to its column.
    pub fn column_for(&self, name: &str) -> AssocResult<&str> {
        match self.attribute(name) {
            Some(attr) if !attr.is_virtual() => Ok(attr.column_name()),
            _ => self
                .attribute_by_column(name)
                .map(AttributeDef::column_name)
                .ok_or_else(|| AssocError::unknown_attribute(self.identity(), name)),
        }
    }

    /// Attributes backed by a column, in declaration order.
    pub fn stored_attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.def.attributes.iter().filter(|a| !a.is_virtual())
    }

    pub fn auto_increment(&self) -> Option<&AttributeDef> {
        self.stored_attributes().find(|a| a.auto_increment)
    }
}

/// The collections known to one connection.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    collections: HashMap<String, Collection>,
}

#[derive(Deserialize)]
struct RegistryFile {
    collections: Vec<CollectionDef>,
}

impl Registry {
    pub fn new(defs: impl IntoIterator<Item = CollectionDef>) -> AssocResult<Self> {
        let mut registry = Self::default();
        for def in defs {
            registry.register(def)?;
        }
        Ok(registry)
    }

    /// Register (or redefine) a collection.
    pub fn register(&mut self, def: CollectionDef) -> AssocResult<&Collection> {
        let collection = Collection::resolve(def)?;
        let identity = collection.identity().to_string();
        self.collections.insert(identity.clone(), collection);
        self.collection(&identity)
    }

    pub fn from_toml_str(input: &str) -> AssocResult<Self> {
        let file: RegistryFile =
            toml::from_str(input).map_err(|e| AssocError::Config(e.to_string()))?;
        Self::new(file.collections)
    }

    pub fn from_json_str(input: &str) -> AssocResult<Self> {
        let file: RegistryFile =
            serde_json::from_str(input).map_err(|e| AssocError::Config(e.to_string()))?;
        Self::new(file.collections)
    }

    /// Look up by identity, falling back to the physical table name.
    pub fn collection(&self, name: &str) -> AssocResult<&Collection> {
        self.collections
            .get(name)
            .or_else(|| self.collections.values().find(|c| c.table_name() == name))
            .ok_or_else(|| AssocError::UnknownCollection(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// One introspected column, normalized across vendors.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub size: Option<u32>,
    pub scale: Option<u32>,
    pub unsigned: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub required: bool,
    pub indexed: bool,
    pub default: Option<serde_json::Value>,
}

/// Introspected table layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.primary_key)
    }
}

/// Describe results, cached for the lifetime of a connection.
#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: DashMap<String, TableSchema>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identity: &str) -> Option<TableSchema> {
        self.tables.get(identity).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, identity: &str, schema: TableSchema) {
        self.tables.insert(identity.to_string(), schema);
    }

    /// Drop a cached entry; the next describe hits the database again.
    pub fn invalidate(&self, identity: &str) -> bool {
        self.tables.remove(identity).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> CollectionDef {
        CollectionDef::new(
            "users",
            vec![
                AttributeDef::new("id", AttributeType::Integer),
                AttributeDef::new("name", AttributeType::String).column("full_name"),
                AttributeDef::new("pets", AttributeType::String).via("pets"),
            ],
        )
    }

    #[test]
    fn test_id_is_default_primary_key() {
        let users = Collection::resolve(users()).unwrap();
        assert_eq!(users.primary_key().name, "id");
    }

    #[test]
    fn test_missing_primary_key_is_fatal() {
        let def = CollectionDef::new("logs", vec![AttributeDef::new("line", AttributeType::Text)]);
        let err = Collection::resolve(def).unwrap_err();
        assert!(matches!(err, AssocError::PrimaryKeyResolution { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_two_flagged_keys_are_rejected() {
        let def = CollectionDef::new(
            "pairs",
            vec![
                AttributeDef::new("a", AttributeType::Integer).primary(),
                AttributeDef::new("b", AttributeType::Integer).primary(),
            ],
        );
        assert!(Collection::resolve(def).is_err());
    }

    #[test]
    fn test_column_resolution() {
        let users = Collection::resolve(users()).unwrap();
        assert_eq!(users.column_for("name").unwrap(), "full_name");
        assert_eq!(users.column_for("full_name").unwrap(), "full_name");
        assert!(users.column_for("pets").is_err());
        assert!(users.column_for("nickname").is_err());
    }

    #[test]
    fn test_lookup_by_table_name() {
        let mut def = users();
        def.table_name = Some("app_users".into());
        let registry = Registry::new([def]).unwrap();
        assert_eq!(registry.collection("app_users").unwrap().identity(), "users");
        assert!(matches!(
            registry.collection("ghosts"),
            Err(AssocError::UnknownCollection(_))
        ));
    }

    #[test]
    fn test_schema_cache_invalidation() {
        let cache = SchemaCache::new();
        cache.insert("users", TableSchema { table: "users".into(), columns: vec![] });
        assert!(cache.get("users").is_some());
        assert!(cache.invalidate("users"));
        assert!(cache.get("users").is_none());
    }
}
