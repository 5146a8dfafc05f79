//! Per-identity connection state and the CRUD operations built on the compiler.

use std::sync::Arc;

use serde_json::Value;

use crate::ast::{Criteria, Predicate, Row};
use crate::config::ConnectionConfig;
use crate::dialect::{Dialect, HookContext, UpdateParams};
use crate::engine::{Executor, LoggingExecutor, SqlxExecutor};
use crate::error::{AssocError, AssocResult};
use crate::populate::{populate, JoinRequest};
use crate::schema::{Collection, CollectionDef, Registry, SchemaCache, TableSchema};
use crate::transpiler::Compiler;

/// Everything one registered data store owns: its config, collections,
/// dialect, executor and schema cache. Passed by reference into every
/// operation; nothing here is global.
pub struct Connection {
    config: ConnectionConfig,
    registry: Registry,
    dialect: Box<dyn Dialect>,
    executor: Arc<dyn Executor>,
    schemas: SchemaCache,
}

impl Connection {
    /// Wrap an existing executor. Session initialization is not run.
    pub fn new(config: ConnectionConfig, registry: Registry, executor: Arc<dyn Executor>) -> Self {
        Self {
            dialect: config.db_type.build(),
            config,
            registry,
            executor,
            schemas: SchemaCache::new(),
        }
    }

    /// Connect through sqlx and run the dialect's session statements.
    pub async fn connect(config: ConnectionConfig, registry: Registry) -> AssocResult<Self> {
        if config.url.is_empty() {
            return Err(AssocError::Config(format!(
                "connection `{}` has no url",
                config.identity
            )));
        }
        let executor = SqlxExecutor::connect(&config.url, config.max_connections).await?;
        let connection = Self::new(config, registry, Arc::new(executor));
        connection.init_session().await?;
        tracing::info!(
            identity = %connection.config.identity,
            dialect = connection.dialect.kind().name(),
            collections = connection.registry.len(),
            "connection ready"
        );
        Ok(connection)
    }

    /// Run the dialect's session statements, one after another.
    pub async fn init_session(&self) -> AssocResult<()> {
        let executor = self.executor();
        for statement in self.dialect.session_init() {
            executor.raw_query(statement).await?;
        }
        Ok(())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(self.dialect.as_ref(), &self.registry)
    }

    fn executor(&self) -> LoggingExecutor<'_> {
        LoggingExecutor::new(self.executor.as_ref(), self.config.log_queries)
    }

    fn context<'a>(&'a self, collection: &'a Collection, table: &'a str) -> HookContext<'a> {
        HookContext { collection, table }
    }

    /// Find records matching `criteria`. Population instructions are honored.
    pub async fn find(&self, collection: &str, criteria: Criteria) -> AssocResult<Vec<Row>> {
        let target = self.registry.collection(collection)?;
        let compiler = self.compiler();
        let table = compiler.table_name(target);
        let ctx = self.context(target, &table);

        let criteria = self.dialect.before_find(&ctx, criteria)?;
        let rows = if criteria.instructions.is_empty() {
            let statement = compiler.compile_select(collection, &criteria, false)?;
            self.executor().select(&table, &statement).await?
        } else {
            let request = JoinRequest::new(collection, criteria);
            populate(&compiler, &self.executor(), &request).await?
        };
        self.dialect.after_find(&ctx, rows)
    }

    /// Run a join request through the population protocol.
    pub async fn join(&self, request: JoinRequest) -> AssocResult<Vec<Row>> {
        self.find(&request.collection, request.criteria).await
    }

    /// Insert one record and return it with its generated key.
    pub async fn create(&self, collection: &str, values: Row) -> AssocResult<Row> {
        let target = self.registry.collection(collection)?;
        let compiler = self.compiler();
        let table = compiler.table_name(target);
        let ctx = self.context(target, &table);

        let prepared = self.dialect.before_create(&ctx, values.clone())?;
        let statement = compiler.compile_insert(collection, &prepared)?;
        let outcome = self.executor().mutate(&table, &statement).await?;

        let mut record = values;
        if let (Some(attr), Some(id)) = (target.auto_increment(), outcome.last_insert_id) {
            let present = record.get(&attr.name).is_some_and(|v| !v.is_null());
            if !present {
                record.insert(attr.name.clone(), Value::from(id));
            }
        }
        self.dialect.after_create(&ctx, record)
    }

    /// Insert several records, in order. Stops at the first failure.
    pub async fn create_each(&self, collection: &str, records: Vec<Row>) -> AssocResult<Vec<Row>> {
        let mut created = Vec::with_capacity(records.len());
        for values in records {
            created.push(self.create(collection, values).await?);
        }
        Ok(created)
    }

    /// Update the records matching `criteria` and return them as updated.
    ///
    /// Matching primary keys are selected first; when nothing matches no
    /// UPDATE is issued.
    pub async fn update(&self, collection: &str, criteria: Criteria, values: Row) -> AssocResult<Vec<Row>> {
        let target = self.registry.collection(collection)?;
        let compiler = self.compiler();
        let table = compiler.table_name(target);
        let ctx = self.context(target, &table);
        let executor = self.executor();

        let params = self.dialect.before_update(&ctx, UpdateParams { criteria, values })?;
        let primary_key = target.primary_key();

        let mut lookup = params.criteria.clone().select([primary_key.name.clone()]);
        lookup.instructions.clear();
        let statement = compiler.compile_select(collection, &lookup, false)?;
        let ids: Vec<Value> = executor
            .select(&table, &statement)
            .await?
            .into_iter()
            .filter_map(|mut row| row.remove(primary_key.column_name()))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let by_id = Criteria::new().filter(Predicate::is_in(primary_key.name.clone(), ids));
        let statement = compiler.compile_update(collection, &by_id, &params.values)?;
        executor.mutate(&table, &statement).await?;

        let mut reselect = by_id;
        reselect.select = params.criteria.select.clone();
        let statement = compiler.compile_select(collection, &reselect, false)?;
        let rows = executor.select(&table, &statement).await?;
        self.dialect.after_update(&ctx, rows)
    }

    /// Delete the records matching `criteria` and return them.
    pub async fn destroy(&self, collection: &str, criteria: Criteria) -> AssocResult<Vec<Row>> {
        let target = self.registry.collection(collection)?;
        let compiler = self.compiler();
        let table = compiler.table_name(target);
        let ctx = self.context(target, &table);
        let executor = self.executor();

        let mut criteria = self.dialect.before_destroy(&ctx, criteria)?;
        criteria.instructions.clear();
        let statement = compiler.compile_select(collection, &criteria, false)?;
        let rows = executor.select(&table, &statement).await?;
        if rows.is_empty() {
            return self.dialect.after_destroy(&ctx, rows);
        }

        let statement = compiler.compile_delete(collection, &criteria)?;
        executor.mutate(&table, &statement).await?;
        self.dialect.after_destroy(&ctx, rows)
    }

    /// Introspect the collection's table. `None` when the table does not exist.
    pub async fn describe(&self, collection: &str) -> AssocResult<Option<TableSchema>> {
        let target = self.registry.collection(collection)?;
        if let Some(schema) = self.schemas.get(target.identity()) {
            return Ok(Some(schema));
        }

        let table = self.compiler().table_name(target);
        let results = self.dialect.describe_table(&self.executor(), &table).await?;
        let schema = self.dialect.normalize_schema(&table, results, target)?;
        if let Some(schema) = &schema {
            self.schemas.insert(target.identity(), schema.clone());
        }
        Ok(schema)
    }

    /// Forget a cached schema after the collection was redefined.
    pub fn invalidate_schema(&self, collection: &str) -> bool {
        self.schemas.invalidate(collection)
    }

    /// Register or redefine a collection. Its cached schema is dropped.
    pub fn define(&mut self, def: CollectionDef) -> AssocResult<()> {
        let identity = self.registry.register(def)?.identity().to_string();
        self.schemas.invalidate(&identity);
        Ok(())
    }

    /// Run raw SQL, substituting `$1`, `$2`, ... with escaped literals.
    pub async fn query(&self, sql: &str, params: &[Value]) -> AssocResult<Vec<Row>> {
        let sql = substitute_params(self.dialect.as_ref(), sql, params)?;
        self.executor().raw_query(&sql).await
    }
}

/// Render a value as an inline SQL literal.
fn literal(dialect: &dyn Dialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => dialect.escape_string(s),
        structured => dialect.escape_string(&structured.to_string()),
    }
}

fn substitute_params(dialect: &dyn Dialect, sql: &str, params: &[Value]) -> AssocResult<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some((_, d)) = chars.peek().copied().filter(|(_, d)| d.is_ascii_digit()) {
            digits.push(d);
            chars.next();
        }
        if digits.is_empty() {
            out.push('$');
            continue;
        }
        let index: usize = digits
            .parse()
            .map_err(|_| AssocError::InvalidCriteria(format!("bad placeholder ${digits}")))?;
        let value = index
            .checked_sub(1)
            .and_then(|i| params.get(i))
            .ok_or_else(|| {
                AssocError::InvalidCriteria(format!(
                    "placeholder ${index} has no value ({} given)",
                    params.len()
                ))
            })?;
        out.push_str(&literal(dialect, value));
    }
    Ok(out)
}
