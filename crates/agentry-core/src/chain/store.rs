//! Run persistence
//!
//! [`RunStore`] is the durability collaborator behind chain state. Two
//! implementations ship with the crate: [`InMemoryRunStore`] for tests and
//! embedding, and [`SqliteRunStore`] which keeps the step, tool and error
//! lists as JSON text columns.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use crate::chain::{ChainError, ChainState, ChainStatus, ChainStep, ToolExecutionRecord};
use crate::config::ChainConfig;
use crate::{Error, Result};

/// Persisted form of a chain's run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub chain_id: String,
    pub agent_definition_id: String,
    pub status: ChainStatus,
    pub inputs: JsonValue,
    pub outputs: Option<JsonValue>,
    pub steps: Vec<ChainStep>,
    pub tools_used: Vec<ToolExecutionRecord>,
    pub errors: Vec<ChainError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to open a run
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub chain_id: String,
    pub agent_definition_id: String,
    pub status: ChainStatus,
    pub inputs: JsonValue,
}

impl NewRun {
    pub fn from_state(state: &ChainState) -> Self {
        Self {
            chain_id: state.chain_id.clone(),
            agent_definition_id: state.agent_definition_id.clone(),
            status: state.status(),
            inputs: state.inputs.clone(),
        }
    }

    fn into_record(self, run_id: String) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            run_id,
            chain_id: self.chain_id,
            agent_definition_id: self.agent_definition_id,
            status: self.status,
            inputs: self.inputs,
            outputs: None,
            steps: Vec::new(),
            tools_used: Vec::new(),
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a run; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub status: Option<ChainStatus>,
    pub outputs: Option<JsonValue>,
    pub steps: Option<Vec<ChainStep>>,
    pub tools_used: Option<Vec<ToolExecutionRecord>>,
    pub errors: Option<Vec<ChainError>>,
}

impl RunUpdate {
    pub fn status(mut self, status: ChainStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn outputs(mut self, outputs: JsonValue) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn steps(mut self, steps: Vec<ChainStep>) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn tools_used(mut self, tools_used: Vec<ToolExecutionRecord>) -> Self {
        self.tools_used = Some(tools_used);
        self
    }

    pub fn errors(mut self, errors: Vec<ChainError>) -> Self {
        self.errors = Some(errors);
        self
    }

    fn apply(self, record: &mut RunRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(outputs) = self.outputs {
            record.outputs = Some(outputs);
        }
        if let Some(steps) = self.steps {
            record.steps = steps;
        }
        if let Some(tools_used) = self.tools_used {
            record.tools_used = tools_used;
        }
        if let Some(errors) = self.errors {
            record.errors = errors;
        }
        record.updated_at = Utc::now();
    }
}

/// Durable storage for agent runs
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Open a run and return its generated id
    async fn create(&self, run: NewRun) -> Result<String>;

    async fn update(&self, run_id: &str, update: RunUpdate) -> Result<()>;

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>>;

    async fn find_by_chain(&self, chain_id: &str) -> Result<Option<RunRecord>>;

    async fn list_by_status(&self, statuses: &[ChainStatus]) -> Result<Vec<RunRecord>>;
}

fn run_not_found(run_id: &str) -> Error {
    Error::Persistence(format!("run not found: {}", run_id))
}

/// Run store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: DashMap<String, RunRecord>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run: NewRun) -> Result<String> {
        let run_id = Uuid::now_v7().to_string();
        self.runs.insert(run_id.clone(), run.into_record(run_id.clone()));
        Ok(run_id)
    }

    async fn update(&self, run_id: &str, update: RunUpdate) -> Result<()> {
        let mut record = self.runs.get_mut(run_id).ok_or_else(|| run_not_found(run_id))?;
        update.apply(&mut record);
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>> {
        Ok(self.runs.get(run_id).map(|r| r.clone()))
    }

    async fn find_by_chain(&self, chain_id: &str) -> Result<Option<RunRecord>> {
        Ok(self
            .runs
            .iter()
            .find(|r| r.chain_id == chain_id)
            .map(|r| r.clone()))
    }

    async fn list_by_status(&self, statuses: &[ChainStatus]) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|r| statuses.contains(&r.status))
            .map(|r| r.clone())
            .collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }
}

const SELECT_COLUMNS: &str = "SELECT run_id, chain_id, agent_definition_id, status, inputs, outputs,
        steps, tools_used, errors, created_at, updated_at FROM agent_runs";

/// SQLite-based run store
pub struct SqliteRunStore {
    conn: Mutex<Connection>,
}

impl SqliteRunStore {
    /// Open (or create) the database at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    /// Open the database named by `[chain] db_path`
    pub fn from_config(config: &ChainConfig) -> Result<Self> {
        debug!(db_path = %config.db_path, "Opening run store");
        Self::new(&config.db_path)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Persistence("run store connection poisoned".to_string()))
    }

    fn init_tables(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS agent_runs (
                run_id TEXT PRIMARY KEY,
                chain_id TEXT NOT NULL UNIQUE,
                agent_definition_id TEXT NOT NULL,
                status TEXT NOT NULL,
                inputs TEXT NOT NULL,
                outputs TEXT,
                steps TEXT NOT NULL,
                tools_used TEXT NOT NULL,
                errors TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_agent_runs_status ON agent_runs(status)",
            [],
        )?;

        Ok(())
    }

    fn save(conn: &Connection, record: &RunRecord) -> Result<()> {
        let outputs = record
            .outputs
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "INSERT OR REPLACE INTO agent_runs (run_id, chain_id, agent_definition_id, status,
                inputs, outputs, steps, tools_used, errors, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.run_id,
                record.chain_id,
                record.agent_definition_id,
                record.status.as_str(),
                serde_json::to_string(&record.inputs)?,
                outputs,
                serde_json::to_string(&record.steps)?,
                serde_json::to_string(&record.tools_used)?,
                serde_json::to_string(&record.errors)?,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load_where(conn: &Connection, column: &str, value: &str) -> Result<Option<RunRecord>> {
        let sql = format!("{} WHERE {} = ?1", SELECT_COLUMNS, column);
        let record = conn
            .query_row(&sql, params![value], row_to_record)
            .optional()?;
        Ok(record)
    }
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status_text: String = row.get(3)?;
    let status = status_text
        .parse::<ChainStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let outputs: Option<String> = row.get(5)?;
    let outputs = outputs
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(RunRecord {
        run_id: row.get(0)?,
        chain_id: row.get(1)?,
        agent_definition_id: row.get(2)?,
        status,
        inputs: json_column(row, 4)?,
        outputs,
        steps: json_column(row, 6)?,
        tools_used: json_column(row, 7)?,
        errors: json_column(row, 8)?,
        created_at: time_column(row, 9)?,
        updated_at: time_column(row, 10)?,
    })
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn create(&self, run: NewRun) -> Result<String> {
        let run_id = Uuid::now_v7().to_string();
        let record = run.into_record(run_id.clone());
        let conn = self.conn()?;
        Self::save(&conn, &record)?;
        debug!(run_id = %run_id, chain_id = %record.chain_id, "Run persisted");
        Ok(run_id)
    }

    async fn update(&self, run_id: &str, update: RunUpdate) -> Result<()> {
        let conn = self.conn()?;
        let mut record =
            Self::load_where(&conn, "run_id", run_id)?.ok_or_else(|| run_not_found(run_id))?;
        update.apply(&mut record);
        Self::save(&conn, &record)
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let conn = self.conn()?;
        Self::load_where(&conn, "run_id", run_id)
    }

    async fn find_by_chain(&self, chain_id: &str) -> Result<Option<RunRecord>> {
        let conn = self.conn()?;
        Self::load_where(&conn, "chain_id", chain_id)
    }

    async fn list_by_status(&self, statuses: &[ChainStatus]) -> Result<Vec<RunRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "{} WHERE status IN ({}) ORDER BY created_at",
            SELECT_COLUMNS, placeholders
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(statuses.iter().map(|s| s.as_str())), row_to_record)?;

        let mut result = Vec::new();
        for record in rows {
            result.push(record?);
        }
        Ok(result)
    }
}
