//! The wire-level seam: dialing, authenticating, executing statements.
//!
//! A [`Dialer`] produces a connected [`GraphService`]; each authenticated
//! [`GraphSession`] executes statements one at a time and must be released
//! when done. [`crate::nebula`] implements them over TCP; the `memory`
//! feature adds an in-process implementation.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use graphmap_core::{GraphConfig, Record, Value};

/// Failures below the statement level: the request never got a server answer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Cannot dial {address}: {message}")]
    Dial { address: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session already released")]
    SessionClosed,
}

/// Establishes the physical connection to a graph service.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, config: &GraphConfig) -> Result<Arc<dyn GraphService>, TransportError>;
}

/// A connected graph service able to open sessions.
#[async_trait]
pub trait GraphService: Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn GraphSession>, TransportError>;

    /// Tear the connection down. Sessions already handed out stay usable
    /// until released.
    fn close(&self) {}
}

/// One authenticated session.
#[async_trait]
pub trait GraphSession: Send {
    async fn execute(&mut self, statement: &str) -> Result<ResultSet, TransportError>;

    /// Return the session to the server. Called exactly once.
    fn release(&mut self);
}

// ── Results ──────────────────────────────────────────────────────

// Graph service error codes.
pub const E_SUCCEEDED: i32 = 0;
pub const E_SYNTAX_ERROR: i32 = -1004;
pub const E_EXECUTION_ERROR: i32 = -1005;
pub const E_STATEMENT_EMPTY: i32 = -1006;
pub const E_BAD_PERMISSION: i32 = -1008;
pub const E_SEMANTIC_ERROR: i32 = -1009;

/// Execution-error texts that name a missing or conflicting object.
/// Matched case-insensitively.
const PERMANENT_MARKERS: &[&str] = &[
    "spacenotfound",
    "tagnotfound",
    "edgenotfound",
    "not found",
    "existed",
    "conflict",
];

/// A server-reported statement failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: i32,
    pub message: String,
}

impl ServerError {
    /// Whether repeating the same statement can succeed.
    ///
    /// Syntax, semantic and permission errors never can, nor can execution
    /// errors naming a missing or already existing object. Everything else
    /// (leader changes, storage hiccups, RPC failures) is worth a retry.
    pub fn is_transient(&self) -> bool {
        match self.code {
            E_SYNTAX_ERROR | E_STATEMENT_EMPTY | E_BAD_PERMISSION | E_SEMANTIC_ERROR => false,
            _ => {
                let message = self.message.to_ascii_lowercase();
                !PERMANENT_MARKERS.iter().any(|m| message.contains(m))
            }
        }
    }
}

/// A vertex as returned by `RETURN n`: its id plus the properties of each tag.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexData {
    pub vid: String,
    pub tags: IndexMap<String, Record>,
}

/// One result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(Value),
    Vertex(VertexData),
}

impl Cell {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(v) => v.as_str(),
            Self::Vertex(_) => None,
        }
    }

    pub fn as_vertex(&self) -> Option<&VertexData> {
        match self {
            Self::Vertex(v) => Some(v),
            Self::Value(_) => None,
        }
    }
}

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// The answer to one statement: either rows or a server error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    error: Option<ServerError>,
}

impl ResultSet {
    /// A successful answer with no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns,
            rows,
            error: None,
        }
    }

    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(ServerError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }

    pub fn error_msg(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Every cell of column `name`, in row order. Empty if the column is absent.
    pub fn column(&self, name: &str) -> impl Iterator<Item = &Cell> {
        let index = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| index.and_then(|i| row.get(i)))
    }
}
