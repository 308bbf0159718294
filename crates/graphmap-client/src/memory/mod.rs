//! In-process graph service.
//!
//! [`MemoryGraph`] implements [`Dialer`], [`GraphService`] and (through its
//! sessions) [`GraphSession`] over an in-memory catalog, executing the nGQL
//! subset this crate emits. It also exposes the knobs tests need: scripted
//! statement failures, dial refusal, per-statement latency, and session
//! accounting.

mod engine;
pub mod parser;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};

use graphmap_core::{GraphConfig, Record};

use crate::client::GraphClient;
use crate::schema::SpaceOptions;
use crate::transport::{
    Dialer, GraphService, GraphSession, ResultSet, TransportError, E_EXECUTION_ERROR,
};

pub use engine::IndexDef;
pub use parser::{parse_literal, parse_statement, Statement};

/// Session counters of a [`MemoryGraph`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Sessions authenticated.
    pub opened: usize,
    /// `release()` calls, counted per call.
    pub released: usize,
    /// Highest number of sessions open at the same time.
    pub peak_active: usize,
    /// `GraphService::close()` calls.
    pub closes: usize,
}

impl SessionStats {
    pub fn active(&self) -> usize {
        self.opened.saturating_sub(self.released)
    }
}

struct Fault {
    prefix: String,
    remaining: u32,
    message: String,
}

#[derive(Default)]
struct State {
    catalog: engine::Catalog,
    faults: Vec<Fault>,
    dial_refusal: Option<String>,
    latency: Duration,
    stats: SessionStats,
    executed: Vec<String>,
}

impl State {
    fn take_fault(&mut self, statement: &str) -> Option<String> {
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.remaining > 0 && statement.starts_with(&f.prefix))?;
        fault.remaining -= 1;
        let message = fault.message.clone();
        self.faults.retain(|f| f.remaining > 0);
        Some(message)
    }
}

/// An in-memory graph service. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    state: Arc<Mutex<State>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client dialing this graph.
    pub fn client(&self, config: GraphConfig) -> GraphClient {
        GraphClient::new(config, Arc::new(self.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    // ── Fault Injection ──────────────────────────────────────────

    /// Make subsequent dials fail with `message`.
    pub fn refuse_connections(&self, message: impl Into<String>) {
        self.lock().dial_refusal = Some(message.into());
    }

    pub fn accept_connections(&self) {
        self.lock().dial_refusal = None;
    }

    /// Fail the next `times` statements starting with `prefix` with a
    /// server error carrying `message`.
    pub fn fail_statements(&self, prefix: impl Into<String>, times: u32, message: impl Into<String>) {
        self.lock().faults.push(Fault {
            prefix: prefix.into(),
            remaining: times,
            message: message.into(),
        });
    }

    /// Delay every statement by `latency` before it executes.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    // ── Inspection ───────────────────────────────────────────────

    pub fn session_stats(&self) -> SessionStats {
        self.lock().stats
    }

    /// Every statement received, in order, including failed ones.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Number of received statements starting with `prefix`.
    pub fn executed_count(&self, prefix: &str) -> usize {
        self.lock()
            .executed
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.lock().catalog.spaces.keys().cloned().collect()
    }

    pub fn namespace_options(&self, namespace: &str) -> Option<SpaceOptions> {
        self.lock()
            .catalog
            .spaces
            .get(namespace)
            .map(|space| SpaceOptions {
                partition_num: space.partition_num,
                replica_factor: space.replica_factor,
                vid_type: space.vid_type,
            })
    }

    /// Tag names of `namespace`, in creation order.
    pub fn tags(&self, namespace: &str) -> Vec<String> {
        self.lock()
            .catalog
            .spaces
            .get(namespace)
            .map(|space| space.tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Edge type names of `namespace`, in creation order.
    pub fn edge_types(&self, namespace: &str) -> Vec<String> {
        self.lock()
            .catalog
            .spaces
            .get(namespace)
            .map(|space| space.edges.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn index(&self, namespace: &str, index: &str) -> Option<IndexDef> {
        self.lock()
            .catalog
            .spaces
            .get(namespace)
            .and_then(|space| space.indexes.get(index).cloned())
    }

    /// Properties of vertex `vid`, per tag.
    pub fn vertex(&self, namespace: &str, vid: &str) -> Option<IndexMap<String, Record>> {
        self.lock()
            .catalog
            .spaces
            .get(namespace)
            .and_then(|space| space.vertices.get(vid).cloned())
    }

    pub fn edge(&self, namespace: &str, edge: &str, src: &str, dst: &str) -> Option<Record> {
        let key = (edge.to_string(), src.to_string(), dst.to_string());
        self.lock()
            .catalog
            .spaces
            .get(namespace)
            .and_then(|space| space.edge_data.get(&key).cloned())
    }
}

#[async_trait]
impl Dialer for MemoryGraph {
    async fn dial(&self, config: &GraphConfig) -> Result<Arc<dyn GraphService>, TransportError> {
        if let Some(message) = self.lock().dial_refusal.clone() {
            return Err(TransportError::Dial {
                address: config.address(),
                message,
            });
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl GraphService for MemoryGraph {
    async fn authenticate(
        &self,
        _username: &str,
        _password: &str,
    ) -> Result<Box<dyn GraphSession>, TransportError> {
        let mut state = self.lock();
        state.stats.opened += 1;
        state.stats.peak_active = state.stats.peak_active.max(state.stats.active());
        Ok(Box::new(MemorySession {
            graph: self.clone(),
            space: None,
            released: false,
        }))
    }

    fn close(&self) {
        self.lock().stats.closes += 1;
    }
}

struct MemorySession {
    graph: MemoryGraph,
    space: Option<String>,
    released: bool,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn execute(&mut self, statement: &str) -> Result<ResultSet, TransportError> {
        if self.released {
            return Err(TransportError::SessionClosed);
        }
        let latency = self.graph.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.graph.lock();
        state.executed.push(statement.to_string());
        if let Some(message) = state.take_fault(statement) {
            return Ok(ResultSet::failure(E_EXECUTION_ERROR, message));
        }
        Ok(state.catalog.execute(&mut self.space, statement))
    }

    fn release(&mut self) {
        self.released = true;
        self.graph.lock().stats.released += 1;
    }
}
