//! NebulaGraph connection management and scoped sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use graphmap_core::naming::ensure_identifier;
use graphmap_core::{GraphConfig, MappingError};

use crate::outcome::Outcome;
use crate::statements;
use crate::transport::{Dialer, GraphService, GraphSession, ResultSet, TransportError};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("NebulaGraph connection error: {0}")]
    Connection(String),

    #[error("Failed to use namespace {namespace}: {message}")]
    NamespaceSelection { namespace: String, message: String },

    #[error("Failed to {operation} {target}: {message}")]
    Schema {
        operation: &'static str,
        target: String,
        message: String,
    },

    #[error("Failed to {operation} {target}: {message}")]
    Write {
        operation: &'static str,
        target: String,
        message: String,
    },

    #[error("Failed to {operation} {target}: {message}")]
    Read {
        operation: &'static str,
        target: String,
        message: String,
    },

    #[error("Vertex not found: {vid} in namespace {namespace}")]
    NotFound { namespace: String, vid: String },

    #[error("Vertex {vid} in namespace {namespace} carries several tags: {}", tags.join(", "))]
    AmbiguousType {
        namespace: String,
        vid: String,
        tags: Vec<String>,
    },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Timed out after {after:?} while trying to {operation}")]
    Timeout { operation: String, after: Duration },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<GraphError>,
    },

    #[error("Failed to drop {} namespace(s): {}", failures.len(), describe_failures(failures))]
    PartialDrop {
        dropped: Vec<String>,
        failures: Vec<DropFailure>,
    },
}

/// One namespace that `delete_all_namespaces` could not drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropFailure {
    pub namespace: String,
    pub message: String,
}

fn describe_failures(failures: &[DropFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.namespace, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl GraphError {
    /// The server message behind this error, following retry wrappers.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::NamespaceSelection { message, .. }
            | Self::Schema { message, .. }
            | Self::Write { message, .. }
            | Self::Read { message, .. } => Some(message),
            Self::RetriesExhausted { last, .. } => last.server_message(),
            _ => None,
        }
    }
}

/// Thread-safe NebulaGraph client with a bounded session pool.
///
/// Constructed once with a [`GraphConfig`] and a [`Dialer`]; the connection
/// is established lazily by the first [`GraphClient::session`] call (or
/// eagerly by [`GraphClient::connect`]) and torn down by
/// [`GraphClient::close`]. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: GraphConfig,
    dialer: Arc<dyn Dialer>,
    service: Mutex<Option<Arc<dyn GraphService>>>,
    slots: Arc<Semaphore>,
}

impl GraphClient {
    pub fn new(config: GraphConfig, dialer: Arc<dyn Dialer>) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_connection_pool_size.max(1)));
        Self {
            inner: Arc::new(ClientInner {
                config,
                dialer,
                service: Mutex::new(None),
                slots,
            }),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    /// Establish the connection if not already connected.
    ///
    /// Returns `false` when the dial fails or times out; the failure is logged.
    pub async fn connect(&self) -> bool {
        let mut service = self.inner.service.lock().await;
        if service.is_some() {
            return true;
        }

        let config = &self.inner.config;
        let address = config.address();
        match timeout(config.connect_timeout(), self.inner.dialer.dial(config)).await {
            Ok(Ok(connected)) => {
                tracing::info!(address = %address, "Connected to NebulaGraph");
                *service = Some(connected);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(address = %address, error = %e, "Failed to connect to NebulaGraph");
                false
            }
            Err(_) => {
                tracing::warn!(
                    address = %address,
                    timeout_ms = config.connect_timeout_ms,
                    "Timed out connecting to NebulaGraph"
                );
                false
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.service.lock().await.is_some()
    }

    /// Tear the connection down. A later `session()` reconnects.
    pub async fn close(&self) {
        if let Some(service) = self.inner.service.lock().await.take() {
            service.close();
            tracing::info!(address = %self.inner.config.address(), "Disconnected from NebulaGraph");
        }
    }

    /// Check out a session, optionally bound to `namespace`.
    ///
    /// Connects lazily. The returned guard releases the session when dropped.
    pub async fn session(&self, namespace: Option<&str>) -> Result<Session, GraphError> {
        if let Some(ns) = namespace {
            ensure_identifier(ns)?;
        }
        let service = self.connected_service().await?;
        let config = &self.inner.config;

        let permit = match timeout(
            config.acquire_timeout(),
            self.inner.slots.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(GraphError::Connection("session pool is closed".to_string())),
            Err(_) => {
                return Err(GraphError::Timeout {
                    operation: "acquire a session".to_string(),
                    after: config.acquire_timeout(),
                })
            }
        };

        let raw = match timeout(
            config.connect_timeout(),
            service.authenticate(&config.username, &config.password),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                return Err(GraphError::Connection(format!("cannot open session: {e}")))
            }
            Err(_) => {
                return Err(GraphError::Timeout {
                    operation: "open a session".to_string(),
                    after: config.connect_timeout(),
                })
            }
        };

        let mut session = Session {
            raw: Some(raw),
            namespace: None,
            statement_timeout: config.statement_timeout(),
            _permit: permit,
        };

        if let Some(ns) = namespace {
            // An early return drops `session`, which releases it.
            let result = session.execute(&statements::use_space(ns)).await?;
            if let Outcome {
                succeeded: false,
                message,
            } = Outcome::from(&result)
            {
                return Err(GraphError::NamespaceSelection {
                    namespace: ns.to_string(),
                    message: message.unwrap_or_default(),
                });
            }
            session.namespace = Some(ns.to_string());
        }

        Ok(session)
    }

    async fn connected_service(&self) -> Result<Arc<dyn GraphService>, GraphError> {
        let current = self.inner.service.lock().await.clone();
        if let Some(service) = current {
            return Ok(service);
        }
        if !self.connect().await {
            return Err(GraphError::Connection(format!(
                "cannot establish connection to {}",
                self.inner.config.address()
            )));
        }
        self.inner.service.lock().await.clone().ok_or_else(|| {
            GraphError::Connection("connection closed while opening a session".to_string())
        })
    }
}

/// A checked-out session, optionally bound to a namespace.
///
/// Holds one pool slot. Dropping the guard releases the underlying session
/// exactly once, whether the operation finished, failed, timed out or was
/// cancelled.
pub struct Session {
    raw: Option<Box<dyn GraphSession>>,
    namespace: Option<String>,
    statement_timeout: Option<Duration>,
    // Declared last: the slot frees only after `release()` ran in `Drop`.
    _permit: OwnedSemaphorePermit,
}

impl Session {
    /// The namespace selected by this session, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Execute one statement and return the raw result.
    ///
    /// Only transport failures and timeouts are errors here; a server-side
    /// failure comes back as a `ResultSet` that is not succeeded.
    pub async fn execute(&mut self, statement: &str) -> Result<ResultSet, GraphError> {
        let raw = self.raw.as_mut().ok_or(TransportError::SessionClosed)?;
        tracing::debug!(
            namespace = self.namespace.as_deref().unwrap_or(""),
            statement,
            "Executing statement"
        );

        let result = match self.statement_timeout {
            Some(limit) => timeout(limit, raw.execute(statement))
                .await
                .map_err(|_| GraphError::Timeout {
                    operation: format!("execute `{statement}`"),
                    after: limit,
                })??,
            None => raw.execute(statement).await?,
        };
        Ok(result)
    }

    /// Execute one statement and turn a server-side failure into the error
    /// built by `on_failure` from the server message.
    pub async fn execute_checked(
        &mut self,
        statement: &str,
        on_failure: impl FnOnce(String) -> GraphError,
    ) -> Result<ResultSet, GraphError> {
        let result = self.execute(statement).await?;
        Outcome::from(&result).into_result(on_failure)?;
        Ok(result)
    }

    /// Release the session now instead of at end of scope.
    pub fn release(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut raw) = self.raw.take() {
            raw.release();
            tracing::debug!(
                namespace = self.namespace.as_deref().unwrap_or(""),
                "Released session"
            );
        }
    }
}
