use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ReporsError, Result};
use crate::traits::{Connection, Connector};

/// Explicit connection state: disconnected, or holding one live handle.
struct RotatorState {
    conn: Option<Arc<dyn Connection>>,
    cursor: usize,
}

/// Supplies a live connection on demand, rotating across a fixed set of
/// connection descriptors to spread load or provide fallback targets.
///
/// At most one live connection exists per rotator at any time; it is
/// created lazily on first use and recreated after `invalidate`. The lock
/// covers acquisition and reset only, never query execution.
pub struct ConnectionRotator {
    connector: Arc<dyn Connector>,
    descriptors: Vec<String>,
    state: Mutex<RotatorState>,
}

impl ConnectionRotator {
    /// Create a rotator over an ordered, non-empty descriptor list.
    pub fn new(connector: Arc<dyn Connector>, descriptors: Vec<String>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(ReporsError::Usage {
                operation: "ConnectionRotator::new",
                reason: "connection descriptor list is empty",
            });
        }
        info!(descriptors = descriptors.len(), "connection rotator ready");
        Ok(Self {
            connector,
            descriptors,
            state: Mutex::new(RotatorState {
                conn: None,
                cursor: 0,
            }),
        })
    }

    /// Returns the current live connection, dialing the descriptor at the
    /// cursor if none exists. The cursor advances by one per attempted
    /// connect, successful or not; a failed connect is surfaced rather
    /// than skipped past.
    pub async fn acquire(&self) -> Result<Arc<dyn Connection>> {
        let mut state = self.state.lock().await;
        if let Some(conn) = &state.conn {
            return Ok(Arc::clone(conn));
        }
        let position = state.cursor % self.descriptors.len();
        state.cursor = (state.cursor + 1) % self.descriptors.len();
        debug!(position, "connecting");
        match self.connector.connect(&self.descriptors[position]).await {
            Ok(conn) => {
                state.conn = Some(Arc::clone(&conn));
                info!(position, "connected");
                Ok(conn)
            }
            Err(ReporsError::Connection(message)) => Err(ReporsError::Connection(message)),
            Err(err) => Err(ReporsError::Connection(err.to_string())),
        }
    }

    /// Discards the current live connection so the next `acquire` dials
    /// the next descriptor in rotation.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if state.conn.take().is_some() {
            warn!("live connection invalidated");
        }
    }

    /// Releases the live connection's handle if one exists; idempotent.
    /// Backends close their socket once the last handle drops.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.conn = None;
    }
}
