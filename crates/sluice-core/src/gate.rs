use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// RAII guard for the single upstream slot.
///
/// Dropping it releases the gate, so a permit moved into a response stream
/// keeps the gate closed until that stream is drained or dropped (including
/// when the caller disconnects).
pub struct GatePermit {
    #[allow(dead_code)]
    guard: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePermit").finish()
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        debug!("completion gate released");
    }
}

/// Process-wide single-flight gate around upstream interaction.
///
/// At most one [`GatePermit`] exists at a time; later callers wait in FIFO
/// order (tokio's mutex is fair). Clones share the same gate.
///
/// Every completion, streaming or not, is serialised through this gate, so
/// unrelated callers queue behind one another for the full duration of the
/// previous exchange. That latency cost is accepted in exchange for a strict
/// global ordering of upstream calls.
#[derive(Debug, Clone, Default)]
pub struct CompletionGate {
    lock: Arc<Mutex<()>>,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the gate and take the permit.
    pub async fn acquire(&self) -> GatePermit {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        debug!("completion gate acquired");
        GatePermit { guard }
    }

    /// Run `action` while holding the gate.
    ///
    /// The permit is handed to `action`; it is released whenever `action`
    /// drops it, so the returned future must move it in to stay exclusive.
    /// Returning it inside a lazily consumed value (a stream) extends the
    /// exclusive section until that value is dropped.
    pub async fn with_exclusive_access<F, Fut, T>(&self, action: F) -> T
    where
        F: FnOnce(GatePermit) -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = self.acquire().await;
        action(permit).await
    }

    /// `true` while some caller holds the permit.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
