//! Backend client lifecycle
//!
//! ```text
//! Uninitialized ──connect──▶ Starting ──ready──▶ Ready
//!       ▲                       │                 │
//!       └──────── failure ──────┘   reconnect / dispose
//!       ▲                                         ▼
//!       └─────────────────────────────────── Disposing
//! ```
//!
//! The manager owns the one live client and the polling task handle.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use vehsync_core::{ClientFactory, ClientOptions, SyncError, SyncResult, VehicleClient};

use crate::config::{settle, EngineTimings};

/// Client lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Starting,
    Ready,
    Disposing,
}

/// Creates, replaces and releases the backend client
pub struct ClientLifecycle {
    factory: Arc<dyn ClientFactory>,
    timings: EngineTimings,
    state: RwLock<LifecycleState>,
    client: RwLock<Option<Arc<dyn VehicleClient>>>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ClientLifecycle {
    pub fn new(factory: Arc<dyn ClientFactory>, timings: EngineTimings) -> Self {
        Self {
            factory,
            timings,
            state: RwLock::new(LifecycleState::Uninitialized),
            client: RwLock::new(None),
            poll_handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// The live client, once `Ready`
    pub fn client(&self) -> Option<Arc<dyn VehicleClient>> {
        self.client.read().clone()
    }

    /// Replace the current client with a fresh one.
    ///
    /// Releases any existing client first. On failure the manager is left
    /// `Uninitialized` with no client.
    pub async fn connect(&self, options: ClientOptions) -> SyncResult<Arc<dyn VehicleClient>> {
        self.release().await;

        *self.state.write() = LifecycleState::Starting;
        match self.start(options).await {
            Ok(client) => {
                *self.client.write() = Some(client.clone());
                *self.state.write() = LifecycleState::Ready;
                info!("Backend client ready");
                Ok(client)
            }
            Err(e) => {
                *self.state.write() = LifecycleState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn start(&self, options: ClientOptions) -> SyncResult<Arc<dyn VehicleClient>> {
        let client = self
            .factory
            .connect(options)
            .await
            .map_err(|e| SyncError::Connection(format!("Client construction failed: {}", e)))?;

        client
            .wait_ready()
            .await
            .map_err(|e| SyncError::Connection(format!("Client not ready: {}", e)))?;
        settle(self.timings.ready_settle()).await;

        // The engine drives polling itself
        client
            .unload()
            .await
            .map_err(|e| SyncError::Connection(format!("Client unload failed: {}", e)))?;
        settle(self.timings.unload_settle()).await;

        Ok(client)
    }

    /// Drop the current client, if any, and wait for the teardown to settle
    async fn release(&self) {
        let previous = self.client.write().take();
        if let Some(client) = previous {
            *self.state.write() = LifecycleState::Disposing;
            drop(client);
            debug!("Previous backend client released");
            settle(self.timings.teardown_settle()).await;
            *self.state.write() = LifecycleState::Uninitialized;
        }
    }

    /// Stop polling and release the client
    pub async fn dispose(&self) {
        self.stop_polling().await;
        self.release().await;
    }

    /// Install the polling task, aborting any previous one
    pub async fn set_poll_task(&self, handle: JoinHandle<()>) {
        let mut slot = self.poll_handle.lock().await;
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    pub async fn stop_polling(&self) {
        let mut slot = self.poll_handle.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
            debug!("Polling stopped");
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.poll_handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ClientLifecycle {
    fn drop(&mut self) {
        if let Some(handle) = self.poll_handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ClientCall, MockClientFactory};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn options() -> ClientOptions {
        let (errors, _rx) = mpsc::unbounded_channel();
        ClientOptions {
            username: "user".into(),
            password: Arc::new("pw".into()),
            vehicle_type: vehsync_core::VehicleType::Id,
            pin: String::new(),
            interval_minutes: 10,
            debug: false,
            errors,
        }
    }

    #[tokio::test]
    async fn test_connect_waits_ready_then_unloads() {
        let factory = Arc::new(MockClientFactory::new());
        let lifecycle = ClientLifecycle::new(factory.clone(), EngineTimings::immediate());
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);

        lifecycle.connect(options()).await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
        assert!(lifecycle.client().is_some());
        assert_eq!(
            factory.client().calls(),
            vec![ClientCall::WaitReady, ClientCall::Unload]
        );
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_no_client() {
        let factory = Arc::new(MockClientFactory::new());
        let lifecycle = ClientLifecycle::new(factory.clone(), EngineTimings::immediate());

        factory.client().fail_ready(true);
        let err = lifecycle.connect(options()).await.err().expect("connect should fail");
        assert!(matches!(err, SyncError::Connection(_)));
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
        assert!(lifecycle.client().is_none());

        factory.client().fail_ready(false);
        factory.fail_connect(true);
        assert!(lifecycle.connect(options()).await.is_err());
        assert_eq!(factory.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_observes_settle_delays() {
        let factory = Arc::new(MockClientFactory::new());
        let lifecycle = ClientLifecycle::new(factory.clone(), EngineTimings::default());

        let start = tokio::time::Instant::now();
        lifecycle.connect(options()).await.unwrap();
        // ready + unload
        assert_eq!(start.elapsed(), Duration::from_secs(7));

        let start = tokio::time::Instant::now();
        lifecycle.connect(options()).await.unwrap();
        // teardown + ready + unload
        assert_eq!(start.elapsed(), Duration::from_secs(8));
        assert_eq!(factory.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_poll_task_is_replaced_and_stopped() {
        let factory = Arc::new(MockClientFactory::new());
        let lifecycle = ClientLifecycle::new(factory, EngineTimings::immediate());

        let first = tokio::spawn(std::future::pending::<()>());
        let first_abort = first.abort_handle();
        lifecycle.set_poll_task(first).await;
        assert!(lifecycle.is_polling().await);

        lifecycle
            .set_poll_task(tokio::spawn(std::future::pending::<()>()))
            .await;
        tokio::task::yield_now().await;
        assert!(first_abort.is_finished());

        lifecycle.dispose().await;
        assert!(!lifecycle.is_polling().await);
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
    }
}
