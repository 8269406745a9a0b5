//! Interval scheduler
//!
//! One repeating timer per device. Each tick refreshes the backend state,
//! either cheaply (`normal`) or by waking the vehicle (`force`), and keeps
//! the `forceUpdate` counter that decides between the two.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use vehsync_core::{SyncError, SyncResult, VehicleClient};

use crate::config::{settle, EngineTimings};
use crate::store::DeviceStore;

/// Kind of refresh a cycle performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    Normal,
    Forced,
}

impl RefreshKind {
    /// Reason passed to the client's status update
    pub fn reason(&self) -> &'static str {
        match self {
            RefreshKind::Normal => "normal",
            RefreshKind::Forced => "force",
        }
    }
}

/// Decide the refresh kind for a tick
pub fn refresh_kind(forced: bool, counter: i64, threshold: i64) -> RefreshKind {
    if forced || counter >= threshold {
        RefreshKind::Forced
    } else {
        RefreshKind::Normal
    }
}

/// Inputs of one refresh
pub struct RefreshPlan<'a> {
    pub vin: &'a str,
    pub forced: bool,
    pub interval_minutes: u32,
    pub threshold: i64,
}

/// Refresh the client's state and advance the counter.
///
/// Returns the refresh kind and the new counter value.
pub async fn refresh(
    client: &dyn VehicleClient,
    store: &DeviceStore,
    timings: &EngineTimings,
    plan: RefreshPlan<'_>,
) -> SyncResult<(RefreshKind, i64)> {
    let kind = refresh_kind(plan.forced, store.force_update(), plan.threshold);

    let counter = match kind {
        RefreshKind::Forced => {
            settle(timings.force_request_settle()).await;
            if let Err(e) = client.request_status_update(plan.vin).await {
                warn!(error = %e, "Forced status request failed");
            }
            settle(timings.force_request_settle()).await;
            client
                .update_status(kind.reason())
                .await
                .map_err(|e| SyncError::Connection(e.to_string()))?;
            settle(timings.force_update_settle()).await;
            0
        }
        RefreshKind::Normal => {
            client
                .update_status(kind.reason())
                .await
                .map_err(|e| SyncError::Connection(e.to_string()))?;
            settle(timings.normal_update_settle()).await;
            store.force_update() + i64::from(plan.interval_minutes)
        }
    };

    store.set_force_update(counter).await?;

    // Keep the client's own timers from doubling up with ours
    client
        .unload()
        .await
        .map_err(|e| SyncError::Connection(e.to_string()))?;

    debug!(kind = kind.reason(), force_update = counter, "Refresh done");
    Ok((kind, counter))
}

/// Spawn a timer that calls `on_tick` every `period`, first after one period.
///
/// The timer ends when `on_tick` returns `false`.
pub fn spawn_ticker<F>(period: Duration, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if !on_tick() {
                debug!("Ticker owner gone, stopping");
                break;
            }
        }
    })
}
