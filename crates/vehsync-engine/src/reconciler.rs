//! Capability reconciler
//!
//! Brings the host's exposed capability list in line with the desired set
//! and points write listeners at the writable capabilities.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vehsync_core::{is_writable, HostDevice, HostResult};

use crate::config::settle;

/// Ordered union of capability lists; the first occurrence wins
pub fn desired_capabilities<'a, I>(sources: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut desired: Vec<String> = Vec::new();
    for name in sources.into_iter().flatten() {
        if !desired.contains(name) {
            desired.push(name.clone());
        }
    }
    desired
}

/// Changes needed to go from the exposed to the desired set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityPlan {
    pub to_remove: Vec<String>,
    pub to_add: Vec<String>,
}

impl CapabilityPlan {
    pub fn new(exposed: &[String], desired: &[String]) -> Self {
        Self {
            to_remove: exposed
                .iter()
                .filter(|c| !desired.contains(c))
                .cloned()
                .collect(),
            to_add: desired
                .iter()
                .filter(|c| !exposed.contains(c))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub removed: Vec<String>,
    pub added: Vec<String>,
    pub failed: Vec<String>,
    pub listeners: Vec<String>,
}

pub struct CapabilityReconciler {
    host: Arc<dyn HostDevice>,
    settle: Duration,
}

impl CapabilityReconciler {
    pub fn new(host: Arc<dyn HostDevice>, settle: Duration) -> Self {
        Self { host, settle }
    }

    /// Apply removals, then additions, then re-register write listeners.
    ///
    /// A capability the host refuses is logged and skipped. Only a failed
    /// listener registration is returned as an error.
    pub async fn reconcile(&self, desired: &[String]) -> HostResult<ReconcileReport> {
        let exposed = self.host.capabilities();
        let plan = CapabilityPlan::new(&exposed, desired);
        let mut report = ReconcileReport::default();

        debug!(?exposed, ?desired, "Reconciling capabilities");

        for name in &plan.to_remove {
            match self.host.remove_capability(name).await {
                Ok(()) => {
                    info!(capability = %name, "Capability removed");
                    report.removed.push(name.clone());
                }
                Err(e) => {
                    warn!(capability = %name, error = %e, "Capability removal failed");
                    report.failed.push(name.clone());
                }
            }
        }
        settle(self.settle).await;

        for name in &plan.to_add {
            match self.host.add_capability(name).await {
                Ok(()) => {
                    info!(capability = %name, "Capability added");
                    report.added.push(name.clone());
                }
                Err(e) => {
                    warn!(capability = %name, error = %e, "Capability add failed");
                    report.failed.push(name.clone());
                }
            }
        }
        settle(self.settle).await;

        report.listeners = desired.iter().filter(|c| is_writable(c)).cloned().collect();
        self.host
            .register_capability_listener(report.listeners.clone())
            .await?;

        Ok(report)
    }
}
