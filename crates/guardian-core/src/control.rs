//! Host-facing control surface and platform lifecycle signals.
//!
//! The host UI talks to the service through string-named methods; the
//! platform delivers boot and task signals. Both end up as supervisor
//! inputs.

use std::sync::Arc;

use serde::Serialize;

use crate::reconcile::{schedule_reconciliation, JobScheduler, PeriodicRequest, Registration};
use crate::supervisor::{Input, Supervisor};

pub const WORKER_ERROR: &str = "WORKER_ERROR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    Bool { value: bool },
    Error { code: String, message: String },
    NotImplemented,
}

impl ControlReply {
    pub fn success(value: bool) -> Self {
        ControlReply::Bool { value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSignal {
    BootCompleted,
    LockedBootCompleted,
    PackageReplaced,
    TaskRemoved,
    Other(String),
}

impl HostSignal {
    /// Accepts full intent names (`android.intent.action.BOOT_COMPLETED`) or
    /// the bare action.
    pub fn from_action(action: &str) -> Self {
        let bare = action.rsplit('.').next().unwrap_or(action);
        match bare {
            "BOOT_COMPLETED" => HostSignal::BootCompleted,
            "LOCKED_BOOT_COMPLETED" => HostSignal::LockedBootCompleted,
            "MY_PACKAGE_REPLACED" => HostSignal::PackageReplaced,
            "TASK_REMOVED" => HostSignal::TaskRemoved,
            _ => HostSignal::Other(action.to_string()),
        }
    }

    fn is_boot(&self) -> bool {
        matches!(
            self,
            HostSignal::BootCompleted | HostSignal::LockedBootCompleted | HostSignal::PackageReplaced
        )
    }
}

#[derive(Clone)]
pub struct ControlSurface {
    supervisor: Supervisor,
    scheduler: Arc<dyn JobScheduler>,
    request: PeriodicRequest,
}

impl ControlSurface {
    pub fn new(
        supervisor: Supervisor,
        scheduler: Arc<dyn JobScheduler>,
        request: PeriodicRequest,
    ) -> Self {
        Self {
            supervisor,
            scheduler,
            request,
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub async fn handle(&self, method: &str) -> ControlReply {
        match method {
            "startService" => match self.supervisor.start().await {
                Ok(()) => ControlReply::success(true),
                Err(e) => {
                    tracing::error!(error = %e, "startService failed");
                    ControlReply::success(false)
                }
            },
            "stopService" => match self.supervisor.stop().await {
                Ok(()) => ControlReply::success(true),
                Err(e) => {
                    tracing::error!(error = %e, "stopService failed");
                    ControlReply::success(false)
                }
            },
            "isServiceRunning" => ControlReply::success(self.supervisor.is_running()),
            "scheduleWorker" => match self.schedule() {
                Ok(_) => ControlReply::success(true),
                Err(e) => ControlReply::Error {
                    code: WORKER_ERROR.to_string(),
                    message: e.to_string(),
                },
            },
            other => {
                tracing::debug!(method = other, "unknown control method");
                ControlReply::NotImplemented
            }
        }
    }

    pub fn schedule(&self) -> crate::error::Result<Registration> {
        schedule_reconciliation(self.scheduler.as_ref(), &self.supervisor, self.request.clone())
    }

    /// Boot-like signals start the service and then make sure reconciliation
    /// is registered, even if the start failed.
    pub async fn on_signal(&self, signal: HostSignal) {
        tracing::info!(?signal, "host signal");
        if signal.is_boot() {
            if let Err(e) = self.supervisor.start().await {
                tracing::error!(?signal, error = %e, "service start on boot failed");
            }
            if let Err(e) = self.schedule() {
                tracing::error!(?signal, error = %e, "failed to schedule reconciliation");
            }
            return;
        }
        match signal {
            HostSignal::TaskRemoved => {
                if let Err(e) = self.supervisor.handle(Input::TaskRemoved).await {
                    tracing::error!(error = %e, "restart after task removal failed");
                }
            }
            HostSignal::Other(action) => tracing::info!(action = %action, "ignoring host signal"),
            _ => {}
        }
    }
}
