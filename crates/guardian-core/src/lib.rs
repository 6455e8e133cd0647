//! # Guardian Core Library
//!
//! This library keeps a device listening for community emergency alerts
//! while the app is backgrounded, killed or rebooted, and turns each
//! eligible alert into a maximum-urgency notification with a bounded
//! vibration. The `guardian` CLI binary drives the same library.
//!
//! ## Architecture
//!
//! - **Stream**: live query on the alert collection, added records only
//! - **Filter**: pure eligibility decision (own, viewed, stale, untyped)
//! - **Policy**: category profile table rendered into notification specs
//! - **Haptics**: waveform playback with a hard cutoff timer
//! - **Supervisor**: lifecycle state machine owning the one subscription
//! - **Reconcile**: unique periodic job that restarts a stopped service
//!
//! ## Key Components
//!
//! - [`Supervisor`]: lifecycle state machine and delivery pump
//! - [`EligibilityFilter`]: delivery decision per alert
//! - [`Config`]: service configuration
//! - [`Notifier`], [`Vibrator`], [`AlertFeed`]: platform seams

pub mod alert;
pub mod clock;
pub mod control;
pub mod error;
pub mod events;
pub mod filter;
pub mod haptics;
pub mod identity;
pub mod notifier;
pub mod policy;
pub mod reconcile;
pub mod storage;
pub mod stream;
pub mod supervisor;

pub use alert::{AlertCategory, AlertEvent, AlertRecord, Locale, NotificationProfile, Urgency};
pub use clock::{Clock, ManualClock, SystemClock};
pub use control::{ControlReply, ControlSurface, HostSignal};
pub use error::{ConfigError, CoreError, SchedulerError};
pub use events::Event;
pub use filter::{classify, Eligibility, EligibilityFilter, SuppressReason};
pub use haptics::{HapticController, MemoryVibrator, NoVibrator, Vibrator, Waveform};
pub use identity::{IdentityProvider, LocalIdentity, StaticIdentity};
pub use notifier::{AlertDispatcher, LogNotifier, MemoryNotifier, NotificationRecord, Notifier};
pub use policy::{render, NotificationSpec, RenderOptions};
pub use reconcile::{
    ExistingJobPolicy, JobOutcome, JobScheduler, PeriodicRequest, ReconciliationJob,
    TokioJobScheduler,
};
pub use storage::Config;
pub use stream::{AlertFeed, AlertStreamClient, MemoryFeed};
pub use supervisor::{Dependencies, Input, ServiceState, Supervisor, SupervisorSettings};
