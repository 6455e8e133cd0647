use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::state::{Action, Input, ServiceState};
use crate::alert::{AlertRecord, Locale};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::filter::{default_window, Eligibility, EligibilityFilter, SeenAlerts};
use crate::haptics::{HapticController, NoVibrator, Vibrator, Waveform, DEFAULT_CUTOFF};
use crate::identity::IdentityProvider;
use crate::notifier::{AlertDispatcher, ChannelSpec, NotificationRecord, Notifier, INDICATOR_ID};
use crate::policy::{RenderOptions, DEFAULT_TIMEOUT_MS};
use crate::stream::{AlertFeed, AlertStreamClient, AlertSubscription, DEFAULT_COLLECTION};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Platform seams the supervisor drives.
#[derive(Clone)]
pub struct Dependencies {
    pub feed: Arc<dyn AlertFeed>,
    pub identity: Arc<dyn IdentityProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub vibrator: Arc<dyn Vibrator>,
    pub clock: Arc<dyn Clock>,
}

impl Dependencies {
    /// No vibrator, system clock.
    pub fn new(
        feed: Arc<dyn AlertFeed>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            feed,
            identity,
            notifier,
            vibrator: Arc::new(NoVibrator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_vibrator(mut self, vibrator: Arc<dyn Vibrator>) -> Self {
        self.vibrator = vibrator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub collection: String,
    /// Subscription and staleness window.
    pub window: chrono::Duration,
    pub locale: Locale,
    /// When false, eligible alerts are logged but not posted.
    pub notifications_enabled: bool,
    pub timeout_ms: u64,
    pub haptics_enabled: bool,
    pub vibration_cutoff: std::time::Duration,
    pub repeat_waveform: bool,
    /// Events buffered per observer before a slow one starts lagging.
    pub event_capacity: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            window: default_window(),
            locale: Locale::default(),
            notifications_enabled: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            haptics_enabled: true,
            vibration_cutoff: DEFAULT_CUTOFF,
            repeat_waveform: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SupervisorSettings {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            locale: self.locale,
            timeout_ms: self.timeout_ms,
        }
    }
}

struct Pump {
    subscription_id: Uuid,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    state: ServiceState,
    pump: Option<Pump>,
}

struct Inner {
    deps: Dependencies,
    settings: SupervisorSettings,
    stream: AlertStreamClient,
    filter: EligibilityFilter,
    dispatcher: AlertDispatcher,
    haptics: HapticController,
    slot: tokio::sync::Mutex<Slot>,
    running: AtomicBool,
    seen: Mutex<SeenAlerts>,
    events: broadcast::Sender<Event>,
}

/// Owns the one alert subscription and keeps it alive across platform
/// lifecycle signals.
///
/// Cloning is cheap and every clone drives the same service.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(deps: Dependencies, settings: SupervisorSettings) -> Self {
        let stream =
            AlertStreamClient::new(Arc::clone(&deps.feed)).with_collection(&settings.collection);
        let dispatcher =
            AlertDispatcher::new(Arc::clone(&deps.notifier), settings.render_options());
        let haptics = HapticController::new(Arc::clone(&deps.vibrator));
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                filter: EligibilityFilter::new(settings.window),
                stream,
                dispatcher,
                haptics,
                deps,
                settings,
                slot: tokio::sync::Mutex::new(Slot::default()),
                running: AtomicBool::new(false),
                seen: Mutex::new(SeenAlerts::new()),
                events,
            }),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    /// Lock-free; may briefly lag a transition in progress.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> ServiceState {
        self.inner.slot.lock().await.state
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub async fn start(&self) -> Result<()> {
        self.handle(Input::Start).await.map(|_| ())
    }

    pub async fn stop(&self) -> Result<()> {
        self.handle(Input::Stop).await.map(|_| ())
    }

    /// Periodic check. Returns whether a stopped service was started.
    pub async fn reconcile(&self) -> Result<bool> {
        let was_running = self.is_running();
        let result = self.handle(Input::PeriodicCheck).await;
        let restarted = !was_running && result.is_ok();
        tracing::info!(was_running, restarted, "reconciliation ran");
        self.inner.emit(Event::ReconciliationRan {
            was_running,
            restarted,
            at: self.inner.deps.clock.now(),
        });
        result.map(|_| restarted)
    }

    /// Feed one lifecycle input through the transition table and perform
    /// the resulting action. Returns the state afterwards.
    ///
    /// Inputs are serialized: a second caller waits for the first
    /// transition to finish.
    pub async fn handle(&self, input: Input) -> Result<ServiceState> {
        let mut slot = self.inner.slot.lock().await;
        self.apply(&mut slot, input).await
    }

    async fn apply(&self, slot: &mut Slot, input: Input) -> Result<ServiceState> {
        let action = slot.state.on(input);
        tracing::debug!(state = %slot.state, ?input, ?action, "lifecycle input");

        match action {
            Action::Noop => Ok(slot.state),
            Action::Open => match self.open(slot) {
                Ok(subscription_id) => {
                    self.inner.emit(Event::ServiceStarted {
                        subscription_id,
                        trigger: input,
                        at: self.inner.deps.clock.now(),
                    });
                    Ok(slot.state)
                }
                Err(err) if input == Input::Start => Err(err),
                Err(err) => Err(self.restart_failed(input, err, slot.state)),
            },
            Action::Close => {
                self.close(slot).await;
                self.inner.emit(Event::ServiceStopped {
                    trigger: input,
                    at: self.inner.deps.clock.now(),
                });
                Ok(slot.state)
            }
            Action::Restart => {
                self.close(slot).await;
                self.inner.emit(Event::ServiceStopped {
                    trigger: input,
                    at: self.inner.deps.clock.now(),
                });
                match self.open(slot) {
                    Ok(subscription_id) => {
                        tracing::info!(subscription = %subscription_id, "service self-healed");
                        self.inner.emit(Event::SelfHealed {
                            subscription_id,
                            at: self.inner.deps.clock.now(),
                        });
                        Ok(slot.state)
                    }
                    Err(err) => Err(self.restart_failed(input, err, slot.state)),
                }
            }
        }
    }

    /// The pump for `subscription_id` stopped without a Stop. Handled as
    /// `Killed` unless that pump was already replaced or stopped.
    async fn pump_exited(&self, subscription_id: Uuid) {
        let mut slot = self.inner.slot.lock().await;
        let current = slot.pump.as_ref().map(|pump| pump.subscription_id);
        if current != Some(subscription_id) {
            tracing::debug!(subscription = %subscription_id, "stale pump exit ignored");
            return;
        }
        tracing::warn!(subscription = %subscription_id, "delivery pump exited on its own");
        self.inner.emit(Event::StreamEnded {
            subscription_id,
            at: self.inner.deps.clock.now(),
        });
        // A failed restart is already logged and emitted as RestartFailed.
        let _ = self.apply(&mut slot, Input::Killed).await;
    }

    fn restart_failed(&self, input: Input, err: CoreError, state: ServiceState) -> CoreError {
        let err = CoreError::restart_failed(err);
        tracing::error!(?input, %state, error = %err, "self-issued start failed");
        self.inner.emit(Event::RestartFailed {
            trigger: input,
            error: err.to_string(),
            state,
            at: self.inner.deps.clock.now(),
        });
        err
    }

    fn open(&self, slot: &mut Slot) -> Result<Uuid> {
        slot.state = ServiceState::Starting;
        match self.try_open() {
            Ok(pump) => {
                let id = pump.subscription_id;
                slot.pump = Some(pump);
                slot.state = ServiceState::Running;
                self.inner.running.store(true, Ordering::SeqCst);
                tracing::info!(state = %slot.state, subscription = %id, "service started");
                Ok(id)
            }
            Err(err) => {
                slot.state = ServiceState::Stopped;
                self.inner.running.store(false, Ordering::SeqCst);
                if let Err(e) = self.inner.deps.notifier.withdraw(INDICATOR_ID) {
                    tracing::debug!(error = %e, "indicator withdraw after failed start");
                }
                tracing::warn!(state = %slot.state, error = %err, "service failed to start");
                Err(err)
            }
        }
    }

    fn try_open(&self) -> Result<Pump> {
        let inner = &self.inner;
        let locale = inner.settings.locale;
        let notifier = &inner.deps.notifier;
        notifier.declare_channel(&ChannelSpec::service(locale))?;
        notifier.declare_channel(&ChannelSpec::alerts(locale))?;
        notifier.post(&NotificationRecord::indicator(locale))?;

        let subscription = inner
            .stream
            .open(inner.settings.window, inner.deps.clock.now())?;
        let subscription_id = subscription.id().unwrap_or_else(Uuid::nil);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(watch_pump(
            self.clone(),
            subscription_id,
            subscription,
            shutdown_rx,
        ));
        Ok(Pump {
            subscription_id,
            shutdown,
            handle,
        })
    }

    async fn close(&self, slot: &mut Slot) {
        slot.state = ServiceState::Stopping;
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(pump) = slot.pump.take() {
            // Already gone if the stream ended on its own.
            let _ = pump.shutdown.send(());
            if let Err(e) = pump.handle.await {
                tracing::error!(error = %e, "delivery pump panicked");
            }
            tracing::debug!(subscription = %pump.subscription_id, "delivery pump joined");
        }
        if let Err(e) = self.inner.deps.notifier.withdraw(INDICATOR_ID) {
            tracing::warn!(error = %e, "failed to withdraw service indicator");
        }
        slot.state = ServiceState::Stopped;
        tracing::info!(state = %slot.state, "service stopped");
    }
}

impl Inner {
    fn emit(&self, event: Event) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn deliver(&self, record: AlertRecord) {
        let now = self.deps.clock.now();
        let identity = self.deps.identity.current();

        let verdict = {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            seen.prune(now, self.filter.window());
            let verdict = self
                .filter
                .classify_seen(&record, identity.as_ref(), &seen, now);
            if let Eligibility::Deliver(event) = &verdict {
                seen.insert(event.id.clone(), event.occurred_at);
            }
            verdict
        };

        let event = match verdict {
            Eligibility::Suppress(reason) => {
                tracing::debug!(alert_id = %record.id, %reason, "alert suppressed");
                self.emit(Event::AlertSuppressed {
                    alert_id: record.id,
                    reason,
                    at: now,
                });
                return;
            }
            Eligibility::Deliver(event) => event,
        };

        if !self.settings.notifications_enabled {
            tracing::info!(alert_id = %event.id, category = %event.category, "notifications disabled, alert not posted");
            self.emit(Event::AlertWithheld {
                alert_id: event.id,
                category: event.category,
                at: now,
            });
            return;
        }

        let posted = self.dispatcher.dispatch(&event);
        let vibrated = self.settings.haptics_enabled
            && self.haptics.trigger(
                &Waveform::emergency(self.settings.repeat_waveform),
                self.settings.vibration_cutoff,
            );

        match posted {
            Ok(notification) => {
                tracing::info!(
                    alert_id = %event.id,
                    category = %event.category,
                    notification_id = notification.id,
                    vibrated,
                    "alert delivered"
                );
                self.emit(Event::AlertDelivered {
                    alert_id: event.id,
                    category: event.category,
                    notification_id: notification.id,
                    vibrated,
                    at: now,
                });
            }
            Err(err) => {
                tracing::error!(alert_id = %event.id, error = %err, "alert not posted");
                self.emit(Event::NotifierFailed {
                    alert_id: event.id,
                    error: err.to_string(),
                    at: now,
                });
            }
        }
    }
}

enum PumpExit {
    Shutdown,
    Ended,
}

/// Runs the pump on its own task and reports an exit nobody asked for.
async fn watch_pump(
    supervisor: Supervisor,
    subscription_id: Uuid,
    subscription: AlertSubscription,
    shutdown: oneshot::Receiver<()>,
) {
    let task = tokio::spawn(pump(
        Arc::clone(&supervisor.inner),
        subscription,
        shutdown,
    ));
    match task.await {
        Ok(PumpExit::Shutdown) => return,
        Ok(PumpExit::Ended) => {}
        Err(e) => {
            tracing::error!(subscription = %subscription_id, error = %e, "delivery pump panicked");
        }
    }
    // Detached: close() joins this task while holding the slot lock.
    tokio::spawn(async move { supervisor.pump_exited(subscription_id).await });
}

async fn pump(
    inner: Arc<Inner>,
    mut subscription: AlertSubscription,
    mut shutdown: oneshot::Receiver<()>,
) -> PumpExit {
    let exit = loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break PumpExit::Shutdown,
            next = subscription.next() => match next {
                Some(Ok(record)) => inner.deliver(record),
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "alert stream interrupted");
                    inner.emit(Event::StreamInterrupted {
                        error: err.to_string(),
                        at: inner.deps.clock.now(),
                    });
                }
                None => {
                    tracing::warn!("alert stream ended");
                    break PumpExit::Ended;
                }
            },
        }
    };
    subscription.close();
    exit
}
