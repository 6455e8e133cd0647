//! End-to-end supervisor scenarios over the in-memory feed, notifier and
//! vibrator.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use common::Harness;
use guardian_core::alert::{AlertCategory, AlertRecord, Locale, Urgency};
use guardian_core::notifier::{ChannelSpec, INDICATOR_ID};
use guardian_core::stream::{FeedQuery, FeedSubscription};
use guardian_core::{
    AlertFeed, CoreError, Dependencies, Event, Input, LocalIdentity, MemoryFeed, MemoryNotifier,
    NotificationRecord, Notifier, ServiceState, StaticIdentity, Supervisor, SupervisorSettings,
    SuppressReason,
};
use tokio::sync::mpsc;
use uuid::Uuid;

fn suppressed(event: &Event) -> Option<SuppressReason> {
    match event {
        Event::AlertSuppressed { reason, .. } => Some(*reason),
        _ => None,
    }
}

#[tokio::test]
async fn own_alert_is_never_posted() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();

    h.feed
        .publish(h.alert("mine", AlertCategory::Fire).with_author("u1"));

    let outcome = h.next_alert_outcome().await;
    assert_eq!(suppressed(&outcome), Some(SuppressReason::OwnAlert));
    assert!(h.notifier.alerts().is_empty());
    assert_eq!(h.vibrator.vibrations(), 0);
}

#[tokio::test]
async fn robbery_from_someone_else_is_delivered_with_maximum_urgency() {
    let mut h = Harness::with_settings(SupervisorSettings {
        locale: Locale::En,
        ..SupervisorSettings::default()
    });
    h.supervisor.start().await.unwrap();

    h.feed.publish(
        h.alert("r1", AlertCategory::Robbery)
            .with_description("Test")
            .sharing_location(true)
            .anonymous(true),
    );

    match h.next_alert_outcome().await {
        Event::AlertDelivered {
            alert_id,
            category,
            vibrated,
            ..
        } => {
            assert_eq!(alert_id, "r1");
            assert_eq!(category, AlertCategory::Robbery);
            assert!(vibrated);
        }
        other => panic!("expected delivery, got {other:?}"),
    }

    let alerts = h.notifier.alerts();
    assert_eq!(alerts.len(), 1);
    let spec = &alerts[0].spec;
    assert_eq!(spec.title, "🚨 Robbery Reported");
    assert_eq!(spec.body, "Test\n📍 Location included\n👤 Anonymous report");
    assert_eq!(spec.urgency, Urgency::Maximum);
    assert_eq!(spec.timeout_ms, Some(30_000));
    assert_eq!(h.vibrator.vibrations(), 1);
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let h = Harness::new();

    h.supervisor.start().await.unwrap();
    h.supervisor.start().await.unwrap();
    assert_eq!(h.feed.total_subscriptions(), 1);
    assert_eq!(h.feed.open_subscriptions(), 1);
    assert!(h.supervisor.is_running());

    h.supervisor.stop().await.unwrap();
    h.supervisor.stop().await.unwrap();
    assert_eq!(h.supervisor.state().await, ServiceState::Stopped);
    assert_eq!(h.feed.open_subscriptions(), 0);
    assert_eq!(h.notifier.withdrawn().len(), 1);
    assert!(!h.notifier.indicator_visible());
}

#[tokio::test]
async fn killed_service_heals_itself() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();

    let state = h.supervisor.handle(Input::Killed).await.unwrap();
    assert_eq!(state, ServiceState::Running);

    h.wait_for(|e| matches!(e, Event::ServiceStopped { trigger: Input::Killed, .. }))
        .await;
    h.wait_for(|e| matches!(e, Event::SelfHealed { .. })).await;

    assert!(h.supervisor.is_running());
    assert_eq!(h.feed.total_subscriptions(), 2);
    assert_eq!(h.feed.open_subscriptions(), 1);
    assert!(h.notifier.indicator_visible());
}

#[tokio::test]
async fn failed_restart_waits_for_reconciliation() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();

    h.feed.refuse_subscriptions(Some("network down"));
    let err = h.supervisor.handle(Input::Killed).await.unwrap_err();
    assert!(matches!(err, CoreError::RestartFailed { .. }));
    h.wait_for(|e| matches!(e, Event::RestartFailed { .. })).await;
    assert!(!h.supervisor.is_running());
    assert_eq!(h.supervisor.state().await, ServiceState::Stopped);

    h.feed.refuse_subscriptions(None);
    assert!(h.supervisor.reconcile().await.unwrap());
    assert!(h.supervisor.is_running());
    match h
        .wait_for(|e| matches!(e, Event::ReconciliationRan { .. }))
        .await
    {
        Event::ReconciliationRan {
            was_running,
            restarted,
            ..
        } => {
            assert!(!was_running);
            assert!(restarted);
        }
        _ => unreachable!(),
    }

    // Already running: nothing to do.
    assert!(!h.supervisor.reconcile().await.unwrap());
    assert_eq!(h.feed.total_subscriptions(), 2);
}

#[tokio::test]
async fn replayed_snapshot_after_restart_is_not_posted_twice() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();
    h.feed.publish(h.alert("a1", AlertCategory::Assistance));
    assert!(matches!(
        h.next_alert_outcome().await,
        Event::AlertDelivered { .. }
    ));

    h.supervisor.handle(Input::Killed).await.unwrap();

    let outcome = h.next_alert_outcome().await;
    assert_eq!(suppressed(&outcome), Some(SuppressReason::AlreadyViewed));
    assert_eq!(h.notifier.alerts().len(), 1);
}

#[tokio::test]
async fn viewed_alert_is_suppressed() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();
    h.feed
        .publish(h.alert("v1", AlertCategory::VialEmergency).viewed_by("u1"));
    assert_eq!(
        suppressed(&h.next_alert_outcome().await),
        Some(SuppressReason::AlreadyViewed)
    );
}

#[tokio::test]
async fn staleness_uses_the_clock_at_delivery() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();

    let record = h
        .alert("late", AlertCategory::Fire)
        .at(h.now() - Duration::minutes(59));
    h.clock.advance(Duration::minutes(2));
    h.feed.publish(record);

    assert_eq!(
        suppressed(&h.next_alert_outcome().await),
        Some(SuppressReason::Stale)
    );
}

#[tokio::test]
async fn sign_out_takes_effect_on_the_next_alert() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();
    h.identity.sign_out();
    h.feed.publish(h.alert("x", AlertCategory::GeneralEmergency));
    assert_eq!(
        suppressed(&h.next_alert_outcome().await),
        Some(SuppressReason::NoIdentity)
    );
}

#[tokio::test]
async fn untyped_alert_is_dropped() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();
    let mut record = h.alert("t", AlertCategory::Fire);
    record.alert_type = Some("SOMETHING_ELSE".into());
    h.feed.publish(record);
    assert_eq!(
        suppressed(&h.next_alert_outcome().await),
        Some(SuppressReason::MissingType)
    );
}

#[tokio::test]
async fn stream_interruption_keeps_the_subscription() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();

    h.feed.fail("backend unavailable");
    h.wait_for(|e| matches!(e, Event::StreamInterrupted { .. }))
        .await;

    h.feed.publish(h.alert("after", AlertCategory::Unsafety));
    assert!(matches!(
        h.next_alert_outcome().await,
        Event::AlertDelivered { .. }
    ));
    assert_eq!(h.feed.open_subscriptions(), 1);
    assert!(h.supervisor.is_running());
}

#[tokio::test]
async fn notifier_failure_is_contained() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();

    h.notifier.fail_posts(true);
    h.feed.publish(h.alert("n1", AlertCategory::PhysicalRisk));
    assert!(matches!(
        h.next_alert_outcome().await,
        Event::NotifierFailed { .. }
    ));
    assert_eq!(h.vibrator.vibrations(), 1);

    h.notifier.fail_posts(false);
    h.feed.publish(h.alert("n2", AlertCategory::PhysicalRisk));
    assert!(matches!(
        h.next_alert_outcome().await,
        Event::AlertDelivered { .. }
    ));
    assert_eq!(h.notifier.alerts().len(), 1);
    assert!(h.supervisor.is_running());
}

#[tokio::test]
async fn haptics_can_be_disabled() {
    let mut h = Harness::with_settings(SupervisorSettings {
        haptics_enabled: false,
        ..SupervisorSettings::default()
    });
    h.supervisor.start().await.unwrap();
    h.feed.publish(h.alert("q", AlertCategory::PublicServicesEmergency));
    match h.next_alert_outcome().await {
        Event::AlertDelivered { vibrated, .. } => assert!(!vibrated),
        other => panic!("expected delivery, got {other:?}"),
    }
    assert_eq!(h.vibrator.vibrations(), 0);
}

#[tokio::test]
async fn nothing_is_read_after_stop() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();
    h.supervisor.stop().await.unwrap();

    h.feed.publish(h.alert("late", AlertCategory::Fire));
    tokio::task::yield_now().await;

    assert!(h.notifier.alerts().is_empty());
    assert!(matches!(
        h.events.try_recv(),
        Ok(Event::ServiceStarted { .. })
    ));
    assert!(matches!(
        h.events.try_recv(),
        Ok(Event::ServiceStopped { trigger: Input::Stop, .. })
    ));
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn task_removed_restarts_a_stopped_service() {
    let h = Harness::new();
    let state = h.supervisor.handle(Input::TaskRemoved).await.unwrap();
    assert_eq!(state, ServiceState::Running);
    let state = h.supervisor.handle(Input::TaskRemoved).await.unwrap();
    assert_eq!(state, ServiceState::Running);
    assert_eq!(h.feed.total_subscriptions(), 1);
}

#[tokio::test]
async fn feed_ending_the_stream_heals_the_service() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();

    h.feed.end_streams();
    h.wait_for(|e| matches!(e, Event::StreamEnded { .. })).await;
    h.wait_for(|e| matches!(e, Event::ServiceStopped { trigger: Input::Killed, .. }))
        .await;
    h.wait_for(|e| matches!(e, Event::SelfHealed { .. })).await;

    assert!(h.supervisor.is_running());
    assert_eq!(h.feed.total_subscriptions(), 2);
    assert_eq!(h.feed.open_subscriptions(), 1);

    h.feed.publish(h.alert("after-end", AlertCategory::Fire));
    assert!(matches!(
        h.next_alert_outcome().await,
        Event::AlertDelivered { .. }
    ));
}

#[tokio::test]
async fn ended_stream_with_failed_restart_is_left_to_reconciliation() {
    let mut h = Harness::new();
    h.supervisor.start().await.unwrap();

    h.feed.refuse_subscriptions(Some("offline"));
    h.feed.end_streams();
    h.wait_for(|e| matches!(e, Event::RestartFailed { trigger: Input::Killed, .. }))
        .await;
    assert!(!h.supervisor.is_running());
    assert_eq!(h.supervisor.state().await, ServiceState::Stopped);
    assert!(!h.notifier.indicator_visible());

    h.feed.refuse_subscriptions(None);
    assert!(h.supervisor.reconcile().await.unwrap());
    assert!(h.supervisor.is_running());
    assert_eq!(h.feed.total_subscriptions(), 2);
}

/// First subscription is already closed by the feed; later ones stay open.
#[derive(Default)]
struct ClosingFeed {
    subscriptions: AtomicUsize,
    live: Mutex<Vec<mpsc::UnboundedSender<guardian_core::stream::FeedMessage>>>,
}

impl AlertFeed for ClosingFeed {
    fn subscribe(&self, _query: FeedQuery) -> guardian_core::error::Result<FeedSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.subscriptions.fetch_add(1, Ordering::SeqCst) > 0 {
            self.live.lock().unwrap().push(tx);
        }
        Ok(FeedSubscription::new(Uuid::new_v4(), rx))
    }
}

#[tokio::test]
async fn subscription_closed_at_open_is_reopened() {
    let feed = Arc::new(ClosingFeed::default());
    let identity = Arc::new(StaticIdentity::signed_in(LocalIdentity::new("u1")));
    let supervisor = Supervisor::new(
        Dependencies::new(feed.clone(), identity, Arc::new(MemoryNotifier::new())),
        SupervisorSettings::default(),
    );
    let mut events = supervisor.subscribe_events();
    supervisor.start().await.unwrap();

    tokio::time::timeout(StdDuration::from_secs(2), async {
        loop {
            if let Ok(Event::SelfHealed { .. }) = events.recv().await {
                break;
            }
        }
    })
    .await
    .unwrap();

    assert!(supervisor.is_running());
    assert_eq!(supervisor.state().await, ServiceState::Running);
    assert_eq!(feed.subscriptions.load(Ordering::SeqCst), 2);
    // Healthy again, so reconciliation has nothing to do.
    assert!(!supervisor.reconcile().await.unwrap());
}

/// Blocks every alert post until the test releases it.
struct GatedNotifier {
    inner: MemoryNotifier,
    entered: Mutex<std_mpsc::Sender<()>>,
    release: Mutex<std_mpsc::Receiver<()>>,
}

impl Notifier for GatedNotifier {
    fn declare_channel(&self, channel: &ChannelSpec) -> guardian_core::error::Result<()> {
        self.inner.declare_channel(channel)
    }

    fn post(&self, record: &NotificationRecord) -> guardian_core::error::Result<()> {
        if record.id != INDICATOR_ID {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self
                .release
                .lock()
                .unwrap()
                .recv_timeout(StdDuration::from_secs(5));
        }
        self.inner.post(record)
    }

    fn withdraw(&self, id: i32) -> guardian_core::error::Result<()> {
        self.inner.withdraw(id)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_lets_an_alert_in_dispatch_finish() {
    let (entered_tx, entered_rx) = std_mpsc::channel();
    let (release_tx, release_rx) = std_mpsc::channel();
    let notifier = Arc::new(GatedNotifier {
        inner: MemoryNotifier::new(),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let feed = Arc::new(MemoryFeed::new());
    let identity = Arc::new(StaticIdentity::signed_in(LocalIdentity::new("u1")));
    let supervisor = Supervisor::new(
        Dependencies::new(feed.clone(), identity, notifier.clone()),
        SupervisorSettings::default(),
    );
    let mut events = supervisor.subscribe_events();
    supervisor.start().await.unwrap();

    feed.publish(
        AlertRecord::new("in-flight")
            .with_category(AlertCategory::Fire)
            .with_author("u2")
            .at(Utc::now()),
    );
    entered_rx
        .recv_timeout(StdDuration::from_secs(2))
        .expect("alert never reached the notifier");

    let stopping = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.stop().await }
    });
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(!stopping.is_finished(), "stop returned before dispatch finished");

    release_tx.send(()).unwrap();
    stopping.await.unwrap().unwrap();

    assert_eq!(notifier.inner.alerts().len(), 1);
    assert_eq!(feed.open_subscriptions(), 0);
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let delivered = seen
        .iter()
        .position(|e| matches!(e, Event::AlertDelivered { .. }))
        .expect("in-flight alert was dropped");
    let stopped = seen
        .iter()
        .position(|e| matches!(e, Event::ServiceStopped { .. }))
        .unwrap();
    assert!(delivered < stopped);
}

/// Panics on the first alert post, then behaves.
#[derive(Default)]
struct PanicOnceNotifier {
    inner: MemoryNotifier,
    panicked: std::sync::atomic::AtomicBool,
}

impl Notifier for PanicOnceNotifier {
    fn declare_channel(&self, channel: &ChannelSpec) -> guardian_core::error::Result<()> {
        self.inner.declare_channel(channel)
    }

    fn post(&self, record: &NotificationRecord) -> guardian_core::error::Result<()> {
        if record.id != INDICATOR_ID && !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("notifier blew up");
        }
        self.inner.post(record)
    }

    fn withdraw(&self, id: i32) -> guardian_core::error::Result<()> {
        self.inner.withdraw(id)
    }
}

#[tokio::test]
async fn panicked_pump_is_restarted() {
    let feed = Arc::new(MemoryFeed::new());
    let notifier = Arc::new(PanicOnceNotifier::default());
    let identity = Arc::new(StaticIdentity::signed_in(LocalIdentity::new("u1")));
    let supervisor = Supervisor::new(
        Dependencies::new(feed.clone(), identity, notifier.clone()),
        SupervisorSettings::default(),
    );
    let mut events = supervisor.subscribe_events();
    supervisor.start().await.unwrap();

    feed.publish(
        AlertRecord::new("boom")
            .with_category(AlertCategory::Robbery)
            .with_author("u2")
            .at(Utc::now()),
    );

    tokio::time::timeout(StdDuration::from_secs(2), async {
        loop {
            if let Ok(Event::SelfHealed { .. }) = events.recv().await {
                break;
            }
        }
    })
    .await
    .unwrap();
    assert!(supervisor.is_running());
    assert_eq!(feed.total_subscriptions(), 2);
    assert_eq!(feed.open_subscriptions(), 1);
}
