//! Haptic escalation.
//!
//! A trigger plays a waveform and arms a cutoff timer. When the timer fires
//! the vibrator is cancelled no matter what the waveform's repeat setting
//! says, so a misbehaving platform can't leave the device buzzing. A newer
//! trigger aborts the older cutoff before arming its own.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::alert::EMERGENCY_WAVEFORM;

pub const DEFAULT_CUTOFF: Duration = Duration::from_millis(7_000);

#[derive(Error, Debug)]
pub enum HapticError {
    /// No hardware, or the platform refused. Never surfaced past the
    /// controller.
    #[error("Vibrator unavailable: {0}")]
    VibratorUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waveform {
    /// Alternating off/on timings in milliseconds.
    pub timings_ms: Vec<u64>,
    /// Index to loop back to after the last timing; `None` plays once.
    pub repeat: Option<usize>,
}

impl Waveform {
    pub fn new(timings_ms: Vec<u64>, repeat: Option<usize>) -> Self {
        Self { timings_ms, repeat }
    }

    pub fn emergency(repeat: bool) -> Self {
        Self::new(EMERGENCY_WAVEFORM.to_vec(), repeat.then_some(0))
    }

    pub fn total(&self) -> Duration {
        Duration::from_millis(self.timings_ms.iter().sum())
    }
}

pub trait Vibrator: Send + Sync {
    fn has_vibrator(&self) -> bool;

    fn vibrate(&self, waveform: &Waveform) -> Result<(), HapticError>;

    fn cancel(&self);
}

/// A device without vibration hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVibrator;

impl Vibrator for NoVibrator {
    fn has_vibrator(&self) -> bool {
        false
    }

    fn vibrate(&self, _waveform: &Waveform) -> Result<(), HapticError> {
        Err(HapticError::VibratorUnavailable("no vibrator".into()))
    }

    fn cancel(&self) {}
}

/// Vibrator that tracks calls. `is_vibrating` is true between a vibrate and
/// the next cancel.
#[derive(Debug, Default)]
pub struct MemoryVibrator {
    vibrations: AtomicUsize,
    cancels: AtomicUsize,
    active: Mutex<Option<Waveform>>,
    fail: AtomicBool,
}

impl MemoryVibrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_vibrations(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn vibrations(&self) -> usize {
        self.vibrations.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn is_vibrating(&self) -> bool {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

impl Vibrator for MemoryVibrator {
    fn has_vibrator(&self) -> bool {
        true
    }

    fn vibrate(&self, waveform: &Waveform) -> Result<(), HapticError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HapticError::VibratorUnavailable("vibration refused".into()));
        }
        self.vibrations.fetch_add(1, Ordering::SeqCst);
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(waveform.clone());
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

pub struct HapticController {
    vibrator: Arc<dyn Vibrator>,
    cutoff: Mutex<Option<JoinHandle<()>>>,
}

impl HapticController {
    pub fn new(vibrator: Arc<dyn Vibrator>) -> Self {
        Self {
            vibrator,
            cutoff: Mutex::new(None),
        }
    }

    /// Play `waveform` and cancel it after `total`. Returns whether the
    /// vibrator accepted the waveform.
    pub fn trigger(&self, waveform: &Waveform, total: Duration) -> bool {
        if !self.vibrator.has_vibrator() {
            tracing::debug!("no vibrator, skipping haptics");
            return false;
        }

        let mut cutoff = self.cutoff.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = cutoff.take() {
            previous.abort();
        }

        let started = match self.vibrator.vibrate(waveform) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "vibration not started");
                false
            }
        };

        // Armed even when vibrate failed; the platform may have started anyway.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let vibrator = Arc::clone(&self.vibrator);
                *cutoff = Some(handle.spawn(async move {
                    tokio::time::sleep(total).await;
                    vibrator.cancel();
                    tracing::debug!(after_ms = total.as_millis() as u64, "vibration cut off");
                }));
            }
            Err(_) => {
                tracing::warn!("no runtime for vibration cutoff, cancelling immediately");
                self.vibrator.cancel();
            }
        }
        started
    }

    /// Stop vibrating now and drop any armed cutoff.
    pub fn cancel(&self) {
        if let Some(pending) = self
            .cutoff
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            pending.abort();
        }
        self.vibrator.cancel();
    }

    pub fn has_pending_cutoff(&self) -> bool {
        self.cutoff
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for HapticController {
    fn drop(&mut self) {
        if let Some(pending) = self
            .cutoff
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            pending.abort();
            self.vibrator.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (Arc<MemoryVibrator>, HapticController) {
        let vibrator = Arc::new(MemoryVibrator::new());
        let controller = HapticController::new(vibrator.clone());
        (vibrator, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn cutoff_cancels_even_a_repeating_waveform() {
        let (vibrator, haptics) = controller();
        assert!(haptics.trigger(&Waveform::emergency(true), Duration::from_secs(7)));
        assert!(vibrator.is_vibrating());

        tokio::time::sleep(Duration::from_millis(6_999)).await;
        assert!(vibrator.is_vibrating());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!vibrator.is_vibrating());
        assert_eq!(vibrator.cancels(), 1);
        assert!(!haptics.has_pending_cutoff());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_trigger_supersedes_older_cutoff() {
        let (vibrator, haptics) = controller();
        haptics.trigger(&Waveform::emergency(false), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(3)).await;
        haptics.trigger(&Waveform::emergency(false), Duration::from_secs(5));

        // The first cutoff would have fired at t=5s.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(vibrator.is_vibrating());
        assert_eq!(vibrator.cancels(), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!vibrator.is_vibrating());
        assert_eq!(vibrator.cancels(), 1);
        assert_eq!(vibrator.vibrations(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_hardware_is_a_silent_noop() {
        let haptics = HapticController::new(Arc::new(NoVibrator));
        assert!(!haptics.trigger(&Waveform::emergency(false), DEFAULT_CUTOFF));
        assert!(!haptics.has_pending_cutoff());
    }

    #[tokio::test(start_paused = true)]
    async fn refused_vibration_still_arms_the_cutoff() {
        let (vibrator, haptics) = controller();
        vibrator.fail_vibrations(true);
        assert!(!haptics.trigger(&Waveform::emergency(false), Duration::from_secs(1)));
        assert!(haptics.has_pending_cutoff());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(vibrator.cancels(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_stops_immediately() {
        let (vibrator, haptics) = controller();
        haptics.trigger(&Waveform::emergency(false), Duration::from_secs(10));
        haptics.cancel();
        assert!(!vibrator.is_vibrating());
        assert!(!haptics.has_pending_cutoff());
    }

    #[test]
    fn emergency_waveform_length() {
        assert_eq!(Waveform::emergency(false).total(), Duration::from_millis(7_000));
        assert_eq!(Waveform::emergency(true).repeat, Some(0));
    }

    #[test]
    fn trigger_outside_runtime_cancels_right_away() {
        let (vibrator, haptics) = controller();
        assert!(haptics.trigger(&Waveform::emergency(false), DEFAULT_CUTOFF));
        assert!(!vibrator.is_vibrating());
    }
}
