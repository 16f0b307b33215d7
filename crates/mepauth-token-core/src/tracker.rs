//! Per-access-key signature failure tracking.
//!
//! ```text
//!            fail                       fail (counter < threshold)
//!   None ───────────► ValidationInProgress ◄───┐
//!    ▲                  │   │                  │
//!    │   success/expiry │   └──────────────────┘
//!    ├──────────────────┘   │ fail (counter == threshold)
//!    │                      ▼
//!    └──── expiry ──── UnderBlockList
//! ```
//!
//! Every entry owns one clear timer, a Tokio task that removes the entry when
//! its window elapses. The timer is always stopped before its entry is
//! replaced or removed, and each timer carries the generation of the entry it
//! was armed for, so a timer that loses the race against a state change finds
//! a newer generation and leaves the entry alone.
//!
//! Timers are spawned on the ambient Tokio runtime; state-changing methods
//! must be called from within one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tracking state of an access key. Absence from the tracker means no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AkState {
    /// At least one recent signature failure.
    ValidationInProgress,
    /// Too many recent failures; requests are refused.
    UnderBlockList,
}

/// Tracker windows and threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Lifetime of a `ValidationInProgress` entry.
    pub validation_window: Duration,
    /// Lifetime of an `UnderBlockList` entry.
    pub block_window: Duration,
    /// Consecutive failures that block-list an access key.
    pub block_threshold: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            validation_window: Duration::from_secs(300),
            block_window: Duration::from_secs(900),
            block_threshold: 3,
        }
    }
}

#[derive(Debug)]
struct AkSessionInfo {
    state: AkState,
    validate_counter: u32,
    generation: u64,
    clear_timer: JoinHandle<()>,
}

type SessionMap = Arc<Mutex<HashMap<String, AkSessionInfo>>>;

/// Tracks signature failures per access key and block-lists repeat offenders.
///
/// # Examples
///
/// ```
/// use mepauth_token_core::{AbuseTracker, AkState, TrackerConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let tracker = AbuseTracker::new(TrackerConfig::default());
/// for _ in 0..3 {
///     tracker.process_failed_signature("QVUJMSUMgS0VZLS0tLS0");
/// }
/// assert_eq!(tracker.state("QVUJMSUMgS0VZLS0tLS0"), Some(AkState::UnderBlockList));
/// # }
/// ```
#[derive(Debug)]
pub struct AbuseTracker {
    sessions: SessionMap,
    config: TrackerConfig,
    next_generation: AtomicU64,
}

impl AbuseTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Current state of `access_key`, `None` when untracked.
    #[must_use]
    pub fn state(&self, access_key: &str) -> Option<AkState> {
        self.sessions.lock().get(access_key).map(|info| info.state)
    }

    /// Whether `access_key` is block-listed.
    #[must_use]
    pub fn is_block_listed(&self, access_key: &str) -> bool {
        self.state(access_key) == Some(AkState::UnderBlockList)
    }

    /// Whether `access_key` has recent failures but is not block-listed.
    #[must_use]
    pub fn is_under_validation(&self, access_key: &str) -> bool {
        self.state(access_key) == Some(AkState::ValidationInProgress)
    }

    /// Number of recorded consecutive failures, zero when untracked.
    #[must_use]
    pub fn failure_count(&self, access_key: &str) -> u32 {
        self.sessions
            .lock()
            .get(access_key)
            .map_or(0, |info| info.validate_counter)
    }

    /// Record a signature mismatch for `access_key`.
    pub fn process_failed_signature(&self, access_key: &str) {
        let mut sessions = self.sessions.lock();

        let Some(info) = sessions.get_mut(access_key) else {
            let (state, window) = if self.config.block_threshold <= 1 {
                (AkState::UnderBlockList, self.config.block_window)
            } else {
                (AkState::ValidationInProgress, self.config.validation_window)
            };
            let generation = self.next_generation();
            let clear_timer = self.arm_clear_timer(access_key, generation, window);
            sessions.insert(
                access_key.to_owned(),
                AkSessionInfo {
                    state,
                    validate_counter: 1,
                    generation,
                    clear_timer,
                },
            );
            info!(access_key, ?state, "signature failure recorded for untracked access key");
            return;
        };

        match info.state {
            AkState::ValidationInProgress => {
                info.validate_counter += 1;
                if info.validate_counter >= self.config.block_threshold {
                    stop_timer(access_key, &info.clear_timer);
                    let generation = self.next_generation();
                    info.state = AkState::UnderBlockList;
                    info.generation = generation;
                    info.clear_timer =
                        self.arm_clear_timer(access_key, generation, self.config.block_window);
                    warn!(
                        access_key,
                        failures = info.validate_counter,
                        "access key block-listed"
                    );
                } else {
                    info!(
                        access_key,
                        failures = info.validate_counter,
                        "signature failure recorded"
                    );
                }
            }
            AkState::UnderBlockList => {
                debug!(access_key, "access key already block-listed");
            }
        }
    }

    /// Forget the failures of `access_key` after a successful verification.
    ///
    /// Block-listed keys stay blocked until their window elapses.
    pub fn clear_on_success(&self, access_key: &str) {
        let mut sessions = self.sessions.lock();
        if !matches!(
            sessions.get(access_key),
            Some(info) if info.state == AkState::ValidationInProgress
        ) {
            return;
        }
        if let Some(info) = sessions.remove(access_key) {
            stop_timer(access_key, &info.clear_timer);
            debug!(access_key, "validation state cleared");
        }
    }

    /// Stop every clear timer and forget all entries.
    pub fn shutdown(&self) {
        let mut sessions = self.sessions.lock();
        for (access_key, info) in sessions.drain() {
            stop_timer(&access_key, &info.clear_timer);
        }
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    fn arm_clear_timer(&self, access_key: &str, generation: u64, window: Duration) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let access_key = access_key.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let mut sessions = sessions.lock();
            match sessions.get(&access_key) {
                Some(info) if info.generation == generation => {
                    let state = info.state;
                    sessions.remove(&access_key);
                    info!(access_key = %access_key, ?state, "tracking window elapsed, access key cleared");
                }
                _ => {
                    debug!(access_key = %access_key, generation, "stale clear timer fired, ignoring");
                }
            }
        })
    }
}

impl Drop for AbuseTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop_timer(access_key: &str, timer: &JoinHandle<()>) {
    if timer.is_finished() {
        debug!(access_key, "clear timer already fired");
    } else {
        timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AK: &str = "QVUJMSUMgS0VZLS0tLS0";

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_start_validation_on_first_failure() {
        let tracker = AbuseTracker::new(TrackerConfig::default());
        assert_eq!(tracker.state(AK), None);

        tracker.process_failed_signature(AK);
        assert!(tracker.is_under_validation(AK));
        assert_eq!(tracker.failure_count(AK), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_block_list_after_threshold() {
        let tracker = AbuseTracker::new(TrackerConfig::default());
        tracker.process_failed_signature(AK);
        tracker.process_failed_signature(AK);
        assert!(tracker.is_under_validation(AK));

        tracker.process_failed_signature(AK);
        assert!(tracker.is_block_listed(AK));

        tracker.process_failed_signature(AK);
        assert!(tracker.is_block_listed(AK));
        assert_eq!(tracker.failure_count(AK), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_clear_validation_after_window() {
        let tracker = AbuseTracker::new(TrackerConfig::default());
        tracker.process_failed_signature(AK);

        advance(299).await;
        assert!(tracker.is_under_validation(AK));

        advance(2).await;
        assert_eq!(tracker.state(AK), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_keep_block_for_block_window_not_validation_window() {
        let tracker = AbuseTracker::new(TrackerConfig::default());
        tracker.process_failed_signature(AK);
        advance(200).await;
        tracker.process_failed_signature(AK);
        tracker.process_failed_signature(AK);

        // The validation timer armed at t=0 would have fired at t=300.
        advance(200).await;
        assert!(tracker.is_block_listed(AK));

        advance(699).await;
        assert!(tracker.is_block_listed(AK));

        advance(2).await;
        assert_eq!(tracker.state(AK), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_clear_on_success_and_restart_count() {
        let tracker = AbuseTracker::new(TrackerConfig::default());
        tracker.process_failed_signature(AK);
        tracker.clear_on_success(AK);
        assert_eq!(tracker.state(AK), None);

        tracker.process_failed_signature(AK);
        tracker.process_failed_signature(AK);
        assert!(tracker.is_under_validation(AK));
        assert_eq!(tracker.failure_count(AK), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_not_clear_block_on_success() {
        let tracker = AbuseTracker::new(TrackerConfig::default());
        for _ in 0..3 {
            tracker.process_failed_signature(AK);
        }
        tracker.clear_on_success(AK);
        assert!(tracker.is_block_listed(AK));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_not_let_cleared_entry_timer_remove_new_entry() {
        let tracker = AbuseTracker::new(TrackerConfig::default());
        tracker.process_failed_signature(AK);
        advance(100).await;
        tracker.clear_on_success(AK);
        tracker.process_failed_signature(AK);

        // First entry's window would end at t=300; the new one ends at t=400.
        advance(250).await;
        assert!(tracker.is_under_validation(AK));

        advance(51).await;
        assert_eq!(tracker.state(AK), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_track_access_keys_independently() {
        let tracker = AbuseTracker::new(TrackerConfig {
            block_threshold: 1,
            ..TrackerConfig::default()
        });
        tracker.process_failed_signature("ak-one");
        assert!(tracker.is_block_listed("ak-one"));
        assert_eq!(tracker.state("ak-two"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_forget_everything_on_shutdown() {
        let tracker = AbuseTracker::new(TrackerConfig::default());
        tracker.process_failed_signature("ak-one");
        tracker.process_failed_signature("ak-two");

        tracker.shutdown();
        assert_eq!(tracker.state("ak-one"), None);
        assert_eq!(tracker.state("ak-two"), None);
    }

    fn short_windows(block_threshold: u32) -> TrackerConfig {
        TrackerConfig {
            validation_window: Duration::from_millis(100),
            block_window: Duration::from_millis(500),
            block_threshold,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_count_concurrent_failures_into_one_entry() {
        let tracker = Arc::new(AbuseTracker::new(short_windows(3)));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move { tracker.process_failed_signature(AK) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        {
            let sessions = tracker.sessions.lock();
            assert_eq!(sessions.len(), 1);
            let info = &sessions[AK];
            assert_eq!(info.state, AkState::UnderBlockList);
            assert_eq!(info.validate_counter, 3);
            assert!(!info.clear_timer.is_finished());
        }

        // Past the validation window the aborted validation timer must not clear the block.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(tracker.is_block_listed(AK));

        tokio::time::sleep(Duration::from_millis(750)).await;
        assert_eq!(tracker.state(AK), None);
        assert!(tracker.sessions.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_leave_no_stray_entry_when_success_races_failures() {
        let tracker = Arc::new(AbuseTracker::new(short_windows(u32::MAX)));

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        tracker.process_failed_signature(AK);
                    } else {
                        tracker.clear_on_success(AK);
                    }
                    tokio::task::yield_now().await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        {
            let sessions = tracker.sessions.lock();
            assert!(sessions.len() <= 1);
            if let Some(info) = sessions.get(AK) {
                assert_eq!(info.state, AkState::ValidationInProgress);
                assert!(info.validate_counter >= 1);
                assert!(!info.clear_timer.is_finished());
            }
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(tracker.state(AK), None);
        assert!(tracker.sessions.lock().is_empty());
    }
}

