//! Change Feed Supervisor.
//!
//! Owns at most one live subscription for the signed-in user and guarantees a
//! reconciliation pass happens within a bounded time even when the push
//! channel is degraded:
//!
//! - `Subscribed` moves the channel to [`ChannelState::Live`] and stops
//!   fallback polling.
//! - `Error`, `TimedOut` and `Closed` leave `Live`, request one reconciliation
//!   and start fallback polling.
//! - No confirmation within the connect timeout is treated like a failure.
//!
//! Every activation bumps an epoch. Events, poll ticks and timeouts carrying
//! an older epoch are dropped, so a torn-down subscription can never deliver
//! into its successor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::gateway::{ChangeFeed, FeedSink, SubscriptionHandle};
use crate::types::errors::SyncError;
use crate::types::feed::{ChannelState, ChannelStatus, FeedEvent, ReconcileTrigger};
use crate::types::settings::SyncSettings;

/// Caller-supplied, idempotent "refresh everything relevant" hook.
pub type ReconcileCallback = Arc<dyn Fn(ReconcileTrigger) + Send + Sync>;

/// A background timer task. Cancelled when dropped.
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn spawn<F>(runtime: &Handle, future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            task: runtime.spawn(future),
        }
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct SupervisorInner {
    epoch: u64,
    user_id: Option<String>,
    callback: Option<ReconcileCallback>,
    state: ChannelState,
    subscription: Option<Box<dyn SubscriptionHandle>>,
    poll_timer: Option<TimerHandle>,
    connect_timer: Option<TimerHandle>,
    runtime: Option<Handle>,
    foreground: bool,
}

impl SupervisorInner {
    /// Cancels both timers and detaches the subscription, returning it so the
    /// caller can close it after releasing the lock.
    fn teardown(&mut self) -> Option<Box<dyn SubscriptionHandle>> {
        self.epoch += 1;
        if let Some(timer) = self.poll_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.connect_timer.take() {
            timer.cancel();
        }
        self.state = ChannelState::Disconnected;
        self.subscription.take()
    }

    fn start_polling(&mut self, shared: &Weak<Mutex<SupervisorInner>>, interval: Duration) {
        if self.poll_timer.is_some() {
            return;
        }
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => return,
        };
        info!(interval_ms = interval.as_millis() as u64, "starting fallback polling");
        self.poll_timer = Some(TimerHandle::spawn(
            &runtime,
            poll_loop(shared.clone(), self.epoch, interval),
        ));
    }

    fn stop_polling(&mut self) {
        if let Some(timer) = self.poll_timer.take() {
            info!("stopping fallback polling");
            timer.cancel();
        }
    }
}

fn lock(inner: &Mutex<SupervisorInner>) -> MutexGuard<'_, SupervisorInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Invokes the callback once per interval while `epoch` is current.
async fn poll_loop(shared: Weak<Mutex<SupervisorInner>>, epoch: u64, interval: Duration) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let callback = match shared.upgrade() {
            Some(inner) => {
                let guard = lock(&inner);
                if guard.epoch != epoch {
                    return;
                }
                guard.callback.clone()
            }
            None => return,
        };
        debug!("fallback poll tick");
        if let Some(callback) = callback {
            callback(ReconcileTrigger::Poll);
        }
    }
}

/// Falls back to polling if the channel has not gone live by `timeout`.
async fn connect_watchdog(
    shared: Weak<Mutex<SupervisorInner>>,
    epoch: u64,
    timeout: Duration,
    poll_interval: Duration,
) {
    time::sleep(timeout).await;
    let callback = match shared.upgrade() {
        Some(inner) => {
            let mut guard = lock(&inner);
            if guard.epoch != epoch || guard.state == ChannelState::Live {
                return;
            }
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "change feed not confirmed in time"
            );
            guard.state = ChannelState::Disconnected;
            guard.start_polling(&shared, poll_interval);
            guard.callback.clone()
        }
        None => return,
    };
    if let Some(callback) = callback {
        callback(ReconcileTrigger::ChannelFailure);
    }
}

fn handle_event(
    shared: &Weak<Mutex<SupervisorInner>>,
    epoch: u64,
    poll_interval: Duration,
    event: FeedEvent,
) {
    let inner = match shared.upgrade() {
        Some(inner) => inner,
        None => return,
    };
    let fire = {
        let mut guard = lock(&inner);
        if guard.epoch != epoch {
            debug!("dropping event from a closed subscription");
            return;
        }
        let trigger = match event {
            FeedEvent::Status(ChannelStatus::Subscribed) => {
                info!(user_id = ?guard.user_id, "change feed live");
                guard.state = ChannelState::Live;
                if let Some(timer) = guard.connect_timer.take() {
                    timer.cancel();
                }
                guard.stop_polling();
                None
            }
            FeedEvent::Status(status) => {
                let already_degraded =
                    guard.state == ChannelState::Disconnected && guard.poll_timer.is_some();
                warn!(?status, "change feed left live state");
                guard.state = ChannelState::Disconnected;
                if let Some(timer) = guard.connect_timer.take() {
                    timer.cancel();
                }
                guard.start_polling(shared, poll_interval);
                if already_degraded {
                    None
                } else {
                    Some(ReconcileTrigger::ChannelFailure)
                }
            }
            FeedEvent::Changes(batch) => {
                if guard.state == ChannelState::Live && !batch.is_empty() {
                    debug!(changes = batch.len(), "change batch received");
                    Some(ReconcileTrigger::Change)
                } else {
                    debug!(state = ?guard.state, "ignoring change batch outside live state");
                    None
                }
            }
        };
        trigger.and_then(|t| guard.callback.clone().map(|cb| (cb, t)))
    };
    if let Some((callback, trigger)) = fire {
        callback(trigger);
    }
}

pub struct ChangeFeedSupervisor {
    feed: Arc<dyn ChangeFeed>,
    poll_interval: Duration,
    connect_timeout: Duration,
    inner: Arc<Mutex<SupervisorInner>>,
}

impl ChangeFeedSupervisor {
    pub fn new(feed: Arc<dyn ChangeFeed>, poll_interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            feed,
            poll_interval,
            connect_timeout,
            inner: Arc::new(Mutex::new(SupervisorInner {
                epoch: 0,
                user_id: None,
                callback: None,
                state: ChannelState::Disconnected,
                subscription: None,
                poll_timer: None,
                connect_timer: None,
                runtime: None,
                foreground: true,
            })),
        }
    }

    pub fn from_settings(feed: Arc<dyn ChangeFeed>, settings: &SyncSettings) -> Self {
        Self::new(feed, settings.poll_interval(), settings.connect_timeout())
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.inner).state
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner).poll_timer.is_some()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner).callback.is_some()
    }

    pub fn has_subscription(&self) -> bool {
        lock(&self.inner).subscription.is_some()
    }

    pub fn user_id(&self) -> Option<String> {
        lock(&self.inner).user_id.clone()
    }

    /// Opens the subscription for `user_id`, first tearing down any previous one.
    ///
    /// If the subscribe call itself fails the supervisor degrades to polling
    /// and the error is returned.
    pub async fn activate(&self, user_id: &str, callback: ReconcileCallback) -> Result<(), SyncError> {
        let weak = Arc::downgrade(&self.inner);
        let (epoch, previous) = {
            let mut inner = lock(&self.inner);
            let previous = inner.teardown();
            let runtime = Handle::current();
            inner.user_id = Some(user_id.to_string());
            inner.callback = Some(callback);
            inner.state = ChannelState::Connecting;
            inner.connect_timer = Some(TimerHandle::spawn(
                &runtime,
                connect_watchdog(weak.clone(), inner.epoch, self.connect_timeout, self.poll_interval),
            ));
            inner.runtime = Some(runtime);
            (inner.epoch, previous)
        };
        if let Some(mut previous) = previous {
            previous.unsubscribe();
            debug!("closed previous subscription before reopening");
        }

        let poll_interval = self.poll_interval;
        let sink_target = weak.clone();
        let sink: FeedSink = Arc::new(move |event| {
            handle_event(&sink_target, epoch, poll_interval, event);
        });

        let handle = match self.feed.subscribe(user_id, sink).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(user_id, error = %e, "subscribe failed, degrading to polling");
                let callback = {
                    let mut inner = lock(&self.inner);
                    if inner.epoch != epoch {
                        return Err(e.into());
                    }
                    inner.state = ChannelState::Disconnected;
                    if let Some(timer) = inner.connect_timer.take() {
                        timer.cancel();
                    }
                    inner.start_polling(&weak, poll_interval);
                    inner.callback.clone()
                };
                if let Some(callback) = callback {
                    callback(ReconcileTrigger::ChannelFailure);
                }
                return Err(e.into());
            }
        };

        let stale = {
            let mut inner = lock(&self.inner);
            if inner.epoch == epoch {
                inner.subscription = Some(handle);
                None
            } else {
                Some(handle)
            }
        };
        if let Some(mut stale) = stale {
            debug!("superseded while subscribing, closing new subscription");
            stale.unsubscribe();
        }
        Ok(())
    }

    /// Closes the subscription and cancels both timers. Safe from any state.
    pub fn deactivate(&self) {
        let subscription = {
            let mut inner = lock(&self.inner);
            let subscription = inner.teardown();
            inner.user_id = None;
            inner.callback = None;
            subscription
        };
        if let Some(mut subscription) = subscription {
            subscription.unsubscribe();
            info!("change feed deactivated");
        }
    }

    /// Records tab visibility. Coming back to the foreground always requests
    /// one reconciliation, whatever the channel state.
    pub fn set_visibility(&self, visible: bool) {
        let callback = {
            let mut inner = lock(&self.inner);
            let returned = visible && !inner.foreground;
            inner.foreground = visible;
            if returned {
                inner.callback.clone()
            } else {
                None
            }
        };
        if let Some(callback) = callback {
            debug!("foregrounded, reconciling");
            callback(ReconcileTrigger::Foreground);
        }
    }
}

impl Drop for ChangeFeedSupervisor {
    fn drop(&mut self) {
        self.deactivate();
    }
}
