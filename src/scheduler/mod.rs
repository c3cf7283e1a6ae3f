//! Scheduler module: the serialized, jittered tick loop.
//!
//! ```text
//! Idle -> Armed -> Running -> Armed -> ... -> Cancelled
//! ```
//!
//! The next tick is armed only after the previous one has fully completed,
//! so two ticks never overlap. Cancellation stops the loop from arming again
//! but never interrupts a tick that is already running.

mod heartbeat;
mod tick;

pub use heartbeat::*;
pub use tick::*;

use rand::Rng;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Lower bound for any delay between two ticks.
pub const MIN_TICK_DELAY: Duration = Duration::from_millis(1_000);

/// Lifecycle of the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, loop not yet running
    Idle,
    /// Waiting for the next tick delay to elapse
    Armed,
    /// A tick callback is executing
    Running,
    /// Terminal; reached only through the handle
    Cancelled,
}

/// Compute a tick delay of `interval + offset * jitter`, floored at [`MIN_TICK_DELAY`].
///
/// `offset` is clamped to `[-1, 1]`.
pub fn jittered_delay(interval: Duration, jitter: Duration, offset: f64) -> Duration {
    let offset = offset.clamp(-1.0, 1.0);
    let ms = interval.as_millis() as f64 + jitter.as_millis() as f64 * offset;
    let floor = MIN_TICK_DELAY.as_millis() as f64;
    Duration::from_millis(ms.max(floor).round() as u64)
}

fn next_delay(interval: Duration, jitter: Duration) -> Duration {
    let offset: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
    jittered_delay(interval, jitter, offset)
}

/// Tick loop configuration.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    interval: Duration,
    jitter: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration, jitter: Duration) -> Self {
        Self { interval, jitter }
    }

    /// Spawn the tick loop and return the handle that controls it.
    ///
    /// Each invocation of `on_tick` runs in its own task; an `Err` or a panic,
    /// whether raised while building the future or while polling it, is
    /// logged and the loop carries on with its normal schedule.
    pub fn start<F, Fut, E>(self, on_tick: F) -> SchedulerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);

        tracing::info!(
            "Scheduler: starting with interval {:?} and jitter ±{:?}",
            self.interval,
            self.jitter
        );

        let task = tokio::spawn(run_tick_loop(self, on_tick, token.clone(), state_tx));

        SchedulerHandle {
            token,
            state: state_rx,
            task,
        }
    }
}

async fn run_tick_loop<F, Fut, E>(
    scheduler: Scheduler,
    mut on_tick: F,
    token: CancellationToken,
    state: watch::Sender<SchedulerState>,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    while !token.is_cancelled() {
        let delay = next_delay(scheduler.interval, scheduler.jitter);
        state.send_replace(SchedulerState::Armed);
        tracing::debug!("Scheduler: next tick in {:?}", delay);

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        state.send_replace(SchedulerState::Running);
        let tick = match panic::catch_unwind(AssertUnwindSafe(|| on_tick())) {
            Ok(tick) => tick,
            Err(payload) => {
                tracing::error!("Scheduler: tick panicked: {}", panic_message(&*payload));
                continue;
            }
        };
        match tokio::spawn(tick).await {
            Ok(Ok(())) => tracing::debug!("Scheduler: tick completed"),
            Ok(Err(e)) => tracing::error!("Scheduler: tick failed: {}", e),
            Err(e) => tracing::error!("Scheduler: tick task aborted: {}", e),
        }
    }

    state.send_replace(SchedulerState::Cancelled);
    tracing::info!("Scheduler: stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Control handle for a running tick loop.
pub struct SchedulerHandle {
    token: CancellationToken,
    state: watch::Receiver<SchedulerState>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop arming new ticks. A tick in progress runs to completion.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Wait for the loop to exit. Only returns once the handle has been cancelled.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}
