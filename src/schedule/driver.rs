use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ScheduleConfig;
use crate::error::{PipelineError, PipelineResult, SessionFailure};

use super::times::{advance_after_run, next_due_at_or_after, parse_schedule, Clock, SystemClock};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DriverState {
    Idle,
    Waiting,
    Running,
    Stopped,
}

/// Work the driver fires. Called on a blocking thread, one call at a time.
pub trait ScheduledJob: Send + 'static {
    fn run_session(&mut self, due: NaiveDateTime) -> Result<(), SessionFailure>;

    fn capture_timelapse(&mut self) -> PipelineResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    pub sessions_run: u64,
    pub sessions_failed: u64,
    pub triggers_skipped: u64,
    pub timelapse_frames: u64,
}

pub struct ScheduleDriver<J: ScheduledJob> {
    schedule: Vec<NaiveTime>,
    poll_interval: Duration,
    timelapse_interval: Option<chrono::Duration>,
    capture_on_start: bool,
    job: Arc<Mutex<J>>,
    clock: Arc<dyn Clock>,
    state_tx: watch::Sender<DriverState>,
}

impl<J: ScheduledJob> ScheduleDriver<J> {
    pub fn new(config: &ScheduleConfig, job: J) -> PipelineResult<Self> {
        Self::with_clock(config, job, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &ScheduleConfig, job: J, clock: Arc<dyn Clock>) -> PipelineResult<Self> {
        let schedule = parse_schedule(&config.times)?;
        if config.poll_interval_secs == 0 {
            return Err(PipelineError::config_invalid(
                "schedule.poll_interval_secs must be positive",
            ));
        }
        let (state_tx, _) = watch::channel(DriverState::Idle);

        Ok(Self {
            schedule,
            poll_interval: config.poll_interval(),
            timelapse_interval: config
                .timelapse_interval_minutes
                .map(|minutes| chrono::Duration::minutes(minutes as i64)),
            capture_on_start: config.capture_on_start,
            job: Arc::new(Mutex::new(job)),
            clock,
            state_tx,
        })
    }

    /// Overrides the poll granularity (tests, debug mode).
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<DriverState> {
        self.state_tx.subscribe()
    }

    /// Runs until `cancel` fires. Cancellation is only observed between runs,
    /// so an in-flight session always completes and releases the camera.
    pub async fn run(self, cancel: CancellationToken) -> DriverStats {
        let mut stats = DriverStats::default();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let now = self.clock.now().naive_local();
        let mut next_due = next_due_at_or_after(&self.schedule, now);
        let mut next_timelapse = self.timelapse_interval.map(|every| now + every);

        log_info!(
            "schedule driver started: {} daily trigger(s), next session due {}",
            self.schedule.len(),
            next_due
        );

        if self.capture_on_start && !cancel.is_cancelled() {
            self.fire_session(now, &mut stats).await;
        }
        self.set_state(DriverState::Waiting);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log_info!("schedule driver received stop signal");
                    break;
                }
                _ = ticker.tick() => {
                    let now = self.clock.now().naive_local();

                    if now >= next_due {
                        let due = next_due;
                        self.fire_session(due, &mut stats).await;

                        let finished = self.clock.now().naive_local();
                        let (next, skipped) = advance_after_run(&self.schedule, due, finished);
                        if skipped > 0 {
                            log_warn!(
                                "skipped {} trigger(s) that fell due while the {} session was running",
                                skipped,
                                due
                            );
                            stats.triggers_skipped += skipped as u64;
                        }
                        next_due = next;
                        log_info!("next session due {}", next_due);
                    } else if let (Some(due), Some(every)) = (next_timelapse, self.timelapse_interval) {
                        if now >= due {
                            self.fire_timelapse(&mut stats).await;
                            next_timelapse = Some(self.clock.now().naive_local() + every);
                        }
                    }
                }
            }
        }

        self.set_state(DriverState::Stopped);
        log_info!(
            "schedule driver stopped: {} session(s), {} failed, {} skipped trigger(s)",
            stats.sessions_run,
            stats.sessions_failed,
            stats.triggers_skipped
        );
        stats
    }

    async fn fire_session(&self, due: NaiveDateTime, stats: &mut DriverStats) {
        self.set_state(DriverState::Running);
        let started = Instant::now();
        log_info!("session triggered for {}", due);

        let job = Arc::clone(&self.job);
        let outcome = tokio::task::spawn_blocking(move || {
            let mut guard = job.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.run_session(due)
        })
        .await;

        stats.sessions_run += 1;
        match outcome {
            Ok(Ok(())) => log_info!(
                "session for {} finished in {}ms",
                due,
                started.elapsed().as_millis()
            ),
            Ok(Err(failure)) => {
                stats.sessions_failed += 1;
                log_error!(
                    "session for {} failed ({}): {}; waiting for next trigger",
                    due,
                    failure.kind(),
                    failure
                );
            }
            Err(join_err) => {
                stats.sessions_failed += 1;
                log_error!("session worker for {} aborted: {join_err}", due);
            }
        }
        self.set_state(DriverState::Waiting);
    }

    async fn fire_timelapse(&self, stats: &mut DriverStats) {
        self.set_state(DriverState::Running);
        let job = Arc::clone(&self.job);
        let outcome = tokio::task::spawn_blocking(move || {
            let mut guard = job.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.capture_timelapse()
        })
        .await;

        match outcome {
            Ok(Ok(())) => stats.timelapse_frames += 1,
            Ok(Err(err)) => log_warn!("timelapse capture failed ({}): {err}", err.kind()),
            Err(join_err) => log_error!("timelapse worker aborted: {join_err}"),
        }
        self.set_state(DriverState::Waiting);
    }

    fn set_state(&self, state: DriverState) {
        self.state_tx.send_replace(state);
    }
}

/// Owns a running driver task, mirroring start/stop of a background loop.
pub struct DriverHandle {
    handle: Option<JoinHandle<DriverStats>>,
    cancel: CancellationToken,
    state: watch::Receiver<DriverState>,
}

impl DriverHandle {
    pub fn spawn<J: ScheduledJob>(driver: ScheduleDriver<J>) -> Self {
        let cancel = CancellationToken::new();
        let state = driver.subscribe();
        let handle = tokio::spawn(driver.run(cancel.clone()));
        Self {
            handle: Some(handle),
            cancel,
            state,
        }
    }

    pub fn state(&self) -> DriverState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<DriverState> {
        self.state.clone()
    }

    /// Signals stop and waits for the in-flight session, if any, to finish.
    pub async fn stop(&mut self) -> Result<DriverStats> {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.context("schedule driver task failed to join"),
            None => bail!("schedule driver already stopped"),
        }
    }
}
