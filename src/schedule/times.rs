#[cfg(test)]
use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{PipelineError, PipelineResult};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Parses strict `HH:MM` strings into a sorted, duplicate-free schedule.
pub fn parse_schedule(times: &[String]) -> PipelineResult<Vec<NaiveTime>> {
    if times.is_empty() {
        return Err(PipelineError::config_invalid("schedule.times is empty"));
    }

    let mut parsed = Vec::with_capacity(times.len());
    for raw in times {
        let well_formed = raw.len() == 5
            && raw.as_bytes()[2] == b':'
            && raw
                .bytes()
                .enumerate()
                .all(|(i, b)| i == 2 || b.is_ascii_digit());
        let time = well_formed
            .then(|| NaiveTime::parse_from_str(raw, "%H:%M").ok())
            .flatten()
            .ok_or_else(|| {
                PipelineError::config_invalid(format!("malformed schedule time '{raw}', expected HH:MM"))
            })?;
        parsed.push(time);
    }

    parsed.sort();
    if parsed.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(PipelineError::config_invalid("schedule.times contains duplicates"));
    }
    Ok(parsed)
}

/// Earliest scheduled instant at or after `now`.
pub fn next_due_at_or_after(schedule: &[NaiveTime], now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date();
    schedule
        .iter()
        .map(|time| today.and_time(*time))
        .find(|candidate| *candidate >= now)
        .unwrap_or_else(|| {
            let first = schedule.first().copied().unwrap_or(NaiveTime::MIN);
            (today + Duration::days(1)).and_time(first)
        })
}

/// Next trigger after one fired at `fired`, given that it finished at
/// `finished`. Returns the next due instant and how many triggers fell due
/// while the run was in progress (those are skipped, not queued).
pub fn advance_after_run(
    schedule: &[NaiveTime],
    fired: NaiveDateTime,
    finished: NaiveDateTime,
) -> (NaiveDateTime, usize) {
    let mut skipped = 0;
    let mut next = next_due_at_or_after(schedule, fired + Duration::minutes(1));
    while next < finished {
        skipped += 1;
        next = next_due_at_or_after(schedule, next + Duration::minutes(1));
    }
    (next, skipped)
}

/// Truncates to whole seconds.
pub fn to_second(timestamp: DateTime<Local>) -> DateTime<Local> {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}
