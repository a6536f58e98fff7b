//! Continuous position tracking.
//!
//! A [`PositionSource`] is polled on a dedicated thread and each reading is
//! delivered over a channel, the way a browser `watchPosition` subscription
//! calls back with either a position or an error. [`WatchHandle::clear`]
//! ends the subscription.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::geo::LatLng;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("Invalid GPS coordinates received: {lat}, {lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("Position is {age_ms} ms old, more than the allowed maximum age")]
    Stale { age_ms: i64 },

    #[error("Timed out waiting for a position")]
    Timeout,

    #[error("Position unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    pub maximum_age: Duration,
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            maximum_age: Duration::from_secs(5),
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub position: LatLng,
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    pub fn new(lat: f64, lng: f64, timestamp: DateTime<Utc>) -> Result<Self, PositionError> {
        let position = LatLng::new(lat, lng);
        if !position.is_valid() {
            return Err(PositionError::InvalidCoordinates { lat, lng });
        }
        Ok(Self {
            position,
            accuracy_m: None,
            timestamp,
        })
    }

    pub fn now(lat: f64, lng: f64) -> Result<Self, PositionError> {
        Self::new(lat, lng, Utc::now())
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}

/// Something that can be asked for the current position.
pub trait PositionSource: Send {
    /// Blocks up to `timeout` for the next reading. `Ok(None)` means the
    /// source is exhausted and the watch ends.
    fn next_fix(&mut self, options: &WatchOptions) -> Result<Option<PositionFix>, PositionError>;
}

/// Always reports the same position, stamped with the current time.
pub struct FixedSource {
    position: LatLng,
}

impl FixedSource {
    pub fn new(position: LatLng) -> Self {
        Self { position }
    }
}

impl PositionSource for FixedSource {
    fn next_fix(&mut self, _: &WatchOptions) -> Result<Option<PositionFix>, PositionError> {
        PositionFix::now(self.position.lat, self.position.lng).map(Some)
    }
}

/// Replays a recorded track of `lat,lng[,rfc3339]` lines. Lines starting
/// with `#` and blank lines are ignored. Untimed readings are stamped when
/// they are read.
///
/// Recorded times are moved onto the replay clock: the first timed line is
/// stamped with the moment it is read, later lines keep their recorded
/// spacing. When the replay runs slower than the recording the clock slides
/// forward, so no replayed fix is stamped in the past.
pub struct TraceSource {
    lines: Box<dyn Iterator<Item = std::io::Result<String>> + Send>,
    line_no: usize,
    clock_shift: Option<chrono::Duration>,
}

impl TraceSource {
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(Self::from_lines(reader.lines()))
    }

    pub fn from_lines<I>(lines: I) -> Self
    where
        I: Iterator<Item = std::io::Result<String>> + Send + 'static,
    {
        Self {
            lines: Box::new(lines),
            line_no: 0,
            clock_shift: None,
        }
    }

    fn parse_line(&self, line: &str) -> Result<(f64, f64, Option<DateTime<Utc>>), PositionError> {
        let mut fields = line.split(',').map(str::trim);
        let number = |field: Option<&str>| field.and_then(|f| f.parse::<f64>().ok()).unwrap_or(f64::NAN);
        let lat = number(fields.next());
        let lng = number(fields.next());
        let recorded = match fields.next().filter(|f| !f.is_empty()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| PositionError::Unavailable(format!("line {}: {}", self.line_no, e)))?,
            ),
            None => None,
        };
        Ok((lat, lng, recorded))
    }

    fn replay_time(&mut self, recorded: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let shift = *self.clock_shift.get_or_insert(now - recorded);
        let stamped = recorded + shift;
        if stamped < now {
            self.clock_shift = Some(now - recorded);
            now
        } else {
            stamped
        }
    }
}

impl PositionSource for TraceSource {
    fn next_fix(&mut self, _: &WatchOptions) -> Result<Option<PositionFix>, PositionError> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            self.line_no += 1;
            let line = line.map_err(|e| PositionError::Unavailable(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (lat, lng, recorded) = self.parse_line(line)?;
            let now = Utc::now();
            let timestamp = match recorded {
                Some(recorded) => self.replay_time(recorded, now),
                None => now,
            };
            return PositionFix::new(lat, lng, timestamp).map(Some);
        }
    }
}

/// Rejects readings older than `maximum_age`.
pub fn check_staleness(
    fix: PositionFix,
    options: &WatchOptions,
    now: DateTime<Utc>,
) -> Result<PositionFix, PositionError> {
    let age = fix.age(now);
    match age.to_std() {
        Ok(age_std) if age_std > options.maximum_age => Err(PositionError::Stale {
            age_ms: age.num_milliseconds(),
        }),
        // Future timestamps (clock skew) count as fresh.
        _ => Ok(fix),
    }
}

/// An active position subscription.
pub struct WatchHandle {
    receiver: Receiver<Result<PositionFix, PositionError>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl WatchHandle {
    /// Next reading. A silent source produces [`PositionError::Timeout`];
    /// `None` once the watch has ended.
    pub fn recv(&self) -> Option<Result<PositionFix, PositionError>> {
        match self.receiver.recv_timeout(self.timeout) {
            Ok(update) => Some(update),
            Err(RecvTimeoutError::Timeout) if !self.stop.load(Ordering::SeqCst) => {
                Some(Err(PositionError::Timeout))
            }
            Err(_) => None,
        }
    }

    /// Stops the subscription and waits for the worker to finish.
    pub fn clear(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Position watch thread panicked");
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts polling `source` every `interval` on its own thread.
pub fn watch_position<S>(mut source: S, options: WatchOptions, interval: Duration) -> WatchHandle
where
    S: PositionSource + 'static,
{
    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);

    let worker = thread::spawn(move || {
        while !worker_stop.load(Ordering::SeqCst) {
            let update = match source.next_fix(&options) {
                Ok(Some(fix)) => check_staleness(fix, &options, Utc::now()),
                Ok(None) => {
                    log::debug!("Position source exhausted");
                    break;
                }
                Err(e) => Err(e),
            };
            if tx.send(update).is_err() {
                break;
            }
            sleep_unless_stopped(interval, &worker_stop);
        }
    });

    WatchHandle {
        receiver: rx,
        stop,
        worker: Some(worker),
        timeout: options.timeout,
    }
}

// Sleeps in short slices so a cleared watch is not held up by a long interval.
fn sleep_unless_stopped(interval: Duration, stop: &AtomicBool) {
    let slice = Duration::from_millis(50);
    let mut remaining = interval;
    while !remaining.is_zero() && !stop.load(Ordering::SeqCst) {
        let step = remaining.min(slice);
        thread::sleep(step);
        remaining -= step;
    }
}
