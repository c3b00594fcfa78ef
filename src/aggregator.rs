//! Turns raw detections into emitted road events.
//!
//! Potholes and broken patches are emitted as soon as they clear the speed
//! gate. Speed breakers are buffered for one aggregation window anchored on
//! the first of them; when the window closes, a lone speed breaker is emitted
//! as-is and two or more collapse into a single `MultipleSpeedBreakers`
//! event carrying the last buffered event's id, position and speed.
//!
//! The aggregator has no clock of its own. Callers drive window closure with
//! `poll(now)` (sample time or a timer) or `close_window()` (timer fire).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::DetectorConfig;
use crate::types::{EventKind, RawEventType, RoadEvent};

/// Distinguishes aggregators created within the same millisecond.
fn next_instance() -> u64 {
    static INSTANCES: AtomicU64 = AtomicU64::new(0);
    INSTANCES.fetch_add(1, Ordering::Relaxed)
}

/// Where and how fast the vehicle was when a raw event fired.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EventContext {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub timestamp_ms: i64,
}

pub struct EventAggregator {
    min_speed_kmh: f64,
    window_ms: i64,
    confidence: f32,
    session_id: String,
    next_seq: u64,
    buffer: Vec<RoadEvent>,
    deadline: Option<i64>,
}

impl EventAggregator {
    pub fn new(config: &DetectorConfig) -> Self {
        let session_id = format!(
            "evt-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            next_instance()
        );
        Self::with_session_id(config, session_id)
    }

    /// Fixed id prefix, for reproducible replays.
    pub fn with_session_id(config: &DetectorConfig, session_id: impl Into<String>) -> Self {
        Self {
            min_speed_kmh: config.min_event_speed_kmh,
            window_ms: config.aggregation_window_ms,
            confidence: config.default_confidence,
            session_id: session_id.into(),
            next_seq: 0,
            buffer: Vec::new(),
            deadline: None,
        }
    }

    /// Returns the events that became final as a result of this call.
    pub fn on_raw_event(&mut self, raw: RawEventType, ctx: EventContext) -> Vec<RoadEvent> {
        if !self.accepts_speed(ctx.speed_kmh) {
            log::debug!(
                "Discarding {:?}: speed {:.1} km/h below {:.1} km/h gate",
                raw,
                ctx.speed_kmh,
                self.min_speed_kmh
            );
            return Vec::new();
        }

        let event = self.make_event(raw.into(), &ctx);

        match raw {
            RawEventType::Pothole | RawEventType::BrokenPatch => {
                log::info!(
                    "Emitting {:?} at ({:.6}, {:.6}) {:.1} km/h",
                    event.kind,
                    event.latitude,
                    event.longitude,
                    event.speed_kmh
                );
                vec![event]
            }
            RawEventType::SpeedBreaker => {
                let mut emitted = Vec::new();
                if let Some(deadline) = self.deadline {
                    if ctx.timestamp_ms >= deadline {
                        emitted.extend(self.close_window());
                    }
                }
                if self.deadline.is_none() {
                    self.deadline = Some(ctx.timestamp_ms + self.window_ms);
                }
                self.buffer.push(event);
                log::debug!(
                    "Buffered speed breaker ({} pending, window closes at {:?})",
                    self.buffer.len(),
                    self.deadline
                );
                emitted
            }
        }
    }

    /// Minimum-speed gate; events below it are discarded.
    pub fn accepts_speed(&self, speed_kmh: f64) -> bool {
        speed_kmh >= self.min_speed_kmh
    }

    /// Close the pending window if `now_ms` has reached its deadline.
    pub fn poll(&mut self, now_ms: i64) -> Option<RoadEvent> {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => self.close_window(),
            _ => None,
        }
    }

    /// Close the pending window regardless of time.
    pub fn close_window(&mut self) -> Option<RoadEvent> {
        self.deadline = None;
        let count = self.buffer.len();
        let last = self.buffer.drain(..).last()?;

        let event = if count > 1 {
            RoadEvent {
                kind: EventKind::MultipleSpeedBreakers,
                ..last
            }
        } else {
            last
        };

        log::info!(
            "Emitting {:?} ({} speed breaker(s) in window) at ({:.6}, {:.6})",
            event.kind,
            count,
            event.latitude,
            event.longitude
        );
        Some(event)
    }

    /// Shutdown path; buffered speed breakers go through the same merge rule.
    pub fn flush(&mut self) -> Option<RoadEvent> {
        self.close_window()
    }

    pub fn deadline(&self) -> Option<i64> {
        self.deadline
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn make_event(&mut self, kind: EventKind, ctx: &EventContext) -> RoadEvent {
        let id = format!("{}-{}", self.session_id, self.next_seq);
        self.next_seq += 1;
        RoadEvent {
            id,
            kind,
            latitude: ctx.latitude,
            longitude: ctx.longitude,
            timestamp_ms: ctx.timestamp_ms,
            confidence: self.confidence,
            speed_kmh: ctx.speed_kmh as f32,
            confirmed: false,
        }
    }
}
