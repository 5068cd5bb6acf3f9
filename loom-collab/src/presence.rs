//! Remote cursors and the outbound pointer throttle.
//!
//! ```text
//! local pointer ──► PresenceThrottle (≤ 1 per 50ms) ──► send_presence
//!
//! inbound presence ──► PresenceTracker::upsert ──► cursors()
//!                             ▲
//!                             └── sweep every 5s, drop records idle ≥ 10s
//! ```
//!
//! All time-dependent operations have an `_at` / `now` form taking an
//! explicit `Instant`, so callers and tests control the clock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use loom_core::model::{Point, DEFAULT_PRIMARY};

use crate::protocol::PresenceUpdate;

/// Cursor colors handed out to users.
pub const CURSOR_PALETTE: [&str; 15] = [
    "#f44336", // red
    "#e91e63", // pink
    "#9c27b0", // purple
    "#673ab7", // deep purple
    "#3f51b5", // indigo
    "#2196f3", // blue
    "#03a9f4", // light blue
    "#00bcd4", // cyan
    "#009688", // teal
    "#4caf50", // green
    "#8bc34a", // light green
    "#cddc39", // lime
    "#ffc107", // amber
    "#ff9800", // orange
    "#ff5722", // deep orange
];

/// Stable palette color for a user id.
pub fn color_for_user(user_id: &str) -> &'static str {
    let hash = user_id
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)));
    CURSOR_PALETTE[hash as usize % CURSOR_PALETTE.len()]
}

/// Fallback display name: `User-` plus the first four characters of the id.
pub fn default_username(user_id: &str) -> String {
    let prefix: String = user_id.chars().take(4).collect();
    format!("User-{prefix}")
}

/// Presence timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Records older than this are swept
    pub ttl: Duration,
    /// How often the session runs a sweep
    pub sweep_interval: Duration,
    /// Minimum spacing of outbound pointer updates
    pub throttle_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
            throttle_interval: Duration::from_millis(50),
        }
    }
}

impl PresenceConfig {
    pub fn for_testing() -> Self {
        Self {
            ttl: Duration::from_millis(200),
            sweep_interval: Duration::from_millis(50),
            throttle_interval: Duration::from_millis(10),
        }
    }
}

/// Identity this peer advertises in its presence frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub user_id: String,
    pub username: Option<String>,
    pub color: String,
}

impl LocalUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let color = color_for_user(&user_id).to_owned();
        Self {
            user_id,
            username: None,
            color,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Presence frame for a pointer at `point`.
    pub fn presence_at(&self, point: Point) -> PresenceUpdate {
        PresenceUpdate {
            user_id: self.user_id.clone(),
            x: point.x,
            y: point.y,
            username: self.username.clone(),
            color: Some(self.color.clone()),
        }
    }
}

/// One remote cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub user_id: String,
    pub x: f64,
    pub y: f64,
    pub username: String,
    pub color: String,
    pub last_seen_at: Instant,
}

/// Remote cursors keyed by user id.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    records: HashMap<String, PresenceRecord>,
    ttl: Duration,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(PresenceConfig::default().ttl)
    }
}

impl PresenceTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: HashMap::new(),
            ttl,
        }
    }

    pub fn upsert(&mut self, update: PresenceUpdate) {
        self.upsert_at(update, Instant::now());
    }

    /// Insert or replace the record for `update.user_id`, stamped `now`.
    pub fn upsert_at(&mut self, update: PresenceUpdate, now: Instant) {
        let username = update
            .username
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_username(&update.user_id));
        let color = update
            .color
            .filter(|color| !color.is_empty())
            .unwrap_or_else(|| DEFAULT_PRIMARY.to_owned());
        let record = PresenceRecord {
            user_id: update.user_id.clone(),
            x: update.x,
            y: update.y,
            username,
            color,
            last_seen_at: now,
        };
        self.records.insert(update.user_id, record);
    }

    /// Drop records idle for at least the ttl; returns their ids.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let ttl = self.ttl;
        let stale: Vec<String> = self
            .records
            .values()
            .filter(|r| now.saturating_duration_since(r.last_seen_at) >= ttl)
            .map(|r| r.user_id.clone())
            .collect();

        for id in &stale {
            self.records.remove(id);
        }
        stale
    }

    pub fn remove(&mut self, user_id: &str) -> Option<PresenceRecord> {
        self.records.remove(user_id)
    }

    pub fn get(&self, user_id: &str) -> Option<&PresenceRecord> {
        self.records.get(user_id)
    }

    /// All cursors, sorted by user id.
    pub fn cursors(&self) -> Vec<PresenceRecord> {
        let mut cursors: Vec<PresenceRecord> = self.records.values().cloned().collect();
        cursors.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        cursors
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Coalesces pointer moves to at most one send per interval.
///
/// A move that arrives inside the interval is remembered; [`flush`] hands it
/// out once the interval has passed so the final resting position is never
/// lost.
///
/// [`flush`]: PresenceThrottle::flush
#[derive(Debug, Clone)]
pub struct PresenceThrottle {
    interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<Point>,
}

impl PresenceThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            pending: None,
        }
    }

    fn ready(&self, now: Instant) -> bool {
        self.last_sent
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Returns the point to send now, or `None` if throttled.
    pub fn offer(&mut self, point: Point, now: Instant) -> Option<Point> {
        if self.ready(now) {
            self.last_sent = Some(now);
            self.pending = None;
            Some(point)
        } else {
            self.pending = Some(point);
            None
        }
    }

    /// The latest throttled point, once the interval allows sending it.
    pub fn flush(&mut self, now: Instant) -> Option<Point> {
        if self.pending.is_some() && self.ready(now) {
            self.last_sent = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
