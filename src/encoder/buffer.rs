//! Time-bounded ring buffer of encoded access units.
//!
//! Units are grouped: a sync point heads each group and the units that
//! follow depend on it, so eviction always removes whole groups from the
//! oldest end. The retained run therefore always starts at a sync point
//! and can be turned into a valid stream at any moment.

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// One compressed access unit out of the codec. Immutable once produced.
#[derive(Debug, Clone)]
pub struct EncodedUnit {
    /// Compressed payload. Reference-counted so the live buffer and an
    /// in-flight save share memory without copying.
    pub data: Bytes,
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    /// Whether this unit can start a decodable stream.
    pub is_sync: bool,
}

impl EncodedUnit {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Rolling window over the most recent encoded units.
///
/// Capacity is a target buffered duration rather than a unit count, since
/// units vary in size and spacing. The newest group may hold the buffer
/// briefly over budget while it is still open; the surplus is evicted once
/// the next sync point closes it.
#[derive(Debug)]
pub struct RingBuffer {
    units: VecDeque<EncodedUnit>,
    window_us: i64,
    total_bytes: usize,
    leading_dropped: u64,
}

impl RingBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            units: VecDeque::new(),
            window_us: window.as_micros() as i64,
            total_bytes: 0,
            leading_dropped: 0,
        }
    }

    /// Append a unit, evicting whole groups from the oldest end while the
    /// buffered span exceeds the window.
    pub fn push(&mut self, unit: EncodedUnit) {
        if self.units.is_empty() && !unit.is_sync {
            // Nothing decodable can start mid-group; wait for the first
            // sync point.
            self.leading_dropped += 1;
            debug!(
                pts_us = unit.pts_us,
                dropped = self.leading_dropped,
                "discarding unit ahead of first sync point"
            );
            return;
        }

        self.total_bytes += unit.data.len();
        self.units.push_back(unit);

        while self.span_us() > self.window_us && self.evict_oldest_group() {}
    }

    /// Remove the oldest group, but only if another sync point exists to
    /// become the new head of the run.
    fn evict_oldest_group(&mut self) -> bool {
        let next_sync = self
            .units
            .iter()
            .skip(1)
            .position(|u| u.is_sync)
            .map(|i| i + 1);
        let Some(next_sync) = next_sync else {
            return false;
        };

        for _ in 0..next_sync {
            if let Some(unit) = self.units.pop_front() {
                self.total_bytes -= unit.data.len();
            }
        }
        true
    }

    /// Buffered span: newest timestamp minus the oldest retained sync
    /// point's timestamp, in microseconds.
    pub fn span_us(&self) -> i64 {
        match (self.units.front(), self.units.back()) {
            (Some(first), Some(last)) => last.pts_us - first.pts_us,
            _ => 0,
        }
    }

    /// Copy of the buffered run for a save drain. Cheap: payloads are
    /// reference-counted, not duplicated.
    pub fn snapshot(&self) -> Vec<EncodedUnit> {
        self.units.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Total payload bytes currently retained.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn window_us(&self) -> i64 {
        self.window_us
    }
}
