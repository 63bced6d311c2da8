//! Packet history tracking for debugging and diagnostics.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Which way a datagram went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
    /// Received but undecodable
    Dropped,
}

/// A recorded datagram in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub direction: Direction,
    pub peer: SocketAddr,
    /// Packet type name, or the decode error of a dropped datagram
    pub packet: String,
    /// Seconds since history creation
    pub timestamp: f64,
}

/// Bounded record of recent traffic.
#[derive(Debug, Clone)]
pub struct PacketHistory {
    counts: HashMap<Direction, usize>,
    last_error: Option<String>,
    start_time: Instant,
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
}

impl Default for PacketHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            counts: HashMap::new(),
            last_error: None,
            start_time: Instant::now(),
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
        }
    }

    pub fn record(&mut self, direction: Direction, peer: SocketAddr, packet: impl Into<String>) {
        *self.counts.entry(direction).or_default() += 1;

        if self.max_entries == 0 {
            return;
        }
        if self.entries.len() == self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            direction,
            peer,
            packet: packet.into(),
            timestamp: self.start_time.elapsed().as_secs_f64(),
        });
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn count(&self, direction: Direction) -> usize {
        self.counts.get(&direction).copied().unwrap_or(0)
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.entries.clear();
        self.last_error = None;
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            sent_count: self.count(Direction::Sent),
            received_count: self.count(Direction::Received),
            dropped_count: self.count(Direction::Dropped),
            total_entries: self.entries.len(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Summary of packet history for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub sent_count: usize,
    pub received_count: usize,
    pub dropped_count: usize,
    pub total_entries: usize,
    pub last_error: Option<String>,
}
