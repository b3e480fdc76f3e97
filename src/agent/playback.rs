//! # Playback Accounting
//!
//! Ledger of how much agent audio the caller has actually heard, keyed by
//! (utterance id, content index). The bridge records into it when the
//! telephony side acknowledges a playback mark; the agent session reads it
//! when the caller barges in, to tell the agent runtime where to truncate
//! its notion of the conversation.
//!
//! The ledger stores byte counts rather than payload copies: only the
//! length of played audio matters to the accounting.
//!
//! ## Thread Safety:
//! Shared between the bridge actor (writer) and the agent pump task
//! (reader), so access goes through a Mutex. Both sides touch it only in
//! short non-blocking sections.

use std::collections::HashMap;
use std::sync::Mutex;

/// Played-byte ledger for one call.
#[derive(Debug, Default)]
pub struct PlaybackTracker {
    played: Mutex<HashMap<(String, u32), usize>>,
}

impl PlaybackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `byte_count` more bytes of the given utterance segment
    /// have been played to the caller.
    pub fn record_played(&self, utterance_id: &str, content_index: u32, byte_count: usize) {
        let mut played = self.played.lock().unwrap();
        *played
            .entry((utterance_id.to_string(), content_index))
            .or_insert(0) += byte_count;
    }

    /// Total bytes played for one utterance segment.
    pub fn played_bytes(&self, utterance_id: &str, content_index: u32) -> usize {
        let played = self.played.lock().unwrap();
        played
            .get(&(utterance_id.to_string(), content_index))
            .copied()
            .unwrap_or(0)
    }

    /// Played duration in milliseconds for one utterance segment, given the
    /// stream's byte rate (at 8 kHz µ-law, 8 bytes per millisecond).
    pub fn played_ms(&self, utterance_id: &str, content_index: u32, sample_rate: u32) -> u64 {
        let bytes = self.played_bytes(utterance_id, content_index) as u64;
        let bytes_per_ms = (sample_rate / 1000).max(1) as u64;
        bytes / bytes_per_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_accumulate_per_segment() {
        let tracker = PlaybackTracker::new();
        tracker.record_played("u1", 0, 160);
        tracker.record_played("u1", 0, 240);
        tracker.record_played("u1", 1, 80);

        assert_eq!(tracker.played_bytes("u1", 0), 400);
        assert_eq!(tracker.played_bytes("u1", 1), 80);
        assert_eq!(tracker.played_bytes("u2", 0), 0);
    }

    #[test]
    fn test_played_ms_at_telephony_rate() {
        let tracker = PlaybackTracker::new();
        // 800 bytes of 8 kHz µ-law is 100ms of audio
        tracker.record_played("u1", 0, 800);
        assert_eq!(tracker.played_ms("u1", 0, 8000), 100);
    }
}
