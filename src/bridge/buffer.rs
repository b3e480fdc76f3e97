//! # Audio Chunk Buffer
//!
//! Accumulates inbound caller audio and decides when to forward it upstream.
//! Telephony media frames arrive as tiny payloads (commonly 20 ms); pushing
//! each one to the voice-agent session individually wastes round trips, while
//! holding audio too long adds latency. The buffer forwards on whichever of
//! two thresholds trips first:
//!
//! - **Size**: the buffer reaches one chunk duration worth of bytes
//! - **Staleness**: a periodic tick finds data that has waited longer than
//!   twice the chunk duration since the last flush
//!
//! Staleness is measured from the last flush, not from the oldest buffered
//! byte. The worst-case hold time is therefore about two chunk durations
//! plus tick jitter.
//!
//! Every operation completes synchronously; callers on a cooperative
//! scheduler can never observe a half-updated buffer. `flush()` on an empty
//! buffer is a no-op, so the size path and the tick path may race benignly.

use std::time::{Duration, Instant};

/// Audio characteristics of the stream being buffered.
///
/// Fixed at construction; the bridge never renegotiates audio parameters
/// mid-call.
#[derive(Debug, Clone)]
pub struct ChunkBufferConfig {
    /// Samples per second (telephony µ-law runs at 8 kHz)
    pub sample_rate: u32,

    /// Target duration of one forwarded chunk, in seconds
    pub chunk_duration_s: f64,
}

impl Default for ChunkBufferConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,      // g711_ulaw telephony rate
            chunk_duration_s: 0.05, // 50ms chunks
        }
    }
}

impl ChunkBufferConfig {
    /// Bytes per forwarded chunk: sample rate × chunk duration, one byte
    /// per sample for µ-law.
    pub fn flush_size_bytes(&self) -> usize {
        (self.sample_rate as f64 * self.chunk_duration_s) as usize
    }

    /// How long buffered audio may sit before the tick forces a flush.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_duration_s * 2.0)
    }

    /// Interval of the periodic flush tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_duration_s)
    }
}

/// Append-only byte buffer with dual-threshold flushing.
#[derive(Debug)]
pub struct ChunkBuffer {
    data: Vec<u8>,
    last_flush: Instant,
    flush_size: usize,
    stale_after: Duration,
}

impl ChunkBuffer {
    /// Create an empty buffer. The staleness clock starts now.
    pub fn new(config: &ChunkBufferConfig) -> Self {
        Self {
            data: Vec::with_capacity(config.flush_size_bytes()),
            last_flush: Instant::now(),
            flush_size: config.flush_size_bytes(),
            stale_after: config.stale_after(),
        }
    }

    /// Append caller audio. Returns the accumulated chunk when the size
    /// threshold is crossed, otherwise None.
    pub fn append(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        self.data.extend_from_slice(bytes);
        if self.data.len() >= self.flush_size {
            self.flush()
        } else {
            None
        }
    }

    /// Snapshot-and-clear the buffer. None when empty; calling redundantly
    /// is harmless.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        self.flush_at(Instant::now())
    }

    /// Flush only if the buffer holds data that has waited longer than the
    /// staleness threshold since the last flush. Called from the periodic
    /// tick.
    pub fn flush_if_stale(&mut self, now: Instant) -> Option<Vec<u8>> {
        if !self.data.is_empty() && now.duration_since(self.last_flush) > self.stale_after {
            self.flush_at(now)
        } else {
            None
        }
    }

    fn flush_at(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.data.is_empty() {
            return None;
        }
        let chunk = std::mem::take(&mut self.data);
        self.last_flush = now;
        Some(chunk)
    }

    /// Bytes currently held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// When the buffer last flushed (or was created).
    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkBufferConfig {
        ChunkBufferConfig::default()
    }

    #[test]
    fn test_default_flush_size_is_50ms_at_8khz() {
        assert_eq!(config().flush_size_bytes(), 400);
        assert_eq!(config().stale_after(), Duration::from_millis(100));
    }

    #[test]
    fn test_exact_threshold_flushes_once_and_empties() {
        let mut buffer = ChunkBuffer::new(&config());
        let before = buffer.last_flush();

        let chunk = buffer.append(&[7u8; 400]).expect("threshold crossed");
        assert_eq!(chunk, vec![7u8; 400]);
        assert!(buffer.is_empty());
        assert!(buffer.last_flush() >= before);
    }

    #[test]
    fn test_chunk_preserves_append_order_across_calls() {
        let mut buffer = ChunkBuffer::new(&config());
        assert!(buffer.append(&[1u8; 150]).is_none());
        assert!(buffer.append(&[2u8; 150]).is_none());
        let chunk = buffer.append(&[3u8; 150]).expect("crossed at 450 bytes");

        let mut expected = vec![1u8; 150];
        expected.extend_from_slice(&[2u8; 150]);
        expected.extend_from_slice(&[3u8; 150]);
        assert_eq!(chunk, expected);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_one_flush_per_crossing() {
        let mut buffer = ChunkBuffer::new(&config());
        let mut flushes = 0;
        // 10 appends of 200 bytes: crossings at appends 2, 4, 6, 8, 10
        for _ in 0..10 {
            if buffer.append(&[0u8; 200]).is_some() {
                flushes += 1;
            }
        }
        assert_eq!(flushes, 5);
    }

    #[test]
    fn test_flush_on_empty_is_noop() {
        let mut buffer = ChunkBuffer::new(&config());
        assert!(buffer.flush().is_none());
        assert!(buffer.flush().is_none());
    }

    #[test]
    fn test_stale_flush_fires_only_after_threshold() {
        let mut buffer = ChunkBuffer::new(&config());
        assert!(buffer.append(&[9u8; 10]).is_none());
        let base = buffer.last_flush();

        // Exactly at the threshold: strictly-greater comparison, no flush
        assert!(buffer
            .flush_if_stale(base + Duration::from_millis(100))
            .is_none());

        let chunk = buffer
            .flush_if_stale(base + Duration::from_millis(101))
            .expect("stale data must flush");
        assert_eq!(chunk, vec![9u8; 10]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_stale_flush_noop_on_empty_buffer() {
        let mut buffer = ChunkBuffer::new(&config());
        let base = buffer.last_flush();
        assert!(buffer
            .flush_if_stale(base + Duration::from_secs(10))
            .is_none());
    }

    #[test]
    fn test_size_flush_resets_staleness_clock() {
        let mut buffer = ChunkBuffer::new(&config());
        buffer.append(&[1u8; 400]).expect("size flush");
        let after_size_flush = buffer.last_flush();

        buffer.append(&[2u8; 10]);
        // The new bytes are fresh relative to the size flush
        assert!(buffer
            .flush_if_stale(after_size_flush + Duration::from_millis(50))
            .is_none());
    }
}
