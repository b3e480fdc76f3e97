//! # Call Session State
//!
//! Per-call state owned by the bridge: the stream identifier handed over by
//! the telephony side, the audio chunk buffer, the mark table, and counters
//! for the end-of-call summary. One `StreamSession` exists per accepted
//! media-stream connection and dies with it.
//!
//! ## Call Lifecycle:
//! 1. **Initializing**: connection accepted, agent session negotiated,
//!    waiting for the `start` frame
//! 2. **Streaming**: stream SID known, bidirectional audio flowing
//! 3. **Closing**: terminal; entered on `stop`, transport close, or agent
//!    session end
//!
//! All mutation happens on the bridge actor's single control flow, so no
//! locking is needed here.

use crate::bridge::buffer::{ChunkBuffer, ChunkBufferConfig};
use crate::bridge::marks::MarkTracker;
use crate::error::BridgeError;
use uuid::Uuid;

/// Where the call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallPhase {
    /// Waiting for the telephony `start` frame
    Initializing,
    /// Normal bidirectional flow
    Streaming,
    /// Terminal; no new work is accepted
    Closing,
}

impl CallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallPhase::Initializing => "initializing",
            CallPhase::Streaming => "streaming",
            CallPhase::Closing => "closing",
        }
    }
}

/// Counters accumulated over one call, logged at teardown.
#[derive(Debug, Default)]
pub struct CallStats {
    /// Media frames received from the phone
    pub media_frames_in: u64,

    /// Caller audio bytes received (after base64 decode)
    pub audio_bytes_in: u64,

    /// Chunks forwarded to the agent session
    pub chunks_forwarded: u64,

    /// Agent audio frames sent to the phone
    pub media_frames_out: u64,

    /// Mark acknowledgements that matched a live entry
    pub marks_acked: u64,

    /// Frames dropped for framing or payload errors
    pub frames_dropped: u64,
}

/// State for one active phone call.
pub struct StreamSession {
    /// Local identifier for log correlation (the telephony SID arrives late)
    pub call_id: String,

    stream_sid: Option<String>,
    phase: CallPhase,

    /// Inbound audio accumulation
    pub buffer: ChunkBuffer,

    /// Outstanding playback marks
    pub marks: MarkTracker,

    /// Per-call counters
    pub stats: CallStats,
}

impl StreamSession {
    /// Create session state for a freshly accepted connection.
    pub fn new(buffer_config: &ChunkBufferConfig) -> Self {
        Self {
            call_id: Uuid::new_v4().to_string(),
            stream_sid: None,
            phase: CallPhase::Initializing,
            buffer: ChunkBuffer::new(buffer_config),
            marks: MarkTracker::new(),
            stats: CallStats::default(),
        }
    }

    /// Record the stream SID from the `start` frame and begin streaming.
    pub fn begin_stream(&mut self, stream_sid: String) -> Result<(), BridgeError> {
        match self.phase {
            CallPhase::Initializing => {
                self.stream_sid = Some(stream_sid);
                self.phase = CallPhase::Streaming;
                Ok(())
            }
            phase => Err(BridgeError::Phase(format!(
                "start frame received while {}",
                phase.as_str()
            ))),
        }
    }

    /// Enter the terminal phase. Safe to call more than once.
    pub fn close(&mut self) {
        self.phase = CallPhase::Closing;
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    /// The stream SID, once the `start` frame has arrived.
    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    /// True while bidirectional flow is allowed.
    pub fn is_streaming(&self) -> bool {
        self.phase == CallPhase::Streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StreamSession {
        StreamSession::new(&ChunkBufferConfig::default())
    }

    #[test]
    fn test_new_session_is_initializing_without_sid() {
        let session = session();
        assert_eq!(session.phase(), CallPhase::Initializing);
        assert!(session.stream_sid().is_none());
        assert!(!session.is_streaming());
    }

    #[test]
    fn test_start_frame_sets_sid_and_streams() {
        let mut session = session();
        session.begin_stream("MZabc".to_string()).unwrap();
        assert_eq!(session.phase(), CallPhase::Streaming);
        assert_eq!(session.stream_sid(), Some("MZabc"));
    }

    #[test]
    fn test_second_start_frame_is_a_phase_error() {
        let mut session = session();
        session.begin_stream("MZabc".to_string()).unwrap();
        let err = session.begin_stream("MZother".to_string()).unwrap_err();
        assert_eq!(err.kind(), "phase");
        // The original SID survives the bad frame
        assert_eq!(session.stream_sid(), Some("MZabc"));
    }

    #[test]
    fn test_close_is_terminal_and_idempotent() {
        let mut session = session();
        session.begin_stream("MZabc".to_string()).unwrap();
        session.close();
        assert_eq!(session.phase(), CallPhase::Closing);
        session.close();
        assert_eq!(session.phase(), CallPhase::Closing);
        assert!(session.begin_stream("MZlate".to_string()).is_err());
    }
}
