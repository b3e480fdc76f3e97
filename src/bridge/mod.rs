//! # Call Bridge Core
//!
//! The pieces that relay one phone call between the telephony media stream
//! and the voice-agent session.
//!
//! ## Key Components:
//! - **Frames**: the telephony line protocol (JSON frames, base64 media)
//! - **Chunk Buffer**: jitter smoothing with size and staleness thresholds
//! - **Mark Tracker**: provenance for playback acknowledgement tokens
//! - **Stream Session**: per-call state and lifecycle
//!
//! The WebSocket actor in `crate::websocket` wires these together; it is the
//! only place where transport input enters or output leaves the bridge.

// The bridge actor lives in src/websocket.rs at the root level
pub mod buffer; // Dual-threshold audio chunk buffer
pub mod frames; // Telephony line-protocol codec
pub mod marks; // Playback mark provenance
pub mod session; // Per-call state machine
