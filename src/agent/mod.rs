//! # Voice-Agent Integration
//!
//! Everything on the far side of the bridge: the realtime session client,
//! the playback ledger it consults on barge-in, and the tool functions the
//! agent may call.
//!
//! ## Key Components:
//! - **Session**: WebSocket client, negotiation, and the upstream pump
//! - **Playback**: played-byte accounting per utterance segment
//! - **Tools**: request-to-string functions with failure-as-string contract

pub mod playback; // Played-audio ledger
pub mod session; // Realtime session client and pump
pub mod tools; // Callable tool surface
