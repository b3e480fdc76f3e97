//! # Telephony Line Protocol
//!
//! Frame types for the media-stream WebSocket protocol spoken by the
//! telephony side. Every frame is one JSON object with an `event`
//! discriminator; media payloads are base64-encoded raw µ-law bytes.
//!
//! ## Inbound events (phone → bridge):
//! - `connected`: transport-level hello, informational
//! - `start`: carries the stream SID that all outbound frames must echo
//! - `media`: base64 audio payload from the caller
//! - `mark`: playback acknowledgement for a previously sent mark token
//! - `stop`: the media stream ended
//!
//! ## Outbound events (bridge → phone):
//! - `media`: base64 audio payload for the caller
//! - `mark`: playback marker the far end echoes back once audio is played
//! - `clear`: discard any queued playback (barge-in)
//!
//! Decoding failures here never close the connection; the caller logs the
//! `BridgeError` and drops the frame.

use crate::error::BridgeError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Frames received from the telephony connection.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundFrame {
    /// Media stream transport connected
    Connected,

    /// Stream metadata, delivered once after `connected`
    Start {
        /// Nested `start` object from the wire
        start: StartInfo,
    },

    /// Caller audio chunk
    Media {
        /// Nested `media` object holding the base64 payload
        media: MediaPayload,
    },

    /// Playback acknowledgement for a mark the bridge sent earlier
    Mark {
        /// Nested `mark` object holding the token
        mark: MarkInfo,
    },

    /// The media stream is over
    Stop,

    /// Any event this bridge does not handle (providers send extras such as
    /// dtmf). Ignored, not an error.
    #[serde(other)]
    Unknown,
}

/// Payload of the `start` event.
#[derive(Debug, Deserialize)]
pub struct StartInfo {
    /// Opaque stream identifier assigned by the telephony side
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
}

/// Payload of a `media` event, both directions.
#[derive(Debug, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded raw audio bytes
    pub payload: String,
}

/// Payload of a `mark` event, both directions.
#[derive(Debug, Serialize, Deserialize)]
pub struct MarkInfo {
    /// Mark token; the far end echoes back exactly what was sent
    pub name: String,
}

impl InboundFrame {
    /// Parse one text frame off the wire.
    pub fn parse(text: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(text).map_err(|e| BridgeError::Frame(e.to_string()))
    }
}

impl MediaPayload {
    /// Decode the base64 payload into raw audio bytes.
    pub fn decode(&self) -> Result<Vec<u8>, BridgeError> {
        BASE64
            .decode(&self.payload)
            .map_err(|e| BridgeError::Payload(e.to_string()))
    }
}

/// Frames sent to the telephony connection.
///
/// Every variant carries the current stream SID; frames must not be sent
/// before the `start` event has populated it.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Agent audio for the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },

    /// Playback marker; the far end acknowledges it after the preceding
    /// media has actually played
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkInfo,
    },

    /// Flush the far end's playback queue (barge-in)
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl OutboundFrame {
    /// Build a media frame, base64-encoding the audio bytes.
    pub fn media(stream_sid: &str, audio: &[u8]) -> Self {
        OutboundFrame::Media {
            stream_sid: stream_sid.to_string(),
            media: MediaPayload {
                payload: BASE64.encode(audio),
            },
        }
    }

    /// Build a mark frame for the given token.
    pub fn mark(stream_sid: &str, token: String) -> Self {
        OutboundFrame::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkInfo { name: token },
        }
    }

    /// Build a clear frame.
    pub fn clear(stream_sid: &str) -> Self {
        OutboundFrame::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(|e| BridgeError::Frame(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_frame() {
        let frame = InboundFrame::parse(r#"{"event":"start","start":{"streamSid":"MZ123"}}"#)
            .expect("valid start frame");
        match frame {
            InboundFrame::Start { start } => assert_eq!(start.stream_sid, "MZ123"),
            other => panic!("wrong frame: {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_frame_decodes_payload() {
        // "hello" in base64
        let frame = InboundFrame::parse(r#"{"event":"media","media":{"payload":"aGVsbG8="}}"#)
            .expect("valid media frame");
        match frame {
            InboundFrame::Media { media } => {
                assert_eq!(media.decode().unwrap(), b"hello");
            }
            other => panic!("wrong frame: {:?}", other),
        }
    }

    #[test]
    fn test_bad_base64_is_payload_error() {
        let media = MediaPayload {
            payload: "not valid base64!!!".to_string(),
        };
        let err = media.decode().unwrap_err();
        assert_eq!(err.kind(), "payload");
    }

    #[test]
    fn test_parse_mark_and_stop() {
        let mark = InboundFrame::parse(r#"{"event":"mark","mark":{"name":"3"}}"#).unwrap();
        match mark {
            InboundFrame::Mark { mark } => assert_eq!(mark.name, "3"),
            other => panic!("wrong frame: {:?}", other),
        }

        assert!(matches!(
            InboundFrame::parse(r#"{"event":"stop"}"#).unwrap(),
            InboundFrame::Stop
        ));
    }

    #[test]
    fn test_unhandled_event_is_not_an_error() {
        let frame = InboundFrame::parse(r#"{"event":"dtmf","dtmf":{"digit":"5"}}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Unknown));
    }

    #[test]
    fn test_malformed_json_is_frame_error() {
        let err = InboundFrame::parse("{not json").unwrap_err();
        assert_eq!(err.kind(), "frame");
    }

    #[test]
    fn test_outbound_media_carries_sid_and_base64() {
        let json = OutboundFrame::media("MZ123", b"hello").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "MZ123");
        assert_eq!(value["media"]["payload"], "aGVsbG8=");
    }

    #[test]
    fn test_outbound_mark_and_clear_shapes() {
        let mark = OutboundFrame::mark("MZ9", "1".to_string()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&mark).unwrap();
        assert_eq!(value["event"], "mark");
        assert_eq!(value["streamSid"], "MZ9");
        assert_eq!(value["mark"]["name"], "1");

        let clear = OutboundFrame::clear("MZ9").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&clear).unwrap();
        assert_eq!(value["event"], "clear");
        assert_eq!(value["streamSid"], "MZ9");
    }
}
