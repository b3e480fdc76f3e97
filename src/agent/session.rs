//! # Voice-Agent Session Client
//!
//! Owns the WebSocket connection to the realtime voice-agent service. The
//! bridge talks to it through two narrow channels:
//!
//! - **Outbound**: `AgentHandle::send_audio` pushes caller audio chunks. The
//!   send is a plain channel write, so the bridge's control flow never
//!   suspends while forwarding audio and receipt order is preserved.
//! - **Inbound**: an event receiver the bridge attaches to its actor. The
//!   pump task translates wire events into `AgentEvent` variants; the
//!   channel closing signals the session has ended.
//!
//! The session negotiates telephony audio (g711_ulaw both directions) and
//! semantic voice-activity detection with server-side interruption, then
//! runs a select loop over outbound audio, inbound events, and shutdown.
//!
//! Barge-in handling consumes the playback ledger: when the caller starts
//! speaking over agent audio, the pump tells the service how many
//! milliseconds of the current utterance were actually played so the
//! conversation record can be truncated to what the caller heard.

use crate::agent::playback::PlaybackTracker;
use crate::agent::tools;
use crate::config::AppConfig;
use crate::error::BridgeError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Events the agent session surfaces to the bridge.
#[derive(Debug)]
pub enum AgentEvent {
    /// A chunk of agent speech to relay to the caller
    Audio {
        utterance_id: String,
        content_index: u32,
        data: Vec<u8>,
    },

    /// The caller barged in while agent audio was playing
    AudioInterrupted,

    /// The current agent utterance finished
    AudioEnd,

    /// Any other wire event, passed through for observability
    Raw(Value),
}

/// The bridge's grip on a live agent session.
pub struct AgentHandle {
    audio_tx: mpsc::UnboundedSender<Vec<u8>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl AgentHandle {
    /// Forward one chunk of caller audio. Fails only when the session has
    /// already ended, which the bridge treats as a teardown signal.
    pub fn send_audio(&self, chunk: Vec<u8>) -> Result<(), BridgeError> {
        self.audio_tx
            .send(chunk)
            .map_err(|_| BridgeError::Session("agent session closed".to_string()))
    }

    /// Ask the pump to drain and disconnect. Idempotent.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Connection entry point for one call's agent session.
pub struct AgentSession;

impl AgentSession {
    /// Connect to the realtime service, negotiate the session, and spawn
    /// the pump task. Returns the bridge-facing handle and event stream.
    pub async fn connect(
        config: &AppConfig,
        playback: Arc<PlaybackTracker>,
    ) -> anyhow::Result<(AgentHandle, mpsc::UnboundedReceiver<AgentEvent>)> {
        let mut request = config.agent.realtime_url.clone().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", config.agent.api_key))?,
        );
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (mut ws, _response) = tokio_tungstenite::connect_async(request).await?;
        info!("Agent session connected to {}", config.agent.realtime_url);

        let update = session_update(config);
        ws.send(Message::Text(update.to_string())).await?;

        let (audio_tx, audio_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<AgentEvent>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let pump_config = config.clone();
        tokio::spawn(async move {
            run_pump(ws, audio_rx, event_tx, shutdown_rx, playback, pump_config).await;
        });

        Ok((
            AgentHandle {
                audio_tx,
                shutdown_tx: Some(shutdown_tx),
            },
            event_rx,
        ))
    }
}

/// Session negotiation payload: telephony audio both directions, semantic
/// VAD with server-side interruption, and the tool surface.
fn session_update(config: &AppConfig) -> Value {
    json!({
        "type": "session.update",
        "session": {
            "model": config.agent.model,
            "voice": config.agent.voice,
            "instructions": config.agent.instructions,
            "modalities": ["audio", "text"],
            "input_audio_format": "g711_ulaw",
            "output_audio_format": "g711_ulaw",
            "turn_detection": {
                "type": "semantic_vad",
                "interrupt_response": true,
                "create_response": true
            },
            "tools": tools::schemas()
        }
    })
}

type AgentSocket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// The upstream pump: one select loop over outbound audio, inbound wire
/// events, and shutdown. Ends when the socket drops or shutdown fires;
/// dropping the event sender tells the bridge the session is over.
async fn run_pump(
    mut ws: AgentSocket,
    mut audio_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    event_tx: mpsc::UnboundedSender<AgentEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    playback: Arc<PlaybackTracker>,
    config: AppConfig,
) {
    // Segment of agent audio currently being played to the caller, if any
    let mut current_segment: Option<(String, u32)> = None;

    loop {
        tokio::select! {
            chunk = audio_rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        let frame = json!({
                            "type": "input_audio_buffer.append",
                            "audio": BASE64.encode(&bytes),
                        });
                        if let Err(e) = ws.send(Message::Text(frame.to_string())).await {
                            error!("Failed to send caller audio upstream: {}", e);
                            break;
                        }
                    }
                    // The bridge dropped its handle; the call is over
                    None => break,
                }
            }
            incoming = ws.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Value>(&text) {
                            Ok(event) => {
                                handle_wire_event(
                                    event,
                                    &mut ws,
                                    &event_tx,
                                    &mut current_segment,
                                    &playback,
                                    &config,
                                ).await;
                            }
                            Err(e) => warn!("Unparseable agent event dropped: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(reason))) => {
                        info!("Agent session closed: {:?}", reason);
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                    Some(Err(e)) => {
                        error!("Agent session socket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut shutdown_rx => {
                debug!("Agent session shutdown requested");
                let _ = ws.close(None).await;
                break;
            }
        }
    }
    // event_tx drops here; the bridge sees the stream end and tears down
}

/// Translate one wire event. Errors inside a single event are logged and do
/// not end the pump.
async fn handle_wire_event(
    event: Value,
    ws: &mut AgentSocket,
    event_tx: &mpsc::UnboundedSender<AgentEvent>,
    current_segment: &mut Option<(String, u32)>,
    playback: &PlaybackTracker,
    config: &AppConfig,
) {
    let event_type = event
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string();

    match event_type.as_str() {
        "response.audio.delta" | "response.output_audio.delta" => {
            let utterance_id = event
                .get("item_id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let content_index = event
                .get("content_index")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            let payload = event.get("delta").and_then(|v| v.as_str()).unwrap_or("");

            match BASE64.decode(payload) {
                Ok(data) => {
                    *current_segment = Some((utterance_id.clone(), content_index));
                    let _ = event_tx.send(AgentEvent::Audio {
                        utterance_id,
                        content_index,
                        data,
                    });
                }
                Err(e) => warn!("Bad base64 in agent audio delta: {}", e),
            }
        }
        "response.audio.done" | "response.output_audio.done" => {
            *current_segment = None;
            let _ = event_tx.send(AgentEvent::AudioEnd);
        }
        "input_audio_buffer.speech_started" => {
            // Caller speech during agent playback is a barge-in. Tell the
            // service how much of the utterance was actually heard, then
            // let the bridge clear the telephony playback queue.
            if let Some((utterance_id, content_index)) = current_segment.take() {
                let audio_end_ms =
                    playback.played_ms(&utterance_id, content_index, config.audio.sample_rate);
                let truncate = json!({
                    "type": "conversation.item.truncate",
                    "item_id": utterance_id,
                    "content_index": content_index,
                    "audio_end_ms": audio_end_ms,
                });
                if let Err(e) = ws.send(Message::Text(truncate.to_string())).await {
                    warn!("Failed to send truncate after barge-in: {}", e);
                }
                let _ = event_tx.send(AgentEvent::AudioInterrupted);
            }
        }
        "response.function_call_arguments.done" => {
            let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let call_id = event.get("call_id").and_then(|v| v.as_str()).unwrap_or("");
            let args: Value = event
                .get("arguments")
                .and_then(|v| v.as_str())
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_else(|| json!({}));

            let output = tools::dispatch(name, &args, &config.tools);
            debug!(tool = name, "Tool dispatched");

            let reply = json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "function_call_output",
                    "call_id": call_id,
                    "output": output,
                }
            });
            if let Err(e) = ws.send(Message::Text(reply.to_string())).await {
                warn!("Failed to send tool output: {}", e);
                return;
            }
            let _ = ws
                .send(Message::Text(json!({"type": "response.create"}).to_string()))
                .await;
        }
        "error" => {
            let message = event
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown");
            warn!("Agent session reported error: {}", message);
        }
        _ => {
            let _ = event_tx.send(AgentEvent::Raw(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_session_update_negotiates_telephony_audio() {
        let config = AppConfig::default();
        let update = session_update(&config);

        assert_eq!(update["type"], "session.update");
        assert_eq!(update["session"]["input_audio_format"], "g711_ulaw");
        assert_eq!(update["session"]["output_audio_format"], "g711_ulaw");
        assert_eq!(update["session"]["turn_detection"]["type"], "semantic_vad");
        assert_eq!(
            update["session"]["turn_detection"]["interrupt_response"],
            true
        );
        assert!(update["session"]["tools"].as_array().unwrap().len() >= 4);
    }
}
