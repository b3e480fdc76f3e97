//! # Media-Stream Bridge Handler
//!
//! Terminates the telephony media-stream WebSocket and bridges it to the
//! voice-agent session. One actor per phone call.
//!
//! ## Bridging Protocol:
//! 1. **Connection**: the telephony side connects to `/ws/media-stream`;
//!    the agent session is negotiated before the upgrade completes
//! 2. **Start**: the `start` frame delivers the stream SID all outbound
//!    frames must carry
//! 3. **Caller audio**: `media` frames are decoded and accumulated; chunks
//!    are forwarded upstream on a size threshold or a staleness tick
//! 4. **Agent audio**: each chunk goes to the phone as a `media` frame
//!    followed by a `mark`; the far end's mark acknowledgement feeds the
//!    playback ledger
//! 5. **Barge-in**: an interruption event from the agent session becomes a
//!    single `clear` frame
//! 6. **Teardown**: `stop`, transport close, or the agent event stream
//!    ending all converge on stopping the actor
//!
//! ## Concurrency Model:
//! The actor context interleaves exactly three activities: the transport
//! pump (WebSocket `StreamHandler`), the agent event pump (an attached
//! stream), and the periodic flush tick (`run_interval`). Handlers run one
//! at a time and never suspend mid-mutation, so the buffer, mark table and
//! stream SID need no locking. A mark is created in the same handler
//! invocation that sends its media frame, which makes an acknowledgement
//! for an unknown chunk structurally impossible.
//!
//! A fault in any single frame or event is logged and isolated to that
//! frame; only a dead transport or a dead agent session ends the call.

use crate::agent::playback::PlaybackTracker;
use crate::agent::session::{AgentEvent, AgentHandle, AgentSession};
use crate::bridge::frames::{InboundFrame, OutboundFrame};
use crate::bridge::session::{CallPhase, StreamSession};
use crate::config::AppConfig;
use crate::error::{AppError, BridgeError};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, trace, warn};

/// Actor bridging one phone call.
pub struct CallBridgeSocket {
    /// Per-call state: SID, phase, buffer, marks, counters
    session: StreamSession,

    /// Grip on the voice-agent session
    agent: AgentHandle,

    /// Agent event stream, attached to the actor context in `started`
    agent_events: Option<mpsc::UnboundedReceiver<AgentEvent>>,

    /// Played-audio ledger shared with the agent session
    playback: Arc<PlaybackTracker>,

    /// Interval of the staleness tick
    tick_interval: Duration,

    /// Shared service state (call gauge)
    app_state: web::Data<AppState>,
}

impl CallBridgeSocket {
    pub fn new(
        config: &AppConfig,
        agent: AgentHandle,
        agent_events: mpsc::UnboundedReceiver<AgentEvent>,
        playback: Arc<PlaybackTracker>,
        app_state: web::Data<AppState>,
    ) -> Self {
        let buffer_config = config.buffer_config();
        Self {
            session: StreamSession::new(&buffer_config),
            agent,
            agent_events: Some(agent_events),
            playback,
            tick_interval: buffer_config.tick_interval(),
            app_state,
        }
    }

    /// Push one accumulated chunk to the agent session. A closed session
    /// means the call is over; stop the actor so teardown runs.
    fn forward_chunk(&mut self, chunk: Vec<u8>, ctx: &mut ws::WebsocketContext<Self>) {
        match self.agent.send_audio(chunk) {
            Ok(()) => self.session.stats.chunks_forwarded += 1,
            Err(e) => {
                warn!(call_id = %self.session.call_id, error = %e, "Agent session gone, ending call");
                self.session.close();
                ctx.stop();
            }
        }
    }

    /// Serialize and write one outbound frame to the telephony connection.
    fn send_frame(&mut self, frame: OutboundFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match frame.to_json() {
            Ok(json) => ctx.text(json),
            Err(e) => error!(call_id = %self.session.call_id, error = %e, "Dropped outbound frame"),
        }
    }

    /// Handle one inbound text frame. Per-frame errors propagate to the
    /// caller for logging; they never terminate the connection.
    fn handle_frame(
        &mut self,
        text: &str,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Result<(), BridgeError> {
        // No new work once the call is closing
        if self.session.phase() == CallPhase::Closing {
            return Ok(());
        }

        match InboundFrame::parse(text)? {
            InboundFrame::Connected => {
                debug!(call_id = %self.session.call_id, "Media stream transport connected");
            }
            InboundFrame::Start { start } => {
                let sid = start.stream_sid;
                info!(call_id = %self.session.call_id, stream_sid = %sid, "Media stream started");
                self.session.begin_stream(sid)?;
            }
            InboundFrame::Media { media } => {
                let bytes = media.decode()?;
                self.session.stats.media_frames_in += 1;
                self.session.stats.audio_bytes_in += bytes.len() as u64;

                if let Some(chunk) = self.session.buffer.append(&bytes) {
                    self.forward_chunk(chunk, ctx);
                }
            }
            InboundFrame::Mark { mark } => {
                match self.session.marks.resolve(&mark.name) {
                    Some(provenance) => {
                        self.playback.record_played(
                            &provenance.utterance_id,
                            provenance.content_index,
                            provenance.byte_count,
                        );
                        self.session.stats.marks_acked += 1;
                        debug!(
                            call_id = %self.session.call_id,
                            utterance = %provenance.utterance_id,
                            content_index = provenance.content_index,
                            bytes = provenance.byte_count,
                            "Playback acknowledged"
                        );
                    }
                    // Normal after a clear: the far end may still acknowledge
                    // marks for audio it already flushed
                    None => {
                        let e = BridgeError::UnknownMark(mark.name);
                        debug!(call_id = %self.session.call_id, kind = e.kind(), "{}", e);
                    }
                }
            }
            InboundFrame::Stop => {
                info!(call_id = %self.session.call_id, "Media stream stopped");
                self.session.close();
                ctx.stop();
            }
            InboundFrame::Unknown => {
                trace!(call_id = %self.session.call_id, "Ignored unhandled transport event");
            }
        }

        Ok(())
    }
}

impl Actor for CallBridgeSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Wire up the two remaining activities: the agent event pump and the
    /// staleness tick. The transport pump is the WebSocket stream itself.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!(call_id = %self.session.call_id, "Call bridge started");
        self.app_state.increment_active_calls();

        if let Some(events) = self.agent_events.take() {
            ctx.add_stream(UnboundedReceiverStream::new(events));
        }

        ctx.run_interval(self.tick_interval, |act, ctx| {
            if let Some(chunk) = act.session.buffer.flush_if_stale(Instant::now()) {
                trace!(call_id = %act.session.call_id, bytes = chunk.len(), "Stale buffer flushed");
                act.forward_chunk(chunk, ctx);
            }
        });
    }

    /// Teardown: release the agent session and log the call summary. All
    /// three activities die with the actor context.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.session.close();
        self.agent.close();
        self.app_state.decrement_active_calls();

        let stats = &self.session.stats;
        info!(
            call_id = %self.session.call_id,
            media_frames_in = stats.media_frames_in,
            audio_bytes_in = stats.audio_bytes_in,
            chunks_forwarded = stats.chunks_forwarded,
            media_frames_out = stats.media_frames_out,
            marks_acked = stats.marks_acked,
            marks_unacked = self.session.marks.in_flight(),
            frames_dropped = stats.frames_dropped,
            "Call bridge stopped"
        );
    }
}

/// Transport pump: frames from the telephony side.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for CallBridgeSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                if let Err(e) = self.handle_frame(&text, ctx) {
                    self.session.stats.frames_dropped += 1;
                    warn!(
                        call_id = %self.session.call_id,
                        kind = e.kind(),
                        error = %e,
                        "Dropped inbound frame"
                    );
                }
            }
            Ok(ws::Message::Binary(_)) => {
                // The line protocol is text-only
                warn!(call_id = %self.session.call_id, "Unexpected binary frame ignored");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(call_id = %self.session.call_id, ?reason, "Telephony connection closed");
                self.session.close();
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(call_id = %self.session.call_id, "Unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!(call_id = %self.session.call_id, error = %e, "Transport protocol error");
                self.session.close();
                ctx.stop();
            }
        }
    }
}

/// Agent event pump: speech and control events from the voice-agent session.
impl StreamHandler<AgentEvent> for CallBridgeSocket {
    fn handle(&mut self, event: AgentEvent, ctx: &mut Self::Context) {
        match event {
            AgentEvent::Audio {
                utterance_id,
                content_index,
                data,
            } => {
                let sid = match self.session.stream_sid() {
                    Some(sid) => sid.to_string(),
                    None => {
                        // Nothing can be delivered before the start frame
                        warn!(call_id = %self.session.call_id, "Agent audio before start frame dropped");
                        return;
                    }
                };

                // Mark and media leave in the same handler invocation: the
                // acknowledgement can never precede the table entry
                let token = self
                    .session
                    .marks
                    .create(&utterance_id, content_index, data.len());
                self.send_frame(OutboundFrame::media(&sid, &data), ctx);
                self.send_frame(OutboundFrame::mark(&sid, token), ctx);
                self.session.stats.media_frames_out += 1;
            }
            AgentEvent::AudioInterrupted => {
                if let Some(sid) = self.session.stream_sid() {
                    let sid = sid.to_string();
                    info!(call_id = %self.session.call_id, "Barge-in, clearing playback queue");
                    self.send_frame(OutboundFrame::clear(&sid), ctx);
                }
            }
            AgentEvent::AudioEnd => {
                debug!(call_id = %self.session.call_id, "Agent utterance finished");
            }
            AgentEvent::Raw(event) => {
                trace!(call_id = %self.session.call_id, ?event, "Passthrough agent event");
            }
        }
    }

    /// The agent session ended; the call cannot continue.
    fn finished(&mut self, ctx: &mut Self::Context) {
        info!(call_id = %self.session.call_id, "Agent session ended, closing call");
        self.session.close();
        ctx.stop();
    }
}

/// WebSocket endpoint handler for `/ws/media-stream`.
///
/// The agent session is negotiated before the upgrade completes so a call
/// is never half-open: if the upstream connect fails the telephony side
/// gets an HTTP error instead of a dead socket.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "New media stream connection from {:?}",
        req.connection_info().peer_addr()
    );

    let config = app_state.get_config();
    let playback = Arc::new(PlaybackTracker::new());

    let (agent, agent_events) = AgentSession::connect(&config, playback.clone())
        .await
        .map_err(|e| {
            error!("Agent session negotiation failed: {}", e);
            AppError::AgentUnavailable(e.to_string())
        })?;

    let socket = CallBridgeSocket::new(&config, agent, agent_events, playback, app_state);
    ws::start(socket, &req, stream)
}
