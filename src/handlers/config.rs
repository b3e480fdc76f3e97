use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Read-only view of the running configuration. Audio parameters are fixed
/// at startup and each call snapshots them at construction, so there is no
/// update counterpart.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "agent": {
                "realtime_url": config.agent.realtime_url,
                "model": config.agent.model,
                "voice": config.agent.voice,
                // Never echo the credential; report only whether it is set
                "api_key_configured": !config.agent.api_key.is_empty()
            },
            "audio": {
                "sample_rate": config.audio.sample_rate,
                "chunk_duration_s": config.audio.chunk_duration_s,
                "flush_size_bytes": config.buffer_config().flush_size_bytes()
            },
            "tools": {
                "document_path": config.tools.document_path,
                "feedback_db": config.tools.feedback_db
            }
        }
    })))
}
