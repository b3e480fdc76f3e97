//! # Tool Dispatch Surface
//!
//! The functions the voice agent may call mid-conversation. Each tool is a
//! synchronous request that always produces a human-readable string; when a
//! tool fails, the failure is encoded in the string rather than propagated,
//! so the agent's dialogue flow never aborts on a tool error.
//!
//! Tools have no access to bridge state. The bridge relays their results
//! opaquely.

use crate::config::ToolsConfig;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;

/// Function declarations advertised to the agent session at negotiation.
pub fn schemas() -> Value {
    json!([
        {
            "type": "function",
            "name": "get_weather",
            "description": "Get the weather in a city.",
            "parameters": {
                "type": "object",
                "properties": {
                    "city": { "type": "string", "description": "City name" }
                },
                "required": ["city"]
            }
        },
        {
            "type": "function",
            "name": "get_current_time",
            "description": "Get the current time.",
            "parameters": { "type": "object", "properties": {} }
        },
        {
            "type": "function",
            "name": "append_to_document",
            "description": "Append the given text to the shared notes document.",
            "parameters": {
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to append" }
                },
                "required": ["text"]
            }
        },
        {
            "type": "function",
            "name": "record_feedback",
            "description": "Insert user feedback into the feedback database.",
            "parameters": {
                "type": "object",
                "properties": {
                    "first_name": { "type": "string" },
                    "last_name": { "type": "string" },
                    "feedback": { "type": "string" }
                },
                "required": ["first_name", "last_name", "feedback"]
            }
        }
    ])
}

/// Invoke a tool by name with JSON arguments. Always returns a string; an
/// unknown tool or a bad argument set yields a descriptive message.
pub fn dispatch(name: &str, args: &Value, config: &ToolsConfig) -> String {
    match name {
        "get_weather" => match str_arg(args, "city") {
            Some(city) => get_weather(city),
            None => "get_weather requires a 'city' argument.".to_string(),
        },
        "get_current_time" => get_current_time(),
        "append_to_document" => match str_arg(args, "text") {
            Some(text) => append_to_document(text, &config.document_path),
            None => "append_to_document requires a 'text' argument.".to_string(),
        },
        "record_feedback" => {
            match (
                str_arg(args, "first_name"),
                str_arg(args, "last_name"),
                str_arg(args, "feedback"),
            ) {
                (Some(first), Some(last), Some(feedback)) => {
                    record_feedback(first, last, feedback, &config.feedback_db)
                }
                _ => "record_feedback requires 'first_name', 'last_name' and 'feedback'."
                    .to_string(),
            }
        }
        other => format!("Unknown tool: {}", other),
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn get_weather(city: &str) -> String {
    format!("The weather in {} is sunny.", city)
}

fn get_current_time() -> String {
    format!(
        "The time right now is {}.",
        chrono::Local::now().format("%H:%M:%S")
    )
}

fn append_to_document(text: &str, document_path: &str) -> String {
    if document_path.is_empty() {
        return "No document is configured for note taking.".to_string();
    }

    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(document_path)
        .and_then(|mut file| writeln!(file, "{}", text));

    match result {
        Ok(()) => "Successfully wrote to the document.".to_string(),
        Err(e) => format!("Failed to write to the document: {}", e),
    }
}

fn record_feedback(first_name: &str, last_name: &str, feedback: &str, db_path: &str) -> String {
    if db_path.is_empty() {
        return "No feedback database is configured.".to_string();
    }

    let result = Connection::open(db_path).and_then(|conn| {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                feedback TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "INSERT INTO user_feedback (first_name, last_name, feedback, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                first_name,
                last_name,
                feedback,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    });

    match result {
        Ok(id) => format!("Successfully inserted feedback record with id {}.", id),
        Err(e) => format!("An error occurred while saving feedback: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(document_path: &str, feedback_db: &str) -> ToolsConfig {
        ToolsConfig {
            document_path: document_path.to_string(),
            feedback_db: feedback_db.to_string(),
        }
    }

    fn temp_path(suffix: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("call-bridge-test-{}-{}", uuid::Uuid::new_v4(), suffix))
    }

    #[test]
    fn test_weather_tool() {
        let out = dispatch(
            "get_weather",
            &json!({"city": "Mumbai"}),
            &config_with("", ""),
        );
        assert_eq!(out, "The weather in Mumbai is sunny.");
    }

    #[test]
    fn test_clock_tool_mentions_time() {
        let out = dispatch("get_current_time", &json!({}), &config_with("", ""));
        assert!(out.starts_with("The time right now is "));
    }

    #[test]
    fn test_unknown_tool_is_a_string_not_an_error() {
        let out = dispatch("launch_rocket", &json!({}), &config_with("", ""));
        assert_eq!(out, "Unknown tool: launch_rocket");
    }

    #[test]
    fn test_missing_argument_is_described() {
        let out = dispatch("get_weather", &json!({}), &config_with("", ""));
        assert!(out.contains("'city'"));
    }

    #[test]
    fn test_document_append_writes_lines() {
        let path = temp_path("notes.txt");
        let config = config_with(path.to_str().unwrap(), "");

        let out = dispatch("append_to_document", &json!({"text": "first note"}), &config);
        assert_eq!(out, "Successfully wrote to the document.");
        dispatch("append_to_document", &json!({"text": "second note"}), &config);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first note\nsecond note\n");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_document_append_without_config_explains() {
        let out = dispatch(
            "append_to_document",
            &json!({"text": "x"}),
            &config_with("", ""),
        );
        assert_eq!(out, "No document is configured for note taking.");
    }

    #[test]
    fn test_feedback_insert_roundtrip() {
        let path = temp_path("feedback.db");
        let config = config_with("", path.to_str().unwrap());

        let out = dispatch(
            "record_feedback",
            &json!({"first_name": "Jane", "last_name": "Doe", "feedback": "Great service!"}),
            &config,
        );
        assert_eq!(out, "Successfully inserted feedback record with id 1.");

        let conn = Connection::open(&path).unwrap();
        let (first, feedback): (String, String) = conn
            .query_row(
                "SELECT first_name, feedback FROM user_feedback WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(first, "Jane");
        assert_eq!(feedback, "Great service!");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_feedback_without_config_explains() {
        let out = dispatch(
            "record_feedback",
            &json!({"first_name": "A", "last_name": "B", "feedback": "C"}),
            &config_with("", ""),
        );
        assert_eq!(out, "No feedback database is configured.");
    }
}
