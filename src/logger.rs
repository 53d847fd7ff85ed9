use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

pub enum MessageLogMode {
    Full,
    /// First payload per entity in full, then only the fields that changed.
    Diffed,
}

/// NDJSON record of device traffic: inbound stream events and outbound commands.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous: HashMap<String, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    pub fn log_command(&mut self, action: &str, url: &str) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "action": action,
            "url": url,
        });
        self.write_line(&entry);
    }

    pub fn log_stream(&mut self, status: &str, detail: Option<&str>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "stream",
            "status": status,
            "detail": detail,
        });
        self.write_line(&entry);
    }

    pub fn log_event(&mut self, event: &str, body: &Value) {
        let diffed_id = match self.mode {
            MessageLogMode::Diffed => body.get("id").and_then(|v| v.as_str()),
            MessageLogMode::Full => None,
        };

        let Some(id) = diffed_id else {
            let entry = json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "event",
                "event": event,
                "body": body,
            });
            self.write_line(&entry);
            return;
        };

        let entry = match self.previous.get(id) {
            None => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "event",
                "event": event,
                "full": true,
                "body": body,
            }),
            Some(prev) => {
                let mut changes = Vec::new();
                diff_json(prev, body, "", &mut changes);
                let change_entries: Vec<Value> = changes
                    .iter()
                    .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                    .collect();
                json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "event",
                    "event": event,
                    "id": id,
                    "changes": change_entries,
                })
            }
        };
        self.previous.insert(id.to_string(), body.clone());
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

/// Leaf-level differences between two JSON documents as `(path, old, new)`.
fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                let prev_val = prev_map.get(key).unwrap_or(&Value::Null);
                diff_json(prev_val, curr_val, &path, changes);
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    fn read_lines(path: &str) -> Vec<Value> {
        let mut contents = String::new();
        std::fs::File::open(path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn log_command_writes_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_command(
            "climate",
            "http://ac/climate/air_conditioner/set?target_temperature=24.5",
        );

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "cmd");
        assert_eq!(lines[0]["action"], "climate");
        assert!(lines[0]["url"].as_str().unwrap().ends_with("24.5"));
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn diffed_mode_logs_full_first_then_changes() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        logger.log_event("state", &json!({"id": "climate-ac", "mode": "COOL", "target_temperature": 22}));
        logger.log_event("state", &json!({"id": "climate-ac", "mode": "COOL", "target_temperature": 23}));

        let lines = read_lines(path);
        assert_eq!(lines[0]["full"], true);
        assert!(lines[0]["body"].is_object());
        let changes = lines[1]["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["path"], "target_temperature");
        assert_eq!(changes[0]["old"], 22);
        assert_eq!(changes[0]["new"], 23);
    }

    #[test]
    fn diffed_mode_tracks_entities_separately() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        logger.log_event("state", &json!({"id": "climate-ac", "mode": "COOL"}));
        logger.log_event("state", &json!({"id": "switch-air_conditioner_beeper", "value": "OFF"}));
        logger.log_event("state", &json!({"id": "climate-ac", "mode": "COOL"}));

        let lines = read_lines(path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["full"], true);
        assert_eq!(lines[2]["changes"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn events_without_id_are_logged_in_full() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();
        logger.log_event("log", &json!("booting"));
        logger.log_stream("closed", Some("connection reset"));

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "event");
        assert_eq!(lines[0]["body"], "booting");
        assert_eq!(lines[1]["dir"], "stream");
        assert_eq!(lines[1]["detail"], "connection reset");
    }
}
