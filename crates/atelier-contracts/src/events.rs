use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::images::{ImageId, MimeType};

/// Everything the gallery records about a session.
///
/// Serialized internally tagged, so the variant name becomes the `type`
/// field of the log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GalleryEvent {
    SessionStarted,
    GenerationStarted {
        prompt: String,
    },
    ImageCreated {
        image_id: ImageId,
        prompt: String,
        mime_type: MimeType,
        bytes: usize,
    },
    GenerationFailed {
        prompt: String,
        error: String,
        detail: String,
    },
    EditStarted {
        image_id: ImageId,
        instruction: String,
        mime_type: MimeType,
    },
    EditFailed {
        image_id: ImageId,
        error: String,
        detail: String,
    },
    UpscaleStarted {
        image_id: ImageId,
        mime_type: MimeType,
    },
    UpscaleFailed {
        image_id: ImageId,
        error: String,
        detail: String,
    },
    ImageReplaced {
        source_id: ImageId,
        image_id: ImageId,
        position: usize,
        prompt: String,
        mime_type: MimeType,
    },
    /// The source left the gallery before its derived image arrived.
    ReplacementDropped {
        source_id: ImageId,
        dropped_id: ImageId,
    },
    ValidationFailed {
        error: String,
    },
    EditTargetSelected {
        image_id: ImageId,
    },
    EditTargetCleared {
        image_id: ImageId,
    },
    ImageOpened {
        image_id: ImageId,
        prompt: String,
        mime_type: MimeType,
    },
    ImageDownloaded {
        image_id: ImageId,
        filename: String,
        path: PathBuf,
    },
    DownloadFailed {
        image_id: ImageId,
        filename: String,
        detail: String,
    },
}

/// Appends one JSON object per event to `events.jsonl`.
///
/// Each line is the serialized event plus `session_id` and a microsecond
/// RFC 3339 `ts`. Clones share the same file lock.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    session_id: Arc<str>,
    lock: Arc<Mutex<()>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: Arc::from(session_id.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn emit(&self, event: &GalleryEvent) -> anyhow::Result<Value> {
        let Value::Object(mut record) = serde_json::to_value(event)? else {
            bail!("event did not serialize to a JSON object");
        };
        record.insert(
            "session_id".to_string(),
            Value::String(self.session_id.to_string()),
        );
        record.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        let record = Value::Object(record);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    fn read_lines(path: &Path) -> anyhow::Result<Vec<Value>> {
        let raw = fs::read_to_string(path)?;
        let mut lines = Vec::new();
        for line in raw.lines() {
            lines.push(serde_json::from_str(line)?);
        }
        Ok(lines)
    }

    #[test]
    fn variant_name_becomes_type_field() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let emitted = writer.emit(&GalleryEvent::ImageCreated {
            image_id: ImageId::new("img-1"),
            prompt: "a red fox".to_string(),
            mime_type: MimeType::Jpeg,
            bytes: 42,
        })?;

        let lines = read_lines(&path)?;
        assert_eq!(lines, vec![emitted]);
        let line = &lines[0];
        assert_eq!(line["type"], "image_created");
        assert_eq!(line["session_id"], "session-123");
        assert_eq!(line["image_id"], "img-1");
        assert_eq!(line["mime_type"], "image/jpeg");
        assert_eq!(line["bytes"], 42);
        DateTime::parse_from_rfc3339(line["ts"].as_str().unwrap_or_default())?;
        Ok(())
    }

    #[test]
    fn unit_variant_carries_only_envelope() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "s");
        let emitted = writer.emit(&GalleryEvent::SessionStarted)?;
        let fields = emitted
            .as_object()
            .map(|map| map.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        assert_eq!(fields, vec!["session_id", "ts", "type"]);
        Ok(())
    }

    #[test]
    fn clones_append_to_same_file_and_create_parents() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.emit(&GalleryEvent::SessionStarted)?;
        writer.clone().emit(&GalleryEvent::ValidationFailed {
            error: "Please enter a prompt.".to_string(),
        })?;

        let lines = read_lines(&path)?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["type"], "validation_failed");
        assert_eq!(lines[1]["error"], "Please enter a prompt.");
        Ok(())
    }

    #[test]
    fn unwritable_path_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocker = temp.path().join("file");
        fs::write(&blocker, "x")?;
        let writer = EventWriter::new(blocker.join("events.jsonl"), "s");
        assert!(writer.emit(&GalleryEvent::SessionStarted).is_err());
        Ok(())
    }
}
