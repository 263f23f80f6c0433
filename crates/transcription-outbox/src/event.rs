//! Transcription event payload.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Bloodbank event type for completed transcriptions.
pub const TRANSCRIPTION_EVENT_TYPE: &str = "transcription.voice.completed";

/// Default producing service.
pub const DEFAULT_SOURCE: &str = "whisperlivekit";

/// Arbitrary JSON object attached to an event.
pub type JsonObject = Map<String, Value>;

/// A completed transcription, exactly as it is written to the WAL and handed
/// to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionEvent {
    pub text: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
    pub session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_metadata: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonObject>,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

impl TranscriptionEvent {
    /// Build an event stamped with the current time.
    ///
    /// Returns `None` when the text is empty after trimming.
    pub fn from_request(request: PublishRequest) -> Option<Self> {
        Self::from_request_at(request, Utc::now())
    }

    /// Build an event with an explicit timestamp.
    pub fn from_request_at(request: PublishRequest, now: DateTime<Utc>) -> Option<Self> {
        let text = request.text.trim();
        if text.is_empty() {
            return None;
        }

        Some(Self {
            text: text.to_string(),
            // WAL lines carry microseconds; keep the in-memory value identical.
            timestamp: now.trunc_subsecs(6),
            source: request.source.unwrap_or_else(default_source),
            session_id: request.session_id,
            target: request.target.filter(|t| !t.is_empty()),
            audio_metadata: request.audio_metadata.filter(|m| !m.is_empty()),
            context: request.context.filter(|m| !m.is_empty()),
        })
    }

    /// Serialize to a single WAL line (no trailing newline).
    pub fn to_wal_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse one WAL line.
    pub fn from_wal_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// Caller-supplied fields for one publish.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub text: String,
    pub session_id: Uuid,
    pub source: Option<String>,
    pub target: Option<String>,
    pub audio_metadata: Option<JsonObject>,
    pub context: Option<JsonObject>,
}

impl PublishRequest {
    pub fn new(text: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            text: text.into(),
            session_id,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_audio_metadata(mut self, audio_metadata: JsonObject) -> Self {
        self.audio_metadata = Some(audio_metadata);
        self
    }

    pub fn with_context(mut self, context: JsonObject) -> Self {
        self.context = Some(context);
        self
    }
}

/// RFC 3339 with microseconds and an explicit `+00:00` offset.
mod timestamp_format {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, false))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
