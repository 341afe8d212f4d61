// Relay message types — the wire vocabulary between watch and phone

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Coarse classification of a relay message, used for queue accounting
/// and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// A translation request travelling watch → phone
    Translation,
    /// Credits query or update
    Credits,
    /// Active language pair replication
    LanguageSync,
    /// Latency/liveness probe
    HealthProbe,
    /// Terminal replies (responses, acks, probe replies)
    Reply,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Translation => write!(f, "translation"),
            MessageKind::Credits => write!(f, "credits"),
            MessageKind::LanguageSync => write!(f, "language-sync"),
            MessageKind::HealthProbe => write!(f, "health-probe"),
            MessageKind::Reply => write!(f, "reply"),
        }
    }
}

/// Recorded speech attached to a translation request.
///
/// Short clips ride the message channel inline; longer recordings are
/// handed to the transport's file-transfer lane and referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioPayload {
    /// Raw audio bytes carried in the frame itself
    Inline(Vec<u8>),
    /// Reference to a recording shipped via file transfer
    FileRef {
        /// Transfer name agreed with the peer
        name: String,
        /// Size of the referenced recording
        byte_len: u64,
    },
}

impl AudioPayload {
    /// Number of audio bytes this payload represents
    pub fn byte_len(&self) -> u64 {
        match self {
            AudioPayload::Inline(bytes) => bytes.len() as u64,
            AudioPayload::FileRef { byte_len, .. } => *byte_len,
        }
    }

    /// Whether the payload must ride the file-transfer lane
    pub fn is_file_ref(&self) -> bool {
        matches!(self, AudioPayload::FileRef { .. })
    }
}

/// A translation request as created on the watch when the user finishes
/// recording.
///
/// The `id` is the correlation key: it is minted once per logical request
/// (UUID v4) and reused verbatim across retries, so the phone can
/// deduplicate and the watch can match the eventual response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// Correlation identifier, stable across retries
    pub id: String,
    /// Source language code (e.g. "en")
    pub source_language: String,
    /// Target language code (e.g. "es")
    pub target_language: String,
    /// The recorded speech to translate
    pub audio: AudioPayload,
    /// Unix timestamp (seconds) of creation
    pub created_at: u64,
}

impl TranslationRequest {
    /// Create a new request with a fresh correlation id
    pub fn new(
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        audio: AudioPayload,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            audio,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// The phone's answer to a translation request.
///
/// Exactly one response is authoritative per request id; the correlator
/// discards any later duplicate bearing the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResponse {
    /// Correlation id of the originating request
    pub request_id: String,
    /// What the speech engine heard
    pub transcribed_text: String,
    /// The translated text
    pub translated_text: String,
    /// Synthesized speech for playback, when available
    pub audio: Option<Vec<u8>>,
    /// Usage budget left after this request
    pub credits_remaining: u32,
    /// Set when the backend could not translate
    pub error: Option<String>,
}

impl TranslationResponse {
    /// Build a successful response for a request
    pub fn success(
        request_id: impl Into<String>,
        transcribed_text: impl Into<String>,
        translated_text: impl Into<String>,
        audio: Option<Vec<u8>>,
        credits_remaining: u32,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            transcribed_text: transcribed_text.into(),
            translated_text: translated_text.into(),
            audio,
            credits_remaining,
            error: None,
        }
    }

    /// Build an error response for a request
    pub fn failure(
        request_id: impl Into<String>,
        error: impl Into<String>,
        credits_remaining: u32,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            transcribed_text: String::new(),
            translated_text: String::new(),
            audio: None,
            credits_remaining,
            error: Some(error.into()),
        }
    }
}

/// Everything that can cross the watch↔phone channel.
///
/// A tagged envelope instead of string-keyed dictionaries: each variant
/// carries a typed payload and is encoded/decoded only at the transport
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelayFrame {
    /// Watch → phone: translate this recording
    TranslationRequest(TranslationRequest),
    /// Phone → watch: translation outcome
    TranslationResponse(TranslationResponse),
    /// Ask the peer for the remaining usage budget
    CreditsQuery { id: String },
    /// Remaining usage budget, answering a query by id
    CreditsUpdate { id: String, credits: u32 },
    /// Replicate the active language pair to the peer
    LanguageSync {
        id: String,
        source_language: String,
        target_language: String,
    },
    /// Acknowledge a language sync by id
    LanguageAck { id: String },
    /// Latency probe; `sent_at_ms` is the sender's unix-millis clock
    HealthProbe { id: String, sent_at_ms: u64 },
    /// Probe echo, returning the original timestamp untouched
    HealthProbeReply { id: String, sent_at_ms: u64 },
}

impl RelayFrame {
    /// The correlation id embedded in this frame
    pub fn correlation_id(&self) -> &str {
        match self {
            RelayFrame::TranslationRequest(req) => &req.id,
            RelayFrame::TranslationResponse(resp) => &resp.request_id,
            RelayFrame::CreditsQuery { id }
            | RelayFrame::CreditsUpdate { id, .. }
            | RelayFrame::LanguageSync { id, .. }
            | RelayFrame::LanguageAck { id }
            | RelayFrame::HealthProbe { id, .. }
            | RelayFrame::HealthProbeReply { id, .. } => id,
        }
    }

    /// Classify this frame for queue accounting and logging
    pub fn kind(&self) -> MessageKind {
        match self {
            RelayFrame::TranslationRequest(_) => MessageKind::Translation,
            RelayFrame::CreditsQuery { .. } => MessageKind::Credits,
            RelayFrame::LanguageSync { .. } => MessageKind::LanguageSync,
            RelayFrame::HealthProbe { .. } => MessageKind::HealthProbe,
            RelayFrame::TranslationResponse(_)
            | RelayFrame::CreditsUpdate { .. }
            | RelayFrame::LanguageAck { .. }
            | RelayFrame::HealthProbeReply { .. } => MessageKind::Reply,
        }
    }
}
