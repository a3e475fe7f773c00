//! Audio service: speech synthesis, transcription and translation.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::{Method, multipart};
use serde::{Deserialize, Serialize};

use super::{error::Result, http::HttpClient};

/// Audio service.
pub struct AudioService {
    http: Arc<HttpClient>,
}

impl AudioService {
    pub(crate) fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Synthesizes speech and returns the encoded audio.
    pub async fn speech(&self, request: &SpeechRequest) -> Result<Bytes> {
        self.http
            .request_bytes(Method::POST, "/audio/speech", Some(request))
            .await
    }

    /// Transcribes audio in its spoken language.
    pub async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcription> {
        self.http
            .request_multipart("/audio/transcriptions", request.to_form(true))
            .await
    }

    /// Translates audio into English text.
    pub async fn translate(&self, request: &TranscriptionRequest) -> Result<Transcription> {
        self.http
            .request_multipart("/audio/translations", request.to_form(false))
            .await
    }
}

// ==================== Request/Response Types ====================

/// Request for speech synthesis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechRequest {
    /// e.g. "gpt-4o-mini-tts", "tts-1".
    pub model: String,
    pub input: String,
    pub voice: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// "mp3", "opus", "aac", "flac", "wav" or "pcm".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// Request for transcription or translation.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionRequest {
    pub file: Vec<u8>,
    /// File name; its extension tells the server the container format.
    pub filename: String,
    pub model: String,
    /// ISO-639-1 language hint. Transcription only.
    pub language: Option<String>,
    pub prompt: Option<String>,
    /// "json", "text", "srt", "verbose_json" or "vtt". Only JSON formats
    /// decode into [`Transcription`].
    pub response_format: Option<String>,
    pub temperature: Option<f64>,
}

impl TranscriptionRequest {
    pub fn new(file: Vec<u8>, filename: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            file,
            filename: filename.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    fn to_form(&self, with_language: bool) -> multipart::Form {
        let mut form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(self.file.clone()).file_name(self.filename.clone()),
            )
            .text("model", self.model.clone());
        if with_language {
            if let Some(language) = &self.language {
                form = form.text("language", language.clone());
            }
        }
        if let Some(prompt) = &self.prompt {
            form = form.text("prompt", prompt.clone());
        }
        if let Some(format) = &self.response_format {
            form = form.text("response_format", format.clone());
        }
        if let Some(temperature) = self.temperature {
            form = form.text("temperature", temperature.to_string());
        }
        form
    }
}

/// Transcription or translation result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<TranscriptionSegment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}
