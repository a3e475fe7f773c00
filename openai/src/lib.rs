//! OpenAI HTTP API SDK for Rust.
//!
//! Thin wrappers over chat completions, audio, images, batches, vector
//! stores and the Responses API. Streamed chat completions are rebuilt with
//! [`ChatStreamAccumulator`]; streamed responses are decoded and reconciled
//! with the realtime event model from `orca-openai-realtime`.

mod audio;
mod batches;
mod chat;
mod client;
mod error;
pub mod http;
mod images;
mod responses;
mod types;
mod vector_stores;

pub use audio::{AudioService, SpeechRequest, Transcription, TranscriptionRequest, TranscriptionSegment};
pub use batches::{Batch, BatchError, BatchErrors, BatchRequest, BatchService, RequestCounts};
pub use chat::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, ChatService,
    ChatStreamAccumulator, ChatTool, Choice, ChunkChoice, ChunkDelta, CompletionUsage,
    FunctionCall, FunctionCallDelta, FunctionDefinition, ToolCall, ToolCallDelta,
};
pub use client::{
    Client, ClientBuilder, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, ENV_API_KEY,
    ENV_BASE_URL, ENV_ORG_ID, ENV_PROJECT_ID,
};
pub use error::{Error, Result};
pub use images::{
    ImageData, ImageEditRequest, ImageGenerateRequest, ImageOptions, ImageResponse, ImageService,
    ImageVariationRequest,
};
pub use responses::{ModelResponse, ResponseRequest, ResponseService, ResponseStreamAccumulator};
pub use types::{DeletionStatus, Job, JobStatus, ListParams, ListResponse};
pub use vector_stores::{
    ExpiresAfter, FileBatch, FileBatchRequest, FileCounts, VectorStore, VectorStoreRequest,
    VectorStoreService,
};

#[cfg(test)]
mod tests;
