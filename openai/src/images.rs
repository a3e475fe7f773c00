//! Image generation service.

use std::sync::Arc;

use reqwest::{Method, multipart};
use serde::{Deserialize, Serialize};

use super::{error::Result, http::HttpClient};

/// Image generation service.
pub struct ImageService {
    http: Arc<HttpClient>,
}

impl ImageService {
    pub(crate) fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Generates images from a prompt.
    pub async fn generate(&self, request: &ImageGenerateRequest) -> Result<ImageResponse> {
        self.http
            .request(Method::POST, "/images/generations", Some(request))
            .await
    }

    /// Edits an image according to a prompt, optionally within a mask.
    pub async fn edit(&self, request: &ImageEditRequest) -> Result<ImageResponse> {
        let mut form = image_form(&request.image, &request.filename, &request.options)
            .text("prompt", request.prompt.clone());
        if let Some(mask) = &request.mask {
            form = form.part(
                "mask",
                multipart::Part::bytes(mask.clone()).file_name("mask.png"),
            );
        }
        self.http.request_multipart("/images/edits", form).await
    }

    /// Creates variations of an image.
    pub async fn variation(&self, request: &ImageVariationRequest) -> Result<ImageResponse> {
        let form = image_form(&request.image, &request.filename, &request.options);
        self.http.request_multipart("/images/variations", form).await
    }
}

fn image_form(image: &[u8], filename: &str, options: &ImageOptions) -> multipart::Form {
    let mut form = multipart::Form::new().part(
        "image",
        multipart::Part::bytes(image.to_vec()).file_name(filename.to_string()),
    );
    if let Some(model) = &options.model {
        form = form.text("model", model.clone());
    }
    if let Some(n) = options.n {
        form = form.text("n", n.to_string());
    }
    if let Some(size) = &options.size {
        form = form.text("size", size.clone());
    }
    if let Some(format) = &options.response_format {
        form = form.text("response_format", format.clone());
    }
    form
}

// ==================== Request/Response Types ====================

/// Request for image generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageGenerateRequest {
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    /// e.g. "1024x1024".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,

    /// "url" or "b64_json".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
}

/// Options shared by the edit and variation endpoints.
#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    pub model: Option<String>,
    pub n: Option<u32>,
    pub size: Option<String>,
    pub response_format: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageEditRequest {
    pub image: Vec<u8>,
    pub filename: String,
    pub prompt: String,
    /// PNG whose transparent pixels mark the area to edit.
    pub mask: Option<Vec<u8>>,
    pub options: ImageOptions,
}

#[derive(Debug, Clone, Default)]
pub struct ImageVariationRequest {
    pub image: Vec<u8>,
    pub filename: String,
    pub options: ImageOptions,
}

/// Generated images.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResponse {
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub data: Vec<ImageData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}
