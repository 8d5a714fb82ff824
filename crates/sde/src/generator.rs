//! Seam to the image-generation backend used by `Generator.generate`.
//!
//! The engine never renders anything itself. A backend receives a fully
//! resolved [`GenerationRequest`] and hands back one [`ImageArtifact`].

use log::info;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub steps: u32,
    pub guidance: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageArtifact {
    pub model: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    /// Encoded image bytes; empty for metadata-only artifacts.
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("model '{0}' not found")]
    ModelNotFound(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("generation failed: {0}")]
    Failed(String),
}

/// Blocking from the executor's point of view.
pub trait GenerationBackend {
    fn generate(&mut self, request: &GenerationRequest) -> Result<ImageArtifact, GenerationError>;
}

/// Returns metadata-only artifacts and remembers every request.
#[derive(Debug, Default)]
pub struct DryRunBackend {
    known_models: Vec<String>,
    requests: Vec<GenerationRequest>,
}

impl DryRunBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the listed models are accepted. An empty list accepts any model.
    pub fn with_known_models(
        mut self,
        known_models: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.known_models = known_models.into_iter().map(Into::into).collect();
        self
    }

    pub fn requests(&self) -> &[GenerationRequest] {
        &self.requests
    }
}

impl GenerationBackend for DryRunBackend {
    fn generate(&mut self, request: &GenerationRequest) -> Result<ImageArtifact, GenerationError> {
        if !self.known_models.is_empty() && !self.known_models.contains(&request.model) {
            return Err(GenerationError::ModelNotFound(request.model.clone()));
        }
        info!(
            "Dry run: {}x{} image from '{}' for prompt {:?}",
            request.width, request.height, request.model, request.prompt
        );
        self.requests.push(request.clone());
        Ok(ImageArtifact {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            width: request.width,
            height: request.height,
            data: Vec::new(),
        })
    }
}

/// Stands in for a backend that cannot be reached.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl GenerationBackend for UnavailableBackend {
    fn generate(&mut self, _request: &GenerationRequest) -> Result<ImageArtifact, GenerationError> {
        Err(GenerationError::Unavailable(self.reason.clone()))
    }
}
