//! Trait definitions for the encoder module.

use async_trait::async_trait;

use super::error::EncodeError;
use super::handle::EncodeHandle;
use super::types::{EncodeRequest, MediaInfo};

/// An engine that transcodes a source into the fixed output profile.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns the name of this encoder implementation.
    fn name(&self) -> &str;

    /// Probes a source to get its media information.
    async fn probe(&self, location: &str) -> Result<MediaInfo, EncodeError>;

    /// Starts encoding a job.
    ///
    /// Fails fast with a classified error when the input is missing or
    /// unreadable, the destination cannot be prepared, or the engine cannot
    /// be spawned. Never retries internally.
    async fn start(&self, request: EncodeRequest) -> Result<EncodeHandle, EncodeError>;

    /// Validates that the encoder is properly configured and ready.
    async fn validate(&self) -> Result<(), EncodeError>;
}
