//! Service error types.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::fetch::FetchError;
use crate::source::UrlTemplateError;

/// Errors raised while assembling a [`TileService`](super::TileService).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid tile URL: {0}")]
    UrlTemplate(#[from] UrlTemplateError),

    #[error("HTTP setup failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Archive unavailable: {0}")]
    Archive(#[from] ArchiveError),
}
