//! Layered tile sources.
//!
//! A [`SourceChain`] is an owned sequence of [`SourceStage`]s ordered from
//! fastest to slowest. Each stage either answers a request itself or hands
//! it to the next stage, possibly learning the answer on the way back.
//!
//! ```text
//! ┌────────────────┐   miss   ┌────────────────┐   miss   ┌────────────────┐
//! │ MemoryCache    │ ───────► │ Archive        │ ───────► │ Network        │
//! │ Stage          │ ◄─────── │ Stage          │ ◄─────── │ Stage          │
//! └────────────────┘  store   └────────────────┘  store   └────────────────┘
//! ```

mod archive;
mod memory;
mod network;
pub(crate) mod stage;
mod url;

pub use archive::{ArchiveMode, ArchiveStage};
pub use memory::MemoryCacheStage;
pub use network::{NetworkStage, NetworkStats, DEFAULT_MAX_PENDING};
pub use stage::{delegate, SourceChain, SourceStage};
pub use url::{UrlTemplate, UrlTemplateError};
