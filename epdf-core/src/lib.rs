//! Document model shared by all epdf front ends.
//!
//! A [`DocumentLoader`] resolves a file to a registered [`Backend`], opens it into a
//! [`Document`] and initializes every [`Page`]. Everything format-specific lives
//! behind the backend's [`BackendFunctions`] table; the [`layout`] helpers turn the
//! document's viewing state into pixel geometry.

pub mod backend;
pub mod config;
pub mod content_type;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod layout;
pub mod loader;
pub mod page;
pub mod registry;
pub mod render;
pub mod state;

#[cfg(test)]
mod testing;

pub use backend::{
    downcast_data, downcast_state, Backend, BackendData, BackendFunctions, BackendState,
    Capability,
};
pub use config::{Config, LayoutConfig, ViewConfig};
pub use content_type::{ContentTypeGuesser, MagicContentTypes};
pub use document::{AdjustMode, DeviceFactors, Document};
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use layout::PixelSize;
pub use loader::DocumentLoader;
pub use page::Page;
pub use registry::BackendRegistry;
pub use render::{ImageId, Rectangle, RenderImage, RenderTarget};
pub use state::{FileStateStore, MemoryStateStore, StateStore, ViewState};
