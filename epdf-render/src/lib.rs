//! Format backends for epdf.

#[cfg(feature = "pdf")]
pub mod pdfium;
pub mod raster;

use epdf_core::BackendRegistry;
use tracing::debug;

/// Registers every backend compiled into this crate.
pub fn register_default_backends(registry: &mut BackendRegistry) {
    #[cfg(feature = "pdf")]
    registry.register(pdfium::backend());
    registry.register(raster::backend());
    debug!(content_types = ?registry.content_types(), "registered backends");
}
