use std::fmt;

use crate::backend::{BackendData, BackendState};

/// One page of a [`Document`](crate::Document).
///
/// Pages are created by the loader and torn down together with their document;
/// they are never freed on their own. Every backend call that concerns a page goes
/// through the owning document, which carries the backend reference.
pub struct Page {
    index: u32,
    width: f64,
    height: f64,
    visible: bool,
    data: Option<BackendData>,
}

impl Page {
    /// Extent reported for a page whose backend has not provided one.
    pub const UNAVAILABLE: f64 = -1.0;

    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            width: Self::UNAVAILABLE,
            height: Self::UNAVAILABLE,
            visible: false,
            data: None,
        }
    }

    /// Zero-based position inside the owning document.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Width in page units, not transformed by rotation or scale.
    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn set_width(&mut self, width: f64) {
        self.width = width;
    }

    /// Height in page units, not transformed by rotation or scale.
    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn set_height(&mut self, height: f64) {
        self.height = height;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn data(&self) -> BackendState<'_> {
        self.data.as_deref()
    }

    /// Attaches backend page state, returning whatever was attached before.
    pub fn set_data(&mut self, data: BackendData) -> Option<BackendData> {
        self.data.replace(data)
    }

    pub(crate) fn take_data(&mut self) -> Option<BackendData> {
        self.data.take()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("visible", &self.visible)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}
