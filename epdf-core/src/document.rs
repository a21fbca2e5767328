use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::backend::{Backend, BackendData, BackendState};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::layout::{self, PixelSize};
use crate::page::Page;
use crate::render::{ImageId, Rectangle, RenderImage, RenderTarget};

/// How zoom is fitted to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdjustMode {
    #[default]
    None,
    BestFit,
    Width,
    InputBar,
}

impl AdjustMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustMode::None => "none",
            AdjustMode::BestFit => "best-fit",
            AdjustMode::Width => "width",
            AdjustMode::InputBar => "input-bar",
        }
    }
}

impl fmt::Display for AdjustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(AdjustMode::None),
            "best-fit" | "bestfit" => Ok(AdjustMode::BestFit),
            "width" => Ok(AdjustMode::Width),
            "input-bar" | "inputbar" => Ok(AdjustMode::InputBar),
            _ => Err(Error::InvalidArguments),
        }
    }
}

/// Per-axis screen scaling (e.g. HiDPI). Both components are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceFactors {
    pub x: f64,
    pub y: f64,
}

impl Default for DeviceFactors {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

/// An open document: identity, viewing state, grid layout and its pages.
///
/// Owns its pages and the backend document state. Dropping a document (or calling
/// [`Document::close`]) tears the pages down in index order before the backend
/// state, always through the backend that created them.
pub struct Document {
    path: PathBuf,
    uri: Option<String>,
    basename: String,
    fingerprint: Fingerprint,
    password: Option<String>,
    current_page_number: u32,
    number_of_pages: u32,
    zoom: f64,
    rotation: u32,
    adjust_mode: AdjustMode,
    page_offset: i32,
    cell_width: f64,
    cell_height: f64,
    view_width: u32,
    view_height: u32,
    view_ppi: f64,
    device_factors: DeviceFactors,
    pages_per_row: u32,
    first_page_column: u32,
    page_padding: u32,
    position_x: f64,
    position_y: f64,
    pages: Vec<Page>,
    data: Option<BackendData>,
    backend: Arc<Backend>,
    closed: bool,
}

impl Document {
    pub(crate) fn new(
        path: PathBuf,
        uri: Option<String>,
        basename: String,
        fingerprint: Fingerprint,
        password: Option<String>,
        backend: Arc<Backend>,
    ) -> Self {
        Self {
            path,
            uri,
            basename,
            fingerprint,
            password,
            current_page_number: 0,
            number_of_pages: 0,
            zoom: 1.0,
            rotation: 0,
            adjust_mode: AdjustMode::None,
            page_offset: 0,
            cell_width: 0.0,
            cell_height: 0.0,
            view_width: 0,
            view_height: 0,
            view_ppi: 0.0,
            device_factors: DeviceFactors::default(),
            pages_per_row: 0,
            first_page_column: 0,
            page_padding: 0,
            position_x: 0.0,
            position_y: 0.0,
            pages: Vec::new(),
            data: None,
            backend,
            closed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn number_of_pages(&self) -> u32 {
        self.number_of_pages
    }

    /// Set by the backend's open slot.
    pub fn set_number_of_pages(&mut self, number_of_pages: u32) {
        self.number_of_pages = number_of_pages;
    }

    pub fn current_page_number(&self) -> u32 {
        self.current_page_number
    }

    pub fn set_current_page_number(&mut self, current_page: u32) {
        self.current_page_number = current_page;
    }

    /// Horizontal position as a fraction of the document width (0 = left, 1 = right).
    pub fn position_x(&self) -> f64 {
        self.position_x
    }

    /// Vertical position as a fraction of the document height (0 = top, 1 = bottom).
    pub fn position_y(&self) -> f64 {
        self.position_y
    }

    pub fn set_position_x(&mut self, position_x: f64) {
        self.position_x = position_x;
    }

    pub fn set_position_y(&mut self, position_y: f64) {
        self.position_y = position_y;
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    /// Pixels per page point at the current zoom and viewport PPI.
    pub fn scale(&self) -> f64 {
        layout::scale(self)
    }

    /// One of 0, 90, 180 or 270.
    pub fn rotation(&self) -> u32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: i32) {
        self.rotation = layout::normalize_rotation(rotation);
    }

    pub fn adjust_mode(&self) -> AdjustMode {
        self.adjust_mode
    }

    pub fn set_adjust_mode(&mut self, mode: AdjustMode) {
        self.adjust_mode = mode;
    }

    /// Recomputes zoom from the adjust mode and viewport. Returns the new zoom, or
    /// `None` when the mode does not fit or the sizes involved are still zero.
    pub fn apply_adjust_mode(&mut self) -> Option<f64> {
        let zoom = layout::fit_zoom(self)?;
        self.zoom = zoom;
        Some(zoom)
    }

    pub fn page_offset(&self) -> i32 {
        self.page_offset
    }

    pub fn set_page_offset(&mut self, page_offset: i32) {
        self.page_offset = page_offset;
    }

    /// Number shown to the reader for the page at `index`.
    pub fn page_display_number(&self, index: u32) -> i64 {
        i64::from(index) + 1 + i64::from(self.page_offset)
    }

    pub fn set_viewport_width(&mut self, width: u32) {
        self.view_width = width;
    }

    pub fn set_viewport_height(&mut self, height: u32) {
        self.view_height = height;
    }

    pub fn viewport_size(&self) -> PixelSize {
        PixelSize {
            width: self.view_width,
            height: self.view_height,
        }
    }

    /// Monitor resolution after device scaling; 0 when unknown.
    pub fn viewport_ppi(&self) -> f64 {
        self.view_ppi
    }

    pub fn set_viewport_ppi(&mut self, ppi: f64) {
        self.view_ppi = ppi;
    }

    pub fn device_factors(&self) -> DeviceFactors {
        self.device_factors
    }

    /// Ignored (previous factors kept) when either factor is zero or close to it.
    pub fn set_device_factors(&mut self, x: f64, y: f64) {
        if x.abs() < f64::EPSILON || y.abs() < f64::EPSILON {
            warn!(x, y, "refusing to set zero device factors");
            return;
        }
        self.device_factors = DeviceFactors { x, y };
    }

    /// Largest page width seen while opening, in page units.
    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    /// Largest page height seen while opening, in page units.
    pub fn cell_height(&self) -> f64 {
        self.cell_height
    }

    pub fn cell_size(&self) -> PixelSize {
        layout::cell_size(self)
    }

    pub fn document_size(&self) -> PixelSize {
        layout::document_size(self)
    }

    /// Sets padding and grid columns. `first_page_column` is 1-based and wraps into
    /// `1..=pages_per_row`; zero becomes 1.
    pub fn set_page_layout(
        &mut self,
        page_padding: u32,
        pages_per_row: u32,
        first_page_column: u32,
    ) {
        self.page_padding = page_padding;
        self.pages_per_row = pages_per_row;
        self.first_page_column =
            layout::normalize_first_page_column(first_page_column, pages_per_row);
    }

    pub fn page_padding(&self) -> u32 {
        self.page_padding
    }

    pub fn pages_per_row(&self) -> u32 {
        self.pages_per_row
    }

    pub fn first_page_column(&self) -> u32 {
        self.first_page_column
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: u32) -> Option<&Page> {
        self.pages.get(index as usize)
    }

    pub fn page_mut(&mut self, index: u32) -> Option<&mut Page> {
        self.pages.get_mut(index as usize)
    }

    pub fn data(&self) -> BackendState<'_> {
        self.data.as_deref()
    }

    /// Attaches backend document state, returning whatever was attached before.
    pub fn set_data(&mut self, data: BackendData) -> Option<BackendData> {
        self.data.replace(data)
    }

    /// Adds an initialized page and folds its extents into the cell size.
    pub(crate) fn push_page(&mut self, page: Page) {
        if self.cell_width < page.width() {
            self.cell_width = page.width();
        }
        if self.cell_height < page.height() {
            self.cell_height = page.height();
        }
        self.pages.push(page);
    }

    /// Writes the whole document to `path`.
    pub fn save_as(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArguments);
        }
        let save_as = self
            .backend
            .functions()
            .document_save_as
            .ok_or(Error::NotImplemented)?;
        save_as(self, self.data(), path)
    }

    /// Writes the embedded attachment `name` to `path`.
    pub fn attachment_save(&self, name: &str, path: &Path) -> Result<()> {
        let save = self
            .backend
            .functions()
            .document_attachment_save
            .ok_or(Error::NotImplemented)?;
        save(self, self.data(), name, path)
    }

    pub fn render_page(
        &self,
        index: u32,
        target: &mut dyn RenderTarget,
        printing: bool,
    ) -> Result<()> {
        let page = self.page(index).ok_or(Error::InvalidArguments)?;
        let render = self
            .backend
            .functions()
            .page_render
            .ok_or(Error::NotImplemented)?;
        render(self, page, page.data(), target, printing)
    }

    /// Text inside `rect` (page units, top-left origin) on the page at `index`.
    pub fn page_text(&self, index: u32, rect: Rectangle) -> Result<String> {
        let page = self.page(index).ok_or(Error::InvalidArguments)?;
        let get_text = self
            .backend
            .functions()
            .page_get_text
            .ok_or(Error::NotImplemented)?;
        get_text(self, page, page.data(), rect)
    }

    pub fn page_image(&self, index: u32, image: ImageId) -> Result<RenderImage> {
        let page = self.page(index).ok_or(Error::InvalidArguments)?;
        let image_get = self
            .backend
            .functions()
            .page_image_get
            .ok_or(Error::NotImplemented)?;
        image_get(self, page, page.data(), image)
    }

    /// Label of the page at `index`. `Ok(None)` means the document has no label
    /// for it, which is not an error.
    pub fn page_label(&self, index: u32) -> Result<Option<String>> {
        let page = self.page(index).ok_or(Error::InvalidArguments)?;
        let get_label = self
            .backend
            .functions()
            .page_get_label
            .ok_or(Error::NotImplemented)?;
        get_label(self, page, page.data())
    }

    /// Tears the document down and reports the backend's verdict on freeing its
    /// document state.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let functions = *self.backend.functions();
        let pages = std::mem::take(&mut self.pages);
        for mut page in pages {
            let data = page.take_data();
            let Some(clear) = functions.page_clear else {
                continue;
            };
            if let Err(err) = clear(self, &mut page, data) {
                warn!(page = page.index(), %err, "failed to clear page");
            }
        }

        let Some(data) = self.data.take() else {
            return Ok(());
        };
        match functions.document_free {
            Some(free) => free(self, Some(data)),
            None => {
                debug!(backend = self.backend.name(), "backend has no free slot");
                Err(Error::NotImplemented)
            }
        }
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            warn!(path = %self.path.display(), %err, "failed to free document");
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path)
            .field("basename", &self.basename)
            .field("fingerprint", &self.fingerprint)
            .field("backend", &self.backend.name())
            .field("number_of_pages", &self.number_of_pages)
            .field("zoom", &self.zoom)
            .field("rotation", &self.rotation)
            .finish_non_exhaustive()
    }
}
