use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use epdf_core::{
    downcast_data, downcast_state, Backend, BackendData, BackendFunctions, BackendState,
    Document, Error, ImageId, Page, Rectangle, RenderImage, RenderTarget,
};
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use tracing::{debug, info, instrument, warn};

pub const CONTENT_TYPE: &str = "application/pdf";

/// Points to a pdfium shared library to use instead of the default search.
pub const LIBRARY_PATH_ENV: &str = "EPDF_PDFIUM_LIBRARY_PATH";

static PDFIUM: OnceCell<Pdfium> = OnceCell::new();

/// The process-wide pdfium binding, created on first use.
pub fn pdfium() -> Result<&'static Pdfium> {
    PDFIUM.get_or_try_init(bind_pdfium)
}

pub fn backend() -> Backend {
    Backend::new(
        "pdfium",
        [CONTENT_TYPE],
        BackendFunctions {
            document_open: Some(document_open),
            document_free: Some(document_free),
            document_save_as: Some(document_save_as),
            document_attachment_save: Some(document_attachment_save),
            page_init: Some(page_init),
            page_clear: Some(page_clear),
            page_render: Some(page_render),
            page_image_get: Some(page_image_get),
            page_get_text: Some(page_get_text),
            page_get_label: Some(page_get_label),
        },
    )
}

struct PdfState {
    document: PdfDocument<'static>,
}

struct PdfPageState {
    index: PdfPageIndex,
}

fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::InvalidPassword
        }
        err => {
            warn!(?err, "pdfium call failed");
            Error::Unknown
        }
    }
}

fn document_state(document: &Document) -> epdf_core::Result<&PdfDocument<'static>> {
    Ok(&downcast_state::<PdfState>(document.data())?.document)
}

fn load_page(
    document: &Document,
    state: BackendState<'_>,
) -> epdf_core::Result<PdfPage<'static>> {
    let index = downcast_state::<PdfPageState>(state)?.index;
    document_state(document)?
        .pages()
        .get(index)
        .map_err(map_pdfium_error)
}

#[instrument(skip(document), fields(path = %document.path().display()))]
fn document_open(document: &mut Document) -> epdf_core::Result<()> {
    let pdfium = pdfium().map_err(|err| {
        warn!(%err, "pdfium is unavailable");
        Error::Unknown
    })?;
    let pdf = pdfium
        .load_pdf_from_byte_vec(
            fs::read(document.path())
                .map_err(|err| map_pdfium_error(PdfiumError::IoError(err)))?,
            document.password(),
        )
        .map_err(map_pdfium_error)?;

    let pages = u32::try_from(pdf.pages().len()).unwrap_or_default();
    debug!(pages, "loaded pdf");
    document.set_number_of_pages(pages);
    document.set_data(Box::new(PdfState { document: pdf }));
    Ok(())
}

fn document_free(_: &mut Document, data: Option<BackendData>) -> epdf_core::Result<()> {
    drop(downcast_data::<PdfState>(data)?);
    Ok(())
}

fn document_save_as(_: &Document, state: BackendState<'_>, path: &Path) -> epdf_core::Result<()> {
    let state = downcast_state::<PdfState>(state)?;
    state
        .document
        .save_to_file(path)
        .map_err(map_pdfium_error)?;
    info!(path = %path.display(), "saved document");
    Ok(())
}

fn document_attachment_save(
    _: &Document,
    state: BackendState<'_>,
    name: &str,
    path: &Path,
) -> epdf_core::Result<()> {
    let state = downcast_state::<PdfState>(state)?;
    let attachments = state.document.attachments();
    let attachment = attachments
        .iter()
        .find(|attachment| attachment.name() == name)
        .ok_or_else(|| {
            debug!(name, "no attachment with this name");
            Error::InvalidArguments
        })?;
    let bytes = attachment.save_to_bytes().map_err(map_pdfium_error)?;
    fs::write(path, bytes).map_err(|err| {
        warn!(%err, path = %path.display(), "failed to write attachment");
        Error::Unknown
    })
}

fn page_init(document: &Document, page: &mut Page) -> epdf_core::Result<()> {
    let index = PdfPageIndex::try_from(page.index()).map_err(|_| Error::InvalidArguments)?;
    let pdf_page = document_state(document)?
        .pages()
        .get(index)
        .map_err(map_pdfium_error)?;
    page.set_width(f64::from(pdf_page.width().value));
    page.set_height(f64::from(pdf_page.height().value));
    page.set_data(Box::new(PdfPageState { index }));
    Ok(())
}

fn page_clear(_: &Document, _: &mut Page, data: Option<BackendData>) -> epdf_core::Result<()> {
    if data.is_some() {
        drop(downcast_data::<PdfPageState>(data)?);
    }
    Ok(())
}

fn render_rotation(rotation: u32) -> PdfPageRenderRotation {
    match rotation {
        90 => PdfPageRenderRotation::Degrees90,
        180 => PdfPageRenderRotation::Degrees180,
        270 => PdfPageRenderRotation::Degrees270,
        _ => PdfPageRenderRotation::None,
    }
}

fn page_render(
    document: &Document,
    page: &Page,
    state: BackendState<'_>,
    target: &mut dyn RenderTarget,
    printing: bool,
) -> epdf_core::Result<()> {
    let pdf_page = load_page(document, state)?;
    let (width, height) = target.size();
    let target_width = i32::try_from(width).map_err(|_| Error::InvalidArguments)?;
    let target_height = i32::try_from(height).map_err(|_| Error::InvalidArguments)?;

    let config = PdfRenderConfig::new()
        .set_target_width(target_width)
        .set_target_height(target_height)
        .rotate(render_rotation(document.rotation()), true)
        .use_print_quality(printing)
        .render_form_data(true);
    let bitmap = pdf_page.render_with_config(&config).map_err(|err| {
        warn!(page = page.index(), ?err, "failed to render page");
        Error::Unknown
    })?;
    let image = bitmap.as_image().to_rgba8();
    let image = RenderImage::from_rgba(image.width(), image.height(), image.into_raw())?;
    target.draw(&image)
}

fn page_image_get(
    document: &Document,
    page: &Page,
    state: BackendState<'_>,
    image: ImageId,
) -> epdf_core::Result<RenderImage> {
    let pdf_page = load_page(document, state)?;
    let raw = pdf_page
        .objects()
        .iter()
        .filter_map(|object| {
            object
                .as_image_object()
                .and_then(|embedded| embedded.get_raw_image().ok())
        })
        .nth(image.0)
        .ok_or_else(|| {
            debug!(page = page.index(), image = image.0, "no such image on page");
            Error::InvalidArguments
        })?;
    let rgba = raw.to_rgba8();
    RenderImage::from_rgba(rgba.width(), rgba.height(), rgba.into_raw())
}

/// `rect` uses a top-left origin; pdfium measures from the bottom-left corner.
fn page_get_text(
    document: &Document,
    page: &Page,
    state: BackendState<'_>,
    rect: Rectangle,
) -> epdf_core::Result<String> {
    let pdf_page = load_page(document, state)?;
    let rect = rect.normalized();
    let height = page.height();
    let area = PdfRect::new_from_values(
        (height - rect.y2) as f32,
        rect.x1 as f32,
        (height - rect.y1) as f32,
        rect.x2 as f32,
    );
    let text = pdf_page.text().map_err(map_pdfium_error)?;
    Ok(text.inside_rect(area))
}

fn page_get_label(
    document: &Document,
    _: &Page,
    state: BackendState<'_>,
) -> epdf_core::Result<Option<String>> {
    let pdf_page = load_page(document, state)?;
    Ok(pdf_page
        .label()
        .map(|label| label.to_string())
        .filter(|label| !label.is_empty()))
}

fn bind_pdfium() -> Result<Pdfium> {
    let mut errors = Vec::new();

    if let Some(path) = std::env::var_os(LIBRARY_PATH_ENV).filter(|path| !path.is_empty()) {
        let path = PathBuf::from(path);
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(err) => {
                warn!(path = %path.display(), ?err, "failed to load pdfium from {LIBRARY_PATH_ENV}");
                errors.push(format!("{}: {:?}", path.display(), err));
            }
        }
    }

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {:?}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err:?}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}
