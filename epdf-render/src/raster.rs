use std::fs;

use epdf_core::{
    downcast_data, downcast_state, Backend, BackendData, BackendFunctions, BackendState,
    Document, Error, ImageId, Page, RenderImage, RenderTarget,
};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::{debug, warn};

pub const CONTENT_TYPES: [&str; 2] = ["image/png", "image/jpeg"];

/// Single-page documents backed by a decoded raster image.
pub fn backend() -> Backend {
    Backend::new(
        "raster",
        CONTENT_TYPES,
        BackendFunctions {
            document_open: Some(document_open),
            document_free: Some(document_free),
            page_init: Some(page_init),
            page_clear: Some(page_clear),
            page_render: Some(page_render),
            page_image_get: Some(page_image_get),
            ..Default::default()
        },
    )
}

struct RasterState {
    image: RgbaImage,
}

fn raster(document: &Document) -> epdf_core::Result<&RgbaImage> {
    Ok(&downcast_state::<RasterState>(document.data())?.image)
}

fn document_open(document: &mut Document) -> epdf_core::Result<()> {
    let bytes = fs::read(document.path()).map_err(|err| {
        warn!(%err, path = %document.path().display(), "failed to read image");
        Error::Unknown
    })?;
    let image = image::load_from_memory(&bytes)
        .map_err(|err| {
            warn!(%err, path = %document.path().display(), "failed to decode image");
            Error::Unknown
        })?
        .to_rgba8();
    debug!(width = image.width(), height = image.height(), "decoded image");

    document.set_number_of_pages(1);
    document.set_data(Box::new(RasterState { image }));
    Ok(())
}

fn document_free(_: &mut Document, data: Option<BackendData>) -> epdf_core::Result<()> {
    drop(downcast_data::<RasterState>(data)?);
    Ok(())
}

fn page_init(document: &Document, page: &mut Page) -> epdf_core::Result<()> {
    let image = raster(document)?;
    page.set_width(f64::from(image.width()));
    page.set_height(f64::from(image.height()));
    Ok(())
}

fn page_clear(_: &Document, _: &mut Page, _: Option<BackendData>) -> epdf_core::Result<()> {
    Ok(())
}

fn page_render(
    document: &Document,
    _: &Page,
    _: BackendState<'_>,
    target: &mut dyn RenderTarget,
    _printing: bool,
) -> epdf_core::Result<()> {
    let image = raster(document)?;
    let rotated = match document.rotation() {
        90 => imageops::rotate90(image),
        180 => imageops::rotate180(image),
        270 => imageops::rotate270(image),
        _ => image.clone(),
    };

    let (width, height) = target.size();
    let fitted = if rotated.dimensions() == (width, height) {
        rotated
    } else {
        imageops::resize(&rotated, width, height, FilterType::Triangle)
    };
    let frame = RenderImage::from_rgba(fitted.width(), fitted.height(), fitted.into_raw())?;
    target.draw(&frame)
}

fn page_image_get(
    document: &Document,
    _: &Page,
    _: BackendState<'_>,
    id: ImageId,
) -> epdf_core::Result<RenderImage> {
    if id != ImageId(0) {
        return Err(Error::InvalidArguments);
    }
    let image = raster(document)?;
    RenderImage::from_rgba(image.width(), image.height(), image.as_raw().clone())
}
