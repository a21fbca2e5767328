//! Geometry of a document laid out as a grid of equally sized cells.
//!
//! Everything here is a pure function of [`Document`] state and is recomputed on
//! every call. Backends are never consulted.

use serde::Serialize;

use crate::document::{AdjustMode, Document};

/// Page units per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// PPI assumed while the viewport resolution is unknown.
pub const FALLBACK_PPI: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

/// Pixels per page point: `zoom * ppi / 72`.
pub fn scale(document: &Document) -> f64 {
    let mut ppi = document.viewport_ppi();
    if ppi < f64::EPSILON {
        ppi = FALLBACK_PPI;
    }
    document.zoom() * ppi / POINTS_PER_INCH
}

/// Snaps any angle to the cardinal orientation reached by rotating clockwise:
/// 0 and (270, 360) map to 0, (0, 90] to 90, (90, 180] to 180, (180, 270] to 270.
pub fn normalize_rotation(rotation: i32) -> u32 {
    match rotation.rem_euclid(360) {
        0 => 0,
        r if r > 270 => 0,
        r if r <= 90 => 90,
        r if r <= 180 => 180,
        _ => 270,
    }
}

/// Wraps a 1-based column into `1..=pages_per_row`.
///
/// With no columns at all the grid is empty and the column is 0.
pub fn normalize_first_page_column(first_page_column: u32, pages_per_row: u32) -> u32 {
    if pages_per_row == 0 {
        0
    } else if first_page_column < 1 {
        1
    } else if first_page_column > pages_per_row {
        (first_page_column - 1) % pages_per_row + 1
    } else {
        first_page_column
    }
}

/// Scales raw page extents to pixels, swapping them when the document is turned
/// on its side.
pub fn scaled_size(document: &Document, width: f64, height: f64) -> PixelSize {
    let scale = scale(document);
    let (width, height) = if document.rotation() % 180 != 0 {
        (height, width)
    } else {
        (width, height)
    };
    PixelSize {
        width: to_pixels(width * scale),
        height: to_pixels(height * scale),
    }
}

/// Size of one grid cell in pixels.
pub fn cell_size(document: &Document) -> PixelSize {
    scaled_size(document, document.cell_width(), document.cell_height())
}

/// Size of a single page in pixels, or `None` for an unknown index.
pub fn page_size(document: &Document, index: u32) -> Option<PixelSize> {
    let page = document.page(index)?;
    Some(scaled_size(document, page.width(), page.height()))
}

/// Number of grid rows needed when the first page starts in `first_page_column`.
pub fn grid_rows(number_of_pages: u32, pages_per_row: u32, first_page_column: u32) -> u32 {
    if pages_per_row == 0 {
        return 0;
    }
    number_of_pages
        .saturating_add(first_page_column)
        .saturating_sub(1)
        .div_ceil(pages_per_row)
}

/// Size of the whole laid-out document in pixels, padding included. Zero when the
/// document has no pages or no columns.
pub fn document_size(document: &Document) -> PixelSize {
    let pages = document.number_of_pages();
    let columns = document.pages_per_row();
    if pages == 0 || columns == 0 {
        return PixelSize::default();
    }

    let rows = grid_rows(pages, columns, document.first_page_column());
    let cell = cell_size(document);
    let padding = document.page_padding();

    PixelSize {
        width: span(columns, cell.width, padding),
        height: span(rows, cell.height, padding),
    }
}

/// Zoom that fits the document to the viewport according to its adjust mode.
pub fn fit_zoom(document: &Document) -> Option<f64> {
    let mode = document.adjust_mode();
    if !matches!(mode, AdjustMode::BestFit | AdjustMode::Width) {
        return None;
    }

    let view = document.viewport_size();
    let cell = cell_size(document);
    let total = document_size(document);
    if view.width == 0 || view.height == 0 || cell.height == 0 || total.width == 0 {
        return None;
    }

    let page_ratio = f64::from(cell.height) / f64::from(total.width);
    let view_ratio = f64::from(view.height) / f64::from(view.width);
    let zoom = document.zoom();

    if mode == AdjustMode::Width || page_ratio < view_ratio {
        Some(zoom * f64::from(view.width) / f64::from(total.width))
    } else {
        Some(zoom * f64::from(view.height) / f64::from(cell.height))
    }
}

/// Position (as fractions of the document size) that brings page `index` into
/// view. A page smaller than the viewport is centered; a larger one is shifted
/// according to `xalign`/`yalign` (0 = left/top edge, 1 = right/bottom edge).
pub fn page_position(
    document: &Document,
    index: u32,
    xalign: f64,
    yalign: f64,
) -> Option<(f64, f64)> {
    let columns = document.pages_per_row();
    if columns == 0 || index >= document.number_of_pages() {
        return None;
    }
    let total = document_size(document);
    if total.width == 0 || total.height == 0 {
        return None;
    }

    let slot = u64::from(index) + u64::from(document.first_page_column()) - 1;
    let row = slot / u64::from(columns);
    let column = slot % u64::from(columns);

    let cell = cell_size(document);
    let view = document.viewport_size();
    let padding = f64::from(document.page_padding());

    let shift_x = align_shift(cell.width, view.width, xalign);
    let shift_y = align_shift(cell.height, view.height, yalign);

    let x = (column as f64 + shift_x) * (f64::from(cell.width) + padding)
        / f64::from(total.width);
    let y = (row as f64 + shift_y) * (f64::from(cell.height) + padding)
        / f64::from(total.height);
    Some((x, y))
}

/// Page under a position given as fractions of the document size. Positions on or
/// past an edge are clamped to the outermost cell; cells before the first page
/// resolve to page 0 and cells past the last page to the last page.
pub fn page_at_position(document: &Document, position_x: f64, position_y: f64) -> Option<u32> {
    let pages = document.number_of_pages();
    let columns = document.pages_per_row();
    if pages == 0 || columns == 0 {
        return None;
    }

    let total = document_size(document);
    let cell = cell_size(document);
    let padding = document.page_padding();
    let stride_x = cell.width.saturating_add(padding);
    let stride_y = cell.height.saturating_add(padding);
    if stride_x == 0 || stride_y == 0 {
        return None;
    }

    let first_column = document.first_page_column();
    let rows = grid_rows(pages, columns, first_column);
    let column = grid_cell(position_x, total.width, stride_x).min(columns - 1);
    let row = grid_cell(position_y, total.height, stride_y).min(rows - 1);

    let slot = u64::from(columns) * u64::from(row) + u64::from(column);
    let leading = u64::from(first_column) - 1;
    let last_page = u64::from(pages - 1);
    let page = slot.saturating_sub(leading).min(last_page);
    Some(u32::try_from(page).unwrap_or(pages - 1))
}

/// Cell index along one axis; negative positions land in the first cell.
fn grid_cell(position: f64, total: u32, stride: u32) -> u32 {
    (position * f64::from(total) / f64::from(stride)).floor() as u32
}

fn align_shift(cell: u32, view: u32, align: f64) -> f64 {
    if cell > view {
        0.5 + (align - 0.5) * (f64::from(cell) - f64::from(view)) / f64::from(cell)
    } else {
        0.5
    }
}

fn span(count: u32, cell: u32, padding: u32) -> u32 {
    count
        .saturating_mul(cell)
        .saturating_add(count.saturating_sub(1).saturating_mul(padding))
}

/// Rounds to whole pixels, saturating at the bounds of `u32` (NaN becomes 0).
fn to_pixels(value: f64) -> u32 {
    value.round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detached_document, document_with_pages};
    use proptest::prelude::*;

    fn approx(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-4
    }

    #[test]
    fn rotation_table() {
        for (input, expected) in [
            (0, 0),
            (45, 90),
            (90, 90),
            (91, 180),
            (180, 180),
            (181, 270),
            (270, 270),
            (271, 0),
            (359, 0),
            (360, 0),
            (450, 90),
            (-1, 0),
            (-90, 270),
        ] {
            assert_eq!(normalize_rotation(input), expected, "rotation {input}");
        }
    }

    #[test]
    fn scale_falls_back_to_typical_ppi() {
        let mut doc = detached_document();
        doc.set_zoom(2.0);
        assert!(approx(scale(&doc), 2.7778));
        doc.set_viewport_ppi(150.0);
        assert!(approx(scale(&doc), 4.1667));
        doc.set_viewport_ppi(-3.0);
        assert!(approx(scale(&doc), 2.7778));
    }

    #[test]
    fn first_column_wraps_into_range() {
        assert_eq!(normalize_first_page_column(6, 4), 2);
        assert_eq!(normalize_first_page_column(0, 4), 1);
        assert_eq!(normalize_first_page_column(8, 4), 4);
        assert_eq!(normalize_first_page_column(3, 4), 3);
        assert_eq!(normalize_first_page_column(5, 0), 0);
    }

    #[test]
    fn document_size_of_three_column_grid() {
        let mut doc = document_with_pages(&[(50.0, 100.0); 10]);
        doc.set_viewport_ppi(POINTS_PER_INCH);
        doc.set_page_layout(0, 3, 1);

        assert_eq!(cell_size(&doc), PixelSize { width: 50, height: 100 });
        assert_eq!(grid_rows(10, 3, 1), 4);
        assert_eq!(document_size(&doc), PixelSize { width: 150, height: 400 });
    }

    #[test]
    fn document_size_counts_padding_and_offset_first_page() {
        let mut doc = document_with_pages(&[(50.0, 100.0); 3]);
        doc.set_viewport_ppi(POINTS_PER_INCH);
        doc.set_page_layout(10, 2, 2);

        // cover page alone in the second column, then one spread
        assert_eq!(document_size(&doc), PixelSize { width: 110, height: 210 });
    }

    #[test]
    fn degenerate_grid_has_zero_size() {
        let mut doc = document_with_pages(&[(50.0, 100.0); 2]);
        assert_eq!(document_size(&doc), PixelSize::default());
        doc.set_page_layout(5, 1, 1);
        let empty = document_with_pages(&[]);
        assert_eq!(document_size(&empty), PixelSize::default());
        assert_ne!(document_size(&doc), PixelSize::default());
    }

    #[test]
    fn quarter_turn_swaps_cell_extents() {
        let mut doc = document_with_pages(&[(50.0, 100.0), (80.0, 20.0)]);
        doc.set_viewport_ppi(POINTS_PER_INCH);
        assert_eq!(cell_size(&doc), PixelSize { width: 80, height: 100 });
        doc.set_rotation(90);
        assert_eq!(cell_size(&doc), PixelSize { width: 100, height: 80 });
        assert_eq!(page_size(&doc, 1), Some(PixelSize { width: 20, height: 80 }));
        doc.set_rotation(180);
        assert_eq!(cell_size(&doc), PixelSize { width: 80, height: 100 });
        assert_eq!(page_size(&doc, 2), None);
    }

    #[test]
    fn cell_size_rounds_scaled_extents() {
        let mut doc = document_with_pages(&[(612.0, 792.0)]);
        doc.set_zoom(1.0);
        assert_eq!(cell_size(&doc), PixelSize { width: 850, height: 1100 });
        doc.set_zoom(-1.0);
        assert_eq!(cell_size(&doc), PixelSize::default());
    }

    #[test]
    fn width_mode_fits_document_width() {
        let mut doc = document_with_pages(&[(100.0, 200.0); 4]);
        doc.set_viewport_ppi(POINTS_PER_INCH);
        doc.set_page_layout(0, 2, 1);
        doc.set_viewport_width(400);
        doc.set_viewport_height(300);

        doc.set_adjust_mode(AdjustMode::Width);
        assert_eq!(fit_zoom(&doc), Some(2.0));

        doc.set_adjust_mode(AdjustMode::BestFit);
        assert_eq!(fit_zoom(&doc), Some(1.5));

        doc.set_adjust_mode(AdjustMode::None);
        assert_eq!(fit_zoom(&doc), None);
    }

    #[test]
    fn best_fit_prefers_width_for_wide_viewports_of_short_pages() {
        let mut doc = document_with_pages(&[(200.0, 100.0)]);
        doc.set_viewport_ppi(POINTS_PER_INCH);
        doc.set_page_layout(0, 1, 1);
        doc.set_viewport_width(100);
        doc.set_viewport_height(400);
        doc.set_adjust_mode(AdjustMode::BestFit);

        assert_eq!(fit_zoom(&doc), Some(0.5));
        assert_eq!(doc.apply_adjust_mode(), Some(0.5));
        assert_eq!(doc.zoom(), 0.5);
    }

    #[test]
    fn page_position_centers_small_pages() {
        let mut doc = document_with_pages(&[(100.0, 100.0); 4]);
        doc.set_viewport_ppi(POINTS_PER_INCH);
        doc.set_page_layout(0, 2, 1);
        doc.set_viewport_width(1000);
        doc.set_viewport_height(1000);

        assert_eq!(page_position(&doc, 0, 0.0, 0.0), Some((0.25, 0.25)));
        assert_eq!(page_position(&doc, 3, 0.0, 0.0), Some((0.75, 0.75)));
        assert_eq!(page_position(&doc, 4, 0.0, 0.0), None);
    }

    #[test]
    fn page_position_aligns_large_pages() {
        let mut doc = document_with_pages(&[(100.0, 200.0); 2]);
        doc.set_viewport_ppi(POINTS_PER_INCH);
        doc.set_page_layout(0, 1, 1);
        doc.set_viewport_width(100);
        doc.set_viewport_height(100);

        let (_, top) = page_position(&doc, 1, 0.5, 0.0).unwrap();
        assert!(approx(top, 0.625));
    }

    #[test]
    fn page_at_position_inverts_grid() {
        let mut doc = document_with_pages(&[(100.0, 100.0); 5]);
        doc.set_viewport_ppi(POINTS_PER_INCH);
        doc.set_page_layout(0, 2, 2);

        assert_eq!(page_at_position(&doc, 0.1, 0.1), Some(0));
        assert_eq!(page_at_position(&doc, 0.75, 0.1), Some(0));
        assert_eq!(page_at_position(&doc, 0.25, 0.5), Some(1));
        assert_eq!(page_at_position(&doc, 0.75, 0.5), Some(2));
        assert_eq!(page_at_position(&doc, 0.75, 0.9), Some(4));
    }

    #[test]
    fn page_at_position_clamps_edges() {
        let mut column = document_with_pages(&[(100.0, 100.0); 5]);
        column.set_viewport_ppi(POINTS_PER_INCH);
        column.set_page_layout(0, 1, 1);

        assert_eq!(page_at_position(&column, 0.5, 1.0), Some(4));
        assert_eq!(page_at_position(&column, 0.5, 0.999), Some(4));
        assert_eq!(page_at_position(&column, 0.5, 7.0), Some(4));
        assert_eq!(page_at_position(&column, -0.5, -1.0), Some(0));

        let mut grid = document_with_pages(&[(100.0, 100.0); 4]);
        grid.set_viewport_ppi(POINTS_PER_INCH);
        grid.set_page_layout(0, 2, 1);

        assert_eq!(page_at_position(&grid, 1.0, 0.0), Some(1));
        assert_eq!(page_at_position(&grid, 0.999, 0.0), Some(1));
        assert_eq!(page_at_position(&grid, 1.0, 1.0), Some(3));
    }

    #[test]
    fn huge_first_column_does_not_overflow() {
        let mut doc = document_with_pages(&[(100.0, 100.0); 2]);
        doc.set_viewport_ppi(POINTS_PER_INCH);
        doc.set_page_layout(0, u32::MAX, u32::MAX);

        assert_eq!(doc.first_page_column(), u32::MAX);
        let _ = page_position(&doc, 1, 0.0, 0.0);
        assert_eq!(page_at_position(&doc, 0.0, 0.0), Some(0));
        assert_eq!(page_at_position(&doc, 1.0, 1.0), Some(0));
    }

    proptest! {
        #[test]
        fn rotation_is_cardinal_and_periodic(r in -100_000..100_000_i32, k in -50..50_i32) {
            let normalized = normalize_rotation(r);
            prop_assert!([0, 90, 180, 270].contains(&normalized));
            prop_assert_eq!(normalized, normalize_rotation(r + 360 * k));
        }

        #[test]
        fn first_column_always_in_range(first in 0..1_000_u32, per_row in 1..64_u32) {
            let column = normalize_first_page_column(first, per_row);
            prop_assert!((1..=per_row).contains(&column));
        }
    }
}
