//! Deterministic banner and document composition
//!
//! Pure functions from decoded letter images to finished print artifacts.
//! No shared state and no IO; the orchestrator feeds artifact bytes in and
//! writes the results back out. Determinism matters here: the same letters
//! and options must produce byte-identical output so re-approval after a
//! rejected edit cannot silently change the banner.

use crate::config::LayoutConfig;
use crate::error::{BannerError, Result};
use crate::palette::Palette;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use log::{debug, info};
use printpdf::{
    BuiltinFont, ColorBits, ColorSpace, CustomPdfConformance, ImageTransform, ImageXObject, Mm,
    OffsetDateTime, PdfConformance, PdfDocument, Px,
};
use std::io::Cursor;

/// US Letter page, portrait
const PAGE_WIDTH_MM: f32 = 215.9;
const PAGE_HEIGHT_MM: f32 = 279.4;
/// 1 inch page margin for the document pages
const PAGE_MARGIN_MM: f32 = 25.4;
const PRINT_DPI: f32 = 300.0;

const MM_PER_INCH: f32 = 25.4;

/// Columns used when the caller does not pin a letters-per-row count.
/// Short names sit on one row; longer ones wrap into a compact grid.
fn auto_columns(letter_count: usize) -> usize {
    if letter_count <= 4 {
        letter_count
    } else if letter_count <= 8 {
        4
    } else {
        letter_count.min(6)
    }
}

/// Grid shape for `letter_count` cells: (columns, rows, cell edge in px)
fn grid_geometry(letter_count: usize, opts: &LayoutConfig) -> (usize, usize, u32) {
    let columns = opts
        .letters_per_row
        .map(|c| c.min(letter_count))
        .unwrap_or_else(|| auto_columns(letter_count))
        .max(1);
    let rows = letter_count.div_ceil(columns);

    let available_width = opts.canvas_width.saturating_sub(2 * opts.margin_px);
    let available_height = opts.canvas_height.saturating_sub(2 * opts.margin_px);
    let cell = (available_width / columns as u32).min(available_height / rows as u32);

    (columns, rows, cell)
}

/// Top-left corner of cell `index` on the canvas. Each row is centered
/// independently so a partial last row does not hang off to the left.
fn cell_origin(
    index: usize,
    letter_count: usize,
    columns: usize,
    cell: u32,
    opts: &LayoutConfig,
) -> (i64, i64) {
    let row = index / columns;
    let col = index % columns;
    let row_len = columns.min(letter_count - row * columns);

    let row_width = row_len as u32 * cell;
    let start_x = (opts.canvas_width.saturating_sub(row_width) / 2) as i64;
    let y = (opts.margin_px + row as u32 * cell) as i64;

    (start_x + (col as u32 * cell) as i64, y)
}

fn decode_letter(bytes: &[u8], index: usize) -> Result<RgbaImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| BannerError::Layout(format!("Failed to decode letter {}: {}", index, e)))?;
    Ok(img.to_rgba8())
}

fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| BannerError::Layout(format!("Failed to encode banner PNG: {}", e)))?;
    Ok(out.into_inner())
}

/// Compose all letters onto one fixed-size print canvas and return it as PNG.
///
/// Letters are placed left-to-right in input order, wrapping into rows, with
/// every row centered horizontally. The canvas background is the first
/// palette color. A single letter fills the canvas without a grid.
pub fn compose_banner(
    letters: &[Vec<u8>],
    palette: &Palette,
    opts: &LayoutConfig,
) -> Result<Vec<u8>> {
    if letters.is_empty() {
        return Err(BannerError::Layout(
            "Cannot compose a banner from zero letters".to_string(),
        ));
    }

    let [r, g, b] = palette.background();
    let mut canvas = RgbaImage::from_pixel(
        opts.canvas_width,
        opts.canvas_height,
        Rgba([r, g, b, 255]),
    );

    if letters.len() == 1 {
        // Full-bleed single letter, centered, no margin
        let letter = decode_letter(&letters[0], 0)?;
        let edge = opts.canvas_width.min(opts.canvas_height);
        let resized = imageops::resize(&letter, edge, edge, FilterType::Lanczos3);
        let x = ((opts.canvas_width - edge) / 2) as i64;
        let y = ((opts.canvas_height - edge) / 2) as i64;
        imageops::overlay(&mut canvas, &resized, x, y);
        return encode_png(canvas);
    }

    let (columns, rows, cell) = grid_geometry(letters.len(), opts);
    if cell == 0 {
        return Err(BannerError::Layout(format!(
            "Canvas {}x{} with margin {} leaves no room for a {}x{} grid",
            opts.canvas_width, opts.canvas_height, opts.margin_px, columns, rows
        )));
    }
    debug!(
        "Banner grid: {} letters, {} per row, {} rows, {}px cells",
        letters.len(),
        columns,
        rows,
        cell
    );

    for (i, bytes) in letters.iter().enumerate() {
        let letter = decode_letter(bytes, i)?;
        let resized = imageops::resize(&letter, cell, cell, FilterType::Lanczos3);
        let (x, y) = cell_origin(i, letters.len(), columns, cell, opts);
        imageops::overlay(&mut canvas, &resized, x, y);
    }

    info!(
        "Composed banner: {}x{} px, {} letters",
        opts.canvas_width,
        opts.canvas_height,
        letters.len()
    );
    encode_png(canvas)
}

/// Flatten RGBA onto a white backing. PDF pages have no alpha channel and
/// the letters arrive with transparent backgrounds.
fn flatten_to_rgb(img: &RgbaImage) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(img.width() as usize * img.height() as usize * 3);
    for Rgba([r, g, b, a]) in img.pixels() {
        let alpha = *a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        rgb.push(blend(*r));
        rgb.push(blend(*g));
        rgb.push(blend(*b));
    }
    rgb
}

/// Place an RGBA image centered on a PDF layer, scaled to fit inside the
/// page margins
fn place_on_page(layer: &printpdf::PdfLayerReference, img: &RgbaImage) {
    let xobject = ImageXObject {
        width: Px(img.width() as usize),
        height: Px(img.height() as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: flatten_to_rgb(img),
        image_filter: None,
        smask: None,
        clipping_bbox: None,
    };

    let natural_width_mm = img.width() as f32 * MM_PER_INCH / PRINT_DPI;
    let natural_height_mm = img.height() as f32 * MM_PER_INCH / PRINT_DPI;
    let available_width = PAGE_WIDTH_MM - 2.0 * PAGE_MARGIN_MM;
    let available_height = PAGE_HEIGHT_MM - 2.0 * PAGE_MARGIN_MM;
    let scale = (available_width / natural_width_mm).min(available_height / natural_height_mm);

    let final_width = natural_width_mm * scale;
    let final_height = natural_height_mm * scale;
    let x = (PAGE_WIDTH_MM - final_width) / 2.0;
    let y = (PAGE_HEIGHT_MM - final_height) / 2.0;

    printpdf::Image::from(xobject).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(x)),
            translate_y: Some(Mm(y)),
            rotate: None,
            scale_x: Some(scale),
            scale_y: Some(scale),
            dpi: Some(PRINT_DPI),
        },
    );
}

/// printpdf regenerates the trailer `/ID` strings on every save and exposes
/// no way to pin them. Overwrite both with a fixed identifier so identical
/// inputs serialize to identical bytes. Offsets are untouched, so the xref
/// table stays valid.
fn pin_file_identifier(bytes: &mut [u8]) -> Result<()> {
    const PINNED_ID: &[u8; 32] = b"00000000000000000000000000000000";

    let id_pos = bytes
        .windows(3)
        .rposition(|w| w == b"/ID")
        .ok_or_else(|| BannerError::Layout("PDF trailer has no /ID entry".to_string()))?;

    let mut cursor = id_pos + 3;
    for _ in 0..2 {
        let open = bytes[cursor..]
            .iter()
            .position(|&b| b == b'(')
            .ok_or_else(|| BannerError::Layout("Malformed PDF /ID entry".to_string()))?;
        let start = cursor + open + 1;
        let end = start + PINNED_ID.len();
        if bytes.len() <= end || bytes[end] != b')' {
            return Err(BannerError::Layout("Malformed PDF /ID entry".to_string()));
        }
        bytes[start..end].copy_from_slice(PINNED_ID);
        cursor = end + 1;
    }
    Ok(())
}

/// Build the paginated print document: a cover page with the assembled
/// banner followed by one full-resolution page per letter, in input order
/// (duplicates included).
pub fn compose_document(
    name: &str,
    letters: &[Vec<u8>],
    banner_png: &[u8],
) -> Result<Vec<u8>> {
    if letters.is_empty() {
        return Err(BannerError::Layout(
            "Cannot compose a document from zero letters".to_string(),
        ));
    }

    let (doc, cover_page, cover_layer) = PdfDocument::new(
        format!("{} letter banner", name),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Cover",
    );
    // The default conformance embeds XMP metadata with a per-save random
    // instance id; the custom default skips it. Dates pinned to the epoch
    // keep the Info dictionary independent of the wall clock.
    let doc = doc
        .with_conformance(PdfConformance::Custom(CustomPdfConformance::default()))
        .with_creation_date(OffsetDateTime::UNIX_EPOCH)
        .with_mod_date(OffsetDateTime::UNIX_EPOCH)
        .with_metadata_date(OffsetDateTime::UNIX_EPOCH);

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| BannerError::Layout(format!("Failed to load PDF font: {}", e)))?;

    let cover = doc.get_page(cover_page).get_layer(cover_layer);
    cover.use_text(
        name.to_uppercase(),
        28.0,
        Mm(PAGE_MARGIN_MM),
        Mm(PAGE_HEIGHT_MM - PAGE_MARGIN_MM + 5.0),
        &font,
    );
    let banner_img = decode_letter(banner_png, 0)
        .map_err(|_| BannerError::Layout("Failed to decode banner for cover page".to_string()))?;
    place_on_page(&cover, &banner_img);

    for (i, bytes) in letters.iter().enumerate() {
        let letter = decode_letter(bytes, i)?;
        let (page, layer) =
            doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), format!("Letter {}", i + 1));
        place_on_page(&doc.get_page(page).get_layer(layer), &letter);
    }

    info!("Composed document: {} letter pages plus cover", letters.len());
    let mut bytes = doc
        .save_to_bytes()
        .map_err(|e| BannerError::Layout(format!("Failed to serialize PDF: {}", e)))?;
    pin_file_identifier(&mut bytes)?;
    Ok(bytes)
}
