//! Image heuristics: webtoon classification, page scoring and poster
//! rendering.
//!
//! Everything here is synchronous and CPU/disk bound; async callers go
//! through `spawn_blocking`.

use std::io::Cursor;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader};
use tracing::debug;

use crate::archive::{self, ArchiveError, EntrySource, is_archive_path, is_image_name, natural_cmp};
use crate::config::CoverImageConfig;

/// Height-to-width ratio from which a page counts as a vertical strip.
pub const WEBTOON_RATIO: u32 = 3;

/// Side of the square the scorer downsamples pages to.
const SCORE_SAMPLE: u32 = 128;

pub fn is_webtoon_dimensions(width: u32, height: u32) -> bool {
    width > 0 && u64::from(height) >= u64::from(WEBTOON_RATIO) * u64::from(width)
}

/// Classify encoded image bytes by their header dimensions only.
pub fn is_webtoon_image(data: &[u8]) -> Result<bool, image::ImageError> {
    let (width, height) = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(is_webtoon_dimensions(width, height))
}

/// Decide whether the media at `path` reads like a webtoon.
///
/// Looks at the middle page of the first chapter container; title pages are
/// often landscape spreads even in strip formats. Any failure means "no".
pub fn detect_webtoon(path: &Path) -> bool {
    let Some(chapter) = first_chapter_container(path) else {
        debug!("{}: no chapter container for webtoon check", path.display());
        return false;
    };
    let result = archive::open(&chapter)
        .and_then(|mut source| archive::middle_image(source.as_mut()))
        .map_err(|e| e.to_string())
        .and_then(|(_, data)| is_webtoon_image(&data).map_err(|e| e.to_string()));
    match result {
        Ok(webtoon) => webtoon,
        Err(e) => {
            debug!("Webtoon check skipped for {}: {e}", chapter.display());
            false
        }
    }
}

/// First archive, or first directory holding images, in natural order.
pub fn first_chapter_container(path: &Path) -> Option<PathBuf> {
    if !path.is_dir() {
        return is_archive_path(path).then(|| path.to_path_buf());
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));

    let mut has_images = false;
    for entry in &entries {
        if entry.is_dir() {
            if let Some(found) = first_chapter_container(entry) {
                return Some(found);
            }
        } else if is_archive_path(entry) {
            return Some(entry.clone());
        } else if entry
            .file_name()
            .is_some_and(|n| is_image_name(&n.to_string_lossy()))
        {
            has_images = true;
        }
    }
    has_images.then(|| path.to_path_buf())
}

/// How much is going on in a page: mean luma gradient plus colour spread,
/// both normalised to `0..=1`. Blank and near-uniform pages score close to 0.
pub fn interest_score(img: &DynamicImage) -> f64 {
    let small = if img.width() > SCORE_SAMPLE || img.height() > SCORE_SAMPLE {
        img.thumbnail(SCORE_SAMPLE, SCORE_SAMPLE)
    } else {
        img.clone()
    };
    let luma = small.to_luma8();
    let (w, h) = luma.dimensions();
    if w < 2 || h < 2 {
        return 0.0;
    }

    let mut gradient = 0u64;
    for y in 0..h - 1 {
        for x in 0..w - 1 {
            let p = i32::from(luma.get_pixel(x, y)[0]);
            let right = i32::from(luma.get_pixel(x + 1, y)[0]);
            let below = i32::from(luma.get_pixel(x, y + 1)[0]);
            gradient += ((p - right).abs() + (p - below).abs()) as u64;
        }
    }
    let samples = f64::from((w - 1) * (h - 1));
    let edge_density = gradient as f64 / (samples * 2.0 * 255.0);

    let rgb = small.to_rgb8();
    let n = f64::from(w * h);
    let mut spread = 0.0;
    for channel in 0..3 {
        let (sum, sum_sq) = rgb.pixels().fold((0.0, 0.0), |(s, sq), p| {
            let v = f64::from(p[channel]);
            (s + v, sq + v * v)
        });
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        spread += variance.sqrt() / 127.5;
    }
    let colour_variance = (spread / 3.0).min(1.0);

    0.6 * edge_density.min(1.0) + 0.4 * colour_variance
}

/// Score the first `limit` decodable images of `source` and return the
/// winner. Undecodable entries are skipped.
pub fn most_interesting_page(
    source: &mut dyn EntrySource,
    limit: usize,
) -> Result<Option<(String, DynamicImage)>, ArchiveError> {
    let mut best: Option<(f64, String, DynamicImage)> = None;
    let mut seen = 0;
    source.visit(&mut |entry| {
        if !is_image_name(entry.name) {
            return Ok(ControlFlow::Continue(()));
        }
        let mut data = Vec::new();
        entry.reader.read_to_end(&mut data)?;
        seen += 1;
        match image::load_from_memory(&data) {
            Ok(img) => {
                let score = interest_score(&img);
                if best.as_ref().is_none_or(|(s, _, _)| score > *s) {
                    best = Some((score, entry.name.to_string(), img));
                }
            }
            Err(e) => debug!("Skipping undecodable page {}: {e}", entry.name),
        }
        Ok(if seen >= limit {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        })
    })?;
    Ok(best.map(|(_, name, img)| (name, img)))
}

/// Crop to the poster aspect ratio (`height / width`), anchored at the top.
///
/// Tall pages lose their bottom; wide pages are trimmed evenly on both sides.
pub fn crop_poster_top(img: &DynamicImage, aspect: f64) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || aspect <= 0.0 {
        return img.clone();
    }
    let target_h = (f64::from(w) * aspect).round() as u32;
    if target_h <= h {
        img.crop_imm(0, 0, w, target_h.max(1))
    } else {
        let target_w = ((f64::from(h) / aspect).round() as u32).clamp(1, w);
        img.crop_imm((w - target_w) / 2, 0, target_w, h)
    }
}

/// Crop from the top and resize to the configured poster, encoded as JPEG.
pub fn render_poster(data: &[u8], cfg: &CoverImageConfig) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(data)?;
    encode_poster(&img, cfg)
}

pub fn encode_poster(img: &DynamicImage, cfg: &CoverImageConfig) -> Result<Vec<u8>, image::ImageError> {
    let poster = crop_poster_top(img, cfg.aspect()).resize_exact(
        cfg.width(),
        cfg.height(),
        FilterType::Lanczos3,
    );
    encode_jpeg(&poster, cfg.jpeg_quality())
}

/// Resize to fit a `size`x`size` box, preserving aspect ratio.
pub fn make_thumbnail(img: &DynamicImage, size: u32, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let thumb = img.resize(size, size, FilterType::Lanczos3);
    encode_jpeg(&thumb, quality)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}
