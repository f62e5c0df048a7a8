// Dot segmentation: luminance, smoothing, adaptive binarization, blob filtering

use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::{box_filter, gaussian_blur_f32};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::trace;

use crate::core::config::DetectorConfig;
use crate::core::types::Dot;

/// Pages darker than this mean luminance are inverted before thresholding
const DARK_PAGE_MEAN: f64 = 110.0;

const FOREGROUND: u8 = 255;

/// Dots may differ from the dominant dot area by at most this factor
const DOT_AREA_SPREAD: f32 = 2.5;

/// Counts of blobs rejected by each filter, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobStats {
    pub components: usize,
    pub rejected_area: usize,
    pub rejected_shape: usize,
    pub rejected_size: usize,
}

/// Single-channel intensity with dots darker than the paper
pub fn to_intensity(img: &DynamicImage) -> GrayImage {
    let mut gray = img.to_luma8();
    if gray.is_empty() {
        return gray;
    }

    let total: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    let mean = total as f64 / (gray.width() as f64 * gray.height() as f64);
    if mean < DARK_PAGE_MEAN {
        trace!("Dark page (mean luminance {:.1}), inverting", mean);
        image::imageops::invert(&mut gray);
    }
    gray
}

/// Gaussian smoothing against paper texture and sensor noise
pub fn smooth(gray: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || gray.is_empty() {
        return gray.clone();
    }
    gaussian_blur_f32(gray, sigma)
}

/// Adaptive mean threshold, foreground (255) where a pixel is darker than its
/// neighbourhood mean by more than `offset`
pub fn binarize(gray: &GrayImage, block_radius: u32, offset: u8) -> GrayImage {
    if gray.is_empty() {
        return gray.clone();
    }

    let local_mean = box_filter(gray, block_radius, block_radius);
    let offset = offset as i16;

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y)[0] as i16;
        let mean = local_mean.get_pixel(x, y)[0] as i16;
        if value < mean - offset {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

#[derive(Debug, Clone, Copy)]
struct BlobAccumulator {
    area: u32,
    sum_x: u64,
    sum_y: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl BlobAccumulator {
    fn new(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            sum_x: 0,
            sum_y: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn into_dot(self) -> Dot {
        Dot {
            x: self.sum_x as f32 / self.area as f32,
            y: self.sum_y as f32 / self.area as f32,
            area: self.area,
            bbox: [self.min_x, self.min_y, self.max_x, self.max_y],
        }
    }
}

/// Label 8-connected foreground regions and keep the round, dot-sized ones
pub fn extract_dots(binary: &GrayImage, config: &DetectorConfig) -> (Vec<Dot>, BlobStats) {
    let mut stats = BlobStats::default();
    if binary.is_empty() {
        return (Vec::new(), stats);
    }

    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));

    let mut blobs: Vec<Option<BlobAccumulator>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= blobs.len() {
            blobs.resize(label + 1, None);
        }
        blobs[label]
            .get_or_insert_with(|| BlobAccumulator::new(x, y))
            .add(x, y);
    }

    let mut dots = Vec::new();
    for blob in blobs.into_iter().flatten() {
        stats.components += 1;

        if blob.area < config.min_blob_area || blob.area > config.max_blob_area {
            stats.rejected_area += 1;
            continue;
        }

        let width = blob.max_x - blob.min_x + 1;
        let height = blob.max_y - blob.min_y + 1;
        let aspect = width.max(height) as f32 / width.min(height) as f32;
        let fill = blob.area as f32 / (width * height) as f32;
        if aspect > config.max_aspect_ratio || fill < config.min_fill_ratio {
            stats.rejected_shape += 1;
            continue;
        }

        dots.push(blob.into_dot());
    }

    stats.rejected_size = reject_size_outliers(&mut dots);
    (dots, stats)
}

/// Area of the blob a typical foreground pixel belongs to
///
/// Weighting by area keeps a crowd of small specks from outvoting the
/// fewer, larger dots.
fn dominant_area(dots: &[Dot]) -> Option<u32> {
    let mut areas: Vec<u32> = dots.iter().map(|d| d.area).collect();
    areas.sort_unstable();

    let total: u64 = areas.iter().map(|&a| a as u64).sum();
    let mut seen = 0u64;
    for area in areas {
        seen += area as u64;
        if 2 * seen >= total {
            return Some(area);
        }
    }
    None
}

/// Drop blobs far from the dominant dot size; returns how many were dropped
fn reject_size_outliers(dots: &mut Vec<Dot>) -> usize {
    let Some(reference) = dominant_area(dots) else {
        return 0;
    };
    let low = reference as f32 / DOT_AREA_SPREAD;
    let high = reference as f32 * DOT_AREA_SPREAD;

    let before = dots.len();
    dots.retain(|d| (low..=high).contains(&(d.area as f32)));
    let rejected = before - dots.len();
    if rejected > 0 {
        trace!(
            "Dominant dot area {}px, dropped {} blobs outside {:.0}-{:.0}px",
            reference,
            rejected,
            low,
            high
        );
    }
    rejected
}
