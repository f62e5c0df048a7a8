// Cell detector: image to dots, dots to cells, plus an annotated copy

pub mod annotate;
pub mod blobs;
pub mod grid;

use image::DynamicImage;
use std::time::Instant;
use tracing::{debug, trace};

use crate::core::config::DetectorConfig;
use crate::core::errors::{ConfigError, InputError, InputResult};
use crate::core::types::CellDetection;

/// Reject images the detector cannot look at
pub fn validate_image(img: &DynamicImage) -> InputResult<()> {
    if img.width() == 0 || img.height() == 0 {
        return Err(InputError::EmptyImage {
            width: img.width(),
            height: img.height(),
        });
    }
    Ok(())
}

/// Stateless detector; safe to share across threads
#[derive(Debug, Clone)]
pub struct CellDetector {
    config: DetectorConfig,
}

impl CellDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Find Braille cells in reading order
    ///
    /// Never fails: an image without dots yields no cells, and blobs that fit
    /// no cell are dropped with a note.
    pub fn detect(&self, img: &DynamicImage) -> CellDetection {
        let start = Instant::now();
        let config = &self.config;

        let gray = blobs::to_intensity(img);
        let smoothed = blobs::smooth(&gray, config.blur_sigma);
        let binary = blobs::binarize(
            &smoothed,
            config.threshold_block_radius,
            config.threshold_offset,
        );
        let (dots, stats) = blobs::extract_dots(&binary, config);
        trace!(
            "Blobs: {} components, {} dots, {} rejected by area, {} by shape, {} by size",
            stats.components,
            dots.len(),
            stats.rejected_area,
            stats.rejected_shape,
            stats.rejected_size
        );

        let dot_spacing = grid::estimate_dot_spacing(&dots, config);
        let layout = match dot_spacing {
            Some(spacing) => grid::infer_cells(&dots, spacing, config),
            None => grid::GridLayout::default(),
        };
        for note in &layout.notes {
            trace!("{}", note);
        }

        let annotated = annotate::draw_detections(img, &dots, &layout.cells, dot_spacing);

        debug!(
            "Detected {} cells from {} dots in {:.2}ms",
            layout.cells.len(),
            dots.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        CellDetection {
            cells: layout.cells,
            dots,
            dot_spacing,
            notes: layout.notes,
            annotated,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::config::MAX_DOT_SPACING;
    use crate::core::types::DotPattern;
    use crate::services::decoder;
    use crate::services::translation::transliterate_basic;
    use image::{GrayImage, Luma, RgbImage};
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    /// Dot radius, dot pitch and cell pitch of a rendered page, in pixels
    #[derive(Debug, Clone, Copy)]
    struct Geometry {
        radius: i32,
        pitch: i32,
        cell_pitch: i32,
    }

    const STANDARD: Geometry = Geometry {
        radius: 4,
        pitch: 16,
        cell_pitch: 40,
    };

    const LARGE: Geometry = Geometry {
        radius: 6,
        pitch: 24,
        cell_pitch: 60,
    };

    const MARGIN: i32 = 30;

    fn paint_cell(page: &mut GrayImage, pattern: DotPattern, x0: i32, y0: i32, g: Geometry) {
        for col in 0..2 {
            for row in 0..3 {
                if pattern.is_raised(DotPattern::index(row, col)) {
                    let center = (x0 + col as i32 * g.pitch, y0 + row as i32 * g.pitch);
                    draw_filled_circle_mut(page, center, g.radius, Luma([0]));
                }
            }
        }
    }

    /// Render embossed-style cells (black discs on white) on a grayscale page;
    /// `None` leaves an empty cell
    pub(crate) fn render_cells(cells: &[Option<[u8; 6]>], width: u32, height: u32) -> GrayImage {
        let mut page = GrayImage::from_pixel(width, height, Luma([255]));
        for (i, cell) in cells.iter().enumerate() {
            if let Some(dots) = cell {
                let x0 = MARGIN + i as i32 * STANDARD.cell_pitch;
                paint_cell(&mut page, DotPattern::from(*dots), x0, MARGIN, STANDARD);
            }
        }
        page
    }

    fn letter_pattern(letter: char) -> Option<DotPattern> {
        decoder::defined_patterns()
            .find(|(_, braille)| transliterate_basic(&braille.to_string()) == letter.to_string())
            .map(|(pattern, _)| pattern)
    }

    /// Render lines of lowercase text, one Braille line per entry
    fn render_text(lines: &[&str], g: Geometry) -> GrayImage {
        let line_pitch = 5 * g.pitch;
        let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as i32;
        let width = 2 * MARGIN + longest * g.cell_pitch;
        let height = 2 * MARGIN + lines.len() as i32 * line_pitch;

        let mut page = GrayImage::from_pixel(width as u32, height as u32, Luma([255]));
        for (row, line) in lines.iter().enumerate() {
            for (i, letter) in line.chars().enumerate() {
                let pattern = letter_pattern(letter).unwrap();
                let x0 = MARGIN + i as i32 * g.cell_pitch;
                let y0 = MARGIN + row as i32 * line_pitch;
                paint_cell(&mut page, pattern, x0, y0, g);
            }
        }
        page
    }

    fn detector() -> CellDetector {
        CellDetector::new(DetectorConfig::default()).unwrap()
    }

    fn read_text(page: GrayImage) -> String {
        let detection = detector().detect(&DynamicImage::ImageLuma8(page));
        transliterate_basic(&decoder::decode_cells(&detection.cells))
    }

    #[test]
    fn test_blank_canvas_has_no_cells() {
        let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 120, Luma([255])));
        let detection = detector().detect(&page);

        assert!(detection.cells.is_empty());
        assert!(detection.dots.is_empty());
        assert!(detection.dot_spacing.is_none());
        assert_eq!(detection.annotated.width(), 200);
    }

    #[test]
    fn test_reads_abc() {
        let page = render_cells(
            &[Some([1, 0, 0, 0, 0, 0]), Some([1, 1, 0, 0, 0, 0]), Some([1, 0, 0, 1, 0, 0])],
            200,
            110,
        );
        let detection = detector().detect(&DynamicImage::ImageLuma8(page));

        assert_eq!(detection.dots.len(), 4);
        assert_eq!(decoder::decode_cells(&detection.cells), "⠁⠃⠉");
        let spacing = detection.dot_spacing.unwrap();
        assert!((spacing - STANDARD.pitch as f32).abs() < 1.0, "spacing {}", spacing);
    }

    #[test]
    fn test_reads_word_gap_as_space() {
        // "ab c" with one empty cell between b and c
        let page = render_cells(
            &[
                Some([1, 0, 0, 0, 0, 0]),
                Some([1, 1, 0, 0, 0, 0]),
                None,
                Some([1, 0, 0, 1, 0, 0]),
            ],
            240,
            110,
        );
        let detection = detector().detect(&DynamicImage::ImageLuma8(page));
        assert_eq!(decoder::decode_cells(&detection.cells), "⠁⠃ ⠉");
    }

    #[test]
    fn test_reads_every_letter_alone() {
        for g in [STANDARD, LARGE] {
            for (pattern, braille) in decoder::defined_patterns() {
                if pattern.is_blank() {
                    continue;
                }
                let mut page = GrayImage::from_pixel(
                    (2 * MARGIN + g.cell_pitch) as u32,
                    (2 * MARGIN + 3 * g.pitch) as u32,
                    Luma([255]),
                );
                paint_cell(&mut page, pattern, MARGIN, MARGIN, g);

                let detection = detector().detect(&DynamicImage::ImageLuma8(page));
                assert_eq!(
                    decoder::decode_cells(&detection.cells),
                    braille.to_string(),
                    "{} at {:?}, spacing {:?}",
                    pattern,
                    g,
                    detection.dot_spacing
                );
            }
        }
    }

    #[test]
    fn test_reads_sentences_at_two_scales() {
        let lines = ["hola mundo", "ae ek uz"];
        for g in [STANDARD, LARGE] {
            assert_eq!(
                read_text(render_text(&lines, g)),
                "hola mundo ae ek uz",
                "{:?}",
                g
            );
        }
    }

    #[test]
    fn test_reads_sparse_single_dot_words() {
        assert_eq!(read_text(render_text(&["a a a e e k"], STANDARD)), "a a a e e k");
    }

    #[test]
    fn test_specks_do_not_disturb_reading() {
        let mut page = render_text(&["hola mundo"], STANDARD);
        let (width, height) = page.dimensions();
        // rows of specks above and below the text line, more of them than dots
        for y in [8, height as i32 - 20] {
            for x in (10..width as i32 - 10).step_by(24) {
                draw_filled_rect_mut(&mut page, Rect::at(x, y).of_size(2, 2), Luma([0]));
            }
        }

        let detection = detector().detect(&DynamicImage::ImageLuma8(page));
        assert_eq!(
            transliterate_basic(&decoder::decode_cells(&detection.cells)),
            "hola mundo"
        );
        assert!(detection.notes.is_empty(), "{:?}", detection.notes);
    }

    #[test]
    fn test_color_input_keeps_color_type() {
        let page = render_cells(&[Some([1, 1, 0, 1, 1, 0])], 100, 100);
        let rgb = RgbImage::from_fn(100, 100, |x, y| {
            let v = page.get_pixel(x, y)[0];
            image::Rgb([v, v, v])
        });
        let detection = detector().detect(&DynamicImage::ImageRgb8(rgb));

        assert_eq!(decoder::decode_cells(&detection.cells), "⠛");
        assert_eq!(detection.annotated.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_largest_fixed_spacing_still_annotates() {
        let config = DetectorConfig {
            dot_spacing: Some(MAX_DOT_SPACING),
            ..DetectorConfig::default()
        };
        let page = render_cells(&[Some([1, 1, 0, 0, 0, 0])], 100, 110);
        let detection = CellDetector::new(config)
            .unwrap()
            .detect(&DynamicImage::ImageLuma8(page));

        assert_eq!(detection.dot_spacing, Some(MAX_DOT_SPACING));
        assert_eq!((detection.annotated.width(), detection.annotated.height()), (100, 110));
    }

    #[test]
    fn test_all_black_image_has_no_cells() {
        let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([0])));
        assert!(detector().detect(&page).cells.is_empty());
    }

    #[test]
    fn test_validate_image() {
        assert!(validate_image(&DynamicImage::new_luma8(0, 10)).is_err());
        assert!(validate_image(&DynamicImage::new_luma8(4, 4)).is_ok());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DetectorConfig {
            min_blob_area: 500,
            max_blob_area: 10,
            ..DetectorConfig::default()
        };
        assert!(CellDetector::new(config).is_err());
    }
}
