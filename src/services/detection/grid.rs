// Cell grid inference: dot pitch, text lines, column bands and cell patterns

use std::cmp::Ordering;
use tracing::trace;

use crate::core::config::DetectorConfig;
use crate::core::types::{Cell, Dot, DotPattern};
use crate::services::decoder::{decode_pattern, UNRECOGNIZED_CELL};

/// Standard Braille dot pitch over dot diameter (about 2.5 mm / 1.45 mm)
const PITCH_PER_DIAMETER: f32 = 1.75;
const MIN_PITCH_PER_DIAMETER: f32 = 1.2;
const MAX_PITCH_PER_DIAMETER: f32 = 3.0;

/// Left column to left column distance of adjacent cells, in dot pitches
const DEFAULT_CELL_PITCH: f32 = 2.5;

/// Distances, in dot pitches, at which a dot's nearest neighbour can sit:
/// next position in the row or column, the diagonal, two rows down, dots 1
/// and 6, next cell seen from a right column, next cell
const NEIGHBOUR_STEPS: [f32; 6] = [1.0, std::f32::consts::SQRT_2, 2.0, 2.236_068, 1.5, 2.5];

/// Nearest-neighbour distance modes turned into pitch candidates
const MAX_DISTANCE_MODES: usize = 4;

/// Pitch candidates whose mean dot offsets differ by less than this many
/// pixels fit equally well
const FIT_SLACK: f32 = 0.25;

/// Cells recovered from a set of dots, plus notes on dots that fit nowhere
#[derive(Debug, Default)]
pub struct GridLayout {
    pub cells: Vec<Cell>,
    pub notes: Vec<String>,
    matched: usize,
    offset_sum: f32,
}

impl GridLayout {
    /// Mean distance of matched dots from their positions, in pixels
    pub fn fit_error(&self) -> f32 {
        if self.matched == 0 {
            0.0
        } else {
            self.offset_sum / self.matched as f32
        }
    }
}

#[derive(Debug)]
struct Line {
    first_y: f32,
    top: f32,
    members: Vec<usize>,
}

#[derive(Debug)]
struct Band {
    x: f32,
    members: Vec<usize>,
}

#[derive(Debug)]
struct CellColumns {
    left: f32,
    bands: Vec<usize>,
}

enum Slot {
    Paired(usize, usize),
    Lone(usize),
}

fn percentile(values: &mut [f32], p: f32) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let idx = ((values.len() - 1) as f32 * p).round() as usize;
    values[idx.min(values.len() - 1)]
}

fn nearest_neighbour_distances(dots: &[Dot]) -> Vec<f32> {
    if dots.len() < 2 {
        return Vec::new();
    }

    let mut sorted: Vec<&Dot> = dots.iter().collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x));

    (0..sorted.len())
        .map(|i| {
            let here = sorted[i];
            let mut best = f32::INFINITY;
            for other in &sorted[i + 1..] {
                if other.x - here.x >= best {
                    break;
                }
                best = best.min(other.distance_to(here.x, here.y));
            }
            for other in sorted[..i].iter().rev() {
                if here.x - other.x >= best {
                    break;
                }
                best = best.min(other.distance_to(here.x, here.y));
            }
            best
        })
        .collect()
}

/// Typical nearest-neighbour distances, most common first
fn distance_modes(mut distances: Vec<f32>) -> Vec<f32> {
    distances.retain(|d| d.is_finite() && *d > 0.0);
    distances.sort_by(|a, b| a.total_cmp(b));

    let mut clusters: Vec<Vec<f32>> = Vec::new();
    for d in distances {
        match clusters.last_mut() {
            Some(cluster) if d <= cluster[0] * 1.05 => cluster.push(d),
            _ => clusters.push(vec![d]),
        }
    }

    clusters.sort_by(|a, b| b.len().cmp(&a.len()));
    clusters
        .into_iter()
        .take(MAX_DISTANCE_MODES)
        .map(|cluster| cluster[cluster.len() / 2])
        .collect()
}

/// How well one dot pitch explains the dots; lower ranks first
#[derive(Debug, Clone, Copy)]
struct PitchFit {
    spacing: f32,
    misreads: usize,
    cells: usize,
    fit_error: f32,
    prior_offset: f32,
}

impl PitchFit {
    fn evaluate(dots: &[Dot], spacing: f32, prior: f32, config: &DetectorConfig) -> Self {
        let layout = infer_cells(dots, spacing, config);
        let read: Vec<&Cell> = layout.cells.iter().filter(|c| !c.inserted).collect();
        let unrecognized = read
            .iter()
            .filter(|c| decode_pattern(c.pattern) == UNRECOGNIZED_CELL)
            .count();

        Self {
            spacing,
            misreads: layout.notes.len() + unrecognized,
            cells: read.len(),
            fit_error: layout.fit_error(),
            prior_offset: (spacing - prior).abs(),
        }
    }

    fn rank(&self, other: &Self) -> Ordering {
        self.misreads
            .cmp(&other.misreads)
            .then(self.cells.cmp(&other.cells))
            .then_with(|| {
                if (self.fit_error - other.fit_error).abs() <= FIT_SLACK {
                    self.prior_offset.total_cmp(&other.prior_offset)
                } else {
                    self.fit_error.total_cmp(&other.fit_error)
                }
            })
    }
}

/// Dot pitch in pixels, or None when there are no dots
///
/// Each typical nearest-neighbour distance is read as every step a
/// neighbour can sit at (row, diagonal, two rows, next cell). The pitches
/// this yields within the range allowed by the dot size are tried on the
/// grid, and the one that reads every dot into known cells, with the fewest
/// cells and the tightest fit, wins. Near-equal fits go to the pitch closest
/// to the one expected from the dot size.
pub fn estimate_dot_spacing(dots: &[Dot], config: &DetectorConfig) -> Option<f32> {
    if dots.is_empty() {
        return None;
    }
    if let Some(spacing) = config.dot_spacing {
        return Some(spacing);
    }

    let mut diameters: Vec<f32> = dots.iter().map(|d| d.radius() * 2.0).collect();
    let diameter = percentile(&mut diameters, 0.5).max(1.0);
    let prior = diameter * PITCH_PER_DIAMETER;
    if dots.len() < 2 {
        return Some(prior);
    }

    let range = diameter * MIN_PITCH_PER_DIAMETER..=diameter * MAX_PITCH_PER_DIAMETER;
    let mut candidates = vec![prior];
    for mode in distance_modes(nearest_neighbour_distances(dots)) {
        candidates.extend(
            NEIGHBOUR_STEPS
                .iter()
                .map(|step| mode / step)
                .filter(|s| range.contains(s)),
        );
    }
    candidates.sort_by(|a, b| a.total_cmp(b));
    candidates.dedup_by(|a, b| (*a - *b).abs() <= *b * 0.005);

    let best = candidates
        .iter()
        .map(|&s| PitchFit::evaluate(dots, s, prior, config))
        .min_by(|a, b| a.rank(b))?;
    trace!(
        "Dot pitch: {:.1}px from {} candidates (diameter {:.1}px, {} misreads, fit {:.3})",
        best.spacing,
        candidates.len(),
        diameter,
        best.misreads,
        best.fit_error
    );
    Some(best.spacing)
}

/// Split dots into text lines; a line spans at most three dot rows
fn group_lines(dots: &[Dot], spacing: f32, tolerance: f32) -> Vec<Line> {
    let mut order: Vec<usize> = (0..dots.len()).collect();
    order.sort_by(|&a, &b| dots[a].y.total_cmp(&dots[b].y));

    let span = 2.0 * spacing + tolerance;
    let mut lines: Vec<Line> = Vec::new();
    for idx in order {
        let y = dots[idx].y;
        match lines.last_mut() {
            Some(line) if y - line.first_y <= span => line.members.push(idx),
            _ => lines.push(Line {
                first_y: y,
                top: y,
                members: vec![idx],
            }),
        }
    }

    // Top row sits at the mean of the dots level with the highest one
    for line in &mut lines {
        let top_row: Vec<f32> = line
            .members
            .iter()
            .map(|&i| dots[i].y)
            .filter(|&y| y - line.first_y <= tolerance)
            .collect();
        line.top = top_row.iter().sum::<f32>() / top_row.len() as f32;
    }

    lines
}

fn column_bands(dots: &[Dot], members: &[usize], tolerance: f32) -> Vec<Band> {
    let mut order = members.to_vec();
    order.sort_by(|&a, &b| dots[a].x.total_cmp(&dots[b].x));

    let mut bands: Vec<Band> = Vec::new();
    for idx in order {
        let x = dots[idx].x;
        match bands.last_mut() {
            Some(band) if x - band.x <= tolerance => {
                band.members.push(idx);
                band.x += (x - band.x) / band.members.len() as f32;
            }
            _ => bands.push(Band {
                x,
                members: vec![idx],
            }),
        }
    }
    bands
}

fn estimate_cell_pitch(lefts: &[f32], spacing: f32) -> f32 {
    let mut steps: Vec<f32> = lefts
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&d| d >= 1.8 * spacing && d <= 3.5 * spacing)
        .collect();
    if steps.is_empty() {
        DEFAULT_CELL_PITCH * spacing
    } else {
        percentile(&mut steps, 0.5)
    }
}

fn lattice_residual(offset: f32, pitch: f32) -> f32 {
    (offset - (offset / pitch).round() * pitch).abs()
}

/// A lone band is a right column only when it lands on the right-column
/// lattice of a known cell and off its left-column lattice
fn sits_on_right_column(x: f32, anchor: f32, spacing: f32, pitch: f32, tolerance: f32) -> bool {
    let as_left = lattice_residual(x - anchor, pitch);
    let as_right = lattice_residual(x - spacing - anchor, pitch);
    as_right <= tolerance && as_left > tolerance
}

fn assign_columns(bands: &[Band], spacing: f32, tolerance: f32) -> Vec<CellColumns> {
    let mut slots = Vec::new();
    let mut i = 0;
    while i < bands.len() {
        if i + 1 < bands.len() && ((bands[i + 1].x - bands[i].x) - spacing).abs() <= tolerance {
            slots.push(Slot::Paired(i, i + 1));
            i += 2;
        } else {
            slots.push(Slot::Lone(i));
            i += 1;
        }
    }

    let anchors: Vec<f32> = slots
        .iter()
        .filter_map(|slot| match slot {
            Slot::Paired(left, _) => Some(bands[*left].x),
            Slot::Lone(_) => None,
        })
        .collect();
    let pitch = estimate_cell_pitch(&anchors, spacing);

    let mut columns: Vec<CellColumns> = slots
        .into_iter()
        .map(|slot| match slot {
            Slot::Paired(left, right) => CellColumns {
                left: bands[left].x,
                bands: vec![left, right],
            },
            Slot::Lone(band) => {
                let x = bands[band].x;
                let nearest_anchor = anchors
                    .iter()
                    .copied()
                    .min_by(|a, b| (a - x).abs().total_cmp(&(b - x).abs()));
                let left = match nearest_anchor {
                    Some(anchor) if sits_on_right_column(x, anchor, spacing, pitch, tolerance) => {
                        x - spacing
                    }
                    _ => x,
                };
                CellColumns {
                    left,
                    bands: vec![band],
                }
            }
        })
        .collect();

    columns.sort_by(|a, b| a.left.total_cmp(&b.left));
    columns
}

/// Match dots to the six canonical positions; returns the pattern, the
/// summed distance of matched dots and the dots that matched no position
fn match_positions(
    dots: &[Dot],
    members: &[usize],
    left: f32,
    top: f32,
    spacing: f32,
    tolerance: f32,
) -> (DotPattern, f32, Vec<usize>) {
    let mut pattern = DotPattern::BLANK;
    let mut offset = 0.0;
    let mut used = vec![false; members.len()];

    for col in 0..2 {
        for row in 0..3 {
            let px = left + col as f32 * spacing;
            let py = top + row as f32 * spacing;
            let nearest = members
                .iter()
                .enumerate()
                .filter(|(k, _)| !used[*k])
                .map(|(k, &i)| (k, dots[i].distance_to(px, py)))
                .filter(|&(_, d)| d <= tolerance)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((k, d)) = nearest {
                used[k] = true;
                offset += d;
                pattern.set(DotPattern::index(row, col), true);
            }
        }
    }

    let unmatched = members
        .iter()
        .zip(used)
        .filter(|(_, used)| !used)
        .map(|(&i, _)| i)
        .collect();
    (pattern, offset, unmatched)
}

fn read_line(
    dots: &[Dot],
    line: &Line,
    line_index: usize,
    spacing: f32,
    tolerance: f32,
    layout: &mut GridLayout,
) -> Vec<Cell> {
    let bands = column_bands(dots, &line.members, tolerance);
    let columns = assign_columns(&bands, spacing, tolerance);

    let mut cells = Vec::with_capacity(columns.len());
    for group in columns {
        let members: Vec<usize> = group
            .bands
            .iter()
            .flat_map(|&b| bands[b].members.iter().copied())
            .collect();
        let (pattern, offset, unmatched) =
            match_positions(dots, &members, group.left, line.top, spacing, tolerance);
        layout.matched += members.len() - unmatched.len();
        layout.offset_sum += offset;

        for i in unmatched {
            layout.notes.push(format!(
                "dropped blob at ({:.0}, {:.0}) on line {}: no dot position within {:.1}px",
                dots[i].x, dots[i].y, line_index, tolerance
            ));
        }

        if pattern.is_blank() {
            continue;
        }

        cells.push(Cell {
            line: line_index,
            x: group.left,
            y: line.top,
            pattern,
            inserted: false,
        });
    }
    cells
}

/// Order one line's cells left to right and insert a space cell wherever the
/// gap between a cell's right column and the next cell's left column exceeds
/// `word_gap_threshold` dot pitches
pub fn insert_word_gaps(mut cells: Vec<Cell>, spacing: f32, word_gap_threshold: f32) -> Vec<Cell> {
    cells.sort_by(|a, b| a.x.total_cmp(&b.x));

    let mut out: Vec<Cell> = Vec::with_capacity(cells.len());
    for cell in cells {
        let space = out.last().and_then(|prev| {
            let gap = cell.x - (prev.x + spacing);
            (gap > word_gap_threshold * spacing)
                .then(|| Cell::space(cell.line, (prev.x + cell.x) / 2.0, cell.y))
        });
        out.extend(space);
        out.push(cell);
    }
    out
}

/// Recover cells in reading order from detected dots
pub fn infer_cells(dots: &[Dot], spacing: f32, config: &DetectorConfig) -> GridLayout {
    let tolerance = config.intra_cell_spacing_tolerance * spacing;
    let mut layout = GridLayout::default();

    for (line_index, line) in group_lines(dots, spacing, tolerance).iter().enumerate() {
        let cells = read_line(dots, line, line_index, spacing, tolerance, &mut layout);
        if cells.is_empty() {
            continue;
        }
        let cells = insert_word_gaps(cells, spacing, config.word_gap_threshold);

        // A line break separates words too
        if let Some(prev) = layout.cells.last() {
            let space = Cell::space(prev.line, prev.x + DEFAULT_CELL_PITCH * spacing, prev.y);
            layout.cells.push(space);
        }
        layout.cells.extend(cells);
    }

    layout
}
