//! Border-table text parsing.
//!
//! Recovers a spanning [`Grid`] of strings from loosely formatted tables
//! drawn with `|`, `+`, `-` and Unicode box glyphs. Parsing is best-effort:
//! spans are supported by growing rectangles between recorded boundary
//! positions, and malformed tables clip to the boundaries that exist. A
//! table with no boundary glyphs at all is rejected.

use anyhow::{bail, Result};
use std::collections::{BTreeMap, BTreeSet};

use super::format::border_characters;
use super::{Grid, Pos, Shape};

/// Characters that mark a column boundary on a content line.
pub(super) fn default_col_separators() -> String {
    format!("|{}", border_characters())
}

/// Characters a pure separator line may consist of (besides spaces).
pub(super) fn default_row_separators() -> String {
    format!("+-{}", border_characters())
}

pub(super) fn parse_table(
    text: &str,
    col_separators: &str,
    row_separators: &str,
    strip: bool,
) -> Result<Grid<String>> {
    let lines: Vec<Vec<char>> = text
        .lines()
        .map(|line| line.trim_end_matches(['\n', '\r', ' ']))
        .filter(|line| !line.is_empty())
        .map(|line| line.chars().collect())
        .collect();

    let mut row_seps: BTreeSet<Pos> = BTreeSet::new();
    let mut col_seps: BTreeSet<Pos> = BTreeSet::new();

    for (y, line) in lines.iter().enumerate() {
        if line.iter().all(|&c| c == ' ' || row_separators.contains(c)) {
            row_seps.extend(
                line.iter()
                    .enumerate()
                    .filter(|(_, &c)| row_separators.contains(c))
                    .map(|(x, _)| (y, x)),
            );
        } else {
            col_seps.extend(
                line.iter()
                    .enumerate()
                    .filter(|(_, &c)| col_separators.contains(c))
                    .map(|(x, _)| (y, x)),
            );
        }
    }

    let all_seps: BTreeSet<Pos> = row_seps.union(&col_seps).copied().collect();
    if all_seps.is_empty() {
        bail!("table has no border glyphs");
    }

    let width = all_seps.iter().map(|&(_, x)| x).max().unwrap_or(0);
    let height = all_seps.iter().map(|&(y, _)| y).max().unwrap_or(0);

    // Logical column index for each distinct boundary column.
    let x_to_col: BTreeMap<usize, usize> = col_seps
        .iter()
        .map(|&(_, x)| x)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(col, x)| (x, col))
        .collect();
    let mut y_to_row: BTreeMap<usize, usize> = BTreeMap::new();

    // Grow each unclaimed boundary into the largest rectangle bounded on all
    // sides by recorded boundary positions. Rectangles already covered by an
    // earlier claim are span interiors and are skipped.
    let mut rects: Vec<((usize, usize, usize, usize), Vec<String>)> = Vec::new();

    for &(y0, x0) in &col_seps {
        if x0 >= width
            || rects
                .iter()
                .any(|&((ry0, rx0, ry1, rx1), _)| ry0 <= y0 && y0 < ry1 && rx0 <= x0 && x0 < rx1)
        {
            continue;
        }

        let mut x1 = x0 + 1;
        while x1 <= width && !all_seps.contains(&(y0, x1)) {
            x1 += 1;
        }
        if x1 > width {
            continue;
        }

        let mut y1 = y0 + 1;
        if !row_seps.is_empty() {
            while y1 <= height && !(x0 + 1..x1).any(|x| all_seps.contains(&(y1, x))) {
                y1 += 1;
            }
        }

        let content = lines[y0..y1.min(lines.len())]
            .iter()
            .map(|line| {
                line.iter()
                    .skip(x0 + 1)
                    .take(x1.saturating_sub(x0 + 1))
                    .collect::<String>()
            })
            .collect();
        rects.push(((y0, x0, y1, x1), content));

        let next_row = y_to_row.len();
        y_to_row.entry(y0).or_insert(next_row);
    }

    let mut shape = Shape::new();
    let mut contents: BTreeMap<Pos, String> = BTreeMap::new();
    for ((y0, x0, y1, x1), cell_lines) in rects {
        let (r0, c0) = (find_next(&y_to_row, y0), find_next(&x_to_col, x0));
        let (r1, c1) = (find_next(&y_to_row, y1), find_next(&x_to_col, x1));
        let text = if strip {
            cell_lines
                .iter()
                .map(|line| line.trim())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            cell_lines.join("\n")
        };
        shape.insert((r0, c0), (r1 - r0, c1 - c0));
        contents.insert((r0, c0), text);
    }

    Grid::new(contents, shape)
}

/// Logical index of the nearest boundary at or after `i`; one past the last
/// known index when `i` is beyond every boundary (clips unterminated spans).
fn find_next(indices: &BTreeMap<usize, usize>, i: usize) -> usize {
    indices
        .range(i..)
        .next()
        .map(|(_, &v)| v)
        .unwrap_or_else(|| indices.values().max().map_or(0, |&v| v + 1))
}
