//! Grid renderers: the inverse of table parsing.
//!
//! Two renderers re-emit a [`Grid`] as text: a simple bar-delimited one for
//! single-line cells, and a boxed one that reconstructs box-drawing borders
//! by looking at which neighbors of each border coordinate are themselves
//! borders. Column and row extents are computed as a least fixed point over
//! declared span widths, so merged cells never squeeze the columns they
//! cross below their natural width.

use anyhow::{bail, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Display;

use super::{cjust, Grid, Pos};

/// Neighbor-presence pattern (NESW, `.` = either) to box-drawing glyph.
const BORDERS: &[(&str, char)] = &[
    ("1111", '┼'),
    ("0111", '┬'),
    ("1110", '├'),
    ("1011", '┤'),
    ("1101", '┴'),
    ("0011", '┐'),
    ("1100", '└'),
    ("0110", '┌'),
    ("1001", '┘'),
    ("0.0.", '─'),
    (".0.0", '│'),
];

/// All glyphs the boxed renderer can emit; the parser treats these as
/// boundary characters.
pub(super) fn border_characters() -> String {
    BORDERS.iter().map(|&(_, c)| c).collect()
}

/// One rendered cell: pixel rectangle, content lines, content `(h, w)`.
struct RenderedCell {
    r0: usize,
    c0: usize,
    r1: usize,
    c1: usize,
    lines: Vec<String>,
    height: usize,
}

/// Renders `table` one cell per line position, bar-delimited.
///
/// # Errors
///
/// Fails when any cell contains multi-line content.
pub fn format_table<T: Display>(
    table: &Grid<T>,
    sep: &str,
    pad: &str,
    just: impl Fn(&str, usize) -> String,
) -> Result<String> {
    let mut lines = vec![String::new(); table.row_count()];
    for cell in render(table, sep.chars().count(), pad.chars().count(), 0) {
        if cell.lines.len() > 1 {
            bail!("cannot format table with multiline cells: {:?}", cell.lines);
        }
        let content = cell.lines.first().map(String::as_str).unwrap_or("");
        let width = cell.c1.saturating_sub(cell.c0 + 1);
        let rendered = format!("{sep}{}{sep}", just(content, width));
        lines[cell.r0] = edit_str(&lines[cell.r0], cell.c0, &rendered);
    }
    Ok(lines.join("\n"))
}

/// Renders `table` with box-drawing borders, supporting spans and
/// multi-line cells.
pub fn format_boxed_table<T: Display>(table: &Grid<T>, pad: &str) -> String {
    let mut bars: BTreeMap<Pos, u8> = BTreeMap::new();
    let mut cells: BTreeMap<Pos, String> = BTreeMap::new();

    let h_pad_width = pad.chars().count();
    let sep_width = 1;
    let v_sep_width = 1;
    let total_sep_width = h_pad_width + sep_width;

    for cell in render(table, sep_width, h_pad_width, v_sep_width) {
        let RenderedCell { r0, c0, r1, c1, .. } = cell;
        for r in r0..=r1 {
            bars.insert((r, c0), 1);
            bars.insert((r, c1), 1);
        }
        for c in c0..=c1 {
            bars.insert((r0, c), 1);
            bars.insert((r1, c), 1);
        }

        let v_offset = (r1 - r0).saturating_sub(1 + cell.height) / 2;
        for (i, line) in cell.lines.iter().enumerate() {
            let width = (c1 - c0).saturating_sub(sep_width * 2);
            cells.insert(
                (v_sep_width + r0 + v_offset + i, c0 + total_sep_width),
                cjust(line, width),
            );
        }
    }

    let final_w = bars.keys().map(|&(_, c)| c).max().unwrap_or(0) + 1;
    let final_h = bars.keys().map(|&(r, _)| r).max().unwrap_or(0) + 1;
    let mut canvas = vec![vec![' '; final_w]; final_h];

    let patterns: Vec<(&str, Regex, char)> = BORDERS
        .iter()
        .filter_map(|&(k, c)| Regex::new(k).ok().map(|re| (k, re, c)))
        .collect();

    for &(r, c) in bars.keys() {
        let at = |pos: (isize, isize)| -> u8 {
            if pos.0 < 0 || pos.1 < 0 {
                return 0;
            }
            bars.get(&(pos.0 as usize, pos.1 as usize)).copied().unwrap_or(0)
        };
        let (ri, ci) = (r as isize, c as isize);
        canvas[r][c] = find_border(
            &patterns,
            [at((ri - 1, ci)), at((ri, ci + 1)), at((ri + 1, ci)), at((ri, ci - 1))],
        );
    }

    for (&(r, c), txt) in &cells {
        for (i, ch) in txt.chars().enumerate() {
            if c + i < final_w {
                canvas[r][c + i] = ch;
            }
        }
    }

    canvas
        .into_iter()
        .map(|row| row.into_iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Looks up the glyph for a NESW neighbor pattern: exact key first, then the
/// first wildcard pattern that matches, defaulting to `+`.
fn find_border(patterns: &[(&str, Regex, char)], nesw: [u8; 4]) -> char {
    let key: String = nesw.iter().map(u8::to_string).collect();
    for (k, _, c) in patterns {
        if *k == key {
            return *c;
        }
    }
    for (_, re, c) in patterns {
        if re.is_match(&key) {
            return *c;
        }
    }
    '+'
}

/// Computes pixel rectangles and content for every cell of `table`.
fn render<T: Display>(
    table: &Grid<T>,
    h_sep_width: usize,
    h_pad_width: usize,
    v_sep_width: usize,
) -> Vec<RenderedCell> {
    let total_pad = h_pad_width * 2 + h_sep_width;
    let ncol = table.col_count();
    let nrow = table.row_count();

    let mut content_lines: BTreeMap<Pos, Vec<String>> = BTreeMap::new();
    let mut content_sizes: BTreeMap<Pos, (usize, usize)> = BTreeMap::new();
    for (pos, content) in table.indexed_cells() {
        let lines: Vec<String> = content
            .to_string()
            .lines()
            .map(|line| line.trim_end_matches(['\n', '\r']).to_string())
            .collect();
        let height = lines.len();
        let width = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
        content_lines.insert(pos, lines);
        content_sizes.insert(pos, (height, width));
    }

    let mut widths: BTreeMap<(usize, usize), usize> =
        (0..ncol).map(|i| ((i, i + 1), 1 + h_sep_width)).collect();
    let mut heights: BTreeMap<(usize, usize), usize> =
        (0..nrow).map(|i| ((i, i + 1), 1 + v_sep_width)).collect();

    for (&(row, col), &(rspan, cspan)) in table.shape() {
        let (h, w) = content_sizes.get(&(row, col)).copied().unwrap_or((0, 0));
        let height = heights.entry((row, row + rspan)).or_insert(0);
        *height = (*height).max(h + v_sep_width);
        let width = widths.entry((col, col + cspan)).or_insert(0);
        *width = (*width).max(w + total_pad);
    }

    let c_limits = limits_from_span_widths(&widths);
    let r_limits = limits_from_span_widths(&heights);

    let mut cells = Vec::new();
    for (&(row, col), &(rspan, cspan)) in table.shape() {
        if let Some(lines) = content_lines.get(&(row, col)) {
            let (height, _) = content_sizes[&(row, col)];
            cells.push(RenderedCell {
                r0: r_limits[row],
                c0: c_limits[col],
                r1: r_limits[row + rspan],
                c1: c_limits[col + cspan],
                lines: lines.clone(),
                height,
            });
        }
    }
    cells
}

/// Least fixed point of `limits[b] = max(limits[b], limits[a] + width)` over
/// every declared span `(a, b)`; spans never shrink the runs they cross.
fn limits_from_span_widths(span_widths: &BTreeMap<(usize, usize), usize>) -> Vec<usize> {
    let n = span_widths.keys().map(|&(_, b)| b).max().unwrap_or(0);
    let mut limits = vec![0; n + 1];
    for (&(a, b), &w) in span_widths {
        limits[b] = limits[b].max(limits[a] + w);
    }
    limits
}

/// Writes `v` into `s` at char position `i`, padding with spaces as needed.
fn edit_str(s: &str, i: usize, v: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < i {
        let mut out: String = chars.into_iter().collect();
        out.push_str(&" ".repeat(i - s.chars().count()));
        out.push_str(v);
        out
    } else {
        let prefix: String = chars.iter().take(i).collect();
        let suffix: String = chars.iter().skip(i + v.chars().count()).collect();
        format!("{prefix}{v}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::super::Shape;
    use super::*;

    fn grid_2x2() -> Grid<String> {
        let mut shape = Shape::new();
        for r in 0..2 {
            for c in 0..2 {
                shape.insert((r, c), (1, 1));
            }
        }
        Grid::from_shape(shape, ["a", "bb", "ccc", "d"].map(String::from), String::new())
    }

    #[test]
    fn test_format_table_simple() {
        let out = format_table(&grid_2x2(), "|", " ", cjust).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("a"));
        assert!(lines[1].contains("ccc"));
        // Columns align: both rows have bars at the same positions.
        let bar_cols = |s: &str| -> Vec<usize> {
            s.char_indices().filter(|&(_, c)| c == '|').map(|(i, _)| i).collect()
        };
        assert_eq!(bar_cols(lines[0]), bar_cols(lines[1]));
    }

    #[test]
    fn test_format_table_rejects_multiline() {
        let mut shape = Shape::new();
        shape.insert((0, 0), (1, 1));
        let grid = Grid::from_shape(shape, ["x\ny".to_string()], String::new());
        assert!(format_table(&grid, "|", " ", cjust).is_err());
    }

    #[test]
    fn test_boxed_round_trip() {
        let text = "\
┌───┬─────┐
│ q │ www │
├───┼─────┤
│ a │ r   │
└───┴─────┘";
        let grid = Grid::parse(text).unwrap();
        let rendered = format_boxed_table(&grid, " ");
        let reparsed = Grid::parse(&rendered).unwrap();
        assert_eq!(reparsed.shape(), grid.shape());
        let a: Vec<&String> = grid.values().collect();
        let b: Vec<&String> = reparsed.values().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_boxed_round_trip_with_colspan() {
        let text = "\
┌───────┬───┐
│ wide  │ x │
├───┬───┼───┤
│ a │ b │ c │
└───┴───┴───┘";
        let grid = Grid::parse(text).unwrap();
        assert_eq!(grid.shape()[&(0, 0)], (1, 2));
        let reparsed = Grid::parse(&format_boxed_table(&grid, " ")).unwrap();
        assert_eq!(reparsed.shape(), grid.shape());
        assert_eq!(reparsed.get((0, 0)).unwrap(), "wide");
    }

    #[test]
    fn test_limits_fixed_point() {
        // A span (0, 2) wider than the sum of its parts pushes the second
        // boundary out; inner columns keep their fair share.
        let mut widths = BTreeMap::new();
        widths.insert((0, 1), 4);
        widths.insert((1, 2), 4);
        widths.insert((0, 2), 12);
        assert_eq!(limits_from_span_widths(&widths), vec![0, 4, 12]);
    }

    #[test]
    fn test_find_border_wildcard_fallback() {
        let patterns: Vec<(&str, Regex, char)> = BORDERS
            .iter()
            .map(|&(k, c)| (k, Regex::new(k).unwrap(), c))
            .collect();
        assert_eq!(find_border(&patterns, [1, 1, 1, 1]), '┼');
        assert_eq!(find_border(&patterns, [0, 1, 0, 1]), '─');
        assert_eq!(find_border(&patterns, [1, 0, 1, 0]), '│');
    }
}
