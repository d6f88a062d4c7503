//! Spanning 2-D grid container.
//!
//! A [`Grid`] records cell values indexed by `(row, col)` together with a
//! shape that maps each cell origin to its `(rowspan, colspan)`. Grids are
//! immutable value objects: every transformation returns a new grid.

mod format;
mod parse;

pub use format::{format_boxed_table, format_table};

use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// A `(row, col)` cell origin.
pub type Pos = (usize, usize);

/// Mapping from cell origin to `(rowspan, colspan)`.
pub type Shape = BTreeMap<Pos, (usize, usize)>;

/// A rectangular grid of cells, some of which may span multiple rows or
/// columns.
///
/// Invariants: `shape().keys() == contents keys`, and the positions covered
/// by any cell's span are disjoint from every other cell's covered positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    contents: BTreeMap<Pos, T>,
    spans: Shape,
}

impl<T> Grid<T> {
    /// Creates a grid from cell contents and a matching shape.
    ///
    /// # Errors
    ///
    /// Fails when the shape and contents key sets differ, or when two cells'
    /// spans overlap.
    pub fn new(contents: BTreeMap<Pos, T>, shape: Shape) -> Result<Self> {
        if shape.keys().ne(contents.keys()) {
            bail!("grid shape and contents do not match");
        }

        let mut covered: BTreeMap<Pos, Pos> = BTreeMap::new();
        for (&(row, col), &(rspan, cspan)) in &shape {
            for r in row..row + rspan {
                for c in col..col + cspan {
                    if let Some(other) = covered.insert((r, c), (row, col)) {
                        bail!(
                            "cell spans overlap at ({r}, {c}): claimed by both \
                             {other:?} and {:?}",
                            (row, col)
                        );
                    }
                }
            }
        }

        Ok(Self {
            contents,
            spans: shape,
        })
    }

    /// Creates a grid by zipping values onto an existing shape in cell order.
    ///
    /// Missing trailing values are filled with `default`.
    pub fn from_shape<I>(shape: Shape, values: I, default: T) -> Self
    where
        T: Clone,
        I: IntoIterator<Item = T>,
    {
        let mut it = values.into_iter();
        let contents = shape
            .keys()
            .map(|&pos| (pos, it.next().unwrap_or_else(|| default.clone())))
            .collect();
        Self {
            contents,
            spans: shape,
        }
    }

    /// Creates a grid from a shape and a sparse position-to-value mapping,
    /// filling unmapped cells with `default`.
    pub fn from_shape_map(shape: Shape, mut values: BTreeMap<Pos, T>, default: T) -> Self
    where
        T: Clone,
    {
        let contents = shape
            .keys()
            .map(|&pos| (pos, values.remove(&pos).unwrap_or_else(|| default.clone())))
            .collect();
        Self {
            contents,
            spans: shape,
        }
    }

    /// Number of rows, including rows covered only by spans.
    pub fn row_count(&self) -> usize {
        self.spans
            .iter()
            .map(|(&(r, _), &(rspan, _))| r + rspan)
            .max()
            .unwrap_or(0)
    }

    /// Number of columns, including columns covered only by spans.
    pub fn col_count(&self) -> usize {
        self.spans
            .iter()
            .map(|(&(_, c), &(_, cspan))| c + cspan)
            .max()
            .unwrap_or(0)
    }

    /// Cell value at `pos`, if a cell originates there.
    pub fn get(&self, pos: Pos) -> Option<&T> {
        self.contents.get(&pos)
    }

    /// The grid's shape: cell origin to `(rowspan, colspan)`.
    pub fn shape(&self) -> &Shape {
        &self.spans
    }

    /// Cell values in row-major cell order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.contents.values()
    }

    /// `(position, value)` pairs in row-major cell order.
    pub fn indexed_cells(&self) -> impl Iterator<Item = (Pos, &T)> {
        self.contents.iter().map(|(&pos, v)| (pos, v))
    }

    /// Number of cells (not covered positions).
    pub fn cell_count(&self) -> usize {
        self.contents.len()
    }

    /// Applies `f` to every cell, keeping the shape.
    pub fn map<T2>(&self, mut f: impl FnMut(&T) -> T2) -> Grid<T2> {
        Grid {
            contents: self.contents.iter().map(|(&k, v)| (k, f(v))).collect(),
            spans: self.spans.clone(),
        }
    }

    /// Removes every cell (and its span) for which `predicate` holds.
    pub fn remove_cells(&self, mut predicate: impl FnMut(&T) -> bool) -> Self
    where
        T: Clone,
    {
        let contents: BTreeMap<Pos, T> = self
            .contents
            .iter()
            .filter(|(_, v)| !predicate(v))
            .map(|(&k, v)| (k, v.clone()))
            .collect();
        let spans = self
            .spans
            .iter()
            .filter(|(k, _)| contents.contains_key(*k))
            .map(|(&k, &v)| (k, v))
            .collect();
        Self { contents, spans }
    }

    /// Reshapes this grid onto a different physical arrangement.
    ///
    /// `src` and `dst` are label grids: a cell of `self` at the position
    /// labelled `L` in `src` moves to the position labelled `L` in `dst`.
    /// Destination cells with no matching label are filled with `default`.
    pub fn reshape<L>(&self, src: &Grid<L>, dst: &Grid<L>, default: T) -> Self
    where
        T: Clone,
        L: Ord + Clone,
    {
        let label_to_pos: BTreeMap<L, Pos> = src
            .indexed_cells()
            .map(|(pos, label)| (label.clone(), pos))
            .collect();

        let mut values = BTreeMap::new();
        for (pos, label) in dst.indexed_cells() {
            if let Some(&src_pos) = label_to_pos.get(label) {
                if let Some(v) = self.get(src_pos) {
                    values.insert(pos, v.clone());
                }
            }
        }

        Self::from_shape_map(dst.shape().clone(), values, default)
    }
}

impl Grid<String> {
    /// Parses border-drawn table text. See [`parse::parse_table`].
    pub fn parse(text: &str) -> Result<Self> {
        parse::parse_table(text, &parse::default_col_separators(), &parse::default_row_separators(), true)
    }
}

/// Left-justifies `s` in a field of width `w`.
pub fn ljust(s: &str, w: usize) -> String {
    let size = s.chars().count();
    if size >= w {
        return s.to_string();
    }
    format!("{}{}", s, " ".repeat(w - size))
}

/// Centers `s` in a field of width `w` (left-biased on odd padding).
pub fn cjust(s: &str, w: usize) -> String {
    let size = s.chars().count();
    if size >= w {
        return s.to_string();
    }
    let h = (w - size) / 2;
    format!("{}{}{}", " ".repeat(h), s, " ".repeat(w - size - h))
}
