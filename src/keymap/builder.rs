//! Builds the keymap IR from parsed layer tables.
//!
//! Input is the ordered `(title, grid)` sequence extracted from the layout
//! document. The builder derives layer names from back-quoted title tokens,
//! enforces a single shared shape, merges the dedicated hold-tap table into
//! the base layer, resolves title path annotations, and drops positions
//! that are empty on every layer (they are not physical keys).

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;

use super::{Key, Keymap, BASE_LAYER, HOLDTAP_LAYER};
use crate::grid::Grid;

/// A layer declaration parsed from one table's title.
#[derive(Debug)]
struct LayerDecl {
    name: String,
    title: String,
    paths: BTreeSet<(String, String)>,
    cells: Vec<String>,
}

/// Builds a [`Keymap`] from `(title, grid)` pairs in declaration order.
///
/// # Errors
///
/// Fails when the `base` or `hold-tap` table is missing, when the tables do
/// not all share one shape, or when a hold-tap cell names neither a
/// declared layer nor a modifier.
pub fn build_keymap(tables: &[(String, Grid<String>)]) -> Result<Keymap> {
    if tables.is_empty() {
        bail!("no layer tables found");
    }

    let shape = tables[0].1.shape().clone();
    for (title, grid) in tables {
        if grid.shape() != &shape {
            bail!("layer tables are not all the same shape (first differing: {title:?})");
        }
    }

    let decls: Vec<LayerDecl> = tables
        .iter()
        .enumerate()
        .map(|(i, (title, grid))| parse_layer_decl(i, title, grid))
        .collect();

    let holdtap_cells = decls
        .iter()
        .find(|d| d.name == HOLDTAP_LAYER)
        .map(|d| d.cells.clone())
        .with_context(|| format!("missing required {HOLDTAP_LAYER:?} table"))?;

    // Hold values may name any layer except the hold-tap table itself.
    let layer_names: Vec<String> = decls
        .iter()
        .filter(|d| d.name != HOLDTAP_LAYER)
        .map(|d| d.name.clone())
        .collect();
    if !layer_names.iter().any(|n| n == BASE_LAYER) {
        bail!("missing required {BASE_LAYER:?} layer");
    }

    let mut layers: Vec<(String, Vec<Key>)> = Vec::new();
    let mut titles = std::collections::BTreeMap::new();
    for decl in decls.iter().filter(|d| d.name != HOLDTAP_LAYER) {
        let keys = if decl.name == BASE_LAYER {
            decl.cells
                .iter()
                .zip(&holdtap_cells)
                .map(|(tap, hold)| make_key(tap, hold, &layer_names))
                .collect::<Result<Vec<_>>>()
                .context("building base layer hold-taps")?
        } else {
            decl.cells
                .iter()
                .map(|tap| {
                    if tap.is_empty() {
                        Key::empty()
                    } else {
                        Key::tap_only(tap.clone())
                    }
                })
                .collect()
        };
        titles.insert(decl.name.clone(), decl.title.clone());
        layers.push((decl.name.clone(), keys));
    }

    resolve_paths(&mut layers, &decls, &holdtap_cells);

    // Positions empty on every layer (hold-tap overlay included) are not
    // physical keys; drop them from the shared shape.
    let nonvoid: Vec<bool> = (0..holdtap_cells.len())
        .map(|i| {
            !holdtap_cells[i].is_empty()
                || layers.iter().any(|(_, keys)| !keys[i].is_empty())
        })
        .collect();

    let table_shape = shape
        .keys()
        .zip(&nonvoid)
        .filter(|(_, &keep)| keep)
        .map(|(&pos, _)| (pos, shape[&pos]))
        .collect();
    for (_, keys) in &mut layers {
        let mut it = nonvoid.iter();
        keys.retain(|_| *it.next().expect("mask length matches keys"));
    }

    Ok(Keymap {
        layers,
        table_shape,
        titles,
    })
}

/// Derives a layer's name, cleaned title, and path annotations from its
/// table title. Names come from the first plain back-quoted token; layers
/// without one get a stable ordinal.
fn parse_layer_decl(index: usize, title: &str, grid: &Grid<String>) -> LayerDecl {
    let code_re = Regex::new(r"`([^`]+)`").expect("valid code regex");
    let path_re = Regex::new(r"^([\w+]+)(?:([>,])|([+&]))([\w+]+)$").expect("valid path regex");

    let mut paths = BTreeSet::new();
    let mut name: Option<String> = None;

    for caps in code_re.captures_iter(title) {
        let code = &caps[1];
        if let Some(m) = path_re.captures(code) {
            let (a, b) = (m[1].to_string(), m[4].to_string());
            if m.get(3).is_some() {
                // Bidirectional annotation: both orders apply.
                paths.insert((b.clone(), a.clone()));
            }
            paths.insert((a, b));
        } else if name.is_none() {
            name = Some(code.to_string());
        }
    }

    let clean_re = Regex::new(r" +\(`[^`]+`\)").expect("valid title regex");
    LayerDecl {
        name: name.unwrap_or_else(|| index.to_string()),
        title: clean_re.replace_all(title, "").trim().to_string(),
        paths,
        cells: grid.values().cloned().collect(),
    }
}

fn make_key(tap: &str, hold: &str, layer_names: &[String]) -> Result<Key> {
    let tap = (!tap.is_empty()).then(|| tap.to_string());
    if hold.is_empty() {
        Ok(Key {
            tap,
            hold: None,
        })
    } else {
        Key::with_hold(tap, hold, layer_names)
    }
}

/// Applies title path annotations: for a layer `L` declaring `A>B`, every
/// position whose hold-tap cell reads `B` gets, in layer `A`, its hold
/// rewritten to activate `L`. Unknown source layers are skipped with a
/// warning.
fn resolve_paths(
    layers: &mut [(String, Vec<Key>)],
    decls: &[LayerDecl],
    holdtap_cells: &[String],
) {
    use super::HoldAction;

    for decl in decls {
        for (src, dst) in &decl.paths {
            let Some((_, keys)) = layers.iter_mut().find(|(n, _)| n == src) else {
                warn!(layer = %decl.name, path_source = %src, "path annotation names unknown layer, skipping");
                continue;
            };
            for (i, cell) in holdtap_cells.iter().enumerate() {
                if cell == dst {
                    keys[i].hold = Some(HoldAction::Layer(decl.name.clone()));
                }
            }
        }
    }
}
