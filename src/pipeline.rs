//! End-to-end generation: markdown document in, firmware source out.

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::dedup::{deduplicate_layers, shorten_names};
use crate::expand::expand;
use crate::grid::Grid;
use crate::keymap::{builder::build_keymap, Key, Keymap, BASE_LAYER};
use crate::markdown::{extract_os_specifics, extract_tables, LAYOUT_SECTION};
use crate::qmk::{self, QmkTranslator};
use crate::translate::{translate_layers, TranslatedLayer, Translator};
use crate::zmk::{self, ZmkTranslator};

/// Firmware dialect to generate.
#[derive(Debug, Clone)]
pub enum Target {
    /// QMK `keymap.c` using the given `LAYOUT_...` macro.
    Qmk { layout: String },
    /// ZMK keymap overlay, optionally selecting a matrix transform.
    Zmk { transform: Option<String> },
}

/// A pair of label grids retargeting the keymap onto a different physical
/// arrangement: a key at the position labelled `x` in the source grid moves
/// to the position labelled `x` in the destination grid.
#[derive(Debug, Clone)]
pub struct ReshapeSpec {
    src: Grid<String>,
    dst: Grid<String>,
}

impl ReshapeSpec {
    /// Parses two label grids separated by a blank line: first the layout
    /// tables' own arrangement, then the target arrangement. Empty cells are
    /// ignored on both sides; destination labels with no source counterpart
    /// become no-op keys (padding positions).
    pub fn parse(text: &str) -> Result<Self> {
        let mut blocks: Vec<Vec<&str>> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    blocks.push(std::mem::take(&mut current));
                }
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            blocks.push(current);
        }
        let [src, dst] = blocks.as_slice() else {
            bail!(
                "reshape spec needs exactly two label grids, found {}",
                blocks.len()
            );
        };
        Ok(Self {
            src: Grid::parse(&src.join("\n"))?.remove_cells(String::is_empty),
            dst: Grid::parse(&dst.join("\n"))?.remove_cells(String::is_empty),
        })
    }

    /// Moves every layer's keys to the destination arrangement; the keymap
    /// takes the destination grid's shape.
    fn apply(&self, keymap: &mut Keymap) -> Result<()> {
        let mut table_shape = None;
        for (name, keys) in &mut keymap.layers {
            if keys.len() != self.src.cell_count() {
                bail!(
                    "reshape source grid has {} labels but layer {name:?} has {} keys",
                    self.src.cell_count(),
                    keys.len()
                );
            }
            let grid = Grid::from_shape(self.src.shape().clone(), keys.iter().cloned(), Key::empty());
            let reshaped = grid.reshape(&self.src, &self.dst, Key::empty());
            *keys = reshaped.values().cloned().collect();
            table_shape = Some(reshaped.shape().clone());
        }
        if let Some(shape) = table_shape {
            keymap.table_shape = shape;
        }
        Ok(())
    }
}

/// Generates firmware source for `target` from a layout document,
/// optionally retargeted onto another physical arrangement first.
pub fn generate(markdown: &str, target: &Target, reshape: Option<&ReshapeSpec>) -> Result<String> {
    let tables = extract_tables(markdown, LAYOUT_SECTION)?;
    if tables.is_empty() {
        bail!("no layer tables found under a {LAYOUT_SECTION:?} heading");
    }
    debug!(tables = tables.len(), "extracted layer tables");

    let mut keymap = build_keymap(&tables).context("building keymap")?;
    if let Some(spec) = reshape {
        spec.apply(&mut keymap).context("reshaping keymap")?;
    }
    let os_tables = extract_os_specifics(markdown)?;
    let os_names: Vec<String> = os_tables.iter().map(|(os, _)| os.clone()).collect();
    info!(
        layers = keymap.layers.len(),
        oses = os_names.len(),
        "building {} output",
        match target {
            Target::Qmk { .. } => "QMK",
            Target::Zmk { .. } => "ZMK",
        }
    );

    let expanded = expand(&keymap, &os_tables);
    // Base variants stay addressable: they are explicit OS switch targets.
    let protected: BTreeSet<String> = expanded
        .iter()
        .filter(|l| l.source_layer == BASE_LAYER)
        .map(|l| l.name.clone())
        .collect();

    match target {
        Target::Qmk { layout } => {
            let translator = QmkTranslator::new()?.with_default_shift_pairs();
            let mut layers = translate_layers(&expanded, &translator)?;
            finish_layers(&mut layers, &translator, &protected, &os_names);
            qmk::emit::emit_keymap(&keymap, &layers, layout)
        }
        Target::Zmk { transform } => {
            // Unicode macros differ per OS, so each OS gets its own
            // translator.
            let mut translators = std::collections::BTreeMap::new();
            for layer in &expanded {
                if !translators.contains_key(&layer.os) {
                    let translator = ZmkTranslator::new(&layer.os)?.with_default_shift_pairs()?;
                    translators.insert(layer.os.clone(), translator);
                }
            }
            let translator = ZmkTranslator::new("")?;
            let mut layers = Vec::with_capacity(expanded.len());
            for layer in &expanded {
                let os_translator = translators
                    .get(&layer.os)
                    .context("translator for OS")?;
                let bindings = layer
                    .keys
                    .iter()
                    .map(|key| os_translator.translate(key))
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("translating layer {:?}", layer.name))?;
                layers.push(TranslatedLayer {
                    name: layer.name.clone(),
                    source_layer: layer.source_layer.clone(),
                    os: layer.os.clone(),
                    bindings,
                });
            }
            finish_layers(&mut layers, &translator, &protected, &os_names);
            zmk::emit::emit_keymap(&keymap, &layers, transform.as_deref())
        }
    }
}

fn finish_layers<T: Translator>(
    layers: &mut Vec<TranslatedLayer<T::Binding>>,
    translator: &T,
    protected: &BTreeSet<String>,
    os_names: &[String],
) {
    let before = layers.len();
    deduplicate_layers(layers, translator, |name| protected.contains(name));
    debug!(before, after = layers.len(), "deduplicated layers");
    shorten_names(layers, translator, os_names);
}
