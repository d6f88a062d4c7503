//! Structural layer deduplication.
//!
//! OS expansion routinely produces identical layer variants (a symbol layer
//! rarely differs between mac and win). Dedup merges layers whose rendered
//! bindings are identical, keeps the earliest member under a combined name,
//! and rewrites every layer reference to match. Merging can make previously
//! distinct layers identical, so the pass repeats until a fixed point.

use std::collections::BTreeMap;
use tracing::debug;

use crate::keymap::{merge_layer_names, shorten_layer_name};
use crate::translate::{TranslatedLayer, Translator};

/// Merges structurally identical layers until a fixed point. A group of
/// identical layers containing a name that satisfies `protected` is left
/// whole; its members stay addressable as explicit switch targets.
pub fn deduplicate_layers<T: Translator>(
    layers: &mut Vec<TranslatedLayer<T::Binding>>,
    translator: &T,
    protected: impl Fn(&str) -> bool,
) {
    for pass in 1.. {
        let mut groups: Vec<(Vec<String>, Vec<usize>)> = Vec::new();
        for (i, layer) in layers.iter().enumerate() {
            let key: Vec<String> = layer.bindings.iter().map(ToString::to_string).collect();
            match groups.iter().position(|(k, _)| *k == key) {
                Some(idx) => groups[idx].1.push(i),
                None => groups.push((key, vec![i])),
            }
        }

        let mut renames = BTreeMap::new();
        let mut dropped = Vec::new();
        for (_, members) in groups.iter().filter(|(_, m)| m.len() > 1) {
            let names: Vec<String> = members.iter().map(|&i| layers[i].name.clone()).collect();
            if names.iter().any(|n| protected(n)) {
                continue;
            }
            let merged = merge_layer_names(&names);
            for name in names {
                renames.insert(name, merged.clone());
            }
            dropped.extend_from_slice(&members[1..]);
        }
        if renames.is_empty() {
            break;
        }
        debug!(pass, merged = dropped.len(), "merging identical layers");

        let mut index = 0;
        layers.retain(|_| {
            let keep = !dropped.contains(&index);
            index += 1;
            keep
        });
        apply_renames(layers, translator, &renames);
    }
}

/// Renames layers and rewrites every layer reference accordingly.
pub fn apply_renames<T: Translator>(
    layers: &mut [TranslatedLayer<T::Binding>],
    translator: &T,
    renames: &BTreeMap<String, String>,
) {
    for layer in layers.iter_mut() {
        if let Some(new_name) = renames.get(&layer.name) {
            layer.name = new_name.clone();
        }
        for binding in &mut layer.bindings {
            translator.replace_layer_ids(binding, renames);
        }
    }
}

/// Shortens every embedded OS name to its first letter, in layer names and
/// in the references pointing at them (`nav_macwin` becomes `nav_mw`).
pub fn shorten_names<T: Translator>(
    layers: &mut [TranslatedLayer<T::Binding>],
    translator: &T,
    os_names: &[String],
) {
    let renames: BTreeMap<String, String> = layers
        .iter()
        .filter_map(|layer| {
            let short = shorten_layer_name(&layer.name, os_names);
            (short != layer.name).then(|| (layer.name.clone(), short))
        })
        .collect();
    if !renames.is_empty() {
        apply_renames(layers, translator, &renames);
    }
}
