//! Multi-OS layer expansion.
//!
//! Every declared layer is cloned once per OS named in the OS-specific
//! tables, with three rewrites applied per clone: symbolic taps and hold
//! modifiers are substituted through that OS's table, hold layer references
//! are qualified with the OS suffix, and `@<os>` taps become switches to
//! that OS's base layer. Without any OS tables the keymap passes through as
//! a single unsuffixed variant.

use std::collections::BTreeMap;

use crate::keymap::{join_layer_name, HoldAction, Key, Keymap, BASE_LAYER};

/// One OS-specific variant of a declared layer.
#[derive(Debug, Clone)]
pub struct OsLayer {
    /// Qualified layer name, e.g. `nav_mac`.
    pub name: String,
    /// The declared layer this variant was expanded from.
    pub source_layer: String,
    /// OS suffix, empty when no OS tables were declared.
    pub os: String,
    pub keys: Vec<Key>,
}

/// Expands `keymap` into per-OS layer variants, declared layers outermost
/// so the base variants keep the lowest indices.
pub fn expand(keymap: &Keymap, os_tables: &[(String, BTreeMap<String, String>)]) -> Vec<OsLayer> {
    let no_os = [(String::new(), BTreeMap::new())];
    let os_tables = if os_tables.is_empty() { &no_os } else { os_tables };
    let os_names: Vec<&str> = os_tables.iter().map(|(os, _)| os.as_str()).collect();

    let mut expanded = Vec::new();
    for (layer, keys) in &keymap.layers {
        for (os, substitutions) in os_tables {
            expanded.push(OsLayer {
                name: join_layer_name(layer, &[os.as_str()]),
                source_layer: layer.clone(),
                os: os.clone(),
                keys: keys
                    .iter()
                    .map(|key| expand_key(key, os, substitutions, &os_names))
                    .collect(),
            });
        }
    }
    expanded
}

fn expand_key(
    key: &Key,
    os: &str,
    substitutions: &BTreeMap<String, String>,
    os_names: &[&str],
) -> Key {
    let tap = key.tap.as_ref().map(|tap| {
        if let Some(target_os) = tap.strip_prefix('@').filter(|t| os_names.contains(t)) {
            format!("@{}", join_layer_name(BASE_LAYER, &[target_os]))
        } else {
            substitutions.get(tap).unwrap_or(tap).clone()
        }
    });
    let hold = key.hold.as_ref().map(|hold| match hold {
        HoldAction::Layer(layer) => HoldAction::Layer(join_layer_name(layer, &[os])),
        HoldAction::Modifier(m) => {
            HoldAction::Modifier(substitutions.get(m).unwrap_or(m).clone())
        }
    });
    Key { tap, hold }
}
