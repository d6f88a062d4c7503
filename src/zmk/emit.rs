//! Renders translated layers into a ZMK keymap overlay.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use super::dt::{Node, PropValue};
use super::ZmkBinding;
use crate::grid::{format_boxed_table, format_table, ljust, Grid};
use crate::keymap::Keymap;
use crate::translate::TranslatedLayer;

/// Headers required once the matching behavior appears anywhere in the
/// rendered overlay.
const BEHAVIOR_INCLUDES: &[(&str, &str)] = &[
    ("kp", "dt-bindings/zmk/keys.h"),
    ("lt", "dt-bindings/zmk/keys.h"),
    ("bt", "dt-bindings/zmk/bt.h"),
    ("out", "dt-bindings/zmk/outputs.h"),
    ("mmv", "dt-bindings/zmk/pointing.h"),
    ("mkb", "dt-bindings/zmk/pointing.h"),
];

/// Renders the generated `.keymap` overlay. `transform` selects a matrix
/// transform via the `chosen` node when the board defines more than one.
pub fn emit_keymap(
    keymap: &Keymap,
    layers: &[TranslatedLayer<ZmkBinding>],
    transform: Option<&str>,
) -> Result<String> {
    let mut defines = String::new();
    for (i, layer) in layers.iter().enumerate() {
        let _ = writeln!(defines, "#define {} {i}", layer.name);
    }

    let mut keymap_node = Node::new("keymap").str_prop("compatible", "zmk,keymap");
    let mut commented: BTreeSet<&str> = BTreeSet::new();
    for layer in layers {
        if commented.insert(&layer.source_layer) {
            keymap_node = keymap_node.comment(layer_comment(keymap, &layer.source_layer)?);
        }
        keymap_node = keymap_node.child(layer_node(keymap, layer)?);
    }

    let (behaviors, macros) = collect_behavior_nodes(layers);

    let mut root = Node::new("/");
    if let Some(transform) = transform {
        root = root.child(
            Node::new("chosen").prop("zmk,matrix-transform", PropValue::Raw(format!("&{transform}"))),
        );
    }
    if !behaviors.is_empty() {
        let mut node = Node::new("behaviors");
        for b in behaviors {
            node = node.child(b);
        }
        root = root.child(node);
    }
    if !macros.is_empty() {
        let mut node = Node::new("macros");
        for m in macros {
            node = node.child(m);
        }
        root = root.child(node);
    }
    root = root.child(keymap_node);

    let mut body = String::new();
    body.push_str(&defines);
    body.push('\n');
    if layers
        .iter()
        .flat_map(|l| &l.bindings)
        .any(|b| b.behavior == "&lt")
    {
        body.push_str(
            &Node::new("&lt")
                .str_prop("flavor", "balanced")
                .int_prop("quick-tap-ms", 175)
                .format(),
        );
        body.push('\n');
    }
    body.push_str(&root.format());

    let mut out = String::from("#include <behaviors.dtsi>\n");
    for header in required_includes(&body) {
        let _ = writeln!(out, "#include <{header}>");
    }
    out.push('\n');
    out.push_str(&body);
    Ok(out)
}

/// Headers needed by the behaviors referenced anywhere in `text`.
fn required_includes(text: &str) -> BTreeSet<&'static str> {
    let behavior_re = Regex::new(r"&(\w+)").expect("valid behavior regex");
    let used: BTreeSet<&str> = behavior_re
        .captures_iter(text)
        .map(|c| c.get(1).expect("group 1").as_str())
        .collect();
    BEHAVIOR_INCLUDES
        .iter()
        .filter(|(behavior, _)| used.contains(behavior))
        .map(|&(_, header)| header)
        .collect()
}

/// Boxed table comment showing the declared layer as the author wrote it.
fn layer_comment(keymap: &Keymap, source_layer: &str) -> Result<String> {
    let keys = keymap
        .layer(source_layer)
        .with_context(|| format!("unknown layer: {source_layer:?}"))?;
    let grid = Grid::from_shape(
        keymap.table_shape.clone(),
        keys.iter().map(ToString::to_string),
        String::new(),
    );
    match keymap.titles.get(source_layer) {
        Some(title) => Ok(format!("{title}\n{}", format_boxed_table(&grid, " "))),
        None => Ok(format_boxed_table(&grid, " ")),
    }
}

fn layer_node(keymap: &Keymap, layer: &TranslatedLayer<ZmkBinding>) -> Result<Node> {
    let grid = Grid::from_shape(
        keymap.table_shape.clone(),
        layer.bindings.iter().map(ToString::to_string),
        String::new(),
    );
    let matrix = format_table(&grid, "", " ", ljust)
        .with_context(|| format!("formatting layer {:?}", layer.name))?;
    let matrix: String = matrix
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Node::new(format!("{}_layer", layer.name))
        .raw_prop("bindings", format!("<\n{matrix}\n\t\t\t>"))
        .str_prop("display-name", layer.display_name()))
}

/// Distinct supporting nodes in first-use order, split into behavior and
/// macro definitions. Identity is the rendered node text.
fn collect_behavior_nodes(layers: &[TranslatedLayer<ZmkBinding>]) -> (Vec<Node>, Vec<Node>) {
    let mut seen: BTreeMap<String, ()> = BTreeMap::new();
    let mut behaviors = Vec::new();
    let mut macros = Vec::new();
    for node in layers
        .iter()
        .flat_map(|l| &l.bindings)
        .flat_map(|b| &b.behavior_nodes)
    {
        if seen.insert(node.format(), ()).is_some() {
            continue;
        }
        let is_macro = matches!(
            node.get_prop("compatible"),
            Some(PropValue::Str(c)) if c.contains("macro")
        );
        if is_macro {
            macros.push(node.clone());
        } else {
            behaviors.push(node.clone());
        }
    }
    (behaviors, macros)
}
