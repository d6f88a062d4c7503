//! Keymap intermediate representation.
//!
//! A [`Keymap`] is an ordered collection of named layers, each a sequence of
//! [`Key`]s aligned 1:1 on one shared table shape (the physical matrix).
//! Layer iteration order follows first-declaration order in the source
//! document and is preserved through every later stage, because it decides
//! the numeric layer indices in the generated output.

pub mod builder;

use anyhow::{bail, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use crate::grid::Shape;

/// Name of the entry-point layer every keymap must declare.
pub const BASE_LAYER: &str = "base";

/// Name of the table holding per-position hold overlays for the base layer.
pub const HOLDTAP_LAYER: &str = "hold-tap";

/// The hold side of a hold-tap key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldAction {
    /// Holding activates another layer (layer-tap).
    Layer(String),
    /// Holding acts as a keyboard modifier (mod-tap).
    Modifier(String),
}

/// One physical key position's declared behavior: an optional tap name and
/// an optional hold action. Both absent means the position renders to the
/// target's no-op binding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Key {
    pub tap: Option<String>,
    pub hold: Option<HoldAction>,
}

impl Key {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tap_only(tap: impl Into<String>) -> Self {
        Self {
            tap: Some(tap.into()),
            hold: None,
        }
    }

    /// Builds a key, classifying a non-empty hold as layer-tap or mod-tap.
    ///
    /// # Errors
    ///
    /// Fails when `hold` names neither a declared layer nor a recognized
    /// modifier.
    pub fn with_hold(
        tap: Option<String>,
        hold: &str,
        layer_names: &[String],
    ) -> Result<Self> {
        let hold = if layer_names.iter().any(|n| n == hold) {
            HoldAction::Layer(hold.to_string())
        } else if is_modifier(hold) {
            HoldAction::Modifier(hold.to_string())
        } else {
            bail!("hold-tap value is neither a declared layer nor a modifier: {hold:?}");
        };
        Ok(Self {
            tap,
            hold: Some(hold),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tap.is_none() && self.hold.is_none()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hold = match &self.hold {
            Some(HoldAction::Layer(name) | HoldAction::Modifier(name)) => Some(name.as_str()),
            None => None,
        };
        match (self.tap.as_deref(), hold) {
            (Some(tap), Some(hold)) => write!(f, "{tap} ⇩{hold}"),
            (Some(tap), None) => write!(f, "{tap}"),
            (None, Some(hold)) => write!(f, "⇩{hold}"),
            (None, None) => Ok(()),
        }
    }
}

/// An ordered, named collection of per-layer key sequences sharing one
/// table shape.
#[derive(Debug, Clone)]
pub struct Keymap {
    /// Layers in first-declaration order.
    pub layers: Vec<(String, Vec<Key>)>,
    /// The shared shape all layers' key sequences flow into.
    pub table_shape: Shape,
    /// Human-readable titles per layer, for generated comments.
    pub titles: BTreeMap<String, String>,
}

impl Keymap {
    /// Key sequence of the layer called `name`.
    pub fn layer(&self, name: &str) -> Option<&[Key]> {
        self.layers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, keys)| keys.as_slice())
    }

    /// Layer names in declaration order.
    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|(n, _)| n.clone()).collect()
    }
}

/// Matches a lone modifier name: optional l/r prefix plus ALT, CMD, CTRL,
/// SHIFT or GUI, case-insensitively.
pub fn is_modifier(name: &str) -> bool {
    modifier_re().is_match(name)
}

fn modifier_re() -> Regex {
    Regex::new(r"(?i)^[rl]?(ALT|CMD|CTRL|SHIFT|GUI)$").expect("valid modifier regex")
}

/// Splits leading `MOD+` combo prefixes off a key name: `CTRL+lALT+x`
/// becomes `(["CTRL", "lALT"], "x")`.
pub fn split_mods(name: &str) -> (Vec<String>, String) {
    let re = Regex::new(r"(?i)^([rl]?(?:ALT|CMD|CTRL|SHIFT|GUI))\+").expect("valid combo regex");
    let mut mods = Vec::new();
    let mut rest = name;
    while let Some(m) = re.captures(rest) {
        mods.push(m.get(1).expect("group 1").as_str().to_string());
        rest = &rest[m.get(0).expect("whole match").end()..];
    }
    (mods, rest.to_string())
}

/// Appends variation parts to a layer name: `join_layer_name("nav", ["mac"])`
/// is `nav_mac`.
pub fn join_layer_name(base: &str, parts: &[&str]) -> String {
    let mut name = base.to_string();
    for part in parts {
        if !part.is_empty() {
            name.push('_');
            name.push_str(part);
        }
    }
    name
}

/// Longest common prefix of `names`.
pub fn common_prefix(names: &[String]) -> String {
    let Some(first) = names.first() else {
        return String::new();
    };
    let mut prefix: &str = first;
    for name in &names[1..] {
        let shared = prefix
            .char_indices()
            .zip(name.chars())
            .take_while(|((_, a), b)| a == b)
            .count();
        let end = prefix
            .char_indices()
            .nth(shared)
            .map_or(prefix.len(), |(i, _)| i);
        prefix = &prefix[..end];
    }
    prefix.to_string()
}

/// Combined name for a group of merged layers: the longest common prefix
/// followed by the distinct suffixes, sorted. With no common prefix this
/// degenerates to the concatenation of the full names.
pub fn merge_layer_names(names: &[String]) -> String {
    let prefix = common_prefix(names);
    let mut suffixes: Vec<&str> = names.iter().map(|n| &n[prefix.len()..]).collect();
    suffixes.sort_unstable();
    suffixes.dedup();
    format!("{prefix}{}", suffixes.concat())
}

/// Shortens a layer name by reducing every embedded OS name to its first
/// letter: `nav_macwin` with OSes `[mac, win]` becomes `nav_mw`.
pub fn shorten_layer_name(name: &str, os_names: &[String]) -> String {
    let mut out = name.to_string();
    for os in os_names {
        if let Some(initial) = os.chars().next() {
            out = out.replace(os.as_str(), &initial.to_string());
        }
    }
    out
}
