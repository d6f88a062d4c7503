//! Keymap-to-firmware translation seam.
//!
//! A [`Translator`] turns the IR's [`Key`]s into one firmware dialect's
//! bindings. The backends share the alias machinery here: a resolver that
//! chains exact renames and pattern rules until a name reaches a fixed
//! point, with a visited set so alias cycles terminate instead of looping.

use anyhow::Result;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::expand::OsLayer;
use crate::keymap::BASE_LAYER;

/// Rewrite rule applied to a resolved alias match.
type PatternRule = Box<dyn Fn(&Captures) -> String>;

/// Chained name resolution: exact renames take precedence over pattern
/// rules, pattern rules apply in registration order, and resolution follows
/// the chain until no rule fires or a name repeats.
#[derive(Default)]
pub struct AliasResolver {
    exact: BTreeMap<String, String>,
    patterns: Vec<(Regex, PatternRule)>,
}

impl AliasResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.exact.insert(from.into(), to.into());
    }

    pub fn pattern(&mut self, re: Regex, rule: impl Fn(&Captures) -> String + 'static) {
        self.patterns.push((re, Box::new(rule)));
    }

    pub fn resolve(&self, name: &str) -> String {
        let mut seen = BTreeSet::new();
        let mut current = name.to_string();
        while seen.insert(current.clone()) {
            if let Some(next) = self.exact.get(&current) {
                current = next.clone();
                continue;
            }
            let next = self
                .patterns
                .iter()
                .find_map(|(re, rule)| re.captures(&current).map(|caps| rule(&caps)));
            match next {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }
        current
    }
}

/// Turns IR keys into one firmware dialect's bindings.
pub trait Translator {
    type Binding: Clone + PartialEq + fmt::Display;

    /// Translates one key. Unknown names degrade to the dialect's no-op
    /// binding with a warning; only structurally untranslatable keys fail.
    fn translate(&self, key: &crate::keymap::Key) -> Result<Self::Binding>;

    /// Rewrites every layer reference inside `binding` through `renames`.
    fn replace_layer_ids(&self, binding: &mut Self::Binding, renames: &BTreeMap<String, String>);
}

/// One fully translated layer.
#[derive(Debug, Clone)]
pub struct TranslatedLayer<B> {
    pub name: String,
    pub source_layer: String,
    pub os: String,
    pub bindings: Vec<B>,
}

impl<B> TranslatedLayer<B> {
    /// Name shown in generated comments: the OS for base variants, the
    /// declared layer name otherwise.
    pub fn display_name(&self) -> &str {
        if self.source_layer == BASE_LAYER && !self.os.is_empty() {
            &self.os
        } else {
            &self.source_layer
        }
    }
}

/// Translates every expanded layer with `translator`, preserving order.
pub fn translate_layers<T: Translator>(
    layers: &[OsLayer],
    translator: &T,
) -> Result<Vec<TranslatedLayer<T::Binding>>> {
    layers
        .iter()
        .map(|layer| {
            let bindings = layer
                .keys
                .iter()
                .map(|key| translator.translate(key))
                .collect::<Result<Vec<_>>>()?;
            Ok(TranslatedLayer {
                name: layer.name.clone(),
                source_layer: layer.source_layer.clone(),
                os: layer.os.clone(),
                bindings,
            })
        })
        .collect()
}
