//! QMK firmware dialect.
//!
//! Translates IR keys into the keycodes and macros a QMK `keymap.c`
//! understands, and renders the generated source file. The keycode
//! database ships embedded; lookups accept the canonical `KC_` name, any
//! registered alias, and bare names that resolve once `KC_` is prefixed.

pub mod emit;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::keymap::{split_mods, HoldAction, Key};
use crate::translate::{AliasResolver, Translator};

#[derive(Debug, Deserialize)]
struct KeycodeEntry {
    code: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    basic: bool,
}

/// Embedded QMK keycode database.
pub struct QmkKeycodes {
    by_name: BTreeMap<String, (String, bool)>,
}

impl QmkKeycodes {
    pub fn load() -> Result<Self> {
        let entries: Vec<KeycodeEntry> = serde_json::from_str(include_str!("keycodes.json"))
            .context("parsing embedded QMK keycode database")?;
        let mut by_name = BTreeMap::new();
        for entry in entries {
            by_name.insert(
                entry.code.to_lowercase(),
                (entry.code.clone(), entry.basic),
            );
            for alias in &entry.aliases {
                by_name.insert(alias.to_lowercase(), (entry.code.clone(), entry.basic));
            }
        }
        Ok(Self { by_name })
    }

    /// Looks `name` up directly, then with a `KC_` prefix.
    fn lookup(&self, name: &str) -> Option<&(String, bool)> {
        let lower = name.to_lowercase();
        self.by_name
            .get(&lower)
            .or_else(|| self.by_name.get(&format!("kc_{lower}")))
    }
}

/// One binding slot in a QMK keymap matrix. Layer fields hold layer names
/// until rendering; the C enum identifiers are derived at emit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QmkBinding {
    /// A plain (possibly modifier-wrapped) keycode expression.
    Key(String),
    /// `MOD_T(kc)`, hold for the modifier, tap for the keycode.
    ModTap { wrapper: String, tap: String },
    /// `LT(layer, kc)`; QMK restricts the tap side to basic keycodes.
    LayerTap { layer: String, tap: String },
    /// Layer-tap with a non-basic tap side, emulated with a tap dance.
    CustomLayerTap { layer: String, tap: String },
    Momentary { layer: String },
    ToLayer { layer: String },
    /// Rendered as the base keycode; the shifted value becomes a key
    /// override in the support block.
    CustomShift { base: String, shifted: String },
}

impl QmkBinding {
    /// Tap dance identifier for a custom layer-tap.
    pub fn tap_dance_ident(layer: &str, tap: &str) -> String {
        fix_c_ident(&format!("LT_{}_{tap}", layer_ident(layer)))
    }
}

impl std::fmt::Display for QmkBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(code) | Self::CustomShift { base: code, .. } => write!(f, "{code}"),
            Self::ModTap { wrapper, tap } => write!(f, "{wrapper}_T({tap})"),
            Self::LayerTap { layer, tap } => write!(f, "LT({},{tap})", layer_ident(layer)),
            Self::CustomLayerTap { layer, tap } => {
                write!(f, "TD({})", Self::tap_dance_ident(layer, tap))
            }
            Self::Momentary { layer } => write!(f, "MO({})", layer_ident(layer)),
            Self::ToLayer { layer } => write!(f, "TO({})", layer_ident(layer)),
        }
    }
}

/// C enum identifier for a layer name: the part before the OS suffix is
/// uppercased, the suffix kept as is (`nav_mw` becomes `NAV_mw`).
pub fn layer_ident(name: &str) -> String {
    match name.rsplit_once('_') {
        Some((head, tail)) => format!("{}_{tail}", head.to_uppercase()),
        None => name.to_uppercase(),
    }
}

fn fix_c_ident(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// QMK modifier wrapper (`LSFT`, `RALT`, ...) for an IR modifier name.
fn modifier_wrapper(name: &str) -> Option<String> {
    let (side, base) = match name.chars().next() {
        Some('r' | 'R') if name.len() > 3 => ('R', &name[1..]),
        Some('l' | 'L') if name.len() > 3 => ('L', &name[1..]),
        _ => ('L', name),
    };
    let base = match base.to_uppercase().as_str() {
        "ALT" => "ALT",
        "CTRL" => "CTL",
        "SHIFT" => "SFT",
        "CMD" | "GUI" => "GUI",
        _ => return None,
    };
    Some(format!("{side}{base}"))
}

/// Resolved tap expression plus whether it is a bare basic keycode.
struct TapCode {
    code: String,
    plain_basic: bool,
}

pub struct QmkTranslator {
    keycodes: QmkKeycodes,
    aliases: AliasResolver,
    translations: BTreeMap<String, QmkBinding>,
}

impl QmkTranslator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            keycodes: QmkKeycodes::load()?,
            aliases: AliasResolver::new(),
            translations: BTreeMap::new(),
        })
    }

    /// Per-keymap overrides consulted before the keycode database.
    pub fn with_translations(mut self, translations: BTreeMap<String, QmkBinding>) -> Self {
        self.translations = translations;
        self
    }

    /// Default two-character shift pairs: the cell names the tap keycode
    /// and the keycode typed under shift, rendered as key overrides.
    pub fn with_default_shift_pairs(self) -> Self {
        let pairs = [
            ("'\"", "KC_QUOT", "KC_DQUO"),
            (",;", "KC_COMM", "KC_SCLN"),
            (".?", "KC_DOT", "KC_QUES"),
            ("/\\", "KC_SLSH", "KC_BSLS"),
        ];
        let translations = pairs
            .into_iter()
            .map(|(name, base, shifted)| {
                (
                    name.to_string(),
                    QmkBinding::CustomShift {
                        base: base.to_string(),
                        shifted: shifted.to_string(),
                    },
                )
            })
            .collect();
        self.with_translations(translations)
    }

    pub fn aliases_mut(&mut self) -> &mut AliasResolver {
        &mut self.aliases
    }

    fn resolve_tap(&self, name: &str) -> TapCode {
        let resolved = self.aliases.resolve(name);
        let (mods, rest) = split_mods(&resolved);
        let rest = self.aliases.resolve(&rest);

        let (mut code, basic) = match self.keycodes.lookup(&rest) {
            Some((code, basic)) => (code.clone(), *basic),
            None => match single_unicode_char(&rest) {
                Some(c) => (format!("UC(0x{:04X})", c as u32), false),
                None => {
                    warn!(key = %name, "no QMK keycode found, emitting KC_NO");
                    ("KC_NO".to_string(), false)
                }
            },
        };
        let plain_basic = basic && mods.is_empty();
        for m in mods.iter().rev() {
            if let Some(wrapper) = modifier_wrapper(m) {
                code = format!("{wrapper}({code})");
            }
        }
        TapCode { code, plain_basic }
    }
}

fn single_unicode_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_ascii() => Some(c),
        _ => None,
    }
}

impl Translator for QmkTranslator {
    type Binding = QmkBinding;

    fn translate(&self, key: &Key) -> Result<QmkBinding> {
        if let Some(binding) = key.tap.as_ref().and_then(|t| self.translations.get(t)) {
            if key.hold.is_none() {
                return Ok(binding.clone());
            }
        }

        match (&key.tap, &key.hold) {
            (None, None) => Ok(QmkBinding::Key("KC_NO".to_string())),
            (Some(tap), None) => {
                if let Some(layer) = tap.strip_prefix('@').filter(|l| !l.is_empty()) {
                    return Ok(QmkBinding::ToLayer {
                        layer: layer.to_string(),
                    });
                }
                Ok(QmkBinding::Key(self.resolve_tap(tap).code))
            }
            (None, Some(HoldAction::Layer(layer))) => Ok(QmkBinding::Momentary {
                layer: layer.clone(),
            }),
            (Some(tap), Some(HoldAction::Layer(layer))) => {
                let tap = self.resolve_tap(tap);
                if tap.plain_basic {
                    Ok(QmkBinding::LayerTap {
                        layer: layer.clone(),
                        tap: tap.code,
                    })
                } else {
                    Ok(QmkBinding::CustomLayerTap {
                        layer: layer.clone(),
                        tap: tap.code,
                    })
                }
            }
            (None, Some(HoldAction::Modifier(m))) => {
                let wrapper = modifier_wrapper(m)
                    .with_context(|| format!("unknown modifier: {m:?}"))?;
                Ok(QmkBinding::Key(format!("KC_{wrapper}")))
            }
            (Some(tap), Some(HoldAction::Modifier(m))) => {
                let wrapper = modifier_wrapper(m)
                    .with_context(|| format!("unknown modifier: {m:?}"))?;
                let tap = self.resolve_tap(tap);
                if !tap.plain_basic {
                    bail!(
                        "mod-tap requires a plain basic keycode on the tap side, got {:?}",
                        tap.code
                    );
                }
                Ok(QmkBinding::ModTap {
                    wrapper,
                    tap: tap.code,
                })
            }
        }
    }

    fn replace_layer_ids(&self, binding: &mut QmkBinding, renames: &BTreeMap<String, String>) {
        let layer = match binding {
            QmkBinding::LayerTap { layer, .. }
            | QmkBinding::CustomLayerTap { layer, .. }
            | QmkBinding::Momentary { layer }
            | QmkBinding::ToLayer { layer } => layer,
            QmkBinding::Key(_) | QmkBinding::ModTap { .. } | QmkBinding::CustomShift { .. } => {
                return;
            }
        };
        if let Some(new_name) = renames.get(layer) {
            *layer = new_name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> QmkTranslator {
        QmkTranslator::new().unwrap()
    }

    #[test]
    fn test_plain_keys() {
        let t = translator();
        assert_eq!(
            t.translate(&Key::tap_only("a")).unwrap().to_string(),
            "KC_A"
        );
        assert_eq!(
            t.translate(&Key::tap_only("spc")).unwrap().to_string(),
            "KC_SPC"
        );
        assert_eq!(t.translate(&Key::empty()).unwrap().to_string(), "KC_NO");
    }

    #[test]
    fn test_modifier_combo_wraps() {
        let t = translator();
        assert_eq!(
            t.translate(&Key::tap_only("CTRL+c")).unwrap().to_string(),
            "LCTL(KC_C)"
        );
        assert_eq!(
            t.translate(&Key::tap_only("CMD+SHIFT+z")).unwrap().to_string(),
            "LGUI(LSFT(KC_Z))"
        );
    }

    #[test]
    fn test_layer_tap_basic_vs_custom() {
        let t = translator();
        let layers = vec!["nav".to_string()];

        let key = Key::with_hold(Some("spc".into()), "nav", &layers).unwrap();
        assert_eq!(t.translate(&key).unwrap().to_string(), "LT(NAV,KC_SPC)");

        // Non-basic tap side falls back to a tap dance.
        let key = Key::with_hold(Some("CMD+c".into()), "nav", &layers).unwrap();
        let binding = t.translate(&key).unwrap();
        assert!(matches!(binding, QmkBinding::CustomLayerTap { .. }));
        assert_eq!(binding.to_string(), "TD(LT_NAV_LGUI_KC_C_)");
    }

    #[test]
    fn test_mod_tap() {
        let t = translator();
        let key = Key::with_hold(Some("a".into()), "SHIFT", &[]).unwrap();
        assert_eq!(t.translate(&key).unwrap().to_string(), "LSFT_T(KC_A)");

        let key = Key::with_hold(None, "rALT", &[]).unwrap();
        assert_eq!(t.translate(&key).unwrap().to_string(), "KC_RALT");
    }

    #[test]
    fn test_mod_tap_rejects_composed_tap() {
        let t = translator();
        let key = Key::with_hold(Some("CTRL+c".into()), "SHIFT", &[]).unwrap();
        assert!(t.translate(&key).is_err());
    }

    #[test]
    fn test_layer_switch_tap() {
        let t = translator();
        let binding = t.translate(&Key::tap_only("@base_mac")).unwrap();
        assert_eq!(binding.to_string(), "TO(BASE_mac)");
        // A bare @ is the at-sign key, not a switch.
        assert_eq!(t.translate(&Key::tap_only("@")).unwrap().to_string(), "KC_AT");
    }

    #[test]
    fn test_unknown_key_degrades_to_noop() {
        let t = translator();
        assert_eq!(
            t.translate(&Key::tap_only("definitely_not_a_key")).unwrap().to_string(),
            "KC_NO"
        );
    }

    #[test]
    fn test_unicode_char() {
        let t = translator();
        assert_eq!(
            t.translate(&Key::tap_only("é")).unwrap().to_string(),
            "UC(0x00E9)"
        );
    }

    #[test]
    fn test_translations_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            ",".to_string(),
            QmkBinding::CustomShift {
                base: "KC_COMM".to_string(),
                shifted: "KC_SCLN".to_string(),
            },
        );
        let t = translator().with_translations(overrides);
        let binding = t.translate(&Key::tap_only(",")).unwrap();
        assert!(matches!(binding, QmkBinding::CustomShift { .. }));
        assert_eq!(binding.to_string(), "KC_COMM");
    }

    #[test]
    fn test_default_shift_pairs() {
        let t = translator().with_default_shift_pairs();
        let binding = t.translate(&Key::tap_only(".?")).unwrap();
        assert_eq!(
            binding,
            QmkBinding::CustomShift {
                base: "KC_DOT".to_string(),
                shifted: "KC_QUES".to_string(),
            }
        );
    }

    #[test]
    fn test_alias_chain_resolution() {
        let mut t = translator();
        t.aliases_mut().alias("ret", "ent");
        assert_eq!(
            t.translate(&Key::tap_only("ret")).unwrap().to_string(),
            "KC_ENT"
        );
    }

    #[test]
    fn test_layer_ident() {
        assert_eq!(layer_ident("nav_mw"), "NAV_mw");
        assert_eq!(layer_ident("base_m"), "BASE_m");
        assert_eq!(layer_ident("sym"), "SYM");
    }
}
