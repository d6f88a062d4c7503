//! ZMK firmware dialect.
//!
//! Translates IR keys into devicetree behavior bindings. Bindings that need
//! supporting behavior definitions (home-row mods, shift morphs, unicode
//! macros) carry their nodes along; the emitter collects and deduplicates
//! them into the overlay's `behaviors` and `macros` sections.

pub mod dt;
pub mod emit;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::keymap::{split_mods, HoldAction, Key};
use crate::translate::{AliasResolver, Translator};
use dt::Node;

#[derive(Debug, Deserialize)]
struct KeycodeEntry {
    code: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Embedded ZMK keycode database.
pub struct ZmkKeycodes {
    by_name: BTreeMap<String, String>,
}

impl ZmkKeycodes {
    pub fn load() -> Result<Self> {
        let entries: Vec<KeycodeEntry> = serde_json::from_str(include_str!("keycodes.json"))
            .context("parsing embedded ZMK keycode database")?;
        let mut by_name = BTreeMap::new();
        for entry in entries {
            by_name.insert(entry.code.to_lowercase(), entry.code.clone());
            for alias in &entry.aliases {
                by_name.insert(alias.to_lowercase(), entry.code.clone());
            }
        }
        Ok(Self { by_name })
    }

    fn lookup(&self, name: &str) -> Option<&String> {
        self.by_name.get(&name.to_lowercase())
    }
}

/// One behavior invocation in a keymap's bindings matrix, plus any behavior
/// nodes it requires.
#[derive(Debug, Clone, PartialEq)]
pub struct ZmkBinding {
    /// Behavior reference including the `&` prefix.
    pub behavior: String,
    pub params: Vec<String>,
    pub behavior_nodes: Vec<Node>,
}

impl ZmkBinding {
    pub fn new(behavior: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            behavior: behavior.into(),
            params,
            behavior_nodes: Vec::new(),
        }
    }

    pub fn none() -> Self {
        Self::new("&none", Vec::new())
    }

    pub fn kp(code: impl Into<String>) -> Self {
        Self::new("&kp", vec![code.into()])
    }

    pub fn mo(layer: impl Into<String>) -> Self {
        Self::new("&mo", vec![layer.into()])
    }

    pub fn to(layer: impl Into<String>) -> Self {
        Self::new("&to", vec![layer.into()])
    }

    /// Layer-tap; the tap side must be a plain `&kp` binding.
    pub fn lt(layer: impl Into<String>, tap: &Self) -> Result<Self> {
        let code = tap.plain_keycode().with_context(|| {
            format!("layer-tap requires a plain keycode tap, got {tap}")
        })?;
        Ok(Self::new("&lt", vec![layer.into(), code.to_string()]))
    }

    /// Home-row mod hold-tap; the tap side must be a plain `&kp` binding.
    pub fn hrm(modifier: impl Into<String>, tap: &Self) -> Result<Self> {
        let code = tap.plain_keycode().with_context(|| {
            format!("mod-tap requires a plain keycode tap, got {tap}")
        })?;
        let mut binding = Self::new("&hrm", vec![modifier.into(), code.to_string()]);
        binding.behavior_nodes.push(hrm_node());
        Ok(binding)
    }

    /// Mod-morph emitting `default` normally and `shifted` under shift.
    pub fn shift_morph(default: &Self, shifted: &Self) -> Result<Self> {
        let (d, s) = (
            default.plain_keycode().context("shift morph default must be a plain keycode")?,
            shifted.plain_keycode().context("shift morph shifted must be a plain keycode")?,
        );
        let name = format!("morph_{}_{}", ident(d), ident(s));
        let node = Node::new(&name)
            .label(&name)
            .str_prop("compatible", "zmk,behavior-mod-morph")
            .int_prop("#binding-cells", 0)
            .raw_prop("bindings", format!("<&kp {d}>, <&kp {s}>"))
            .raw_prop("mods", "<(MOD_LSFT|MOD_RSFT)>");
        let mut binding = Self::new(format!("&{name}"), Vec::new());
        binding.behavior_nodes.push(node);
        Ok(binding)
    }

    /// Macro typing `c` through the OS's unicode input method.
    pub fn unicode_macro(os: &str, c: char) -> Option<Self> {
        let hex_taps: String = format!("{:04x}", c as u32)
            .chars()
            .map(|h| match h {
                '0'..='9' => format!(" &kp N{h}"),
                _ => format!(" &kp {}", h.to_ascii_uppercase()),
            })
            .collect();
        let bindings = match os {
            "mac" | "macos" | "osx" => {
                format!("<&macro_press &kp LALT>\n\t, <&macro_tap{hex_taps}>\n\t, <&macro_release &kp LALT>")
            }
            "linux" => {
                format!("<&macro_tap &kp LC(LS(U)){hex_taps} &kp RET>")
            }
            "win" | "windows" => {
                format!("<&macro_tap &kp RALT &kp U{hex_taps} &kp RET>")
            }
            _ => return None,
        };
        let name = format!("uc_{:04x}_{os}", c as u32);
        let node = Node::new(&name)
            .label(&name)
            .str_prop("compatible", "zmk,behavior-macro")
            .int_prop("#binding-cells", 0)
            .int_prop("wait-ms", 0)
            .int_prop("tap-ms", 0)
            .raw_prop("bindings", bindings);
        let mut binding = Self::new(format!("&{name}"), Vec::new());
        binding.behavior_nodes.push(node);
        Some(binding)
    }

    /// Tap-dance guarding the bootloader behind a double tap.
    pub fn bootloader() -> Self {
        let node = Node::new("boot_td")
            .label("boot_td")
            .str_prop("compatible", "zmk,behavior-tap-dance")
            .int_prop("#binding-cells", 0)
            .int_prop("tapping-term-ms", 200)
            .raw_prop("bindings", "<&none>, <&bootloader>");
        let mut binding = Self::new("&boot_td", Vec::new());
        binding.behavior_nodes.push(node);
        binding
    }

    /// Tap-dance selecting bluetooth profile `index` on tap and clearing the
    /// current profile on double tap.
    pub fn bt_select(index: u8) -> Self {
        let name = format!("bt_td_{index}");
        let node = Node::new(&name)
            .label(&name)
            .str_prop("compatible", "zmk,behavior-tap-dance")
            .int_prop("#binding-cells", 0)
            .int_prop("tapping-term-ms", 200)
            .raw_prop("bindings", format!("<&bt BT_SEL {index}>, <&bt BT_CLR>"));
        let mut binding = Self::new(format!("&{name}"), Vec::new());
        binding.behavior_nodes.push(node);
        binding
    }

    /// The keycode of a bare `&kp` binding. Modifier-wrapped codes do not
    /// count: hold-tap and morph taps need a single unwrapped keycode.
    fn plain_keycode(&self) -> Option<&str> {
        (self.behavior == "&kp" && self.params.len() == 1 && !self.params[0].contains('('))
            .then(|| self.params[0].as_str())
    }
}

impl fmt::Display for ZmkBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.behavior)?;
        for p in &self.params {
            write!(f, " {p}")?;
        }
        Ok(())
    }
}

fn ident(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

fn hrm_node() -> Node {
    Node::new("hrm")
        .label("hrm")
        .str_prop("compatible", "zmk,behavior-hold-tap")
        .int_prop("#binding-cells", 2)
        .str_prop("flavor", "balanced")
        .int_prop("tapping-term-ms", 280)
        .int_prop("quick-tap-ms", 175)
        .int_prop("require-prior-idle-ms", 150)
        .raw_prop("bindings", "<&kp>, <&kp>")
}

/// Modifier function prefix (`LS`, `RC`, ...) for an IR modifier name.
fn modifier_fn(name: &str) -> Option<String> {
    let (side, base) = split_modifier(name)?;
    let base = match base.as_str() {
        "SHIFT" => 'S',
        "CTRL" => 'C',
        "ALT" => 'A',
        "CMD" | "GUI" => 'G',
        _ => return None,
    };
    Some(format!("{side}{base}"))
}

/// Modifier keycode (`LSHFT`, `RGUI`, ...) for an IR modifier name.
fn modifier_keycode(name: &str) -> Option<String> {
    let (side, base) = split_modifier(name)?;
    let base = match base.as_str() {
        "SHIFT" => "SHFT",
        "CTRL" => "CTRL",
        "ALT" => "ALT",
        "CMD" | "GUI" => "GUI",
        _ => return None,
    };
    Some(format!("{side}{base}"))
}

fn split_modifier(name: &str) -> Option<(char, String)> {
    match name.chars().next()? {
        'r' | 'R' if name.len() > 3 => Some(('R', name[1..].to_uppercase())),
        'l' | 'L' if name.len() > 3 => Some(('L', name[1..].to_uppercase())),
        _ => Some(('L', name.to_uppercase())),
    }
}

pub struct ZmkTranslator {
    keycodes: ZmkKeycodes,
    aliases: AliasResolver,
    translations: BTreeMap<String, ZmkBinding>,
    bt_re: Regex,
    os: String,
}

impl ZmkTranslator {
    pub fn new(os: &str) -> Result<Self> {
        Ok(Self {
            keycodes: ZmkKeycodes::load()?,
            aliases: AliasResolver::new(),
            translations: BTreeMap::new(),
            bt_re: Regex::new(r"^(?i)bt(\d)$").context("bluetooth pattern")?,
            os: os.to_string(),
        })
    }

    /// Per-keymap overrides consulted before the keycode database.
    pub fn with_translations(mut self, translations: BTreeMap<String, ZmkBinding>) -> Self {
        self.translations = translations;
        self
    }

    /// Default two-character shift pairs: the cell names the tap value and
    /// the value typed under shift. `'"` is the stock quote key already; the
    /// rest become mod-morphs.
    pub fn with_default_shift_pairs(self) -> Result<Self> {
        let translations = BTreeMap::from([
            ("'\"".to_string(), ZmkBinding::kp("SQT")),
            (
                ",;".to_string(),
                ZmkBinding::shift_morph(&ZmkBinding::kp("COMMA"), &ZmkBinding::kp("SEMI"))?,
            ),
            (
                ".?".to_string(),
                ZmkBinding::shift_morph(&ZmkBinding::kp("DOT"), &ZmkBinding::kp("QMARK"))?,
            ),
            (
                "/\\".to_string(),
                ZmkBinding::shift_morph(&ZmkBinding::kp("FSLH"), &ZmkBinding::kp("BSLH"))?,
            ),
        ]);
        Ok(self.with_translations(translations))
    }

    pub fn aliases_mut(&mut self) -> &mut AliasResolver {
        &mut self.aliases
    }

    fn resolve_tap(&self, name: &str) -> ZmkBinding {
        let resolved = self.aliases.resolve(name);
        match resolved.to_lowercase().as_str() {
            "bootloader" => return ZmkBinding::bootloader(),
            "reset" => return ZmkBinding::new("&sys_reset", Vec::new()),
            "btclr" => return ZmkBinding::new("&bt", vec!["BT_CLR".to_string()]),
            _ => {}
        }
        if let Some(caps) = self.bt_re.captures(&resolved) {
            let index = caps[1].parse().unwrap_or(0);
            return ZmkBinding::bt_select(index);
        }

        let (mods, rest) = split_mods(&resolved);
        let rest = self.aliases.resolve(&rest);
        if let Some(code) = self.keycodes.lookup(&rest) {
            let mut code = code.clone();
            for m in mods.iter().rev() {
                if let Some(f) = modifier_fn(m) {
                    code = format!("{f}({code})");
                }
            }
            return ZmkBinding::kp(code);
        }

        if let Some(c) = single_unicode_char(&rest) {
            if let Some(binding) = ZmkBinding::unicode_macro(&self.os, c) {
                return binding;
            }
            warn!(key = %name, os = %self.os, "no unicode input method for this OS, emitting &none");
            return ZmkBinding::none();
        }

        warn!(key = %name, "no ZMK keycode found, emitting &none");
        ZmkBinding::none()
    }
}

fn single_unicode_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_ascii() => Some(c),
        _ => None,
    }
}

impl Translator for ZmkTranslator {
    type Binding = ZmkBinding;

    fn translate(&self, key: &Key) -> Result<ZmkBinding> {
        if let Some(binding) = key.tap.as_ref().and_then(|t| self.translations.get(t)) {
            if key.hold.is_none() {
                return Ok(binding.clone());
            }
        }

        match (&key.tap, &key.hold) {
            (None, None) => Ok(ZmkBinding::none()),
            (Some(tap), None) => {
                if let Some(layer) = tap.strip_prefix('@').filter(|l| !l.is_empty()) {
                    return Ok(ZmkBinding::to(layer));
                }
                Ok(self.resolve_tap(tap))
            }
            (None, Some(HoldAction::Layer(layer))) => Ok(ZmkBinding::mo(layer)),
            (Some(tap), Some(HoldAction::Layer(layer))) => {
                let tap_binding = self.resolve_tap(tap);
                if tap_binding == ZmkBinding::none() {
                    warn!(key = %tap, layer = %layer, "unknown tap on layer-tap, using momentary");
                    return Ok(ZmkBinding::mo(layer));
                }
                ZmkBinding::lt(layer, &tap_binding)
            }
            (None, Some(HoldAction::Modifier(m))) => {
                let code = modifier_keycode(m)
                    .with_context(|| format!("unknown modifier: {m:?}"))?;
                Ok(ZmkBinding::kp(code))
            }
            (Some(tap), Some(HoldAction::Modifier(m))) => {
                let code = modifier_keycode(m)
                    .with_context(|| format!("unknown modifier: {m:?}"))?;
                ZmkBinding::hrm(code, &self.resolve_tap(tap))
            }
        }
    }

    fn replace_layer_ids(&self, binding: &mut ZmkBinding, renames: &BTreeMap<String, String>) {
        if !matches!(binding.behavior.as_str(), "&mo" | "&to" | "&lt" | "&tog") {
            return;
        }
        if let Some(layer) = binding.params.first_mut() {
            if let Some(new_name) = renames.get(layer) {
                *layer = new_name.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> ZmkTranslator {
        ZmkTranslator::new("mac").unwrap()
    }

    #[test]
    fn test_plain_keys() {
        let t = translator();
        assert_eq!(t.translate(&Key::tap_only("a")).unwrap().to_string(), "&kp A");
        assert_eq!(t.translate(&Key::tap_only("spc")).unwrap().to_string(), "&kp SPACE");
        assert_eq!(t.translate(&Key::empty()).unwrap().to_string(), "&none");
    }

    #[test]
    fn test_modifier_combo_wraps() {
        let t = translator();
        assert_eq!(
            t.translate(&Key::tap_only("CTRL+c")).unwrap().to_string(),
            "&kp LC(C)"
        );
        assert_eq!(
            t.translate(&Key::tap_only("CMD+SHIFT+z")).unwrap().to_string(),
            "&kp LG(LS(Z))"
        );
    }

    #[test]
    fn test_layer_tap() {
        let t = translator();
        let key = Key::with_hold(Some("spc".into()), "nav", &["nav".to_string()]).unwrap();
        assert_eq!(t.translate(&key).unwrap().to_string(), "&lt nav SPACE");
    }

    #[test]
    fn test_layer_tap_with_composed_tap_is_fatal() {
        let t = translator();
        let key = Key::with_hold(Some("CTRL+c".into()), "nav", &["nav".to_string()]).unwrap();
        assert!(t.translate(&key).is_err());
    }

    #[test]
    fn test_mod_tap_with_composed_tap_is_fatal() {
        let t = translator();
        let key = Key::with_hold(Some("CMD+z".into()), "SHIFT", &[]).unwrap();
        assert!(t.translate(&key).is_err());
    }

    #[test]
    fn test_hold_without_tap() {
        let t = translator();
        let key = Key::with_hold(None, "nav", &["nav".to_string()]).unwrap();
        assert_eq!(t.translate(&key).unwrap().to_string(), "&mo nav");

        let key = Key::with_hold(None, "SHIFT", &[]).unwrap();
        assert_eq!(t.translate(&key).unwrap().to_string(), "&kp LSHFT");
    }

    #[test]
    fn test_home_row_mod_carries_node() {
        let t = translator();
        let key = Key::with_hold(Some("a".into()), "CMD", &[]).unwrap();
        let binding = t.translate(&key).unwrap();
        assert_eq!(binding.to_string(), "&hrm LGUI A");
        assert_eq!(binding.behavior_nodes.len(), 1);
        assert!(binding.behavior_nodes[0]
            .format()
            .contains("zmk,behavior-hold-tap"));
    }

    #[test]
    fn test_layer_switch_tap() {
        let t = translator();
        assert_eq!(
            t.translate(&Key::tap_only("@base_mac")).unwrap().to_string(),
            "&to base_mac"
        );
        assert_eq!(t.translate(&Key::tap_only("@")).unwrap().to_string(), "&kp AT");
    }

    #[test]
    fn test_special_taps() {
        let t = translator();
        let boot = t.translate(&Key::tap_only("bootloader")).unwrap();
        assert_eq!(boot.to_string(), "&boot_td");
        assert!(boot.behavior_nodes[0]
            .format()
            .contains("zmk,behavior-tap-dance"));

        let bt = t.translate(&Key::tap_only("bt2")).unwrap();
        assert_eq!(bt.to_string(), "&bt_td_2");
        assert!(bt.behavior_nodes[0]
            .format()
            .contains("<&bt BT_SEL 2>, <&bt BT_CLR>"));

        assert_eq!(
            t.translate(&Key::tap_only("btclr")).unwrap().to_string(),
            "&bt BT_CLR"
        );
    }

    #[test]
    fn test_unknown_key_degrades_to_none() {
        let t = translator();
        assert_eq!(
            t.translate(&Key::tap_only("definitely_not_a_key")).unwrap().to_string(),
            "&none"
        );
    }

    #[test]
    fn test_unicode_macro_per_os() {
        let mac = translator().translate(&Key::tap_only("é")).unwrap();
        assert_eq!(mac.to_string(), "&uc_00e9_mac");
        assert!(mac.behavior_nodes[0].format().contains("&macro_press &kp LALT"));

        let linux = ZmkTranslator::new("linux")
            .unwrap()
            .translate(&Key::tap_only("é"))
            .unwrap();
        assert_eq!(linux.to_string(), "&uc_00e9_linux");
        assert!(linux.behavior_nodes[0].format().contains("LC(LS(U))"));
    }

    #[test]
    fn test_default_shift_pairs() {
        let t = translator().with_default_shift_pairs().unwrap();
        let binding = t.translate(&Key::tap_only(",;")).unwrap();
        assert_eq!(binding.to_string(), "&morph_comma_semi");

        let binding = t.translate(&Key::tap_only("'\"")).unwrap();
        assert_eq!(binding.to_string(), "&kp SQT");
    }

    #[test]
    fn test_shift_morph() {
        let morph =
            ZmkBinding::shift_morph(&ZmkBinding::kp("COMMA"), &ZmkBinding::kp("SEMI")).unwrap();
        assert_eq!(morph.to_string(), "&morph_comma_semi");
        let node = morph.behavior_nodes[0].format();
        assert!(node.contains("zmk,behavior-mod-morph"));
        assert!(node.contains("<&kp COMMA>, <&kp SEMI>"));
    }

    #[test]
    fn test_replace_layer_ids_only_touches_layer_params() {
        let t = translator();
        let renames = BTreeMap::from([("nav".to_string(), "nav_mw".to_string())]);

        let mut binding = ZmkBinding::mo("nav");
        t.replace_layer_ids(&mut binding, &renames);
        assert_eq!(binding.to_string(), "&mo nav_mw");

        // A keycode that happens to spell a layer name stays put.
        let mut binding = ZmkBinding::kp("nav");
        t.replace_layer_ids(&mut binding, &renames);
        assert_eq!(binding.to_string(), "&kp nav");
    }
}
