//! Renders translated layers into a QMK `keymap.c`.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt::Write as _;

use super::{layer_ident, QmkBinding};
use crate::grid::{format_boxed_table, format_table, ljust, Grid};
use crate::keymap::{Keymap, BASE_LAYER};
use crate::translate::TranslatedLayer;

/// Renders the generated `keymap.c` for `layout_name` (the `LAYOUT_...`
/// macro of the target keyboard).
pub fn emit_keymap(
    keymap: &Keymap,
    layers: &[TranslatedLayer<QmkBinding>],
    layout_name: &str,
) -> Result<String> {
    let mut out = String::new();
    out.push_str("#include QMK_KEYBOARD_H\n");
    out.push_str("// clang-format off\n\n");

    let tap_dances = collect_tap_dances(layers);
    if !tap_dances.is_empty() {
        out.push_str("enum tap_dances {\n");
        for (ident, _, _) in &tap_dances {
            let _ = writeln!(out, "    {ident},");
        }
        out.push_str("};\n\n");
    }

    out.push_str("enum layers {\n");
    for layer in layers {
        let _ = writeln!(out, "    {},", layer_ident(&layer.name));
    }
    out.push_str("};\n\n");

    out.push_str("const uint16_t PROGMEM keymaps[][MATRIX_ROWS][MATRIX_COLS] = {\n");
    let mut commented: BTreeSet<&str> = BTreeSet::new();
    for layer in layers {
        if commented.insert(&layer.source_layer) {
            out.push_str(&layer_comment(keymap, &layer.source_layer)?);
        }
        let _ = writeln!(out, "[{}] = {layout_name}(", layer_ident(&layer.name));
        out.push_str(&binding_matrix(keymap, layer)?);
        out.push_str("\n),\n");
    }
    out.push_str("};\n");

    if !tap_dances.is_empty() {
        out.push('\n');
        out.push_str(TAP_DANCE_SUPPORT);
        out.push_str("tap_dance_action_t tap_dance_actions[] = {\n");
        for (ident, tap, layer) in &tap_dances {
            let _ = writeln!(
                out,
                "    [{ident}] = ACTION_TAP_DANCE_LAYER_TAP({tap}, {}),",
                layer_ident(layer)
            );
        }
        out.push_str("};\n");
    }

    let shifts = collect_custom_shifts(layers);
    if !shifts.is_empty() {
        out.push('\n');
        let mut names = Vec::new();
        for (base, shifted) in &shifts {
            let name = format!("{}_shift_override", super::fix_c_ident(base).to_lowercase());
            let _ = writeln!(
                out,
                "const key_override_t {name} = ko_make_basic(MOD_MASK_SHIFT, {base}, {shifted});"
            );
            names.push(name);
        }
        out.push_str("\nconst key_override_t *key_overrides[] = {\n");
        for name in &names {
            let _ = writeln!(out, "    &{name},");
        }
        out.push_str("    NULL\n};\n");
    }

    let unicode_bases = collect_unicode_bases(layers);
    if !unicode_bases.is_empty() && uses_unicode(layers) {
        out.push('\n');
        out.push_str("layer_state_t layer_state_set_user(layer_state_t state) {\n");
        out.push_str("    switch (get_highest_layer(state)) {\n");
        for (name, mode) in &unicode_bases {
            let _ = writeln!(out, "        case {}:", layer_ident(name));
            let _ = writeln!(out, "            set_unicode_input_mode({mode});");
            out.push_str("            break;\n");
        }
        out.push_str("        default:\n            break;\n    }\n    return state;\n}\n");
    }

    Ok(out)
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
    let boxed = format_boxed_table(&grid, " ");

    let mut out = String::from("/*\n");
    if let Some(title) = keymap.titles.get(source_layer) {
        let _ = writeln!(out, " * {title}");
    }
    for line in boxed.lines() {
        let _ = writeln!(out, " * {}", line.trim_end());
    }
    out.push_str(" */\n");
    Ok(out)
}

/// The comma-separated binding matrix, aligned on the table's columns, with
/// the trailing comma of the last cell removed.
fn binding_matrix(keymap: &Keymap, layer: &TranslatedLayer<QmkBinding>) -> Result<String> {
    let grid = Grid::from_shape(
        keymap.table_shape.clone(),
        layer.bindings.iter().map(|b| format!("{b},")),
        String::new(),
    );
    let table = format_table(&grid, " ", "", ljust)
        .with_context(|| format!("formatting layer {:?}", layer.name))?;

    let mut rows: Vec<String> = table
        .lines()
        .map(|line| format!("    {}", line.trim_end()))
        .collect();
    if let Some(last) = rows.last_mut() {
        if let Some(i) = last.rfind(',') {
            last.remove(i);
        }
    }
    Ok(rows.join("\n"))
}

/// Distinct custom layer-taps as `(ident, tap, layer)`, in first-use order.
fn collect_tap_dances(
    layers: &[TranslatedLayer<QmkBinding>],
) -> Vec<(String, String, String)> {
    let mut dances: Vec<(String, String, String)> = Vec::new();
    for binding in layers.iter().flat_map(|l| &l.bindings) {
        if let QmkBinding::CustomLayerTap { layer, tap } = binding {
            let ident = QmkBinding::tap_dance_ident(layer, tap);
            if !dances.iter().any(|(i, _, _)| *i == ident) {
                dances.push((ident, tap.clone(), layer.clone()));
            }
        }
    }
    dances
}

fn collect_custom_shifts(layers: &[TranslatedLayer<QmkBinding>]) -> Vec<(String, String)> {
    let mut shifts: Vec<(String, String)> = Vec::new();
    for binding in layers.iter().flat_map(|l| &l.bindings) {
        if let QmkBinding::CustomShift { base, shifted } = binding {
            if !shifts.iter().any(|(b, _)| b == base) {
                shifts.push((base.clone(), shifted.clone()));
            }
        }
    }
    shifts
}

/// Base layer variants whose OS maps to a QMK unicode input mode.
fn collect_unicode_bases(layers: &[TranslatedLayer<QmkBinding>]) -> Vec<(String, &'static str)> {
    layers
        .iter()
        .filter(|l| l.source_layer == BASE_LAYER)
        .filter_map(|l| unicode_mode(&l.os).map(|mode| (l.name.clone(), mode)))
        .collect()
}

fn unicode_mode(os: &str) -> Option<&'static str> {
    match os.to_lowercase().as_str() {
        "mac" | "macos" | "osx" => Some("UNICODE_MODE_MACOS"),
        "linux" => Some("UNICODE_MODE_LINUX"),
        "win" | "windows" => Some("UNICODE_MODE_WINDOWS"),
        _ => None,
    }
}

fn uses_unicode(layers: &[TranslatedLayer<QmkBinding>]) -> bool {
    layers
        .iter()
        .flat_map(|l| &l.bindings)
        .any(|b| b.to_string().contains("UC(0x"))
}

const TAP_DANCE_SUPPORT: &str = "\
typedef struct {
    uint16_t tap;
    uint8_t layer;
} tap_dance_layer_tap_t;

static void tap_dance_layer_tap_finished(tap_dance_state_t *state, void *user_data) {
    tap_dance_layer_tap_t *lt = (tap_dance_layer_tap_t *)user_data;
    if (state->pressed && !state->interrupted) {
        layer_on(lt->layer);
    } else {
        tap_code16(lt->tap);
    }
}

static void tap_dance_layer_tap_reset(tap_dance_state_t *state, void *user_data) {
    tap_dance_layer_tap_t *lt = (tap_dance_layer_tap_t *)user_data;
    layer_off(lt->layer);
}

#define ACTION_TAP_DANCE_LAYER_TAP(kc, layer) \\
    { .fn = {NULL, tap_dance_layer_tap_finished, tap_dance_layer_tap_reset}, \\
      .user_data = (void *)&((tap_dance_layer_tap_t){kc, layer}), }

";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Shape;
    use crate::keymap::Key;
    use std::collections::BTreeMap;

    fn keymap() -> Keymap {
        let mut shape = Shape::new();
        for c in 0..2 {
            shape.insert((0, c), (1, 1));
        }
        Keymap {
            layers: vec![
                (
                    "base".to_string(),
                    vec![Key::tap_only("a"), Key::tap_only("spc")],
                ),
                (
                    "nav".to_string(),
                    vec![Key::tap_only("left"), Key::empty()],
                ),
            ],
            table_shape: shape,
            titles: BTreeMap::from([("base".to_string(), "Base".to_string())]),
        }
    }

    fn translated(name: &str, source: &str, bindings: Vec<QmkBinding>) -> TranslatedLayer<QmkBinding> {
        TranslatedLayer {
            name: name.to_string(),
            source_layer: source.to_string(),
            os: String::new(),
            bindings,
        }
    }

    #[test]
    fn test_emit_basic_keymap() {
        let layers = vec![
            translated(
                "base",
                "base",
                vec![
                    QmkBinding::Key("KC_A".into()),
                    QmkBinding::LayerTap {
                        layer: "nav".into(),
                        tap: "KC_SPC".into(),
                    },
                ],
            ),
            translated(
                "nav",
                "nav",
                vec![
                    QmkBinding::Key("KC_LEFT".into()),
                    QmkBinding::Key("KC_NO".into()),
                ],
            ),
        ];
        let out = emit_keymap(&keymap(), &layers, "LAYOUT_split_3x5_3").unwrap();

        assert!(out.contains("#include QMK_KEYBOARD_H"));
        assert!(out.contains("enum layers {\n    BASE,\n    NAV,\n};"));
        assert!(out.contains("[BASE] = LAYOUT_split_3x5_3("));
        assert!(out.contains("LT(NAV,KC_SPC)"));
        // Boxed comment shows the declared layer.
        assert!(out.contains(" * Base"));
        assert!(out.contains("┌"));
        // Last binding of a layer has no trailing comma.
        assert!(out.contains("KC_NO\n),"));
    }

    #[test]
    fn test_emit_tap_dance_support() {
        let layers = vec![translated(
            "base",
            "base",
            vec![
                QmkBinding::CustomLayerTap {
                    layer: "nav".into(),
                    tap: "LGUI(KC_C)".into(),
                },
                QmkBinding::Key("KC_A".into()),
            ],
        )];
        let out = emit_keymap(&keymap(), &layers, "LAYOUT").unwrap();
        assert!(out.contains("enum tap_dances {\n    LT_NAV_LGUI_KC_C_,\n};"));
        assert!(out.contains("[LT_NAV_LGUI_KC_C_] = ACTION_TAP_DANCE_LAYER_TAP(LGUI(KC_C), NAV),"));
        assert!(out.contains("tap_dance_layer_tap_t"));
    }

    #[test]
    fn test_emit_key_overrides() {
        let layers = vec![translated(
            "base",
            "base",
            vec![
                QmkBinding::CustomShift {
                    base: "KC_COMM".into(),
                    shifted: "KC_SCLN".into(),
                },
                QmkBinding::Key("KC_A".into()),
            ],
        )];
        let out = emit_keymap(&keymap(), &layers, "LAYOUT").unwrap();
        assert!(out.contains(
            "const key_override_t kc_comm_shift_override = ko_make_basic(MOD_MASK_SHIFT, KC_COMM, KC_SCLN);"
        ));
        assert!(out.contains("&kc_comm_shift_override,"));
    }

    #[test]
    fn test_emit_unicode_mode_switching() {
        let mut mac = translated(
            "base_m",
            "base",
            vec![
                QmkBinding::Key("UC(0x00E9)".into()),
                QmkBinding::Key("KC_A".into()),
            ],
        );
        mac.os = "mac".to_string();
        let mut win = translated(
            "base_w",
            "base",
            vec![
                QmkBinding::Key("UC(0x00E9)".into()),
                QmkBinding::Key("KC_A".into()),
            ],
        );
        win.os = "win".to_string();
        let out = emit_keymap(&keymap(), &[mac, win], "LAYOUT").unwrap();
        assert!(out.contains("case BASE_m:"));
        assert!(out.contains("set_unicode_input_mode(UNICODE_MODE_MACOS);"));
        assert!(out.contains("set_unicode_input_mode(UNICODE_MODE_WINDOWS);"));
    }
}
