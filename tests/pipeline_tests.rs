//! End-to-end generation tests over a complete layout document.

use mdkeymap::pipeline::{generate, ReshapeSpec, Target};

const DOC: &str = include_str!("fixtures/ortho.md");

fn qmk() -> String {
    generate(
        DOC,
        &Target::Qmk {
            layout: "LAYOUT_ortho".to_string(),
        },
        None,
    )
    .unwrap()
}

fn zmk() -> String {
    generate(DOC, &Target::Zmk { transform: None }, None).unwrap()
}

#[test]
fn qmk_layer_set_after_dedup_and_shortening() {
    let out = qmk();
    // Base variants are protected per OS; the overlay layers merge because
    // they are identical once the keypad variants have merged.
    for ident in ["BASE_m", "BASE_w", "NUM_mw", "SYM_mw", "KP_mw"] {
        assert!(out.contains(ident), "missing {ident} in:\n{out}");
    }
    assert!(!out.contains("NUM_mac"), "unmerged layer leaked:\n{out}");
}

#[test]
fn qmk_os_substitutions_and_holds() {
    let out = qmk();
    // UNDO resolves differently per OS.
    assert!(out.contains("LGUI(KC_Z)"));
    assert!(out.contains("LCTL(KC_Z)"));
    // The hold-tap CMD column follows the OS table too.
    assert!(out.contains("LGUI_T(KC_A)"));
    assert!(out.contains("LCTL_T(KC_A)"));
    // Layer-taps reference the merged layer names.
    assert!(out.contains("LT(NUM_mw,KC_SPC)"));
    assert!(out.contains("LT(SYM_mw,KC_ENT)"));
}

#[test]
fn qmk_os_switch_and_path_annotations() {
    let out = qmk();
    assert!(out.contains("TO(BASE_w)"));
    // The keypad layer is reachable from both overlays via path annotations.
    assert!(out.contains("MO(KP_mw)"));
}

#[test]
fn qmk_unknown_key_degrades_to_noop() {
    // "frobnicate" is not a keycode; generation must still succeed.
    let out = qmk();
    assert!(out.contains("KC_NO"));
}

#[test]
fn zmk_layer_defines_and_bindings() {
    let out = zmk();
    assert!(out.contains("#define base_m 0"));
    assert!(out.contains("#define base_w 1"));
    for needle in [
        "#define num_mw",
        "#define sym_mw",
        "#define kp_mw",
        "&lt num_mw SPACE",
        "&lt sym_mw RET",
        "&mo kp_mw",
        "&to base_w",
        "&kp LG(Z)",
        "&kp LC(Z)",
        "&hrm LGUI A",
        "&hrm LCTRL A",
    ] {
        assert!(out.contains(needle), "missing {needle} in:\n{out}");
    }
}

#[test]
fn zmk_behavior_support() {
    let out = zmk();
    // Home-row mod node appears exactly once despite several &hrm bindings.
    assert_eq!(out.matches("hrm: hrm {").count(), 1);
    assert!(out.contains("#include <dt-bindings/zmk/keys.h>"));
    assert!(out.contains("compatible = \"zmk,keymap\";"));
}

#[test]
fn generation_is_deterministic() {
    assert_eq!(qmk(), qmk());
    assert_eq!(zmk(), zmk());
}

#[test]
fn reshape_retargets_the_matrix() {
    // Reverse the five physical positions; the OS switch key moves first.
    let spec = ReshapeSpec::parse("| a | b | c | d | e |  |\n\n| e | d | c | b | a |").unwrap();
    let out = generate(
        DOC,
        &Target::Qmk {
            layout: "LAYOUT_ortho".to_string(),
        },
        Some(&spec),
    )
    .unwrap();
    let switch = out.find("TO(BASE_w)").expect("os switch binding");
    let a = out.find("LGUI_T(KC_A)").expect("a binding");
    assert!(switch < a, "reversed matrix should list the switch first");
}

#[test]
fn void_positions_are_dropped() {
    // The last column is empty on every layer, so no binding row should
    // carry a sixth slot. The base layer has five bindings per OS.
    let out = zmk();
    let base_line = out
        .lines()
        .find(|l| l.contains("&hrm LGUI A"))
        .expect("base bindings line");
    assert_eq!(base_line.matches('&').count(), 5, "line: {base_line}");
}
