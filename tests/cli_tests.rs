//! CLI smoke tests against the built binary.

use std::fs;
use std::process::Command;

const DOC: &str = include_str!("fixtures/ortho.md");

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mdkeymap"))
}

#[test]
fn qmk_subcommand_writes_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let readme = dir.path().join("README.md");
    fs::write(&readme, DOC).unwrap();

    let output = bin()
        .arg(&readme)
        .args(["qmk", "--layout", "LAYOUT_ortho"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("#include QMK_KEYBOARD_H"));
    assert!(stdout.contains("LAYOUT_ortho("));
    assert!(stdout.contains("BASE_m"));
}

#[test]
fn zmk_subcommand_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let readme = dir.path().join("README.md");
    let keymap = dir.path().join("out.keymap");
    fs::write(&readme, DOC).unwrap();

    let status = bin()
        .arg(&readme)
        .args(["--output", keymap.to_str().unwrap()])
        .args(["zmk", "--transform", "ortho_transform"])
        .status()
        .unwrap();
    assert!(status.success());

    let generated = fs::read_to_string(&keymap).unwrap();
    assert!(generated.contains("#include <behaviors.dtsi>"));
    assert!(generated.contains("zmk,matrix-transform = &ortho_transform;"));
}

#[test]
fn reshape_option_retargets_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let readme = dir.path().join("README.md");
    let reshape = dir.path().join("reshape.txt");
    fs::write(&readme, DOC).unwrap();
    fs::write(&reshape, "| a | b | c | d | e |  |\n\n| e | d | c | b | a |\n").unwrap();

    let output = bin()
        .arg(&readme)
        .args(["--reshape", reshape.to_str().unwrap()])
        .arg("qmk")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let switch = stdout.find("TO(BASE_w)").unwrap();
    let a = stdout.find("LGUI_T(KC_A)").unwrap();
    assert!(switch < a, "reversed matrix should list the switch first");
}

#[test]
fn missing_layout_section_fails_with_message() {
    let dir = tempfile::tempdir().unwrap();
    let readme = dir.path().join("README.md");
    fs::write(&readme, "# Just prose, no tables\n").unwrap();

    let output = bin().arg(&readme).arg("qmk").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no layer tables"), "stderr: {stderr}");
}

#[test]
fn missing_input_file_fails() {
    let output = bin().arg("does-not-exist.md").arg("zmk").output().unwrap();
    assert!(!output.status.success());
}
