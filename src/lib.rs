//! Compile keyboard layouts written as markdown tables into QMK and ZMK
//! keymap sources.
//!
//! A layout document declares its layers as border-drawn tables under a
//! `Layout definition` heading, one table per layer, plus an optional
//! `OS specific` section of per-OS key substitutions. The pipeline parses
//! the tables into a spanning grid, builds a keymap IR, expands it per OS,
//! translates it into the target firmware's bindings, merges layers that
//! came out identical, and renders the final source file.

pub mod dedup;
pub mod expand;
pub mod grid;
pub mod keymap;
pub mod markdown;
pub mod pipeline;
pub mod qmk;
pub mod translate;
pub mod zmk;
