//! Markdown table extraction.
//!
//! Locates a heading section by a case-insensitive name pattern and
//! collects the tables found under it, in document order, as
//! `(subsection-title, grid)` pairs. This is the upstream collaborator of
//! the keymap builder: the core pipeline only ever sees the extracted
//! sequence.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;

use crate::grid::Grid;

/// Default section pattern for layer tables.
pub const LAYOUT_SECTION: &str = "layout definition";

/// Default section pattern for per-OS substitution tables.
pub const OS_SECTION: &str = "OS specific";

/// Extracts all tables under the first heading matching `section_pattern`
/// (case-insensitive substring search), paired with the nearest preceding
/// subsection title.
pub fn extract_tables(text: &str, section_pattern: &str) -> Result<Vec<(String, Grid<String>)>> {
    let section_re = Regex::new(&format!("(?i){section_pattern}"))
        .with_context(|| format!("invalid section pattern: {section_pattern:?}"))?;
    let head_re = Regex::new(r"^#+ +(.+)").expect("valid heading regex");

    let mut tables = Vec::new();
    let mut subsection = String::new();
    let mut table_lines: Vec<&str> = Vec::new();
    let mut section_depth: Option<usize> = None;

    let mut flush = |subsection: &str, table_lines: &mut Vec<&str>| -> Result<()> {
        if !table_lines.is_empty() {
            let grid = Grid::parse(&table_lines.join("\n"))
                .with_context(|| format!("parsing table under {subsection:?}"))?;
            tables.push((subsection.to_string(), grid));
            table_lines.clear();
        }
        Ok(())
    };

    for line in text.lines() {
        let depth = header_depth(line);
        match section_depth {
            None => {
                if depth > 0 && section_re.is_match(line) {
                    section_depth = Some(depth);
                }
            }
            Some(d) => {
                if depth > 0 && depth <= d {
                    break;
                }
                if let Some(caps) = head_re.captures(line) {
                    flush(&subsection, &mut table_lines)?;
                    subsection = caps[1].trim_end().to_string();
                } else if line.trim_start().starts_with('|') {
                    table_lines.push(line.trim_matches(['\t', '\r', ' ']));
                } else {
                    flush(&subsection, &mut table_lines)?;
                }
            }
        }
    }
    flush(&subsection, &mut table_lines)?;

    Ok(tables)
}

/// Extracts per-OS symbolic substitution tables from the "OS specific"
/// section: the first table row names the OSes, the first column names the
/// symbol, and each remaining cell is that OS's replacement (empty or
/// dash-only cells mean "no substitution").
pub fn extract_os_specifics(text: &str) -> Result<Vec<(String, BTreeMap<String, String>)>> {
    let mut by_os: Vec<(String, BTreeMap<String, String>)> = Vec::new();

    for (_, table) in extract_tables(text, OS_SECTION)? {
        for c in 1..table.col_count() {
            let Some(os) = table.get((0, c)).filter(|s| !s.is_empty()) else {
                continue;
            };
            let idx = match by_os.iter().position(|(name, _)| name == os) {
                Some(idx) => idx,
                None => {
                    by_os.push((os.clone(), BTreeMap::new()));
                    by_os.len() - 1
                }
            };
            let entry = &mut by_os[idx].1;
            for r in 1..table.row_count() {
                let (Some(key), Some(value)) = (table.get((r, 0)), table.get((r, c))) else {
                    continue;
                };
                if !key.is_empty() && !value.trim_matches([' ', '-']).is_empty() {
                    entry.insert(key.clone(), value.clone());
                }
            }
        }
    }

    Ok(by_os)
}

fn header_depth(line: &str) -> usize {
    let trimmed = line.trim();
    trimmed.len() - trimmed.trim_start_matches('#').len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
# My keyboard

Intro text.

## Layout definition

### Base (`base`)

| a | b |
| c | d |

### Hold-tap (`hold-tap`)

| SHIFT |  |
|       |  |

## OS specific

| code | mac     | win      |
| CMD  | LGUI    | LCTRL    |
| EMAIL| m@ex.io | w@ex.io  |
| skip | -       |          |

## Something else

| not | extracted |
";

    #[test]
    fn test_extract_tables_scoped_to_section() {
        let tables = extract_tables(DOC, LAYOUT_SECTION).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].0, "Base (`base`)");
        assert_eq!(tables[0].1.get((0, 0)).unwrap(), "a");
        assert_eq!(tables[1].0, "Hold-tap (`hold-tap`)");
    }

    #[test]
    fn test_extract_tables_case_insensitive_pattern() {
        let tables = extract_tables(DOC, "LAYOUT DEFINITION").unwrap();
        assert_eq!(tables.len(), 2);
    }

    #[test]
    fn test_extract_tables_missing_section_is_empty() {
        let tables = extract_tables(DOC, "no such section").unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn test_extract_os_specifics() {
        let os_tables = extract_os_specifics(DOC).unwrap();
        assert_eq!(os_tables.len(), 2);

        let (mac_name, mac) = &os_tables[0];
        assert_eq!(mac_name, "mac");
        assert_eq!(mac["CMD"], "LGUI");
        assert_eq!(mac["EMAIL"], "m@ex.io");
        // Dash-only cells are "no substitution".
        assert!(!mac.contains_key("skip"));

        let (win_name, win) = &os_tables[1];
        assert_eq!(win_name, "win");
        assert_eq!(win["CMD"], "LCTRL");
        assert!(!win.contains_key("skip"));
    }
}
