//! Removal of declarations that no other line of code refers to.
use crate::code::Declaration;
use itertools::Itertools;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

fn declaration_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^\s*(?:static\s+)?(?:const\s+)?(?:double|float|int|bool|unsigned\s+int|std::size_t)\s+(?:const\s+)?([A-Za-z_]\w*)\s*(?:\[[^\]]*\]\s*)*(?:=|;)",
        )
        .expect("Declaration pattern is a valid regular expression")
    })
}

fn identifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[A-Za-z_]\w*").expect("Identifier pattern is a valid regular expression"))
}

fn strip_comment(line: &str) -> &str {
    line.split("//").next().unwrap_or("")
}

/// Repeatedly removes declarations whose variable is not mentioned on any other line,
/// until no more declarations can be removed. Comments do not count as uses.
pub fn remove_unused(code: &str) -> String {
    let lines = code.lines().collect_vec();
    let declared: BTreeMap<usize, &str> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            declaration_regex()
                .captures(line)
                .and_then(|captures| captures.get(1))
                .map(|name| (i, name.as_str()))
        })
        .collect();
    let identifiers: Vec<BTreeSet<&str>> = lines
        .iter()
        .map(|line| {
            identifier_regex()
                .find_iter(strip_comment(line))
                .map(|m| m.as_str())
                .collect()
        })
        .collect();

    let mut removed = vec![false; lines.len()];
    loop {
        let mut changed = false;
        for (&i, &name) in &declared {
            if removed[i] {
                continue;
            }
            let used = identifiers
                .iter()
                .enumerate()
                .any(|(j, names)| j != i && !removed[j] && names.contains(name));
            if !used {
                removed[i] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    lines
        .iter()
        .zip(removed)
        .filter(|(_, removed)| !removed)
        .map(|(line, _)| *line)
        .join("\n")
}

/// Renders the declarations and keeps those that are needed to compute the names in `used`.
///
/// `used` must contain every name that code following the declarations refers to.
pub fn prune_declarations(declarations: &[Declaration], used: &BTreeSet<String>) -> String {
    let synthetic = format!("A += {};", used.iter().join("*"));
    let code = declarations
        .iter()
        .map(Declaration::render)
        .chain(std::iter::once(synthetic.clone()))
        .join("\n");
    remove_unused(&code)
        .lines()
        .filter(|line| *line != synthetic)
        .join("\n")
}
