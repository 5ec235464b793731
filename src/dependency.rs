//! Records which terminal accesses the formatted expressions depend on.
use crate::expr::Terminal;
use crate::representation::Restriction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A terminal together with the way it is accessed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TerminalKey {
    pub terminal: Terminal,
    pub component: Vec<usize>,
    /// Sorted derivative directions.
    pub derivatives: Vec<usize>,
    pub restriction: Option<Restriction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Name of the generated variable or table access.
    pub name: String,
    /// Whether the table backing this access must keep its full width.
    pub preserved: bool,
}

/// Accumulates dependencies of a single compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyHandler {
    records: BTreeMap<TerminalKey, DependencyRecord>,
    geometry: BTreeSet<String>,
}

impl DependencyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the access of a terminal under the given generated name.
    ///
    /// The first name recorded for a key wins. Undifferentiated arguments are preserved,
    /// since their tables are indexed directly by the argument loop variables.
    pub fn require(
        &mut self,
        terminal: &Terminal,
        component: &[usize],
        derivatives: &[usize],
        restriction: Option<Restriction>,
        generated_name: &str,
    ) {
        let preserved = matches!(terminal, Terminal::Argument { .. }) && derivatives.is_empty();
        let key = TerminalKey {
            terminal: terminal.clone(),
            component: component.to_vec(),
            derivatives: derivatives.to_vec(),
            restriction,
        };
        self.records
            .entry(key)
            .or_insert_with(|| DependencyRecord {
                name: generated_name.to_string(),
                preserved,
            });
    }

    /// Records a geometric quantity referenced by generated code that is not a terminal,
    /// such as the Jacobian entries of a Piola mapping.
    pub fn require_geometry(&mut self, name: &str) {
        self.geometry.insert(name.to_string());
    }

    pub fn records(&self) -> &BTreeMap<TerminalKey, DependencyRecord> {
        &self.records
    }

    pub fn get(&self, key: &TerminalKey) -> Option<&DependencyRecord> {
        self.records.get(key)
    }

    pub fn is_preserved(&self, name: &str) -> bool {
        self.records
            .values()
            .any(|record| record.preserved && record.name == name)
    }

    /// Names of all geometric quantities referenced so far.
    pub fn geometric_names(&self) -> BTreeSet<String> {
        let terminals = self
            .records
            .iter()
            .filter(|(key, _)| {
                matches!(
                    key.terminal,
                    Terminal::GeometricQuantity { .. } | Terminal::FacetArea
                )
            })
            .map(|(_, record)| record.name.clone());
        self.geometry.iter().cloned().chain(terminals).collect()
    }
}
