//! Numeric tables of basis function values, their naming, zero-stripping and deduplication.
use crate::code::array_declaration;
use crate::dependency::DependencyHandler;
use crate::element::{ElementCounterMap, FiniteElementData};
use crate::error::FormCompilerError;
use crate::expr::Terminal;
use crate::representation::IntegralKind;
use itertools::Itertools;
use log::debug;
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The kind of entity a table is tabulated on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Cell,
    Facet,
}

impl From<IntegralKind> for EntityKind {
    fn from(kind: IntegralKind) -> Self {
        match kind {
            IntegralKind::Cell => EntityKind::Cell,
            IntegralKind::ExteriorFacet | IntegralKind::InteriorFacet => EntityKind::Facet,
        }
    }
}

impl EntityKind {
    fn table_suffix(&self) -> &'static str {
        match self {
            EntityKind::Cell => "",
            EntityKind::Facet => "_F",
        }
    }
}

/// Identifies a table in the tabulation handed over by the basis tabulation module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey {
    pub element: usize,
    /// Flattened value component.
    pub component: usize,
    /// Number of derivatives in each spatial direction.
    pub derivatives: Vec<usize>,
    pub entity: EntityKind,
}

/// Values of basis functions, one `points x dofs` matrix per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericTable {
    entities: Vec<DMatrix<f64>>,
}

pub type Tabulation = BTreeMap<TableKey, NumericTable>;

impl NumericTable {
    /// # Panics
    ///
    /// Panics if no entity is given or if the entity matrices differ in shape.
    pub fn new(entities: Vec<DMatrix<f64>>) -> Self {
        assert!(!entities.is_empty(), "A table must have at least one entity.");
        let shape = entities[0].shape();
        assert!(
            entities.iter().all(|values| values.shape() == shape),
            "All entities of a table must have the same number of points and dofs."
        );
        Self { entities }
    }

    pub fn num_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn num_points(&self) -> usize {
        self.entities[0].nrows()
    }

    pub fn num_dofs(&self) -> usize {
        self.entities[0].ncols()
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.num_entities(), self.num_points(), self.num_dofs()]
    }

    pub fn size(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn entities(&self) -> &[DMatrix<f64>] {
        &self.entities
    }

    /// Values in `[entity][point][dof]` order.
    pub fn values(&self) -> Vec<f64> {
        self.entities
            .iter()
            .flat_map(|values| {
                (0..values.nrows()).flat_map(move |i| (0..values.ncols()).map(move |j| values[(i, j)]))
            })
            .collect()
    }

    /// Restricts the table to the dof columns `begin .. end`.
    pub fn columns(&self, begin: usize, end: usize) -> Self {
        assert!(begin <= end && end <= self.num_dofs(), "Column range out of bounds.");
        let entities = self
            .entities
            .iter()
            .map(|values| values.columns(begin, end - begin).into_owned())
            .collect();
        Self { entities }
    }

    /// Range of dof columns outside of which every entry is exactly zero.
    pub fn nonzero_column_range(&self) -> (usize, usize) {
        let is_nonzero = |j: usize| {
            self.entities
                .iter()
                .any(|values| values.column(j).iter().any(|&v| v != 0.0))
        };
        let nonzero = (0..self.num_dofs()).filter(|&j| is_nonzero(j)).collect_vec();
        match (nonzero.first(), nonzero.last()) {
            (Some(&first), Some(&last)) => (first, last + 1),
            _ => (0, 0),
        }
    }

    fn bit_key(&self) -> ([usize; 3], Vec<u64>) {
        (self.shape(), self.values().into_iter().map(f64::to_bits).collect())
    }
}

/// Removes leading and trailing dof columns that are zero for all entities and points.
pub fn strip_table_zeros(table: &NumericTable) -> (usize, usize, NumericTable) {
    let (begin, end) = table.nonzero_column_range();
    (begin, end, table.columns(begin, end))
}

/// Where the values for a table name live after deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRange {
    pub unique_name: String,
    pub begin: usize,
    pub end: usize,
}

impl TableRange {
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Name of the unstripped copy of a preserved table.
pub fn preserved_table_name(name: &str) -> String {
    format!("p{}", name)
}

/// Strips and deduplicates tables.
///
/// Tables in `preserved` keep their full width. They are additionally registered under
/// [`preserved_table_name`]. Stripped tables that are bit-for-bit identical share the storage
/// of the first of them in sorted name order. Returns the array declarations of the unique
/// tables and the location of every table name.
pub fn build_unique_tables(
    tables: &BTreeMap<String, NumericTable>,
    preserved: &BTreeSet<String>,
    precision: Option<usize>,
) -> (Vec<String>, BTreeMap<String, TableRange>) {
    let mut stripped: BTreeMap<String, (usize, usize, NumericTable)> = BTreeMap::new();
    for (name, table) in tables {
        if preserved.contains(name) {
            let full = (0, table.num_dofs(), table.clone());
            stripped.insert(preserved_table_name(name), full.clone());
            stripped.insert(name.clone(), full);
        } else {
            stripped.insert(name.clone(), strip_table_zeros(table));
        }
    }

    let mut representatives: FxHashMap<([usize; 3], Vec<u64>), String> = FxHashMap::default();
    let mut unique_tables = Vec::new();
    let mut ranges = BTreeMap::new();
    for (name, (begin, end, table)) in stripped {
        let unique_name = representatives
            .entry(table.bit_key())
            .or_insert_with(|| {
                unique_tables.push((name.clone(), table));
                name.clone()
            })
            .clone();
        ranges.insert(
            name,
            TableRange {
                unique_name,
                begin,
                end,
            },
        );
    }
    debug!(
        "Deduplicated {} table names into {} unique tables.",
        ranges.len(),
        unique_tables.len()
    );

    let declarations = unique_tables
        .iter()
        .filter(|(_, table)| table.size() > 0)
        .map(|(name, table)| array_declaration(name, &table.shape(), &table.values(), precision))
        .collect();
    (declarations, ranges)
}

/// Converts a list of derivative directions into the number of derivatives per direction.
pub fn derivative_listing_to_counts(derivatives: &[usize], gdim: usize) -> Vec<usize> {
    let mut counts = vec![0; gdim];
    for &d in derivatives {
        counts[d] += 1;
    }
    counts
}

pub fn generate_table_name(counter: usize, component: usize, derivative_counts: &[usize], entity: EntityKind) -> String {
    format!(
        "FE{}_C{}_D{}{}",
        counter,
        component,
        derivative_counts.iter().join(""),
        entity.table_suffix()
    )
}

/// Table name of a flattened component of a function in the given element.
pub fn table_name(
    counters: &ElementCounterMap,
    element: usize,
    component: usize,
    derivatives: &[usize],
    gdim: usize,
    entity: EntityKind,
) -> String {
    let counts = derivative_listing_to_counts(derivatives, gdim);
    generate_table_name(counters.counter(element), component, &counts, entity)
}

/// Tables needed by the recorded dependencies, with the names that must keep their full width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedTables {
    pub tables: BTreeMap<String, NumericTable>,
    pub preserved: BTreeSet<String>,
}

/// Looks up the tables for all argument and coefficient accesses in the handler.
///
/// Accesses that differ only in restriction share a table. Cellwise constant coefficients
/// are read from the coefficient array directly and need no table.
pub fn collect_tables(
    handler: &DependencyHandler,
    elements: &[FiniteElementData],
    counters: &ElementCounterMap,
    tabulation: &Tabulation,
    gdim: usize,
    kind: IntegralKind,
) -> Result<CollectedTables, FormCompilerError> {
    let entity = EntityKind::from(kind);
    let mut collected = CollectedTables::default();
    let mut visited = BTreeSet::new();
    for (key, record) in handler.records() {
        let element = match key.terminal {
            Terminal::Argument { element, .. } => element,
            Terminal::Coefficient { element, .. } if !elements[element].cellwise_constant => element,
            _ => continue,
        };
        if !visited.insert((&key.terminal, &key.component, &key.derivatives)) {
            continue;
        }

        let component = elements[element].flatten_component(&key.component)?;
        let name = table_name(counters, element, component, &key.derivatives, gdim, entity);
        let table_key = TableKey {
            element,
            component,
            derivatives: derivative_listing_to_counts(&key.derivatives, gdim),
            entity,
        };
        let table = tabulation
            .get(&table_key)
            .ok_or_else(|| FormCompilerError::MissingTable(name.clone()))?;
        if record.preserved {
            collected.preserved.insert(name.clone());
        }
        collected.tables.insert(name, table.clone());
    }
    Ok(collected)
}
