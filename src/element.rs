//! Metadata of the finite elements referenced by a form.
use crate::error::FormCompilerError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

/// How reference values of an element are mapped to physical values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingKind {
    Affine,
    ContravariantPiola,
    CovariantPiola,
    DoubleCovariantPiola,
    DoubleContravariantPiola,
}

impl FromStr for MappingKind {
    type Err = FormCompilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "affine" => Ok(MappingKind::Affine),
            "contravariant piola" => Ok(MappingKind::ContravariantPiola),
            "covariant piola" => Ok(MappingKind::CovariantPiola),
            "double covariant piola" => Ok(MappingKind::DoubleCovariantPiola),
            "double contravariant piola" => Ok(MappingKind::DoubleContravariantPiola),
            _ => Err(FormCompilerError::UnsupportedMapping(s.to_string())),
        }
    }
}

impl Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MappingKind::Affine => "affine",
            MappingKind::ContravariantPiola => "contravariant piola",
            MappingKind::CovariantPiola => "covariant piola",
            MappingKind::DoubleCovariantPiola => "double covariant piola",
            MappingKind::DoubleContravariantPiola => "double contravariant piola",
        };
        write!(f, "{}", name)
    }
}

/// The data the code generator needs to know about a finite element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiniteElementData {
    /// Unique signature of the element, used to number elements deterministically.
    pub signature: String,
    /// Shape of the (reference) value of a function in the element.
    pub value_shape: Vec<usize>,
    /// Value components that are identified with another component, e.g. for symmetric tensors.
    pub symmetry: Vec<(Vec<usize>, Vec<usize>)>,
    /// Name of the value mapping, e.g. `"affine"` or `"contravariant piola"`.
    pub mapping: String,
    /// Number of local degrees of freedom on a single cell.
    pub space_dimension: usize,
    /// Whether functions in the element are constant on each cell.
    pub cellwise_constant: bool,
}

impl FiniteElementData {
    /// Scalar element with affine mapping.
    pub fn scalar(signature: impl Into<String>, space_dimension: usize) -> Self {
        Self {
            signature: signature.into(),
            value_shape: Vec::new(),
            symmetry: Vec::new(),
            mapping: "affine".to_string(),
            space_dimension,
            cellwise_constant: false,
        }
    }

    /// Vector element of the given value dimension with affine mapping.
    pub fn vector(signature: impl Into<String>, dim: usize, space_dimension: usize) -> Self {
        Self {
            value_shape: vec![dim],
            ..Self::scalar(signature, space_dimension)
        }
    }

    pub fn with_mapping(self, mapping: impl Into<String>) -> Self {
        Self {
            mapping: mapping.into(),
            ..self
        }
    }

    pub fn with_cellwise_constant(self, cellwise_constant: bool) -> Self {
        Self {
            cellwise_constant,
            ..self
        }
    }

    pub fn mapping_kind(&self) -> Result<MappingKind, FormCompilerError> {
        self.mapping.parse()
    }

    /// Number of distinct value components after applying the symmetry mapping.
    pub fn num_flat_components(&self) -> usize {
        component_numbering(&self.value_shape, &self.symmetry).1
    }

    pub fn flatten_component(&self, component: &[usize]) -> Result<usize, FormCompilerError> {
        flatten_component(component, &self.value_shape, &self.symmetry)
    }
}

/// Numbers the components of a value shape in row-major order.
///
/// Components mapped by `symmetry` share the number of their target component. Returns the
/// numbering and the number of distinct components.
pub fn component_numbering(
    shape: &[usize],
    symmetry: &[(Vec<usize>, Vec<usize>)],
) -> (BTreeMap<Vec<usize>, usize>, usize) {
    let symmetry: BTreeMap<_, _> = symmetry.iter().cloned().collect();
    let mut numbering = BTreeMap::new();
    let mut count = 0;
    let components: Vec<Vec<usize>> = if shape.is_empty() {
        vec![Vec::new()]
    } else {
        shape
            .iter()
            .map(|&extent| 0..extent)
            .multi_cartesian_product()
            .collect()
    };
    for component in components {
        let mapped = symmetry
            .get(&component)
            .and_then(|target| numbering.get(target))
            .copied();
        let number = mapped.unwrap_or_else(|| {
            count += 1;
            count - 1
        });
        numbering.insert(component, number);
    }
    (numbering, count)
}

/// Flat component number of a value component, respecting the symmetry mapping.
pub fn flatten_component(
    component: &[usize],
    shape: &[usize],
    symmetry: &[(Vec<usize>, Vec<usize>)],
) -> Result<usize, FormCompilerError> {
    let (numbering, _) = component_numbering(shape, symmetry);
    numbering.get(component).copied().ok_or_else(|| {
        FormCompilerError::UnsupportedNesting(format!(
            "component {:?} is not a component of value shape {:?}",
            component, shape
        ))
    })
}

/// Maps element ids to counters that depend only on the element signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementCounterMap {
    counters: Vec<usize>,
}

impl ElementCounterMap {
    /// Counts elements in sorted order of their unique signatures.
    pub fn new(elements: &[FiniteElementData]) -> Self {
        let signatures: Vec<&str> = elements
            .iter()
            .map(|element| element.signature.as_str())
            .sorted()
            .dedup()
            .collect();
        let counters = elements
            .iter()
            .map(|element| {
                signatures
                    .binary_search(&element.signature.as_str())
                    .expect("Signature is always present in the sorted list of signatures")
            })
            .collect();
        Self { counters }
    }

    pub fn counter(&self, element: usize) -> usize {
        self.counters[element]
    }
}
