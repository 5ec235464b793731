//! Factorized tensor representation of integrals: indices, geometry factors and reference tensors.
//!
//! The element tensor of a term is the contraction
//! $A_i = \sum_a A^0_{ia} G_a$ of a reference tensor $A^0$ over the reference cell
//! with a geometry tensor $G$ built from coefficients and transforms of the physical cell.
use crate::error::FormCompilerError;
use fenris_crs::Crs;
use itertools::Itertools;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;

/// The kinds of integrals a form can contain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntegralKind {
    Cell,
    ExteriorFacet,
    InteriorFacet,
}

impl Display for IntegralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegralKind::Cell => write!(f, "cell"),
            IntegralKind::ExteriorFacet => write!(f, "exterior_facet"),
            IntegralKind::InteriorFacet => write!(f, "interior_facet"),
        }
    }
}

/// Side of an interior facet a quantity is evaluated on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Restriction {
    /// The `"+"` side.
    Positive,
    /// The `"-"` side.
    Negative,
}

impl Restriction {
    /// Index of the adjacent cell (0 for `"+"`, 1 for `"-"`).
    pub fn side(&self) -> usize {
        match self {
            Restriction::Positive => 0,
            Restriction::Negative => 1,
        }
    }
}

impl Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Restriction::Positive => write!(f, "+"),
            Restriction::Negative => write!(f, "-"),
        }
    }
}

/// Postfix appended to generated variable names for the given restriction.
pub fn restriction_postfix(restriction: Option<Restriction>) -> String {
    restriction
        .map(|r| format!("_{}", r.side()))
        .unwrap_or_default()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Ranges over local degrees of freedom and determines the shape of the element tensor.
    Primary,
    /// Internal summation index contracted in the geometry tensor.
    Secondary,
    /// Contraction index introduced by expanding a coefficient.
    Auxiliary,
}

/// An integer range variable of fixed size.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    kind: IndexKind,
    range: usize,
}

impl Index {
    pub fn new(kind: IndexKind, range: usize) -> Self {
        Self { kind, range }
    }

    pub fn primary(range: usize) -> Self {
        Self::new(IndexKind::Primary, range)
    }

    pub fn secondary(range: usize) -> Self {
        Self::new(IndexKind::Secondary, range)
    }

    pub fn auxiliary(range: usize) -> Self {
        Self::new(IndexKind::Auxiliary, range)
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn range(&self) -> usize {
        self.range
    }
}

/// Enumerates all assignments of the given indices in row-major order, one tuple per row.
pub fn index_tuples(indices: &[Index]) -> Result<Crs<usize>, FormCompilerError> {
    let num_tuples: usize = indices.iter().map(Index::range).product();
    let mut tuples = Crs::with_capacity(num_tuples, num_tuples * indices.len());
    if indices.is_empty() {
        tuples.push_row(&[])?;
    } else {
        for tuple in indices
            .iter()
            .map(|index| 0..index.range())
            .multi_cartesian_product()
        {
            tuples.push_row(&tuple)?;
        }
    }
    Ok(tuples)
}

/// Row-major flattening of a multi-index.
pub fn flat_index(indices: &[Index], tuple: &[usize]) -> usize {
    assert_eq!(indices.len(), tuple.len(), "Multi-index must match the number of indices.");
    indices
        .iter()
        .zip(tuple)
        .fold(0, |flat, (index, &i)| flat * index.range() + i)
}

/// How a factor refers to an index value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexRef {
    Fixed(usize),
    /// Position in the secondary index tuple.
    Secondary(usize),
    /// Position in the auxiliary index tuple.
    Auxiliary(usize),
}

impl IndexRef {
    pub fn evaluate(&self, secondary: &[usize], auxiliary: &[usize]) -> usize {
        match *self {
            IndexRef::Fixed(value) => value,
            IndexRef::Secondary(position) => secondary[position],
            IndexRef::Auxiliary(position) => auxiliary[position],
        }
    }

    pub fn is_auxiliary(&self) -> bool {
        matches!(self, IndexRef::Auxiliary(_))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    /// Entry of the Jacobian $J$ of the affine map from the reference cell.
    Jacobian,
    /// Entry of the inverse Jacobian $K = J^{-1}$.
    InverseJacobian,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformFactor {
    pub kind: TransformKind,
    pub index0: IndexRef,
    pub index1: IndexRef,
    pub restriction: Option<Restriction>,
}

impl TransformFactor {
    pub fn involves_auxiliary(&self) -> bool {
        self.index0.is_auxiliary() || self.index1.is_auxiliary()
    }
}

/// Operation applied to a coefficient value before it enters the geometry tensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoefficientOp {
    Inverse,
    Modulus,
    Sqrt,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoefficientFactor {
    /// Number of the coefficient function in the form.
    pub number: usize,
    /// Expansion index of the coefficient.
    pub index: IndexRef,
    /// Dimension of the function space of the coefficient (on one cell).
    pub space_dimension: usize,
    /// Operations, outermost first.
    pub ops: Vec<CoefficientOp>,
}

/// Factor of a geometry tensor entry: a product of coefficients and transforms,
/// summed over auxiliary indices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeometryFactor {
    pub coefficients: Vec<CoefficientFactor>,
    pub transforms: Vec<TransformFactor>,
    pub auxiliary: Vec<Index>,
}

/// Reference tensor $A^0$ with one row per primary multi-index and one column per
/// secondary multi-index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTensor {
    primary: Vec<Index>,
    secondary: Vec<Index>,
    values: DMatrix<f64>,
}

impl ReferenceTensor {
    pub fn new(primary: Vec<Index>, secondary: Vec<Index>, values: DMatrix<f64>) -> Self {
        let rows: usize = primary.iter().map(Index::range).product();
        let cols: usize = secondary.iter().map(Index::range).product();
        assert_eq!(
            (values.nrows(), values.ncols()),
            (rows, cols),
            "Reference tensor values must have one row per primary and one column per secondary multi-index."
        );
        Self {
            primary,
            secondary,
            values,
        }
    }

    pub fn primary(&self) -> &[Index] {
        &self.primary
    }

    pub fn secondary(&self) -> &[Index] {
        &self.secondary
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn value(&self, primary: &[usize], secondary: &[usize]) -> f64 {
        let i = flat_index(&self.primary, primary);
        let a = flat_index(&self.secondary, secondary);
        self.values[(i, a)]
    }
}

/// A factorized monomial of the integrand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub geometry: Vec<GeometryFactor>,
    pub reference: ReferenceTensor,
}
