//! Code for element tensors computed as contractions of reference tensors with
//! geometry tensors, $A_i = \sum_t \sum_a A^{0,t}_{ia} G^t_a$.
use crate::code::{CodeNode, Declaration};
use crate::error::FormCompilerError;
use crate::geometry::{transform_name, CellShape, SCALE_FACTOR};
use crate::parameters::{format_float, FormCompilerParameters};
use crate::representation::{index_tuples, CoefficientOp, GeometryFactor, IntegralKind, Term};
use fenris_crs::{Crs, CrsError};
use itertools::Itertools;
use log::{debug, warn};
use std::collections::BTreeSet;

pub fn geometry_tensor_name(term: usize, secondary: &[usize]) -> String {
    let mut name = format!("G{}", term);
    for a in secondary {
        name.push_str(&format!("_{}", a));
    }
    name
}

/// Name of a coefficient value after its operations have been applied.
///
/// `factor` counts geometry factors across all terms, `position` is the position of the
/// coefficient in its geometry factor and `dof` the local dof of the coefficient.
pub fn coefficient_name(number: usize, factor: usize, position: usize, dof: usize) -> String {
    format!("c{}_{}_{}_{}", number, factor, position, dof)
}

/// Element tensor assignments for a single case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementTensor {
    pub code: Vec<CodeNode>,
    /// Geometry tensor names referenced by the assignments.
    pub geometry_set: BTreeSet<String>,
    pub num_operations: usize,
    pub num_dropped: usize,
}

fn element_tensor_size(terms: &[Term]) -> usize {
    terms
        .first()
        .map(|term| term.reference.primary().iter().map(|index| index.range()).product())
        .unwrap_or(0)
}

/// Contracts the reference tensors of the terms with their geometry tensors.
///
/// Reference values with magnitude at or below `epsilon` are dropped and counted.
pub fn generate_element_tensor(
    terms: &[Term],
    epsilon: f64,
    precision: Option<usize>,
) -> Result<ElementTensor, FormCompilerError> {
    assert!(!terms.is_empty(), "Element tensor requires at least one term.");
    let primary = terms[0].reference.primary();
    assert!(
        terms.iter().all(|term| term.reference.primary() == primary),
        "All terms must have the same primary indices."
    );
    let primary_tuples = index_tuples(primary)?;
    let secondary_tuples = terms
        .iter()
        .map(|term| index_tuples(term.reference.secondary()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut code = Vec::with_capacity(primary_tuples.len());
    let mut geometry_set = BTreeSet::new();
    let mut num_operations = 0;
    let mut num_dropped = 0;
    for (k, i) in primary_tuples.iter().enumerate() {
        let mut value: Option<String> = None;
        for (t, (term, secondary)) in terms.iter().zip(&secondary_tuples).enumerate() {
            for a in secondary.iter() {
                let a0 = term.reference.value(i, a);
                if a0.abs() <= epsilon {
                    num_dropped += 1;
                    continue;
                }
                let gk = geometry_tensor_name(t, a);
                value = Some(match value {
                    None => format!("{}*{}", format_float(a0, precision), gk),
                    Some(sum) if a0 < 0.0 => format!("{} - {}*{}", sum, format_float(-a0, precision), gk),
                    Some(sum) => format!("{} + {}*{}", sum, format_float(a0, precision), gk),
                });
                geometry_set.insert(gk);
                num_operations += 1;
            }
        }
        let value = value.unwrap_or_else(|| format_float(0.0, precision));
        code.push(CodeNode::line(format!("A[{}] = {};", k, value)));
    }

    Ok(ElementTensor {
        code,
        geometry_set,
        num_operations,
        num_dropped,
    })
}

/// Assigns zero to every entry of the element tensor.
pub fn zero_element_tensor(size: usize, precision: Option<usize>) -> Vec<CodeNode> {
    (0..size)
        .map(|k| CodeNode::line(format!("A[{}] = {};", k, format_float(0.0, precision))))
        .collect()
}

struct GeometryEntry {
    value: String,
    coefficients: BTreeSet<String>,
    transforms: BTreeSet<String>,
    num_operations: usize,
}

/// Entry of a single geometry factor for the given secondary index tuple.
fn generate_entry(
    factor: &GeometryFactor,
    secondary: &[usize],
    factor_number: usize,
) -> Result<GeometryEntry, FormCompilerError> {
    let mut entry = GeometryEntry {
        value: String::new(),
        coefficients: BTreeSet::new(),
        transforms: BTreeSet::new(),
        num_operations: 0,
    };

    let factor_names = |entry: &mut GeometryEntry, auxiliary: Option<&[usize]>| {
        let aux = auxiliary.unwrap_or(&[]);
        let mut names = Vec::new();
        for (k, coefficient) in factor.coefficients.iter().enumerate() {
            if coefficient.index.is_auxiliary() == auxiliary.is_some() {
                let dof = coefficient.index.evaluate(secondary, aux);
                let name = coefficient_name(coefficient.number, factor_number, k, dof);
                entry.coefficients.insert(name.clone());
                names.push(name);
            }
        }
        for transform in &factor.transforms {
            if transform.involves_auxiliary() == auxiliary.is_some() {
                let name = transform_name(
                    transform.kind,
                    transform.index0.evaluate(secondary, aux),
                    transform.index1.evaluate(secondary, aux),
                    transform.restriction,
                );
                entry.transforms.insert(name.clone());
                names.push(name);
            }
        }
        names
    };

    let mut parts = Vec::new();
    let outer = factor_names(&mut entry, None);
    if !outer.is_empty() {
        entry.num_operations += outer.len() - 1;
        parts.push(outer.join("*"));
    }

    let mut inner = Vec::new();
    for b in index_tuples(&factor.auxiliary)?.iter() {
        let names = factor_names(&mut entry, Some(b));
        if !names.is_empty() {
            entry.num_operations += names.len() - 1;
            inner.push(names.join("*"));
        }
    }
    match inner.len() {
        0 => {}
        1 => parts.extend(inner),
        n => {
            entry.num_operations += n - 1;
            parts.push(format!("({})", inner.join(" + ")));
        }
    }

    entry.value = if parts.is_empty() {
        "1.0".to_string()
    } else {
        entry.num_operations += parts.len() - 1;
        parts.join("*")
    };
    Ok(entry)
}

fn multiply_by_scale_factor(value: &str, is_sum: bool) -> String {
    if value == "1.0" {
        SCALE_FACTOR.to_string()
    } else if is_sum {
        format!("{}*({})", SCALE_FACTOR, value)
    } else {
        format!("{}*{}", SCALE_FACTOR, value)
    }
}

/// Declarations of the geometry tensors named in `geometry_set`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeometryTensors {
    pub declarations: Vec<Declaration>,
    /// Modified coefficient names the declarations refer to.
    pub coefficients: BTreeSet<String>,
    /// Jacobian and inverse Jacobian entries the declarations refer to.
    pub transforms: BTreeSet<String>,
    pub num_operations: usize,
}

pub fn generate_geometry_tensors(
    terms: &[Term],
    geometry_set: &BTreeSet<String>,
) -> Result<GeometryTensors, FormCompilerError> {
    let mut tensors = GeometryTensors::default();
    let mut factor_offset = 0;
    for (t, term) in terms.iter().enumerate() {
        for a in index_tuples(term.reference.secondary())?.iter() {
            let name = geometry_tensor_name(t, a);
            if !geometry_set.contains(&name) {
                continue;
            }
            let mut values = Vec::with_capacity(term.geometry.len());
            for (j, factor) in term.geometry.iter().enumerate() {
                let entry = generate_entry(factor, a, factor_offset + j)?;
                tensors.num_operations += entry.num_operations;
                tensors.coefficients.extend(entry.coefficients);
                tensors.transforms.extend(entry.transforms);
                values.push(entry.value);
            }
            let value = match values.len() {
                0 => "1.0".to_string(),
                1 => values.remove(0),
                n => {
                    tensors.num_operations += n - 1;
                    values.join(" + ")
                }
            };
            let value = multiply_by_scale_factor(&value, term.geometry.len() > 1);
            tensors.num_operations += 1;
            tensors.declarations.push(Declaration::new(name, value));
        }
        factor_offset += term.geometry.len();
    }
    Ok(tensors)
}

fn apply_coefficient_op(op: CoefficientOp, value: &str) -> String {
    match op {
        CoefficientOp::Inverse => format!("1.0/({})", value),
        CoefficientOp::Modulus => format!("std::abs({})", value),
        CoefficientOp::Sqrt => format!("std::sqrt({})", value),
    }
}

/// Declarations of the modified coefficient values named in `coefficients`.
///
/// Coefficients of interior facet integrals have dofs on both adjacent cells.
pub fn generate_coefficient_declarations(
    terms: &[Term],
    coefficients: &BTreeSet<String>,
    kind: IntegralKind,
) -> Vec<Declaration> {
    let mut declarations = Vec::new();
    let mut factor_offset = 0;
    for term in terms {
        for (j, factor) in term.geometry.iter().enumerate() {
            for (k, coefficient) in factor.coefficients.iter().enumerate() {
                let space_dimension = match kind {
                    IntegralKind::InteriorFacet => 2 * coefficient.space_dimension,
                    _ => coefficient.space_dimension,
                };
                for l in 0..space_dimension {
                    let name = coefficient_name(coefficient.number, factor_offset + j, k, l);
                    if !coefficients.contains(&name) {
                        continue;
                    }
                    let value = coefficient
                        .ops
                        .iter()
                        .rev()
                        .fold(format!("w[{}][{}]", coefficient.number, l), |value, &op| {
                            apply_coefficient_op(op, &value)
                        });
                    declarations.push(Declaration::new(name, value));
                }
            }
        }
        factor_offset += term.geometry.len();
    }
    declarations
}

/// Tensor representation code of an integral, with declarations shared by all cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorCode {
    pub coefficient_declarations: Vec<Declaration>,
    pub geometry_declarations: Vec<Declaration>,
    /// Element tensor assignments, wrapped in switches over the local facets of facet integrals.
    pub element_tensor: Vec<CodeNode>,
    pub transforms: BTreeSet<String>,
    pub num_operations: usize,
    pub num_dropped: usize,
    /// Whether no case refers to a geometry tensor, so that the scale factor is unused.
    pub is_zero: bool,
}

fn switch(variable: &str, cases: Vec<Vec<CodeNode>>) -> Vec<CodeNode> {
    let mut body = Vec::new();
    for (i, case) in cases.into_iter().enumerate() {
        body.push(CodeNode::line(format!("case {}:", i)));
        body.push(CodeNode::Indented(vec![CodeNode::Block(case), CodeNode::line("break;")]));
    }
    vec![CodeNode::line(format!("switch ({})", variable)), CodeNode::Block(body)]
}

/// Number of cases of an integral of the given kind: one per cell, local facet or ordered
/// pair of local facets.
pub fn num_cases(kind: IntegralKind, cell: CellShape) -> usize {
    let num_facets = cell.num_facets();
    match kind {
        IntegralKind::Cell => 1,
        IntegralKind::ExteriorFacet => num_facets,
        IntegralKind::InteriorFacet => num_facets * num_facets,
    }
}

/// Generates tensor representation code for the terms of an integral.
///
/// `terms` holds one row of terms per case, see [`num_cases`]. An empty storage means that
/// the integral vanishes. Declarations are generated from the first non-vanishing case and
/// shared by all cases. The operation count is the maximum over the cases.
pub fn generate_tensor_code(
    kind: IntegralKind,
    cell: CellShape,
    terms: &Crs<Term>,
    tensor_size: usize,
    parameters: &FormCompilerParameters,
) -> Result<TensorCode, FormCompilerError> {
    let precision = parameters.precision;
    let num_cases = num_cases(kind, cell);
    if terms.len() > num_cases {
        return Err(CrsError::IndexOutOfRange {
            index: terms.len() - 1,
            len: num_cases,
        }
        .into());
    }
    let cases: Vec<&[Term]> = if terms.is_empty() {
        vec![&[][..]; num_cases]
    } else {
        (0..num_cases)
            .map(|i| terms.row(i))
            .collect::<Result<_, _>>()?
    };

    let mut tensors = Vec::with_capacity(num_cases);
    for (i, case) in cases.iter().enumerate() {
        if case.is_empty() {
            tensors.push(None);
            continue;
        }
        assert_eq!(
            element_tensor_size(case),
            tensor_size,
            "Primary indices of the terms must match the element tensor size."
        );
        let tensor = generate_element_tensor(case, parameters.epsilon, precision)?;
        debug!(
            "{} integral case {}: {} operations, {} dropped reference values.",
            kind, i, tensor.num_operations, tensor.num_dropped
        );
        if tensor.geometry_set.is_empty() {
            warn!(
                "All {} reference values of {} integral case {} are below {:e}.",
                tensor.num_dropped, kind, i, parameters.epsilon
            );
        }
        tensors.push(Some(tensor));
    }

    let first = match tensors.iter().position(Option::is_some) {
        Some(first) => first,
        None => {
            return Ok(TensorCode {
                coefficient_declarations: Vec::new(),
                geometry_declarations: Vec::new(),
                element_tensor: zero_element_tensor(tensor_size, precision),
                transforms: BTreeSet::new(),
                num_operations: 0,
                num_dropped: 0,
                is_zero: true,
            });
        }
    };

    let geometry_set: BTreeSet<String> = tensors
        .iter()
        .flatten()
        .flat_map(|tensor| tensor.geometry_set.iter().cloned())
        .collect();
    let geometry = generate_geometry_tensors(cases[first], &geometry_set)?;
    let coefficient_declarations = generate_coefficient_declarations(cases[first], &geometry.coefficients, kind);

    let tensor_operations = tensors
        .iter()
        .flatten()
        .map(|tensor| tensor.num_operations)
        .max()
        .unwrap_or(0);
    let num_dropped = tensors.iter().flatten().map(|tensor| tensor.num_dropped).sum();
    let mut case_code = tensors
        .into_iter()
        .map(|tensor| match tensor {
            Some(tensor) => tensor.code,
            None => zero_element_tensor(tensor_size, precision),
        })
        .collect_vec();

    let element_tensor = match kind {
        IntegralKind::Cell => case_code.remove(0),
        IntegralKind::ExteriorFacet => switch("facet", case_code),
        IntegralKind::InteriorFacet => {
            let num_facets = cell.num_facets();
            let mut rows = Vec::with_capacity(num_facets);
            let mut cases = case_code.into_iter();
            for _ in 0..num_facets {
                rows.push(switch("facet_1", cases.by_ref().take(num_facets).collect()));
            }
            switch("facet_0", rows)
        }
    };

    Ok(TensorCode {
        coefficient_declarations,
        geometry_declarations: geometry.declarations,
        element_tensor,
        transforms: geometry.transforms,
        num_operations: tensor_operations + geometry.num_operations,
        num_dropped,
        is_zero: geometry_set.is_empty(),
    })
}
