//! Declarations of geometric quantities of affine simplex cells.
use crate::code::Declaration;
use crate::element::MappingKind;
use crate::error::FormCompilerError;
use crate::representation::{restriction_postfix, IntegralKind, Restriction, TransformKind};
use eyre::eyre;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;

/// Name of the factor every element tensor entry is scaled by: the absolute Jacobian
/// determinant for cells, or the facet scaling factor for facets.
pub const SCALE_FACTOR: &str = "det";

pub const FACET_AREA: &str = "facet_area";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellShape {
    Interval,
    Triangle,
    Tetrahedron,
}

impl CellShape {
    pub fn topological_dimension(&self) -> usize {
        match self {
            CellShape::Interval => 1,
            CellShape::Triangle => 2,
            CellShape::Tetrahedron => 3,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.topological_dimension() + 1
    }

    pub fn num_facets(&self) -> usize {
        self.num_vertices()
    }
}

impl Display for CellShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellShape::Interval => write!(f, "interval"),
            CellShape::Triangle => write!(f, "triangle"),
            CellShape::Tetrahedron => write!(f, "tetrahedron"),
        }
    }
}

fn side(restriction: Option<Restriction>) -> String {
    restriction
        .map(|r| r.side().to_string())
        .unwrap_or_default()
}

/// Name of an entry of the Jacobian or its inverse, e.g. `J_01` or `K1_10`.
pub fn transform_name(kind: TransformKind, i: usize, j: usize, restriction: Option<Restriction>) -> String {
    let symbol = match kind {
        TransformKind::Jacobian => "J",
        TransformKind::InverseJacobian => "K",
    };
    format!("{}{}_{}{}", symbol, side(restriction), i, j)
}

pub fn determinant_name(restriction: Option<Restriction>) -> String {
    format!("detJ{}", side(restriction))
}

fn restrictions(kind: IntegralKind) -> Vec<Option<Restriction>> {
    match kind {
        IntegralKind::InteriorFacet => vec![Some(Restriction::Positive), Some(Restriction::Negative)],
        _ => vec![None],
    }
}

/// Declarations of the Jacobian, its determinant and inverse, and the scale factor.
///
/// Only affine simplex cells embedded in a space of the same dimension are supported.
pub fn jacobian_declarations(cell: CellShape, gdim: usize, kind: IntegralKind) -> eyre::Result<Vec<Declaration>> {
    let tdim = cell.topological_dimension();
    if gdim != tdim {
        return Err(eyre!(
            "Cells of topological dimension {} embedded in {} dimensions are not supported.",
            tdim,
            gdim
        ));
    }

    let mut declarations = Vec::new();
    for restriction in restrictions(kind) {
        let coordinates = format!("coordinate_dofs{}", restriction_postfix(restriction));
        let j = |i: usize, k: usize| transform_name(TransformKind::Jacobian, i, k, restriction);
        let det = determinant_name(restriction);

        for (r, c) in (0..gdim).cartesian_product(0..tdim) {
            let value = format!(
                "{x}[{v}] - {x}[{o}]",
                x = coordinates,
                v = (c + 1) * gdim + r,
                o = r
            );
            declarations.push(Declaration::new(j(r, c), value));
        }

        let determinant = match tdim {
            1 => j(0, 0),
            2 => format!("{}*{} - {}*{}", j(0, 0), j(1, 1), j(0, 1), j(1, 0)),
            _ => format!(
                "{}*({}) - {}*({}) + {}*({})",
                j(0, 0),
                cofactor_product(&j, 0, 0),
                j(0, 1),
                minor_product(&j, 0, 1),
                j(0, 2),
                cofactor_product(&j, 0, 2)
            ),
        };
        declarations.push(Declaration::new(det.clone(), determinant));

        for (r, c) in (0..tdim).cartesian_product(0..gdim) {
            let adjugate = match tdim {
                1 => "1.0".to_string(),
                2 => match (r, c) {
                    (0, 0) => j(1, 1),
                    (0, 1) => format!("-{}", j(0, 1)),
                    (1, 0) => format!("-{}", j(1, 0)),
                    _ => j(0, 0),
                },
                _ => format!("({})", cofactor_product(&j, c, r)),
            };
            let name = transform_name(TransformKind::InverseJacobian, r, c, restriction);
            declarations.push(Declaration::new(name, format!("{} / {}", adjugate, det)));
        }
    }

    let scaling = format!("compute_facet_scaling_factor_{}_{}d", cell, gdim);
    let facet_area = format!("compute_facet_area_{}_{}d", cell, gdim);
    match kind {
        IntegralKind::Cell => {
            declarations.push(Declaration::new(SCALE_FACTOR, format!("std::abs({})", determinant_name(None))));
        }
        IntegralKind::ExteriorFacet => {
            declarations.push(Declaration::new(SCALE_FACTOR, format!("{}(coordinate_dofs, facet)", scaling)));
            declarations.push(Declaration::new(FACET_AREA, format!("{}(coordinate_dofs, facet)", facet_area)));
        }
        IntegralKind::InteriorFacet => {
            declarations.push(Declaration::new(SCALE_FACTOR, format!("{}(coordinate_dofs_0, facet_0)", scaling)));
            declarations.push(Declaration::new(FACET_AREA, format!("{}(coordinate_dofs_0, facet_0)", facet_area)));
        }
    }
    Ok(declarations)
}

/// Signed cofactor of entry `(r, c)` of a 3x3 matrix, using cyclic index permutations.
fn cofactor_product(j: &impl Fn(usize, usize) -> String, r: usize, c: usize) -> String {
    let (r1, r2) = ((r + 1) % 3, (r + 2) % 3);
    let (c1, c2) = ((c + 1) % 3, (c + 2) % 3);
    format!("{}*{} - {}*{}", j(r1, c1), j(r2, c2), j(r1, c2), j(r2, c1))
}

/// Minor of entry `(r, c)` of a 3x3 matrix with rows and columns in ascending order.
fn minor_product(j: &impl Fn(usize, usize) -> String, r: usize, c: usize) -> String {
    let rows = (0..3).filter(|&i| i != r).collect_vec();
    let cols = (0..3).filter(|&i| i != c).collect_vec();
    format!(
        "{}*{} - {}*{}",
        j(rows[0], cols[0]),
        j(rows[1], cols[1]),
        j(rows[0], cols[1]),
        j(rows[1], cols[0])
    )
}

/// Combines the reference components of a function into a physical component.
///
/// `reference` holds the rendered reference components in row-major order. Returns the
/// combined expression and the names of the geometric quantities it refers to.
pub fn map_reference_values(
    mapping: MappingKind,
    component: &[usize],
    tdim: usize,
    restriction: Option<Restriction>,
    reference: &[String],
) -> Result<(String, Vec<String>), FormCompilerError> {
    let jacobian = |i: usize, k: usize| transform_name(TransformKind::Jacobian, i, k, restriction);
    let inverse = |i: usize, k: usize| transform_name(TransformKind::InverseJacobian, i, k, restriction);
    let det = determinant_name(restriction);
    let mismatch = || {
        FormCompilerError::UnsupportedNesting(format!(
            "{} mapped function indexed by {:?}",
            mapping, component
        ))
    };

    let mut geometry = Vec::new();
    let code = match (mapping, component) {
        (MappingKind::Affine, _) => {
            let index = component.iter().fold(0, |flat, &i| flat * tdim + i);
            reference.get(index).cloned().ok_or_else(mismatch)?
        }
        (MappingKind::ContravariantPiola, &[i]) => {
            let terms = (0..tdim)
                .map(|k| {
                    geometry.push(jacobian(i, k));
                    format!("{}*{}", jacobian(i, k), reference[k])
                })
                .join(" + ");
            geometry.push(det.clone());
            format!("(({}) / {})", terms, det)
        }
        (MappingKind::CovariantPiola, &[i]) => {
            let terms = (0..tdim)
                .map(|k| {
                    geometry.push(inverse(k, i));
                    format!("{}*{}", inverse(k, i), reference[k])
                })
                .join(" + ");
            format!("({})", terms)
        }
        (MappingKind::DoubleCovariantPiola, &[i, l]) => {
            let terms = (0..tdim)
                .cartesian_product(0..tdim)
                .map(|(k, m)| {
                    geometry.push(inverse(k, i));
                    geometry.push(inverse(m, l));
                    format!("{}*{}*{}", inverse(k, i), reference[k * tdim + m], inverse(m, l))
                })
                .join(" + ");
            format!("({})", terms)
        }
        (MappingKind::DoubleContravariantPiola, &[i, l]) => {
            let terms = (0..tdim)
                .cartesian_product(0..tdim)
                .map(|(k, m)| {
                    geometry.push(jacobian(i, k));
                    geometry.push(jacobian(l, m));
                    format!("{}*{}*{}", jacobian(i, k), reference[k * tdim + m], jacobian(l, m))
                })
                .join(" + ");
            geometry.push(det.clone());
            format!("(({}) / ({}*{}))", terms, det, det)
        }
        _ => return Err(mismatch()),
    };
    geometry.sort();
    geometry.dedup();
    Ok((code, geometry))
}
