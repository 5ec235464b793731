//! Compilation of all integrals of a form into `tabulate_tensor` procedure bodies.
use crate::code::{format_code, CodeNode, Declaration};
use crate::element::FiniteElementData;
use crate::format::{using_statements, Includes};
use crate::geometry::{jacobian_declarations, CellShape, SCALE_FACTOR};
use crate::parameters::FormCompilerParameters;
use crate::quadrature::{generate_quadrature_code, QuadratureIntegrand};
use crate::remove_unused::prune_declarations;
use crate::representation::{IntegralKind, Term};
use crate::table::Tabulation;
use crate::tensor::generate_tensor_code;
use eyre::{eyre, WrapErr};
use fenris_crs::Crs;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Intermediate representation of a form, as produced by the symbolic front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormIr {
    pub cell: CellShape,
    pub geometric_dimension: usize,
    pub elements: Vec<FiniteElementData>,
    /// Element of each argument, ordered by argument number.
    pub arguments: Vec<usize>,
    pub tabulation: Tabulation,
    pub integrals: Vec<IntegralIr>,
}

impl FormIr {
    pub fn rank(&self) -> usize {
        self.arguments.len()
    }

    /// Number of local dofs of each argument. Interior facet integrals couple the dofs of
    /// both adjacent cells.
    pub fn argument_dimensions(&self, kind: IntegralKind) -> Vec<usize> {
        let factor = match kind {
            IntegralKind::InteriorFacet => 2,
            _ => 1,
        };
        self.arguments
            .iter()
            .map(|&element| factor * self.elements[element].space_dimension)
            .collect()
    }

    pub fn tensor_size(&self, kind: IntegralKind) -> usize {
        self.argument_dimensions(kind).iter().product()
    }
}

/// An integral over the cells or facets of a sub domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegralIr {
    pub kind: IntegralKind,
    pub sub_domain: usize,
    /// Terms of the tensor representation, one row per cell, facet or facet pair.
    pub terms: Crs<Term>,
    /// Integrand evaluated by quadrature, keyed by the number of quadrature points.
    pub quadrature: BTreeMap<usize, QuadratureIntegrand>,
}

impl IntegralIr {
    pub fn new(kind: IntegralKind, sub_domain: usize, terms: Crs<Term>) -> Self {
        Self {
            kind,
            sub_domain,
            terms,
            quadrature: BTreeMap::new(),
        }
    }

    pub fn with_quadrature(mut self, integrand: QuadratureIntegrand) -> Self {
        self.quadrature.insert(integrand.num_points(), integrand);
        self
    }

    pub fn id(&self) -> IntegralId {
        IntegralId {
            kind: self.kind,
            sub_domain: self.sub_domain,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IntegralId {
    pub kind: IntegralKind,
    pub sub_domain: usize,
}

/// Generated code of a single integral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabulateTensorCode {
    pub body: String,
    /// Auxiliary member declarations of the generated integral class.
    pub members: String,
    /// Include directives and `using` statements the body needs.
    pub includes: BTreeSet<String>,
    pub num_operations: usize,
    pub num_dropped: usize,
}

fn push_declarations(nodes: &mut Vec<CodeNode>, comment: &str, declarations: &[Declaration]) {
    if !declarations.is_empty() {
        nodes.push(CodeNode::line(""));
        nodes.push(CodeNode::comment(comment));
        nodes.extend(declarations.iter().map(CodeNode::from));
    }
}

/// Generates the body of the `tabulate_tensor` procedure of an integral.
pub fn compile_integral(
    form: &FormIr,
    integral: &IntegralIr,
    parameters: &FormCompilerParameters,
) -> eyre::Result<TabulateTensorCode> {
    let kind = integral.kind;
    let tensor_size = form.tensor_size(kind);
    let tensor = generate_tensor_code(kind, form.cell, &integral.terms, tensor_size, parameters)
        .wrap_err("Failed to generate tensor representation code")?;
    let quadrature = generate_quadrature_code(form, kind, &integral.quadrature, parameters.precision)
        .wrap_err("Failed to generate quadrature code")?;

    let mut used = tensor.transforms.clone();
    if !tensor.is_zero {
        used.insert(SCALE_FACTOR.to_string());
    }
    if let Some(quadrature) = &quadrature {
        used.extend(quadrature.geometry.iter().cloned());
    }
    let jacobian = if used.is_empty() {
        String::new()
    } else {
        let declarations = jacobian_declarations(form.cell, form.geometric_dimension, kind)?;
        prune_declarations(&declarations, &used)
    };

    let includes = quadrature
        .as_ref()
        .map(|quadrature| quadrature.includes.clone())
        .unwrap_or_else(Includes::new);
    let mut nodes = vec![CodeNode::comment(&format!(
        "Number of operations to compute element tensor = {}",
        tensor.num_operations
    ))];
    if let Some(quadrature) = &quadrature {
        nodes.extend(using_statements(&includes).into_iter().map(CodeNode::Line));
        nodes.extend(quadrature.tables.iter().cloned().map(CodeNode::Line));
    }
    if !jacobian.is_empty() {
        nodes.push(CodeNode::line(""));
        nodes.push(CodeNode::comment("Compute Jacobian and scale factor"));
        nodes.extend(jacobian.lines().map(CodeNode::line));
    }
    push_declarations(&mut nodes, "Compute coefficients", &tensor.coefficient_declarations);
    push_declarations(&mut nodes, "Compute geometry tensors", &tensor.geometry_declarations);
    nodes.push(CodeNode::line(""));
    nodes.push(CodeNode::comment("Compute element tensor"));
    nodes.extend(tensor.element_tensor);
    if let Some(quadrature) = quadrature {
        nodes.push(CodeNode::line(""));
        nodes.push(CodeNode::comment("Compute element tensor by quadrature"));
        nodes.extend(quadrature.code);
    }

    debug!(
        "Compiled {} integral {}: {} operations, {} dropped reference values.",
        kind, integral.sub_domain, tensor.num_operations, tensor.num_dropped
    );
    Ok(TabulateTensorCode {
        body: format_code(&nodes),
        members: String::new(),
        includes: includes.directives(),
        num_operations: tensor.num_operations,
        num_dropped: tensor.num_dropped,
    })
}

/// Compiles every integral of the form.
///
/// Each integral is an independent unit of work. With [`FormCompilerParameters::parallel`]
/// the integrals are compiled in parallel. The result does not depend on the order in which
/// integrals are compiled.
pub fn compile_form(
    form: &FormIr,
    parameters: &FormCompilerParameters,
) -> eyre::Result<BTreeMap<IntegralId, TabulateTensorCode>> {
    let mut ids = BTreeSet::new();
    for integral in &form.integrals {
        if !ids.insert(integral.id()) {
            return Err(eyre!(
                "Form has more than one {} integral over sub domain {}.",
                integral.kind,
                integral.sub_domain
            ));
        }
    }

    let compile = |integral: &IntegralIr| {
        compile_integral(form, integral, parameters)
            .wrap_err_with(|| format!("Failed to compile {} integral {}", integral.kind, integral.sub_domain))
            .map(|code| (integral.id(), code))
    };
    let compiled: Vec<_> = if parameters.parallel {
        form.integrals
            .par_iter()
            .map(compile)
            .collect::<eyre::Result<_>>()?
    } else {
        form.integrals
            .iter()
            .map(compile)
            .collect::<eyre::Result<_>>()?
    };

    let num_operations: usize = compiled.iter().map(|(_, code)| code.num_operations).sum();
    info!(
        "Compiled {} integrals using {} operations in total.",
        compiled.len(),
        num_operations
    );
    Ok(compiled.into_iter().collect())
}
