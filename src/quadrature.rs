//! Quadrature loops evaluating expression integrands at the points of a quadrature rule.
use crate::code::{array_declaration, build_loops, for_loop, CodeNode, Declaration};
use crate::compiler::FormIr;
use crate::dependency::{DependencyHandler, TerminalKey};
use crate::element::ElementCounterMap;
use crate::error::FormCompilerError;
use crate::expr::{ExprArena, NodeId, Terminal};
use crate::format::{argument_index, entity_index, ExprFormatter, FormRules, Includes, QUADRATURE_INDEX};
use crate::geometry::SCALE_FACTOR;
use crate::representation::{IntegralKind, Restriction};
use crate::table::{build_unique_tables, collect_tables, table_name, EntityKind, TableRange};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Scalar integrand of an integral together with the quadrature rule it is evaluated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadratureIntegrand {
    pub arena: ExprArena,
    /// Named subexpressions, declared in order before the integrand is evaluated.
    pub variables: Vec<(String, NodeId)>,
    pub integrand: NodeId,
    /// Quadrature weights on the reference entity.
    pub weights: Vec<f64>,
}

impl QuadratureIntegrand {
    pub fn new(arena: ExprArena, integrand: NodeId, weights: Vec<f64>) -> Self {
        Self {
            arena,
            variables: Vec::new(),
            integrand,
            weights,
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, node: NodeId) -> Self {
        self.variables.push((name.into(), node));
        self
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }
}

/// Code evaluating the integrand of an integral by quadrature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuadratureCode {
    /// Declarations of the unique tables and the quadrature weights.
    pub tables: Vec<String>,
    pub code: Vec<CodeNode>,
    pub includes: Includes,
    /// Geometric quantities referenced by the code.
    pub geometry: BTreeSet<String>,
}

struct FormattedIntegrand {
    variables: Vec<Declaration>,
    integrand: String,
}

fn format_integrand(
    integrand: &QuadratureIntegrand,
    rules: &mut FormRules,
    includes: &mut Includes,
) -> Result<FormattedIntegrand, FormCompilerError> {
    let mut variables = BTreeMap::new();
    let mut declarations = Vec::with_capacity(integrand.variables.len());
    for (name, node) in &integrand.variables {
        let code = ExprFormatter::new(&integrand.arena, &variables, rules).format(*node, includes)?;
        declarations.push(Declaration::new(name.clone(), code));
        variables.insert(*node, name.clone());
    }
    let code = ExprFormatter::new(&integrand.arena, &variables, rules).format(integrand.integrand, includes)?;
    Ok(FormattedIntegrand {
        variables: declarations,
        integrand: code,
    })
}

/// Row-major index into the element tensor from the argument loop variables.
fn tensor_index(dims: &[usize]) -> String {
    if dims.is_empty() {
        return "0".to_string();
    }
    (0..dims.len())
        .map(|k| {
            let stride: usize = dims[k + 1..].iter().product();
            if stride == 1 {
                argument_index(k)
            } else {
                format!("{}*{}", argument_index(k), stride)
            }
        })
        .join(" + ")
}

struct DefinitionContext<'a> {
    form: &'a FormIr,
    counters: &'a ElementCounterMap,
    ranges: &'a BTreeMap<String, TableRange>,
    kind: IntegralKind,
}

impl<'a> DefinitionContext<'a> {
    fn range(&self, element: usize, key: &TerminalKey) -> Result<&'a TableRange, FormCompilerError> {
        let component = self.form.elements[element].flatten_component(&key.component)?;
        let name = table_name(
            self.counters,
            element,
            component,
            &key.derivatives,
            self.form.geometric_dimension,
            EntityKind::from(self.kind),
        );
        self.ranges
            .get(&name)
            .ok_or(FormCompilerError::MissingTable(name))
    }

    /// Accumulation of a coefficient value over the dofs of the coefficient.
    fn coefficient_definition(
        &self,
        number: usize,
        element: usize,
        key: &TerminalKey,
        name: &str,
    ) -> Result<Vec<CodeNode>, FormCompilerError> {
        let range = self.range(element, key)?;
        if range.is_empty() {
            return Ok(vec![CodeNode::line(format!("const double {} = 0.0;", name))]);
        }
        let offset = match key.restriction {
            Some(Restriction::Negative) => self.form.elements[element].space_dimension,
            _ => 0,
        };
        let accumulation = format!(
            "{n} += {t}[{e}][{q}][ic]*w[{c}][ic + {o}];",
            n = name,
            t = range.unique_name,
            e = entity_index(self.kind, key.restriction),
            q = QUADRATURE_INDEX,
            c = number,
            o = range.begin + offset
        );
        Ok(vec![
            CodeNode::line(format!("double {} = 0.0;", name)),
            CodeNode::Loop {
                header: for_loop("ic", range.end - range.begin),
                body: vec![CodeNode::line(accumulation)],
            },
        ])
    }

    /// Derivative of a basis function of an argument, zero outside the nonzero table columns.
    fn argument_definition(
        &self,
        number: usize,
        element: usize,
        key: &TerminalKey,
        name: &str,
    ) -> Result<CodeNode, FormCompilerError> {
        let range = self.range(element, key)?;
        if range.is_empty() {
            return Ok(CodeNode::line(format!("const double {} = 0.0;", name)));
        }
        let index = match key.restriction {
            Some(Restriction::Negative) => format!(
                "{} - {}",
                argument_index(number),
                self.form.elements[element].space_dimension
            ),
            _ => argument_index(number),
        };
        let local = if range.begin == 0 {
            index.clone()
        } else {
            format!("{} - {}", index, range.begin)
        };
        Ok(CodeNode::line(format!(
            "const double {n} = ({i} >= {b} && {i} < {e}) ? {t}[{ent}][{q}][{l}] : 0.0;",
            n = name,
            i = index,
            b = range.begin,
            e = range.end,
            t = range.unique_name,
            ent = entity_index(self.kind, key.restriction),
            q = QUADRATURE_INDEX,
            l = local
        )))
    }
}

/// Generates the quadrature loop for the integrand of an integral, if it has one.
///
/// The integrand is formatted twice. The first pass records the terminals the integrand
/// depends on, which determines the tables. The second pass renders table accesses against
/// the deduplicated tables.
pub fn generate_quadrature_code(
    form: &FormIr,
    kind: IntegralKind,
    rules: &BTreeMap<usize, QuadratureIntegrand>,
    precision: Option<usize>,
) -> Result<Option<QuadratureCode>, FormCompilerError> {
    let (&num_points, integrand) = match rules.iter().next() {
        None => return Ok(None),
        Some(_) if rules.len() > 1 => {
            return Err(FormCompilerError::MultipleQuadratureRulesUnsupported(
                rules.keys().copied().collect(),
            ))
        }
        Some(rule) => rule,
    };
    assert_eq!(
        integrand.num_points(),
        num_points,
        "Number of quadrature weights must match the number of points."
    );

    let gdim = form.geometric_dimension;
    let counters = ElementCounterMap::new(&form.elements);
    let mut handler = DependencyHandler::new();
    let mut includes = Includes::new();

    let no_tables = BTreeMap::new();
    let mut collecting = FormRules::new(&mut handler, &form.elements, &counters, &no_tables, kind, gdim)
        .with_precision(precision);
    format_integrand(integrand, &mut collecting, &mut includes)?;

    let collected = collect_tables(&handler, &form.elements, &counters, &form.tabulation, gdim, kind)?;
    let (mut tables, ranges) = build_unique_tables(&collected.tables, &collected.preserved, precision);
    debug!(
        "{} integral with {} quadrature points uses {} tables ({} unique).",
        kind,
        num_points,
        collected.tables.len(),
        tables.len()
    );

    let mut emitting =
        FormRules::new(&mut handler, &form.elements, &counters, &ranges, kind, gdim).with_precision(precision);
    let formatted = format_integrand(integrand, &mut emitting, &mut includes)?;

    let context = DefinitionContext {
        form,
        counters: &counters,
        ranges: &ranges,
        kind,
    };
    let mut coefficient_definitions = Vec::new();
    let mut argument_definitions = Vec::new();
    for (key, record) in handler.records() {
        match key.terminal {
            Terminal::Coefficient { number, element } if !form.elements[element].cellwise_constant => {
                coefficient_definitions.extend(context.coefficient_definition(number, element, key, &record.name)?);
            }
            Terminal::Argument { number, element } if !key.derivatives.is_empty() => {
                argument_definitions.push(context.argument_definition(number, element, key, &record.name)?);
            }
            _ => {}
        }
    }

    let weights = format!("weights{}", num_points);
    tables.push(array_declaration(&weights, &[num_points], &integrand.weights, precision));

    let dims = form.argument_dimensions(kind);
    let mut loops = vec![Some(for_loop(QUADRATURE_INDEX, num_points))];
    loops.extend(
        dims.iter()
            .enumerate()
            .map(|(k, &n)| Some(for_loop(&argument_index(k), n))),
    );
    let innermost = loops.len() - 1;
    let mut definitions = vec![Vec::new(); loops.len()];
    let mut partitions = vec![Vec::new(); loops.len()];
    definitions[0].extend(coefficient_definitions);
    definitions[innermost].extend(argument_definitions);
    definitions[innermost].extend(formatted.variables.iter().map(CodeNode::from));
    partitions[innermost].push(CodeNode::line(format!(
        "A[{}] += ({})*{}[{}]*{};",
        tensor_index(&dims),
        formatted.integrand,
        weights,
        QUADRATURE_INDEX,
        SCALE_FACTOR
    )));

    let mut geometry = handler.geometric_names();
    geometry.insert(SCALE_FACTOR.to_string());
    Ok(Some(QuadratureCode {
        tables,
        code: build_loops(&loops, definitions, partitions),
        includes,
        geometry,
    }))
}
