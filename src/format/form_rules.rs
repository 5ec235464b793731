//! Terminal rules for integrands of a form evaluated in a quadrature loop.
use crate::dependency::DependencyHandler;
use crate::element::{ElementCounterMap, FiniteElementData, MappingKind};
use crate::error::FormCompilerError;
use crate::expr::Terminal;
use crate::format::{LanguageRules, TerminalAccess};
use crate::geometry::map_reference_values;
use crate::representation::{restriction_postfix, IntegralKind, Restriction};
use crate::table::{derivative_listing_to_counts, table_name, EntityKind, TableRange};
use itertools::Itertools;
use std::collections::BTreeMap;

pub const QUADRATURE_INDEX: &str = "iq";

/// Loop variable running over the local dofs of the given argument.
pub fn argument_index(number: usize) -> String {
    format!("ia{}", number)
}

/// Name of a value of a function evaluated at a quadrature point, e.g. `w0_d10_c1_0`.
pub fn computed_name(
    base: &str,
    number: usize,
    derivatives: &[usize],
    gdim: usize,
    component: Option<usize>,
    restriction: Option<Restriction>,
) -> String {
    let mut name = format!("{}{}", base, number);
    if !derivatives.is_empty() {
        let counts = derivative_listing_to_counts(derivatives, gdim);
        name.push_str(&format!("_d{}", counts.iter().join("")));
    }
    if let Some(component) = component {
        name.push_str(&format!("_c{}", component));
    }
    name.push_str(&restriction_postfix(restriction));
    name
}

/// Index of the table entity the quadrature points of an integral live on.
pub fn entity_index(kind: IntegralKind, restriction: Option<Restriction>) -> &'static str {
    match (kind, restriction) {
        (IntegralKind::Cell, _) => "0",
        (IntegralKind::ExteriorFacet, _) => "facet",
        (IntegralKind::InteriorFacet, Some(Restriction::Negative)) => "facet_1",
        (IntegralKind::InteriorFacet, _) => "facet_0",
    }
}

/// Renders terminals of a form integrand and records them in a dependency handler.
///
/// Tables are looked up in `ranges`. Table names without a range (before the tables are
/// built) are rendered with their own name and full width.
pub struct FormRules<'a> {
    handler: &'a mut DependencyHandler,
    elements: &'a [FiniteElementData],
    counters: &'a ElementCounterMap,
    ranges: &'a BTreeMap<String, TableRange>,
    kind: IntegralKind,
    gdim: usize,
    precision: Option<usize>,
}

impl<'a> FormRules<'a> {
    pub fn new(
        handler: &'a mut DependencyHandler,
        elements: &'a [FiniteElementData],
        counters: &'a ElementCounterMap,
        ranges: &'a BTreeMap<String, TableRange>,
        kind: IntegralKind,
        gdim: usize,
    ) -> Self {
        Self {
            handler,
            elements,
            counters,
            ranges,
            kind,
            gdim,
            precision: None,
        }
    }

    pub fn with_precision(self, precision: Option<usize>) -> Self {
        Self { precision, ..self }
    }

    fn geometric_quantity(
        &mut self,
        terminal: &Terminal,
        name: &str,
        shape: &[usize],
        access: &TerminalAccess,
    ) -> Result<String, FormCompilerError> {
        if !access.derivatives.is_empty() {
            return Err(FormCompilerError::UnsupportedNesting(format!(
                "derivatives of geometric quantity {}",
                name
            )));
        }
        let in_range = access.component.len() == shape.len()
            && access
                .component
                .iter()
                .zip(shape)
                .all(|(i, extent)| i < extent);
        if !in_range {
            return Err(FormCompilerError::UnsupportedNesting(format!(
                "geometric quantity {} of shape {:?} indexed by {:?}",
                name, shape, access.component
            )));
        }
        let side = access
            .restriction
            .map(|r| r.side().to_string())
            .unwrap_or_default();
        let component = if shape.is_empty() {
            String::new()
        } else {
            format!("_{}", access.component.iter().join(""))
        };
        let code = format!("{}{}{}", name, side, component);
        self.handler
            .require(terminal, &access.component, &[], access.restriction, &code);
        Ok(code)
    }

    fn constant_coefficient(
        &mut self,
        terminal: &Terminal,
        number: usize,
        element: &FiniteElementData,
        access: &TerminalAccess,
    ) -> Result<String, FormCompilerError> {
        if !access.derivatives.is_empty() {
            return Err(FormCompilerError::UnsupportedNesting(format!(
                "derivatives of cellwise constant coefficient {}",
                number
            )));
        }
        let mut component = element.flatten_component(&access.component)?;
        if access.restriction == Some(Restriction::Negative) {
            component += element.num_flat_components();
        }
        let code = format!("w[{}][{}]", number, component);
        self.handler
            .require(terminal, &access.component, &[], access.restriction, &code);
        Ok(code)
    }

    /// Value of a reference component of an argument or a non-constant coefficient.
    fn reference_value(
        &mut self,
        terminal: &Terminal,
        component: &[usize],
        derivatives: &[usize],
        restriction: Option<Restriction>,
    ) -> Result<String, FormCompilerError> {
        let (base, number, element_id) = match *terminal {
            Terminal::Argument { number, element } => ("v", number, element),
            Terminal::Coefficient { number, element } => ("w", number, element),
            _ => return Err(FormCompilerError::UnsupportedNodeKind(format!("{:?}", terminal))),
        };
        if let Some(direction) = derivatives.iter().find(|&&d| d >= self.gdim) {
            return Err(FormCompilerError::UnsupportedNesting(format!(
                "derivative in direction {} of {}{} in {} dimensions",
                direction, base, number, self.gdim
            )));
        }
        let element = &self.elements[element_id];
        let flat = element.flatten_component(component)?;
        let code = if base == "v" && derivatives.is_empty() {
            self.argument_table_access(number, element_id, flat, restriction)?
        } else {
            let shaped = (!element.value_shape.is_empty()).then_some(flat);
            computed_name(base, number, derivatives, self.gdim, shaped, restriction)
        };
        self.handler
            .require(terminal, component, derivatives, restriction, &code);
        Ok(code)
    }

    fn argument_table_access(
        &self,
        number: usize,
        element: usize,
        component: usize,
        restriction: Option<Restriction>,
    ) -> Result<String, FormCompilerError> {
        let space_dimension = self.elements[element].space_dimension;
        let name = table_name(self.counters, element, component, &[], self.gdim, EntityKind::from(self.kind));
        let table = self
            .ranges
            .get(&name)
            .map(|range| range.unique_name.clone())
            .unwrap_or(name);
        let index = argument_index(number);
        let entity = entity_index(self.kind, restriction);
        let code = match (self.kind, restriction) {
            (IntegralKind::InteriorFacet, Some(Restriction::Positive)) => format!(
                "({i} < {n} ? {t}[{e}][{q}][{i}] : 0.0)",
                i = index,
                n = space_dimension,
                t = table,
                e = entity,
                q = QUADRATURE_INDEX
            ),
            (IntegralKind::InteriorFacet, Some(Restriction::Negative)) => format!(
                "({i} >= {n} ? {t}[{e}][{q}][{i} - {n}] : 0.0)",
                i = index,
                n = space_dimension,
                t = table,
                e = entity,
                q = QUADRATURE_INDEX
            ),
            (IntegralKind::InteriorFacet, None) => {
                return Err(FormCompilerError::UnsupportedNesting(format!(
                    "argument {} must be restricted in interior facet integrals",
                    number
                )))
            }
            _ => format!("{}[{}][{}][{}]", table, entity, QUADRATURE_INDEX, index),
        };
        Ok(code)
    }

    fn function_value(
        &mut self,
        terminal: &Terminal,
        element: &FiniteElementData,
        access: &TerminalAccess,
    ) -> Result<String, FormCompilerError> {
        let mapping = element.mapping_kind()?;
        if mapping == MappingKind::Affine {
            return self.reference_value(terminal, &access.component, &access.derivatives, access.restriction);
        }
        if !access.derivatives.is_empty() {
            return Err(FormCompilerError::UnsupportedMapping(format!(
                "derivatives of functions with {} mapping",
                mapping
            )));
        }

        let tdim = self.gdim;
        let reference_components: Vec<Vec<usize>> = match access.component.len() {
            1 => (0..tdim).map(|j| vec![j]).collect(),
            2 => (0..tdim)
                .cartesian_product(0..tdim)
                .map(|(j, k)| vec![j, k])
                .collect(),
            _ => {
                return Err(FormCompilerError::UnsupportedNesting(format!(
                    "{} mapped function indexed by {:?}",
                    mapping, access.component
                )))
            }
        };
        let values = reference_components
            .iter()
            .map(|component| self.reference_value(terminal, component, &[], access.restriction))
            .collect::<Result<Vec<_>, _>>()?;
        let (code, geometry) = map_reference_values(mapping, &access.component, tdim, access.restriction, &values)?;
        for name in geometry {
            self.handler.require_geometry(&name);
        }
        Ok(code)
    }
}

impl<'a> LanguageRules for FormRules<'a> {
    fn terminal(&mut self, terminal: &Terminal, access: &TerminalAccess) -> Result<String, FormCompilerError> {
        match terminal {
            Terminal::GeometricQuantity { name, shape } => self.geometric_quantity(terminal, name, shape, access),
            Terminal::FacetArea => {
                if access.restriction.is_some() {
                    return Err(FormCompilerError::UnsupportedNesting(
                        "facet area must not be restricted".to_string(),
                    ));
                }
                let code = "facet_area".to_string();
                self.handler.require(terminal, &[], &[], None, &code);
                Ok(code)
            }
            Terminal::Coefficient { number, element } => {
                let elements = self.elements;
                let element = &elements[*element];
                if element.cellwise_constant {
                    self.constant_coefficient(terminal, *number, element, access)
                } else {
                    self.function_value(terminal, element, access)
                }
            }
            Terminal::Argument { element, .. } => {
                let elements = self.elements;
                self.function_value(terminal, &elements[*element], access)
            }
        }
    }

    fn precision(&self) -> Option<usize> {
        self.precision
    }
}
