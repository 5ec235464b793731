use crate::p1_triangle_element;
use fenris_formgen::dependency::{DependencyHandler, TerminalKey};
use fenris_formgen::element::{ElementCounterMap, FiniteElementData};
use fenris_formgen::error::FormCompilerError;
use fenris_formgen::expr::{BesselKind, CompareOp, Expr, ExprArena, Literal, MathFunction, NodeId, Terminal};
use fenris_formgen::format::{
    computed_name, resolve_access, using_statements, CppRules, ExprFormatter, FormRules, Includes, TerminalAccess,
};
use fenris_formgen::representation::{IntegralKind, Restriction};
use fenris_formgen::table::TableRange;
use std::collections::{BTreeMap, BTreeSet};

fn named_terminal(terminal: &Terminal, _access: &TerminalAccess) -> Result<String, FormCompilerError> {
    match terminal {
        Terminal::Argument { number, .. } => Ok(format!("v{}", number)),
        Terminal::Coefficient { number, .. } => Ok(format!("w{}", number)),
        Terminal::GeometricQuantity { name, .. } => Ok(name.clone()),
        Terminal::FacetArea => Ok("facet_area".to_string()),
    }
}

fn try_format_with(
    arena: &ExprArena,
    variables: &BTreeMap<NodeId, String>,
    root: NodeId,
) -> Result<(String, Includes), FormCompilerError> {
    let mut rules = CppRules::new(named_terminal);
    let mut includes = Includes::new();
    let code = ExprFormatter::new(arena, variables, &mut rules).format(root, &mut includes)?;
    Ok((code, includes))
}

fn format(arena: &ExprArena, root: NodeId) -> String {
    try_format_with(arena, &BTreeMap::new(), root).unwrap().0
}

/// Arena holding `v0`, `w0` and `w1`.
fn arena_with_terminals() -> (ExprArena, NodeId, NodeId, NodeId) {
    let mut arena = ExprArena::new();
    let v0 = arena.argument(0, 0);
    let w0 = arena.coefficient(0, 0);
    let w1 = arena.coefficient(1, 0);
    (arena, v0, w0, w1)
}

#[test]
fn lower_precedence_operands_are_wrapped() {
    let (mut arena, v0, w0, w1) = arena_with_terminals();
    let sum = arena.sum(vec![v0, w0]);
    let product = arena.product(vec![sum, w1]);
    assert_eq!(format(&arena, product), "(v0 + w0) * w1");

    let product = arena.product(vec![w0, w1]);
    let sum = arena.sum(vec![v0, product]);
    assert_eq!(format(&arena, sum), "v0 + w0 * w1");
}

#[test]
fn equal_precedence_operands_are_wrapped() {
    let (mut arena, v0, w0, w1) = arena_with_terminals();
    let inner = arena.product(vec![w0, w1]);
    let outer = arena.product(vec![v0, inner]);
    assert_eq!(format(&arena, outer), "v0 * (w0 * w1)");

    let division = arena.division(inner, v0);
    assert_eq!(format(&arena, division), "(w0 * w1) / v0");
    let sum = arena.sum(vec![w0, w1]);
    let division = arena.division(v0, sum);
    assert_eq!(format(&arena, division), "v0 / (w0 + w1)");
}

#[test]
fn cached_variables_are_never_wrapped() {
    let (mut arena, v0, w0, w1) = arena_with_terminals();
    let sum = arena.sum(vec![v0, w0]);
    let product = arena.product(vec![sum, w1]);
    let variables: BTreeMap<_, _> = [(sum, "s0".to_string())].into_iter().collect();

    let (code, _) = try_format_with(&arena, &variables, product).unwrap();
    assert_eq!(code, "s0 * w1");
    let (code, _) = try_format_with(&arena, &variables, sum).unwrap();
    assert_eq!(code, "s0");
}

#[test]
fn shared_subexpressions_are_formatted_at_every_use() {
    let (mut arena, v0, w0, _) = arena_with_terminals();
    let sum = arena.sum(vec![v0, w0]);
    let square = arena.product(vec![sum, sum]);
    assert_eq!(format(&arena, square), "(v0 + w0) * (v0 + w0)");
}

#[test]
fn math_functions_record_using_statements() {
    let (mut arena, v0, w0, w1) = arena_with_terminals();
    let sqrt = arena.math(MathFunction::Sqrt, v0);
    let abs = arena.math(MathFunction::Abs, w0);
    let ln = arena.math(MathFunction::Ln, w1);
    let sum = arena.sum(vec![sqrt, abs, ln]);

    let (code, includes) = try_format_with(&arena, &BTreeMap::new(), sum).unwrap();
    assert_eq!(code, "sqrt(v0) + fabs(w0) + log(w1)");
    assert_eq!(
        using_statements(&includes),
        vec!["using std::fabs;", "using std::log;", "using std::sqrt;"]
    );
    assert!(includes.includes().contains("#include <cmath>"));
}

#[test]
fn power_and_bessel_functions() {
    let (mut arena, v0, _, _) = arena_with_terminals();
    let two = arena.float(2.0);
    let power = arena.add(Expr::Power(v0, two));
    let order = arena.int(1);
    let bessel = arena.add(Expr::Bessel(BesselKind::J, order, v0));
    let product = arena.product(vec![bessel, power]);

    let (code, includes) = try_format_with(&arena, &BTreeMap::new(), product).unwrap();
    assert_eq!(code, "boost::math::cyl_bessel_j(1, v0) * pow(v0, 2.0)");
    assert!(includes
        .includes()
        .contains("#include <boost/math/special_functions.hpp>"));
    assert_eq!(includes.using().iter().collect::<Vec<_>>(), vec!["pow"]);
    assert!(includes.directives().contains("using std::pow;"));
}

#[test]
fn conditions_and_conditionals() {
    let (mut arena, v0, w0, w1) = arena_with_terminals();
    let less = arena.add(Expr::Compare(CompareOp::Lt, v0, w0));
    let equal = arena.add(Expr::Compare(CompareOp::Eq, w0, w1));
    let both = arena.add(Expr::And(less, equal));
    let not = arena.add(Expr::Not(both));
    let conditional = arena.add(Expr::Conditional(not, v0, w1));
    assert_eq!(format(&arena, conditional), "!(v0 < w0 && w0 == w1) ? v0 : w1");

    let either = arena.add(Expr::Or(both, less));
    assert_eq!(format(&arena, either), "v0 < w0 && w0 == w1 || v0 < w0");
}

#[test]
fn literals() {
    let mut arena = ExprArena::new();
    let half = arena.float(-0.5);
    let three = arena.int(3);
    let zero = arena.add(Expr::Literal(Literal::Zero));
    let identity = arena.add(Expr::Literal(Literal::Identity(2)));
    let diagonal = arena.indexed(identity, vec![1, 1]);
    let off_diagonal = arena.indexed(identity, vec![0, 1]);
    let sum = arena.sum(vec![half, three, zero, diagonal, off_diagonal]);
    assert_eq!(format(&arena, sum), "-0.5 + 3 + 0 + 1 + 0");

    let out_of_range = arena.indexed(identity, vec![2, 0]);
    assert!(matches!(
        try_format_with(&arena, &BTreeMap::new(), out_of_range),
        Err(FormCompilerError::UnsupportedNesting(_))
    ));
}

#[test]
fn literals_use_requested_precision() {
    let mut arena = ExprArena::new();
    let third = arena.float(1.0 / 3.0);
    let mut rules = CppRules::new(named_terminal).with_precision(Some(4));
    let code = ExprFormatter::new(&arena, &BTreeMap::new(), &mut rules)
        .format(third, &mut Includes::new())
        .unwrap();
    assert_eq!(code, "3.3333e-1");
}

#[test]
fn resolve_access_sorts_derivatives() {
    let mut arena = ExprArena::new();
    let w0 = arena.coefficient(0, 0);
    let restricted = arena.restricted(w0, Restriction::Negative);
    let grad = arena.grad(restricted);
    let grad_grad = arena.grad(grad);
    let indexed = arena.indexed(grad_grad, vec![2, 0, 1]);

    let (base, access) = resolve_access(&arena, indexed).unwrap();
    assert_eq!(base, w0);
    assert_eq!(
        access,
        TerminalAccess {
            component: vec![2],
            derivatives: vec![0, 1],
            restriction: Some(Restriction::Negative),
        }
    );
}

#[test]
fn resolve_access_of_bare_terminal() {
    let mut arena = ExprArena::new();
    let v0 = arena.argument(0, 0);
    assert_eq!(resolve_access(&arena, v0).unwrap(), (v0, TerminalAccess::default()));
}

#[test]
fn unsupported_nestings_are_errors() {
    let (mut arena, v0, w0, _) = arena_with_terminals();
    let sum = arena.sum(vec![v0, w0]);
    let indexed_sum = arena.indexed(sum, vec![0]);
    let grad = arena.grad(w0);
    let grad_without_component = arena.indexed(grad, Vec::new());
    let restricted = arena.restricted(v0, Restriction::Positive);
    let restricted_twice = arena.restricted(restricted, Restriction::Negative);
    let restricted_grad = arena.restricted(grad, Restriction::Positive);
    let variable = arena.add(Expr::Variable(sum, 3));

    for root in [
        indexed_sum,
        grad,
        grad_without_component,
        restricted_twice,
        restricted_grad,
        variable,
    ] {
        let result = try_format_with(&arena, &BTreeMap::new(), root);
        assert!(
            matches!(result, Err(FormCompilerError::UnsupportedNesting(_))),
            "Expected nesting error for {:?}, got {:?}",
            arena.get(root),
            result
        );
    }
}

#[test]
fn index_sums_have_no_formatting_rule() {
    let (mut arena, v0, _, _) = arena_with_terminals();
    let index_sum = arena.add(Expr::IndexSum(v0));
    let product = arena.product(vec![v0, index_sum]);
    assert_eq!(
        try_format_with(&arena, &BTreeMap::new(), product).unwrap_err(),
        FormCompilerError::UnsupportedNodeKind("index_sum".to_string())
    );
}

#[test]
fn computed_names() {
    assert_eq!(computed_name("w", 0, &[], 2, None, None), "w0");
    assert_eq!(computed_name("v", 1, &[1, 0, 1], 3, None, None), "v1_d120");
    assert_eq!(
        computed_name("w", 2, &[0], 2, Some(1), Some(Restriction::Negative)),
        "w2_d10_c1_1"
    );
}

/// Elements used by the form rule tests: a linear Lagrange element, a Raviart-Thomas element,
/// and a cellwise constant vector element.
fn form_elements() -> Vec<FiniteElementData> {
    vec![
        p1_triangle_element(),
        FiniteElementData::vector("FiniteElement('RT', triangle, 1)", 2, 3).with_mapping("contravariant piola"),
        FiniteElementData::vector("VectorElement('DG', triangle, 0)", 2, 2).with_cellwise_constant(true),
    ]
}

struct FormRulesFixture {
    elements: Vec<FiniteElementData>,
    counters: ElementCounterMap,
    ranges: BTreeMap<String, TableRange>,
    handler: DependencyHandler,
}

impl FormRulesFixture {
    fn new() -> Self {
        let elements = form_elements();
        let counters = ElementCounterMap::new(&elements);
        Self {
            elements,
            counters,
            ranges: BTreeMap::new(),
            handler: DependencyHandler::new(),
        }
    }

    fn format(&mut self, arena: &ExprArena, root: NodeId, kind: IntegralKind) -> Result<String, FormCompilerError> {
        let mut rules = FormRules::new(
            &mut self.handler,
            &self.elements,
            &self.counters,
            &self.ranges,
            kind,
            2,
        );
        ExprFormatter::new(arena, &BTreeMap::new(), &mut rules).format(root, &mut Includes::new())
    }
}

#[test]
fn form_rules_argument_table_access() {
    // Counters follow sorted signatures: 'Lagrange' is 0, 'RT' is 1, 'VectorElement' is 2
    let mut fixture = FormRulesFixture::new();
    let mut arena = ExprArena::new();
    let v0 = arena.argument(0, 0);
    let v1 = arena.argument(1, 0);
    let product = arena.product(vec![v0, v1]);
    assert_eq!(
        fixture.format(&arena, product, IntegralKind::Cell).unwrap(),
        "FE0_C0_D00[0][iq][ia0] * FE0_C0_D00[0][iq][ia1]"
    );
    assert_eq!(
        fixture.format(&arena, v0, IntegralKind::ExteriorFacet).unwrap(),
        "FE0_C0_D00_F[facet][iq][ia0]"
    );

    let key = TerminalKey {
        terminal: Terminal::Argument { number: 1, element: 0 },
        component: Vec::new(),
        derivatives: Vec::new(),
        restriction: None,
    };
    assert!(fixture.handler.get(&key).unwrap().preserved);
}

#[test]
fn form_rules_use_deduplicated_table_names() {
    let mut fixture = FormRulesFixture::new();
    fixture.ranges.insert(
        "FE0_C0_D00".to_string(),
        TableRange {
            unique_name: "FE2_C0_D00".to_string(),
            begin: 0,
            end: 3,
        },
    );
    let mut arena = ExprArena::new();
    let v0 = arena.argument(0, 0);
    assert_eq!(
        fixture.format(&arena, v0, IntegralKind::Cell).unwrap(),
        "FE2_C0_D00[0][iq][ia0]"
    );
}

#[test]
fn form_rules_interior_facet_arguments() {
    let mut fixture = FormRulesFixture::new();
    let mut arena = ExprArena::new();
    let v0 = arena.argument(0, 0);
    let plus = arena.restricted(v0, Restriction::Positive);
    let minus = arena.restricted(v0, Restriction::Negative);
    let kind = IntegralKind::InteriorFacet;

    assert_eq!(
        fixture.format(&arena, plus, kind).unwrap(),
        "(ia0 < 3 ? FE0_C0_D00_F[facet_0][iq][ia0] : 0.0)"
    );
    assert_eq!(
        fixture.format(&arena, minus, kind).unwrap(),
        "(ia0 >= 3 ? FE0_C0_D00_F[facet_1][iq][ia0 - 3] : 0.0)"
    );
    assert!(matches!(
        fixture.format(&arena, v0, kind),
        Err(FormCompilerError::UnsupportedNesting(_))
    ));
}

#[test]
fn form_rules_derivatives_use_computed_names() {
    let mut fixture = FormRulesFixture::new();
    let mut arena = ExprArena::new();
    let w0 = arena.coefficient(0, 0);
    let grad = arena.grad(w0);
    let dx1 = arena.indexed(grad, vec![1]);
    let v0 = arena.argument(0, 0);
    let restricted = arena.restricted(v0, Restriction::Negative);
    let restricted_grad = arena.grad(restricted);
    let dx0 = arena.indexed(restricted_grad, vec![0]);

    assert_eq!(fixture.format(&arena, dx1, IntegralKind::Cell).unwrap(), "w0_d01");
    assert_eq!(fixture.format(&arena, w0, IntegralKind::Cell).unwrap(), "w0");
    assert_eq!(
        fixture.format(&arena, dx0, IntegralKind::InteriorFacet).unwrap(),
        "v0_d10_1"
    );
    assert!(!fixture.handler.is_preserved("v0_d10_1"));
}

#[test]
fn form_rules_derivative_directions_must_be_in_range() {
    let mut fixture = FormRulesFixture::new();
    let mut arena = ExprArena::new();
    let v0 = arena.argument(0, 0);
    let grad = arena.grad(v0);
    let dz = arena.indexed(grad, vec![2]);
    let v1 = arena.argument(1, 0);
    let product = arena.product(vec![dz, v1]);
    assert_eq!(
        fixture.format(&arena, product, IntegralKind::Cell).unwrap_err(),
        FormCompilerError::UnsupportedNesting("derivative in direction 2 of v0 in 2 dimensions".to_string())
    );

    let w0 = arena.coefficient(0, 0);
    let grad = arena.grad(w0);
    let grad_grad = arena.grad(grad);
    let dxz = arena.indexed(grad_grad, vec![0, 3]);
    assert!(matches!(
        fixture.format(&arena, dxz, IntegralKind::Cell),
        Err(FormCompilerError::UnsupportedNesting(_))
    ));
}

#[test]
fn form_rules_constant_coefficients_index_coefficient_array() {
    let mut fixture = FormRulesFixture::new();
    let mut arena = ExprArena::new();
    let w3 = arena.coefficient(3, 2);
    let plus = arena.restricted(w3, Restriction::Positive);
    let minus = arena.restricted(w3, Restriction::Negative);
    let plus1 = arena.indexed(plus, vec![1]);
    let minus1 = arena.indexed(minus, vec![1]);
    let sum = arena.sum(vec![plus1, minus1]);
    assert_eq!(
        fixture.format(&arena, sum, IntegralKind::InteriorFacet).unwrap(),
        "w[3][1] + w[3][3]"
    );

    let grad = arena.grad(w3);
    let derivative = arena.indexed(grad, vec![0, 0]);
    assert!(fixture.format(&arena, derivative, IntegralKind::Cell).is_err());
}

#[test]
fn form_rules_geometric_quantities() {
    let mut fixture = FormRulesFixture::new();
    let mut arena = ExprArena::new();
    let normal = arena.terminal(Terminal::GeometricQuantity {
        name: "n".to_string(),
        shape: vec![2],
    });
    let restricted = arena.restricted(normal, Restriction::Positive);
    let n1 = arena.indexed(restricted, vec![1]);
    let area = arena.terminal(Terminal::FacetArea);
    let product = arena.product(vec![n1, area]);
    assert_eq!(
        fixture.format(&arena, product, IntegralKind::InteriorFacet).unwrap(),
        "n0_1 * facet_area"
    );
    let expected: BTreeSet<String> = ["facet_area", "n0_1"].iter().map(|s| s.to_string()).collect();
    assert_eq!(fixture.handler.geometric_names(), expected);

    let restricted_area = arena.restricted(area, Restriction::Negative);
    assert!(fixture.format(&arena, restricted_area, IntegralKind::InteriorFacet).is_err());
    let out_of_range = arena.indexed(normal, vec![2]);
    assert!(fixture.format(&arena, out_of_range, IntegralKind::Cell).is_err());
}

#[test]
fn form_rules_contravariant_piola() {
    let mut fixture = FormRulesFixture::new();
    let mut arena = ExprArena::new();
    let v0 = arena.argument(0, 1);
    let component = arena.indexed(v0, vec![1]);
    assert_eq!(
        fixture.format(&arena, component, IntegralKind::Cell).unwrap(),
        "((J_10*FE1_C0_D00[0][iq][ia0] + J_11*FE1_C1_D00[0][iq][ia0]) / detJ)"
    );
    let expected: BTreeSet<String> = ["J_10", "J_11", "detJ"].iter().map(|s| s.to_string()).collect();
    assert_eq!(fixture.handler.geometric_names(), expected);

    let grad = arena.grad(v0);
    let derivative = arena.indexed(grad, vec![1, 0]);
    assert!(matches!(
        fixture.format(&arena, derivative, IntegralKind::Cell),
        Err(FormCompilerError::UnsupportedMapping(_))
    ));
}

#[test]
fn form_rules_unknown_mapping() {
    let mut fixture = FormRulesFixture::new();
    fixture.elements[0].mapping = "L2 piola".to_string();
    let mut arena = ExprArena::new();
    let v0 = arena.argument(0, 0);
    assert_eq!(
        fixture.format(&arena, v0, IntegralKind::Cell).unwrap_err(),
        FormCompilerError::UnsupportedMapping("L2 piola".to_string())
    );
}
