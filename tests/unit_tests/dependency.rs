use fenris_formgen::dependency::{DependencyHandler, TerminalKey};
use fenris_formgen::expr::Terminal;
use fenris_formgen::representation::Restriction;
use std::collections::BTreeSet;

fn key(terminal: &Terminal, derivatives: &[usize], restriction: Option<Restriction>) -> TerminalKey {
    TerminalKey {
        terminal: terminal.clone(),
        component: Vec::new(),
        derivatives: derivatives.to_vec(),
        restriction,
    }
}

#[test]
fn first_recorded_name_wins() {
    let coefficient = Terminal::Coefficient { number: 1, element: 0 };
    let mut handler = DependencyHandler::new();
    handler.require(&coefficient, &[], &[0], None, "w1_d10");
    handler.require(&coefficient, &[], &[0], None, "something_else");

    assert_eq!(handler.records().len(), 1);
    let record = handler.get(&key(&coefficient, &[0], None)).unwrap();
    assert_eq!(record.name, "w1_d10");
    assert!(!record.preserved);
}

#[test]
fn restrictions_and_derivatives_are_distinct_accesses() {
    let argument = Terminal::Argument { number: 0, element: 0 };
    let mut handler = DependencyHandler::new();
    handler.require(&argument, &[], &[], Some(Restriction::Positive), "v0_0");
    handler.require(&argument, &[], &[], Some(Restriction::Negative), "v0_1");
    handler.require(&argument, &[], &[1], Some(Restriction::Positive), "v0_d01_0");

    assert_eq!(handler.records().len(), 3);
    assert!(handler.get(&key(&argument, &[], None)).is_none());
    assert_eq!(
        handler
            .get(&key(&argument, &[], Some(Restriction::Negative)))
            .unwrap()
            .name,
        "v0_1"
    );
}

#[test]
fn only_undifferentiated_arguments_are_preserved() {
    let argument = Terminal::Argument { number: 0, element: 0 };
    let coefficient = Terminal::Coefficient { number: 0, element: 0 };
    let mut handler = DependencyHandler::new();
    handler.require(&argument, &[], &[], None, "FE0_C0_D00[0][iq][ia0]");
    handler.require(&argument, &[], &[0], None, "v0_d10");
    handler.require(&coefficient, &[], &[], None, "w0");

    assert!(handler.is_preserved("FE0_C0_D00[0][iq][ia0]"));
    assert!(!handler.is_preserved("v0_d10"));
    assert!(!handler.is_preserved("w0"));
    assert!(!handler.is_preserved("unknown"));
}

#[test]
fn geometric_names_collect_quantities_and_mapping_geometry() {
    let x = Terminal::GeometricQuantity {
        name: "x".to_string(),
        shape: vec![2],
    };
    let mut handler = DependencyHandler::new();
    handler.require(&x, &[1], &[], None, "x_1");
    handler.require(&Terminal::FacetArea, &[], &[], None, "facet_area");
    handler.require(&Terminal::Argument { number: 0, element: 0 }, &[], &[], None, "v0");
    handler.require_geometry("J_00");
    handler.require_geometry("detJ");

    let expected: BTreeSet<String> = ["J_00", "detJ", "facet_area", "x_1"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(handler.geometric_names(), expected);
}
