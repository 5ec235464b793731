use fenris_formgen::code::Declaration;
use fenris_formgen::geometry::{jacobian_declarations, CellShape};
use fenris_formgen::remove_unused::{prune_declarations, remove_unused};
use fenris_formgen::representation::IntegralKind;
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;

#[test]
fn unused_chains_are_removed() {
    let code = "\
const double a = 1.0;
const double b = a*2.0;
const double c = b;
A[0] = b;";
    assert_eq!(remove_unused(code), "const double a = 1.0;\nconst double b = a*2.0;\nA[0] = b;");

    let code = "\
const double x = 1.0;
const double y = x;
A[0] = 0.0;";
    assert_eq!(remove_unused(code), "A[0] = 0.0;");
}

#[test]
fn comments_do_not_count_as_uses() {
    let code = "\
const double a = 1.0;
// a is not used
A[0] = 0.0; // neither here: a";
    assert_eq!(remove_unused(code), "// a is not used\nA[0] = 0.0; // neither here: a");
}

#[test]
fn uses_are_matched_by_whole_identifiers() {
    let code = "\
const double a = 1.0;
double ab = 0.0;
ab += 2.0;
A[0] = ab;";
    assert_eq!(remove_unused(code), "double ab = 0.0;\nab += 2.0;\nA[0] = ab;");
}

#[test]
fn unused_arrays_are_removed() {
    let code = "\
static const double FE0_C0_D00[1][1][3] = {{{0.5, 0.5, 0.0}}};
static const double weights1[1] = {0.5};
for (int iq = 0; iq < 1; ++iq)
{
    A[0] += weights1[iq];
}";
    let expected = "\
static const double weights1[1] = {0.5};
for (int iq = 0; iq < 1; ++iq)
{
    A[0] += weights1[iq];
}";
    assert_eq!(remove_unused(code), expected);
}

fn rendered(declarations: &[Declaration], names: &[&str]) -> String {
    declarations
        .iter()
        .filter(|declaration| names.contains(&declaration.name.as_str()))
        .map(Declaration::render)
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn prune_jacobian_declarations() {
    let declarations = jacobian_declarations(CellShape::Triangle, 2, IntegralKind::Cell).unwrap();
    let used: BTreeSet<String> = ["K_00".to_string()].into_iter().collect();
    assert_eq!(
        prune_declarations(&declarations, &used),
        rendered(&declarations, &["J_00", "J_01", "J_10", "J_11", "detJ", "K_00"])
    );

    let used: BTreeSet<String> = ["det".to_string(), "K_10".to_string()].into_iter().collect();
    assert_eq!(
        prune_declarations(&declarations, &used),
        rendered(&declarations, &["J_00", "J_01", "J_10", "J_11", "detJ", "K_10", "det"])
    );

    assert_eq!(prune_declarations(&declarations, &BTreeSet::new()), "");
}

/// Declarations `x0, x1, ...` where each declaration refers to a subset of the earlier ones.
fn declaration_chain() -> impl Strategy<Value = (Vec<Declaration>, BTreeSet<String>)> {
    (1..8usize)
        .prop_flat_map(|n| (vec(vec(any::<bool>(), n), n), vec(any::<bool>(), n)))
        .prop_map(|(references, used)| {
            let declarations = references
                .iter()
                .enumerate()
                .map(|(i, refers)| {
                    let operands: Vec<String> = (0..i)
                        .filter(|&j| refers[j])
                        .map(|j| format!("x{}", j))
                        .collect();
                    let value = if operands.is_empty() {
                        "1.0".to_string()
                    } else {
                        operands.join(" + ")
                    };
                    Declaration::new(format!("x{}", i), value)
                })
                .collect();
            let used = used
                .iter()
                .enumerate()
                .filter(|(_, used)| **used)
                .map(|(i, _)| format!("x{}", i))
                .collect();
            (declarations, used)
        })
}

proptest! {
    #[test]
    fn pruning_keeps_exactly_the_needed_declarations((declarations, used) in declaration_chain()) {
        // Walk backwards, since declarations only refer to earlier ones
        let mut needed = used.clone();
        for declaration in declarations.iter().rev() {
            if needed.contains(&declaration.name) {
                for name in declaration.value.split(" + ").filter(|name| name.starts_with('x')) {
                    needed.insert(name.to_string());
                }
            }
        }
        let expected = declarations
            .iter()
            .filter(|declaration| needed.contains(&declaration.name))
            .map(Declaration::render)
            .collect::<Vec<_>>()
            .join("\n");
        prop_assert_eq!(prune_declarations(&declarations, &used), expected);
    }
}
