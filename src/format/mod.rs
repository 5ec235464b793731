//! Precedence-aware translation of expression arenas into C++ expressions.
use crate::error::FormCompilerError;
use crate::expr::{CompareOp, Expr, ExprArena, NodeId};
use crate::representation::Restriction;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

mod cpp;
mod form_rules;

pub use cpp::*;
pub use form_rules::*;

/// Include directives and `std` names needed by formatted code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Includes {
    includes: BTreeSet<String>,
    using: BTreeSet<String>,
}

impl Default for Includes {
    fn default() -> Self {
        Self::new()
    }
}

impl Includes {
    /// Includes needed by every generated procedure body.
    pub fn new() -> Self {
        let includes = ["#include <cmath>", "#include <cstring>"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            includes,
            using: BTreeSet::new(),
        }
    }

    pub fn add_include(&mut self, include: &str) {
        self.includes.insert(include.to_string());
    }

    pub fn add_using(&mut self, name: &str) {
        self.using.insert(name.to_string());
    }

    pub fn includes(&self) -> &BTreeSet<String> {
        &self.includes
    }

    pub fn using(&self) -> &BTreeSet<String> {
        &self.using
    }

    pub fn merge(&mut self, other: &Includes) {
        self.includes.extend(other.includes.iter().cloned());
        self.using.extend(other.using.iter().cloned());
    }

    /// All include directives followed by all `using` statements.
    pub fn directives(&self) -> BTreeSet<String> {
        self.includes
            .iter()
            .cloned()
            .chain(using_statements(self))
            .collect()
    }
}

/// How a terminal is accessed: value component, sorted derivative directions and restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalAccess {
    pub component: Vec<usize>,
    pub derivatives: Vec<usize>,
    pub restriction: Option<Restriction>,
}

const MAX_PRECEDENCE: u8 = 10;

/// Binding strength of the C++ rendering of a node. Higher binds tighter.
pub fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Conditional(..) => 0,
        Expr::Or(..) => 1,
        Expr::And(..) => 2,
        Expr::Compare(CompareOp::Eq, ..) | Expr::Compare(CompareOp::Ne, ..) => 3,
        Expr::Compare(..) => 4,
        Expr::Not(_) => 5,
        Expr::Sum(_) => 6,
        Expr::Product(_) | Expr::Division(..) => 7,
        Expr::Power(..) | Expr::Math(..) | Expr::Bessel(..) => 8,
        Expr::Indexed(..) | Expr::Grad(_) | Expr::Restricted(..) | Expr::Variable(..) | Expr::IndexSum(_) => 9,
        Expr::Terminal(_) | Expr::Literal(_) => MAX_PRECEDENCE,
    }
}

/// Unwinds a chain of indexing, differentiation and restriction down to its terminal.
///
/// Derivative directions are taken from the trailing components consumed by each `grad`,
/// and are returned sorted.
pub fn resolve_access(arena: &ExprArena, id: NodeId) -> Result<(NodeId, TerminalAccess), FormCompilerError> {
    let mut access = TerminalAccess::default();
    let mut current = id;
    if let Expr::Indexed(operand, component) = arena.get(id) {
        access.component = component.clone();
        current = *operand;
    }
    loop {
        match arena.get(current) {
            Expr::Terminal(_) | Expr::Literal(_) => break,
            Expr::Grad(operand) => {
                let direction = access.component.pop().ok_or_else(|| {
                    FormCompilerError::UnsupportedNesting("grad without a component index".to_string())
                })?;
                access.derivatives.push(direction);
                current = *operand;
            }
            Expr::Restricted(operand, restriction) => {
                if access.restriction.is_some() {
                    return Err(FormCompilerError::UnsupportedNesting("nested restrictions".to_string()));
                }
                match arena.get(*operand) {
                    Expr::Terminal(_) | Expr::Literal(_) => {}
                    other => {
                        return Err(FormCompilerError::UnsupportedNesting(format!(
                            "restriction must be applied to a terminal, got {}",
                            other.kind_name()
                        )))
                    }
                }
                access.restriction = Some(*restriction);
                current = *operand;
            }
            other => {
                return Err(FormCompilerError::UnsupportedNesting(format!(
                    "{} inside an indexed expression",
                    other.kind_name()
                )))
            }
        }
    }
    access.derivatives.sort_unstable();
    Ok((current, access))
}

enum Visit {
    Enter(NodeId),
    Exit(NodeId),
}

/// Formats expressions of an arena, reusing the names of already declared variables.
pub struct ExprFormatter<'a, R> {
    arena: &'a ExprArena,
    variables: &'a BTreeMap<NodeId, String>,
    rules: &'a mut R,
}

impl<'a, R: LanguageRules> ExprFormatter<'a, R> {
    pub fn new(arena: &'a ExprArena, variables: &'a BTreeMap<NodeId, String>, rules: &'a mut R) -> Self {
        Self {
            arena,
            variables,
            rules,
        }
    }

    pub fn format(&mut self, root: NodeId, includes: &mut Includes) -> Result<String, FormCompilerError> {
        let mut fragments: FxHashMap<NodeId, String> = FxHashMap::default();
        let mut stack = vec![Visit::Enter(root)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    if fragments.contains_key(&id) {
                        continue;
                    }
                    if let Some(name) = self.variables.get(&id) {
                        fragments.insert(id, name.clone());
                        continue;
                    }
                    let expr = self.arena.get(id);
                    match expr {
                        Expr::Terminal(_) | Expr::Literal(_) | Expr::Indexed(..) | Expr::Restricted(..) => {
                            let code = self.format_access(id)?;
                            fragments.insert(id, code);
                        }
                        Expr::Grad(_) => {
                            return Err(FormCompilerError::UnsupportedNesting(
                                "grad without a component index".to_string(),
                            ))
                        }
                        Expr::Variable(..) => {
                            return Err(FormCompilerError::UnsupportedNesting(
                                "variable node reached the formatter".to_string(),
                            ))
                        }
                        Expr::IndexSum(_) => {
                            return Err(FormCompilerError::UnsupportedNodeKind(expr.kind_name().to_string()))
                        }
                        _ => {
                            stack.push(Visit::Exit(id));
                            stack.extend(expr.operands().into_iter().rev().map(Visit::Enter));
                        }
                    }
                }
                Visit::Exit(id) => {
                    let expr = self.arena.get(id);
                    let parent = precedence(expr);
                    let operands: Vec<String> = expr
                        .operands()
                        .into_iter()
                        .map(|operand| {
                            let code = &fragments[&operand];
                            let child = precedence(self.arena.get(operand));
                            let cached = self.variables.contains_key(&operand);
                            if !cached && parent < MAX_PRECEDENCE && child <= parent {
                                format!("({})", code)
                            } else {
                                code.clone()
                            }
                        })
                        .collect();
                    let code = self.apply_rule(expr, &operands, includes)?;
                    fragments.insert(id, code);
                }
            }
        }
        Ok(fragments
            .remove(&root)
            .expect("Root is formatted once the work stack is exhausted"))
    }

    fn format_access(&mut self, id: NodeId) -> Result<String, FormCompilerError> {
        let (base, access) = resolve_access(self.arena, id)?;
        match self.arena.get(base) {
            Expr::Terminal(terminal) => self.rules.terminal(terminal, &access),
            Expr::Literal(literal) => self.rules.literal(literal, &access),
            other => Err(FormCompilerError::UnsupportedNodeKind(other.kind_name().to_string())),
        }
    }

    fn apply_rule(&mut self, expr: &Expr, ops: &[String], includes: &mut Includes) -> Result<String, FormCompilerError> {
        let rules = &mut *self.rules;
        let code = match expr {
            Expr::Sum(_) => rules.sum(ops),
            Expr::Product(_) => rules.product(ops),
            Expr::Division(..) => rules.division(&ops[0], &ops[1]),
            Expr::Power(..) => rules.power(&ops[0], &ops[1], includes),
            Expr::Compare(op, ..) => rules.compare(*op, &ops[0], &ops[1]),
            Expr::And(..) => rules.and(&ops[0], &ops[1]),
            Expr::Or(..) => rules.or(&ops[0], &ops[1]),
            Expr::Not(_) => rules.not(&ops[0]),
            Expr::Conditional(..) => rules.conditional(&ops[0], &ops[1], &ops[2]),
            Expr::Math(function, _) => rules.math_function(*function, &ops[0], includes),
            Expr::Bessel(kind, ..) => rules.bessel(*kind, &ops[0], &ops[1], includes),
            other => return Err(FormCompilerError::UnsupportedNodeKind(other.kind_name().to_string())),
        };
        Ok(code)
    }
}
