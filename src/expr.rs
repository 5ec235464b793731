//! Arena-based scalar expression trees handed over by the symbolic front end.
//!
//! Nodes are addressed by [`NodeId`]. A node can only refer to nodes that were added before it,
//! so every arena is a DAG in topological order.
use crate::representation::Restriction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Leaves that refer to form arguments, coefficients or geometry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Terminal {
    /// Test (`number == 0`) or trial (`number == 1`) function.
    Argument { number: usize, element: usize },
    Coefficient { number: usize, element: usize },
    /// Piecewise constant geometric quantity such as `detJ` or `K`.
    GeometricQuantity { name: String, shape: Vec<usize> },
    FacetArea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Zero,
    Int(i64),
    Float(f64),
    /// Identity matrix of the given dimension.
    Identity(usize),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathFunction {
    Sqrt,
    Exp,
    Ln,
    Cos,
    Sin,
    Tan,
    Cosh,
    Sinh,
    Tanh,
    Acos,
    Asin,
    Atan,
    Abs,
    Erf,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BesselKind {
    I,
    J,
    K,
    Y,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Sum(Vec<NodeId>),
    Product(Vec<NodeId>),
    Division(NodeId, NodeId),
    Power(NodeId, NodeId),
    Compare(CompareOp, NodeId, NodeId),
    And(NodeId, NodeId),
    Or(NodeId, NodeId),
    Not(NodeId),
    /// `condition ? true_value : false_value`
    Conditional(NodeId, NodeId, NodeId),
    Math(MathFunction, NodeId),
    /// Bessel function of the given kind with order `n` and argument `v`.
    Bessel(BesselKind, NodeId, NodeId),
    Literal(Literal),
    Terminal(Terminal),
    /// Fixed component of a tensor valued expression.
    Indexed(NodeId, Vec<usize>),
    Restricted(NodeId, Restriction),
    /// Spatial gradient, appending one axis to the value shape.
    Grad(NodeId),
    /// Labeled subexpression. Must be replaced by a named variable before formatting.
    Variable(NodeId, usize),
    /// Implicit summation. Must be expanded before formatting.
    IndexSum(NodeId),
}

impl Expr {
    /// Operands that are formatted before the node itself.
    ///
    /// Indexing, restriction and differentiation wrap terminals and are unwound together
    /// with the terminal, so they report no operands.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Expr::Sum(ops) | Expr::Product(ops) => ops.clone(),
            Expr::Division(a, b)
            | Expr::Power(a, b)
            | Expr::Compare(_, a, b)
            | Expr::And(a, b)
            | Expr::Or(a, b)
            | Expr::Bessel(_, a, b) => vec![*a, *b],
            Expr::Not(a) | Expr::Math(_, a) => vec![*a],
            Expr::Conditional(c, t, f) => vec![*c, *t, *f],
            Expr::Literal(_)
            | Expr::Terminal(_)
            | Expr::Indexed(..)
            | Expr::Restricted(..)
            | Expr::Grad(_)
            | Expr::Variable(..)
            | Expr::IndexSum(_) => Vec::new(),
        }
    }

    /// All nodes referenced by this node.
    fn children(&self) -> Vec<NodeId> {
        match self {
            Expr::Indexed(a, _) | Expr::Restricted(a, _) | Expr::Grad(a) | Expr::Variable(a, _) | Expr::IndexSum(a) => {
                vec![*a]
            }
            _ => self.operands(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Sum(_) => "sum",
            Expr::Product(_) => "product",
            Expr::Division(..) => "division",
            Expr::Power(..) => "power",
            Expr::Compare(..) => "condition",
            Expr::And(..) => "and_condition",
            Expr::Or(..) => "or_condition",
            Expr::Not(_) => "not_condition",
            Expr::Conditional(..) => "conditional",
            Expr::Math(..) => "math_function",
            Expr::Bessel(..) => "bessel_function",
            Expr::Literal(_) => "literal",
            Expr::Terminal(_) => "terminal",
            Expr::Indexed(..) => "indexed",
            Expr::Restricted(..) => "restricted",
            Expr::Grad(_) => "grad",
            Expr::Variable(..) => "variable",
            Expr::IndexSum(_) => "index_sum",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node to the arena.
    ///
    /// # Panics
    ///
    /// Panics if the node refers to a node that is not yet in the arena.
    pub fn add(&mut self, expr: Expr) -> NodeId {
        for child in expr.children() {
            assert!(
                child.index() < self.nodes.len(),
                "Node {} refers to node {} which is not in the arena.",
                self.nodes.len(),
                child.index()
            );
        }
        self.nodes.push(expr);
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> &Expr {
        &self.nodes[id.index()]
    }

    pub fn terminal(&mut self, terminal: Terminal) -> NodeId {
        self.add(Expr::Terminal(terminal))
    }

    pub fn argument(&mut self, number: usize, element: usize) -> NodeId {
        self.terminal(Terminal::Argument { number, element })
    }

    pub fn coefficient(&mut self, number: usize, element: usize) -> NodeId {
        self.terminal(Terminal::Coefficient { number, element })
    }

    pub fn float(&mut self, value: f64) -> NodeId {
        self.add(Expr::Literal(Literal::Float(value)))
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.add(Expr::Literal(Literal::Int(value)))
    }

    pub fn sum(&mut self, operands: Vec<NodeId>) -> NodeId {
        self.add(Expr::Sum(operands))
    }

    pub fn product(&mut self, operands: Vec<NodeId>) -> NodeId {
        self.add(Expr::Product(operands))
    }

    pub fn division(&mut self, numerator: NodeId, denominator: NodeId) -> NodeId {
        self.add(Expr::Division(numerator, denominator))
    }

    pub fn math(&mut self, function: MathFunction, operand: NodeId) -> NodeId {
        self.add(Expr::Math(function, operand))
    }

    pub fn indexed(&mut self, operand: NodeId, component: Vec<usize>) -> NodeId {
        self.add(Expr::Indexed(operand, component))
    }

    pub fn grad(&mut self, operand: NodeId) -> NodeId {
        self.add(Expr::Grad(operand))
    }

    pub fn restricted(&mut self, operand: NodeId, restriction: Restriction) -> NodeId {
        self.add(Expr::Restricted(operand, restriction))
    }
}
