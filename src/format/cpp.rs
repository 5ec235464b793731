//! Language rules for C++ with default implementations for everything except terminals.
use crate::error::FormCompilerError;
use crate::expr::{BesselKind, CompareOp, Literal, MathFunction, Terminal};
use crate::format::{Includes, TerminalAccess};
use crate::parameters::format_float;
use itertools::Itertools;

const BOOST_SPECIAL_FUNCTIONS: &str = "#include <boost/math/special_functions.hpp>";

/// Formatting rules for each node kind.
///
/// Implementors must provide the terminal rule, since terminals depend on how the
/// surrounding code stores arguments, coefficients and geometry.
pub trait LanguageRules {
    fn terminal(&mut self, terminal: &Terminal, access: &TerminalAccess) -> Result<String, FormCompilerError>;

    fn precision(&self) -> Option<usize> {
        None
    }

    fn literal(&mut self, literal: &Literal, access: &TerminalAccess) -> Result<String, FormCompilerError> {
        match literal {
            Literal::Zero => Ok("0".to_string()),
            Literal::Int(value) => Ok(value.to_string()),
            Literal::Float(value) => Ok(format_float(*value, self.precision())),
            Literal::Identity(dim) => match access.component.as_slice() {
                &[i, j] if i < *dim && j < *dim => Ok(if i == j { "1" } else { "0" }.to_string()),
                component => Err(FormCompilerError::UnsupportedNesting(format!(
                    "identity of dimension {} indexed by {:?}",
                    dim, component
                ))),
            },
        }
    }

    fn sum(&mut self, operands: &[String]) -> String {
        operands.join(" + ")
    }

    fn product(&mut self, operands: &[String]) -> String {
        operands.join(" * ")
    }

    fn division(&mut self, numerator: &str, denominator: &str) -> String {
        format!("{} / {}", numerator, denominator)
    }

    fn power(&mut self, base: &str, exponent: &str, includes: &mut Includes) -> String {
        includes.add_using("pow");
        format!("pow({}, {})", base, exponent)
    }

    fn math_function(&mut self, function: MathFunction, argument: &str, includes: &mut Includes) -> String {
        let name = match function {
            MathFunction::Sqrt => "sqrt",
            MathFunction::Exp => "exp",
            MathFunction::Ln => "log",
            MathFunction::Cos => "cos",
            MathFunction::Sin => "sin",
            MathFunction::Tan => "tan",
            MathFunction::Cosh => "cosh",
            MathFunction::Sinh => "sinh",
            MathFunction::Tanh => "tanh",
            MathFunction::Acos => "acos",
            MathFunction::Asin => "asin",
            MathFunction::Atan => "atan",
            MathFunction::Abs => "fabs",
            MathFunction::Erf => "erf",
        };
        includes.add_using(name);
        format!("{}({})", name, argument)
    }

    fn bessel(&mut self, kind: BesselKind, order: &str, argument: &str, includes: &mut Includes) -> String {
        let name = match kind {
            BesselKind::I => "cyl_bessel_i",
            BesselKind::J => "cyl_bessel_j",
            BesselKind::K => "cyl_bessel_k",
            BesselKind::Y => "cyl_neumann",
        };
        includes.add_include(BOOST_SPECIAL_FUNCTIONS);
        format!("boost::math::{}({}, {})", name, order, argument)
    }

    fn compare(&mut self, op: CompareOp, lhs: &str, rhs: &str) -> String {
        let op = match op {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        format!("{} {} {}", lhs, op, rhs)
    }

    fn and(&mut self, lhs: &str, rhs: &str) -> String {
        format!("{} && {}", lhs, rhs)
    }

    fn or(&mut self, lhs: &str, rhs: &str) -> String {
        format!("{} || {}", lhs, rhs)
    }

    fn not(&mut self, operand: &str) -> String {
        format!("!{}", operand)
    }

    fn conditional(&mut self, condition: &str, true_value: &str, false_value: &str) -> String {
        format!("{} ? {} : {}", condition, true_value, false_value)
    }
}

/// C++ rules where every terminal is rendered by a user supplied function.
///
/// Mostly useful for formatting expressions outside of a form context.
pub struct CppRules<F> {
    terminal: F,
    precision: Option<usize>,
}

impl<F> CppRules<F>
where
    F: FnMut(&Terminal, &TerminalAccess) -> Result<String, FormCompilerError>,
{
    pub fn new(terminal: F) -> Self {
        Self {
            terminal,
            precision: None,
        }
    }

    pub fn with_precision(self, precision: Option<usize>) -> Self {
        Self { precision, ..self }
    }
}

impl<F> LanguageRules for CppRules<F>
where
    F: FnMut(&Terminal, &TerminalAccess) -> Result<String, FormCompilerError>,
{
    fn terminal(&mut self, terminal: &Terminal, access: &TerminalAccess) -> Result<String, FormCompilerError> {
        (self.terminal)(terminal, access)
    }

    fn precision(&self) -> Option<usize> {
        self.precision
    }
}

/// Renders `using std::<name>;` statements in sorted order.
pub fn using_statements(includes: &Includes) -> Vec<String> {
    includes
        .using()
        .iter()
        .map(|name| format!("using std::{};", name))
        .collect_vec()
}
