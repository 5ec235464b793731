//! Structured C++ code fragments and their textual rendering.
use crate::parameters::format_float;
use itertools::Itertools;

const INDENT: &str = "    ";

/// A tree of code lines. Rendering is deterministic and uses four spaces per level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeNode {
    Line(String),
    /// Lines enclosed in braces and indented.
    Block(Vec<CodeNode>),
    /// Lines indented without braces.
    Indented(Vec<CodeNode>),
    /// A loop header followed by a braced body.
    Loop { header: String, body: Vec<CodeNode> },
}

impl CodeNode {
    pub fn line(line: impl Into<String>) -> Self {
        CodeNode::Line(line.into())
    }

    pub fn comment(text: &str) -> Self {
        CodeNode::Line(format!("// {}", text))
    }
}

/// A `const double` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
}

impl Declaration {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn render(&self) -> String {
        format!("const double {} = {};", self.name, self.value)
    }
}

impl From<&Declaration> for CodeNode {
    fn from(declaration: &Declaration) -> Self {
        CodeNode::Line(declaration.render())
    }
}

pub fn format_code(nodes: &[CodeNode]) -> String {
    let mut lines = Vec::new();
    render_into(&mut lines, nodes, 0);
    lines.join("\n")
}

fn render_into(lines: &mut Vec<String>, nodes: &[CodeNode], level: usize) {
    let indent = INDENT.repeat(level);
    for node in nodes {
        match node {
            CodeNode::Line(line) if line.is_empty() => lines.push(String::new()),
            CodeNode::Line(line) => lines.push(format!("{}{}", indent, line)),
            CodeNode::Block(body) => {
                lines.push(format!("{}{{", indent));
                render_into(lines, body, level + 1);
                lines.push(format!("{}}}", indent));
            }
            CodeNode::Indented(body) => render_into(lines, body, level + 1),
            CodeNode::Loop { header, body } => {
                lines.push(format!("{}{}", indent, header));
                lines.push(format!("{}{{", indent));
                render_into(lines, body, level + 1);
                lines.push(format!("{}}}", indent));
            }
        }
    }
}

/// Nests loops, placing the definitions of each level before its loop body and the
/// partitions of each level after the inner loops.
///
/// A level without a loop header contributes its definitions and partitions without
/// opening a new scope.
pub fn build_loops(
    loops: &[Option<String>],
    definitions: Vec<Vec<CodeNode>>,
    partitions: Vec<Vec<CodeNode>>,
) -> Vec<CodeNode> {
    assert_eq!(loops.len(), definitions.len(), "Need definitions for every loop level.");
    assert_eq!(loops.len(), partitions.len(), "Need partitions for every loop level.");
    let mut inner = Vec::new();
    for ((header, defs), parts) in loops
        .iter()
        .zip(definitions)
        .zip(partitions)
        .rev()
    {
        let mut body = defs;
        body.append(&mut inner);
        body.extend(parts);
        inner = match header {
            Some(header) => vec![CodeNode::Loop {
                header: header.clone(),
                body,
            }],
            None => body,
        };
    }
    inner
}

pub fn for_loop(index: &str, range: usize) -> String {
    format!("for (int {i} = 0; {i} < {n}; ++{i})", i = index, n = range)
}

/// Renders a `static const double` array declaration with nested brace initializers.
///
/// # Panics
///
/// Panics if the number of values does not match the shape.
pub fn array_declaration(name: &str, shape: &[usize], values: &[f64], precision: Option<usize>) -> String {
    let size: usize = shape.iter().product();
    assert_eq!(size, values.len(), "Array values must match the array shape.");
    let dims = shape.iter().map(|n| format!("[{}]", n)).join("");
    let initializer = nested_initializer(shape, values, precision);
    format!("static const double {}{} = {};", name, dims, initializer)
}

fn nested_initializer(shape: &[usize], values: &[f64], precision: Option<usize>) -> String {
    match shape.split_first() {
        None => values
            .first()
            .map(|&v| format_float(v, precision))
            .unwrap_or_default(),
        Some((_, [])) => format!(
            "{{{}}}",
            values
                .iter()
                .map(|&v| format_float(v, precision))
                .join(", ")
        ),
        Some((&n, rest)) => {
            let stride: usize = rest.iter().product();
            let inner = (0..n)
                .map(|i| nested_initializer(rest, &values[i * stride..(i + 1) * stride], precision))
                .join(", ");
            format!("{{{}}}", inner)
        }
    }
}
