use serde::{Deserialize, Serialize};

/// Parameters controlling code generation for a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormCompilerParameters {
    /// Reference tensor values with magnitude at or below this threshold are dropped.
    pub epsilon: f64,
    /// Number of significant digits after the decimal point in emitted floating point
    /// literals. `None` emits the shortest representation that round-trips.
    pub precision: Option<usize>,
    /// Compile the integrals of a form in parallel.
    pub parallel: bool,
}

impl Default for FormCompilerParameters {
    fn default() -> Self {
        Self {
            epsilon: 1e-14,
            precision: None,
            parallel: true,
        }
    }
}

/// Formats a floating point literal so that it is always recognized as a `double`.
pub fn format_float(value: f64, precision: Option<usize>) -> String {
    match precision {
        Some(digits) => format!("{:.*e}", digits, value),
        None => format!("{:?}", value),
    }
}
