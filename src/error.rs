//! Errors that abort the compilation of an integral.
use fenris_crs::CrsError;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// An error that is fatal to the current compilation unit.
///
/// Vanishing contributions and reference tensor entries below the drop threshold are *not*
/// errors. They are reported through the operation counts of the generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormCompilerError {
    /// The expression formatter has no rule for the given node kind.
    UnsupportedNodeKind(String),
    /// An indexed/grad/restricted/variable combination that the formatter cannot unwind.
    UnsupportedNesting(String),
    /// A value mapping that is not one of the recognized (Piola) mappings.
    UnsupportedMapping(String),
    /// A compressed row storage was asked to hold more than its declared capacity.
    CapacityExceeded(CrsError),
    /// A compressed row storage was asked for a row that has not been populated.
    IndexOutOfRange(CrsError),
    /// More than one quadrature rule was supplied for a single integral.
    MultipleQuadratureRulesUnsupported(Vec<usize>),
    /// The tabulation does not contain a table required by the integrand.
    MissingTable(String),
}

impl Display for FormCompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormCompilerError::UnsupportedNodeKind(kind) => {
                write!(f, "Missing formatting rule for node kind {}.", kind)
            }
            FormCompilerError::UnsupportedNesting(description) => {
                write!(f, "Unsupported nesting of expression nodes: {}", description)
            }
            FormCompilerError::UnsupportedMapping(mapping) => write!(f, "Unsupported value mapping: {}", mapping),
            FormCompilerError::CapacityExceeded(err) | FormCompilerError::IndexOutOfRange(err) => {
                write!(f, "Compressed row storage misuse. Error: {}", err)
            }
            FormCompilerError::MultipleQuadratureRulesUnsupported(num_points) => write!(
                f,
                "Assuming a single quadrature rule per integral domain, got rules with {:?} points.",
                num_points
            ),
            FormCompilerError::MissingTable(name) => write!(f, "Tabulation does not contain table {}.", name),
        }
    }
}

impl Error for FormCompilerError {}

impl From<CrsError> for FormCompilerError {
    fn from(err: CrsError) -> Self {
        match err {
            CrsError::CapacityExceeded { .. } => FormCompilerError::CapacityExceeded(err),
            CrsError::IndexOutOfRange { .. } => FormCompilerError::IndexOutOfRange(err),
        }
    }
}
