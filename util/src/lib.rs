//! Shared test data for linear Lagrange elements on the reference triangle.
use nalgebra::DMatrix;

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Gradients of the linear basis functions on the reference triangle, one row per function.
pub fn p1_triangle_gradients() -> DMatrix<f64> {
    DMatrix::from_row_slice(3, 2, &[-1.0, -1.0, 1.0, 0.0, 0.0, 1.0])
}

/// Reference tensor of the Laplace bilinear form for linear elements on the reference triangle.
///
/// Rows are indexed by the dof pair `(i, j)` and columns by the derivative pair `(a, b)`, both
/// in row-major order, with entries `|T| dphi_i/dX_a dphi_j/dX_b` for the reference area `|T| = 1/2`.
pub fn p1_triangle_laplace_reference() -> DMatrix<f64> {
    let gradients = p1_triangle_gradients();
    DMatrix::from_fn(9, 4, |row, col| {
        let (i, j) = (row / 3, row % 3);
        let (a, b) = (col / 2, col % 2);
        0.5 * gradients[(i, a)] * gradients[(j, b)]
    })
}

/// Reference tensor of the mass bilinear form for linear elements on the reference triangle.
pub fn p1_triangle_mass_reference() -> DMatrix<f64> {
    DMatrix::from_fn(9, 1, |row, _| {
        let (i, j) = (row / 3, row % 3);
        if i == j {
            1.0 / 12.0
        } else {
            1.0 / 24.0
        }
    })
}

/// Linear basis function values at the midpoint of each facet of the reference triangle,
/// one single point matrix per facet.
pub fn p1_triangle_facet_midpoint_values() -> Vec<DMatrix<f64>> {
    vec![
        DMatrix::from_row_slice(1, 3, &[0.0, 0.5, 0.5]),
        DMatrix::from_row_slice(1, 3, &[0.5, 0.0, 0.5]),
        DMatrix::from_row_slice(1, 3, &[0.5, 0.5, 0.0]),
    ]
}

/// Linear basis function values at the centroid of the reference triangle.
pub fn p1_triangle_centroid_values() -> DMatrix<f64> {
    DMatrix::from_row_slice(1, 3, &[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0])
}
