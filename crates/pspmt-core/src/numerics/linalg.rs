use super::DenseMatrix;

const SINGULAR_PIVOT_EPSILON: f64 = 1.0e-15;
const ILL_CONDITIONED_RELATIVE_PIVOT_EPSILON: f64 = 1.0e-12;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LuError {
    #[error("LU factorization requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("LU factorization requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is singular at pivot index {pivot_index}")]
    SingularMatrix { pivot_index: usize },
    #[error("matrix is ill-conditioned at pivot index {pivot_index}")]
    IllConditionedMatrix { pivot_index: usize },
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LuDecomposition {
    lu: DenseMatrix,
    pivots: Vec<usize>,
    input_norm_infty: f64,
}

impl LuDecomposition {
    pub fn dimension(&self) -> usize {
        self.lu.nrows()
    }

    pub fn lu_matrix(&self) -> &DenseMatrix {
        &self.lu
    }

    pub fn pivots(&self) -> &[usize] {
        &self.pivots
    }

    /// Inverse of the factorized matrix. Rejects pivots that are tiny relative
    /// to the input's infinity norm, since a covariance read from such an
    /// inverse is meaningless.
    pub fn invert(&self) -> Result<DenseMatrix, LuError> {
        let dimension = self.dimension();
        let mut inverse = DenseMatrix::zeros(dimension, dimension);
        let mut basis = vec![0.0; dimension];

        for pivot_index in 0..dimension {
            let diagonal = self.lu[(pivot_index, pivot_index)];
            if is_ill_conditioned_pivot(diagonal, self.input_norm_infty) {
                return Err(LuError::IllConditionedMatrix { pivot_index });
            }
        }

        for col in 0..dimension {
            basis.fill(0.0);
            basis[col] = 1.0;

            let solution = self.solve(&basis)?;
            for row in 0..dimension {
                inverse[(row, col)] = solution[row];
            }
        }

        Ok(inverse)
    }

    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
        let dimension = self.dimension();
        if rhs.len() != dimension {
            return Err(LuError::RhsLengthMismatch {
                expected: dimension,
                actual: rhs.len(),
            });
        }

        let mut forward = vec![0.0; dimension];
        for row in 0..dimension {
            let mut value = rhs[self.pivots[row]];
            for col in 0..row {
                value -= self.lu[(row, col)] * forward[col];
            }
            forward[row] = value;
        }

        let mut solution = vec![0.0; dimension];
        for row in (0..dimension).rev() {
            let mut value = forward[row];
            for col in (row + 1)..dimension {
                value -= self.lu[(row, col)] * solution[col];
            }

            let diagonal = self.lu[(row, row)];
            if is_effectively_zero(diagonal) {
                return Err(LuError::SingularMatrix { pivot_index: row });
            }

            solution[row] = value / diagonal;
        }

        Ok(solution)
    }
}

pub fn lu_factorize(matrix: &DenseMatrix) -> Result<LuDecomposition, LuError> {
    let dimension = validate_square_shape(matrix)?;
    let input_norm_infty = matrix_infinity_norm(matrix);
    let mut lu = matrix.clone();
    let mut pivots: Vec<usize> = (0..dimension).collect();

    for pivot_col in 0..dimension {
        let (pivot_row, pivot_magnitude) = select_pivot_row(&lu, pivot_col);
        if pivot_magnitude <= SINGULAR_PIVOT_EPSILON {
            return Err(LuError::SingularMatrix {
                pivot_index: pivot_col,
            });
        }

        if pivot_row != pivot_col {
            swap_rows(&mut lu, pivot_col, pivot_row);
            pivots.swap(pivot_col, pivot_row);
        }

        let pivot = lu[(pivot_col, pivot_col)];
        for row in (pivot_col + 1)..dimension {
            lu[(row, pivot_col)] /= pivot;
            let multiplier = lu[(row, pivot_col)];
            for col in (pivot_col + 1)..dimension {
                let updated = lu[(row, col)] - multiplier * lu[(pivot_col, col)];
                lu[(row, col)] = updated;
            }
        }
    }

    Ok(LuDecomposition {
        lu,
        pivots,
        input_norm_infty,
    })
}

pub fn lu_solve(matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
    lu_factorize(matrix)?.solve(rhs)
}

pub fn lu_invert(matrix: &DenseMatrix) -> Result<DenseMatrix, LuError> {
    lu_factorize(matrix)?.invert()
}

fn validate_square_shape(matrix: &DenseMatrix) -> Result<usize, LuError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows == 0 || cols == 0 {
        return Err(LuError::EmptyMatrix);
    }
    if rows != cols {
        return Err(LuError::NonSquareMatrix { rows, cols });
    }

    Ok(rows)
}

fn select_pivot_row(matrix: &DenseMatrix, pivot_col: usize) -> (usize, f64) {
    let dimension = matrix.nrows();
    let mut best_row = pivot_col;
    let mut best_magnitude = matrix[(pivot_col, pivot_col)].abs();

    for row in (pivot_col + 1)..dimension {
        let magnitude = matrix[(row, pivot_col)].abs();
        if magnitude > best_magnitude {
            best_magnitude = magnitude;
            best_row = row;
        }
    }

    (best_row, best_magnitude)
}

fn swap_rows(matrix: &mut DenseMatrix, lhs: usize, rhs: usize) {
    if lhs == rhs {
        return;
    }

    for col in 0..matrix.ncols() {
        let value = matrix[(lhs, col)];
        matrix[(lhs, col)] = matrix[(rhs, col)];
        matrix[(rhs, col)] = value;
    }
}

fn is_effectively_zero(value: f64) -> bool {
    value.abs() <= SINGULAR_PIVOT_EPSILON
}

fn is_ill_conditioned_pivot(pivot: f64, input_norm_infty: f64) -> bool {
    pivot.abs() <= input_norm_infty * ILL_CONDITIONED_RELATIVE_PIVOT_EPSILON
}

fn matrix_infinity_norm(matrix: &DenseMatrix) -> f64 {
    let mut best_row_sum: f64 = 0.0;
    for row in 0..matrix.nrows() {
        let mut row_sum = 0.0;
        for col in 0..matrix.ncols() {
            row_sum += matrix[(row, col)].abs();
        }
        best_row_sum = best_row_sum.max(row_sum);
    }
    best_row_sum
}

#[cfg(test)]
mod tests {
    use super::{LuError, lu_factorize, lu_invert, lu_solve};
    use crate::numerics::DenseMatrix;

    #[test]
    fn lu_factorize_reconstructs_permuted_original_matrix() {
        let matrix = dense_matrix(&[
            vec![0.0, 2.0, 1.0],
            vec![1.0, -2.0, -3.0],
            vec![2.0, 3.0, 1.0],
        ]);
        let decomposition = lu_factorize(&matrix).expect("LU decomposition");

        let permuted = permute_rows(&matrix, decomposition.pivots());
        let (l, u) = split_lu(decomposition.lu_matrix());
        let recomposed = multiply(&l, &u);

        assert_matrix_close(&permuted, &recomposed, 1.0e-12);
    }

    #[test]
    fn lu_solve_recovers_known_solution() {
        let matrix = dense_matrix(&[
            vec![4.0, -2.0, 1.0],
            vec![-2.0, 4.0, -2.0],
            vec![1.0, -2.0, 3.0],
        ]);
        let expected = vec![1.0, -0.5, 2.0];
        let rhs = matvec(&matrix, &expected);

        let actual = lu_solve(&matrix, &rhs).expect("solve");
        for (lhs, rhs) in expected.iter().zip(&actual) {
            assert!((lhs - rhs).abs() < 1.0e-12, "expected {lhs}, got {rhs}");
        }
    }

    #[test]
    fn lu_factorize_rejects_non_square_matrices() {
        let matrix = DenseMatrix::zeros(2, 3);
        let error = lu_factorize(&matrix).expect_err("non-square matrix should fail");
        assert_eq!(error, LuError::NonSquareMatrix { rows: 2, cols: 3 });
    }

    #[test]
    fn lu_factorize_rejects_singular_matrices() {
        let matrix = dense_matrix(&[vec![1.0, 2.0], vec![2.0, 4.0]]);
        let error = lu_factorize(&matrix).expect_err("singular matrix should fail");
        assert_eq!(error, LuError::SingularMatrix { pivot_index: 1 });
    }

    #[test]
    fn lu_solve_validates_rhs_dimension() {
        let matrix = dense_matrix(&[vec![3.0, 1.0], vec![1.0, 2.0]]);
        let decomposition = lu_factorize(&matrix).expect("decomposition");

        let error = decomposition
            .solve(&[1.0])
            .expect_err("rhs mismatch should fail");
        assert_eq!(
            error,
            LuError::RhsLengthMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn lu_invert_recovers_identity_when_recomposed() {
        let matrix = dense_matrix(&[
            vec![1.5, -2.0, 0.5],
            vec![0.75, 3.0, -1.0],
            vec![2.0, 1.25, 2.5],
        ]);

        let inverse = lu_invert(&matrix).expect("inverse");
        let product = multiply(&matrix, &inverse);
        let identity = DenseMatrix::from_fn(3, 3, |row, col| if row == col { 1.0 } else { 0.0 });

        assert_matrix_close(&identity, &product, 1.0e-10);
    }

    #[test]
    fn lu_invert_rejects_ill_conditioned_matrices() {
        let matrix = dense_matrix(&[vec![1.0, 1.0], vec![1.0, 1.0 + 1.0e-14]]);

        let error = lu_invert(&matrix).expect_err("ill-conditioned matrix should fail");
        assert_eq!(error, LuError::IllConditionedMatrix { pivot_index: 1 });
    }

    fn dense_matrix(rows: &[Vec<f64>]) -> DenseMatrix {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, |row| row.len());
        DenseMatrix::from_fn(nrows, ncols, |row, col| rows[row][col])
    }

    fn permute_rows(matrix: &DenseMatrix, pivots: &[usize]) -> DenseMatrix {
        DenseMatrix::from_fn(matrix.nrows(), matrix.ncols(), |row, col| {
            matrix[(pivots[row], col)]
        })
    }

    fn split_lu(lu: &DenseMatrix) -> (DenseMatrix, DenseMatrix) {
        let dimension = lu.nrows();
        let lower = DenseMatrix::from_fn(dimension, dimension, |row, col| match row.cmp(&col) {
            std::cmp::Ordering::Greater => lu[(row, col)],
            std::cmp::Ordering::Equal => 1.0,
            std::cmp::Ordering::Less => 0.0,
        });
        let upper =
            DenseMatrix::from_fn(
                dimension,
                dimension,
                |row, col| if row <= col { lu[(row, col)] } else { 0.0 },
            );
        (lower, upper)
    }

    fn multiply(lhs: &DenseMatrix, rhs: &DenseMatrix) -> DenseMatrix {
        DenseMatrix::from_fn(lhs.nrows(), rhs.ncols(), |row, col| {
            (0..lhs.ncols())
                .map(|inner| lhs[(row, inner)] * rhs[(inner, col)])
                .sum()
        })
    }

    fn matvec(matrix: &DenseMatrix, vector: &[f64]) -> Vec<f64> {
        (0..matrix.nrows())
            .map(|row| {
                (0..matrix.ncols())
                    .map(|col| matrix[(row, col)] * vector[col])
                    .sum()
            })
            .collect()
    }

    fn assert_matrix_close(expected: &DenseMatrix, actual: &DenseMatrix, tolerance: f64) {
        assert_eq!(expected.nrows(), actual.nrows());
        assert_eq!(expected.ncols(), actual.ncols());
        for row in 0..expected.nrows() {
            for col in 0..expected.ncols() {
                let diff = (expected[(row, col)] - actual[(row, col)]).abs();
                assert!(
                    diff <= tolerance,
                    "mismatch at ({row}, {col}): expected {}, got {}",
                    expected[(row, col)],
                    actual[(row, col)]
                );
            }
        }
    }
}
