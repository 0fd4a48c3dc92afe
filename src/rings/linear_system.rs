use smallvec::SmallVec;
use std::{
    fmt::{Display, Write},
    ops::{Index, IndexMut},
    slice::Chunks,
};

use super::Field;

/// A dense row-major matrix over a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<F: Field> {
    pub shape: (u32, u32),
    pub data: SmallVec<[F::Element; 25]>,
    pub field: F,
}

impl<F: Field> Matrix<F> {
    pub fn new(rows: u32, cols: u32, field: F) -> Matrix<F> {
        Matrix {
            shape: (rows, cols),
            data: (0..rows as usize * cols as usize)
                .map(|_| field.zero())
                .collect(),
            field,
        }
    }

    pub fn rows(&self) -> usize {
        self.shape.0 as usize
    }

    pub fn cols(&self) -> usize {
        self.shape.1 as usize
    }

    pub fn row_iter(&self) -> Chunks<'_, F::Element> {
        self.data.chunks(self.shape.1 as usize)
    }

    fn swap_rows(&mut self, r1: u32, r2: u32) {
        if r1 == r2 {
            return;
        }
        let cols = self.shape.1;
        for c in 0..cols {
            self.data
                .swap((r1 * cols + c) as usize, (r2 * cols + c) as usize);
        }
    }
}

impl<F: Field> Index<(u32, u32)> for Matrix<F> {
    type Output = F::Element;

    fn index(&self, index: (u32, u32)) -> &Self::Output {
        &self.data[(index.0 * self.shape.1 + index.1) as usize]
    }
}

impl<F: Field> IndexMut<(u32, u32)> for Matrix<F> {
    fn index_mut(&mut self, index: (u32, u32)) -> &mut F::Element {
        &mut self.data[(index.0 * self.shape.1 + index.1) as usize]
    }
}

impl<F: Field> Display for Matrix<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('{')?;
        for (ri, r) in self.row_iter().enumerate() {
            f.write_char('{')?;
            for (ci, c) in r.iter().enumerate() {
                self.field.fmt_display(c, f)?;
                if ci + 1 < self.cols() {
                    f.write_char(',')?;
                }
            }
            f.write_char('}')?;
            if ri + 1 < self.rows() {
                f.write_char(',')?;
            }
        }
        f.write_char('}')
    }
}

/// Error from linear solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverError {
    /// The system has more than one solution.
    Underdetermined { rank: u32 },
    /// The system has no solution.
    Inconsistent,
}

impl<F: Field> Matrix<F> {
    /// Bring the first `max_col` columns into row echelon form, applying the
    /// same row operations to the remaining (augmented) columns.
    /// Returns the rank of the first `max_col` columns.
    pub fn row_reduce(&mut self, max_col: u32) -> u32 {
        let (nrows, ncols) = self.shape;
        let field = self.field;

        let mut rank = 0;
        for j in 0..max_col {
            if rank == nrows {
                break;
            }

            let Some(pivot) = (rank..nrows).find(|&k| !F::is_zero(&self[(k, j)])) else {
                continue;
            };
            self.swap_rows(rank, pivot);

            let inv_x = field.inv(&self[(rank, j)]);
            for k in rank + 1..nrows {
                if F::is_zero(&self[(k, j)]) {
                    continue;
                }

                let s = field.mul(&self[(k, j)], &inv_x);
                self[(k, j)] = field.zero();
                for l in j + 1..ncols {
                    let t = field.mul(&self[(rank, l)], &s);
                    field.sub_assign(&mut self[(k, l)], &t);
                }
            }

            rank += 1;
        }

        rank
    }

    /// Solves `A * x = b` for `x`, where `A` is `self`. More equations than
    /// unknowns are allowed, as long as they are consistent.
    pub fn solve(&self, b: &[F::Element]) -> Result<Vec<F::Element>, LinearSolverError> {
        assert_eq!(self.rows(), b.len(), "Right-hand side has the wrong length");

        let (neqs, nvars) = self.shape;

        let mut m = Matrix::new(neqs, nvars + 1, self.field);
        for r in 0..neqs {
            for c in 0..nvars {
                m[(r, c)] = self[(r, c)].clone();
            }
            m[(r, nvars)] = b[r as usize].clone();
        }

        let rank = m.row_reduce(nvars);

        for k in rank..neqs {
            if !F::is_zero(&m[(k, nvars)]) {
                return Err(LinearSolverError::Inconsistent);
            }
        }

        if rank < nvars {
            return Err(LinearSolverError::Underdetermined { rank });
        }

        // full rank: the pivot of row i is in column i
        let mut x = vec![self.field.zero(); nvars as usize];
        for i in (0..nvars).rev() {
            let mut rhs = m[(i, nvars)].clone();
            for j in i + 1..nvars {
                self.field
                    .sub_mul_assign(&mut rhs, &m[(i, j)], &x[j as usize]);
            }
            x[i as usize] = self.field.div(&rhs, &m[(i, i)]);
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rings::finite_field::{FiniteFieldCore, Zp};

    fn matrix(rows: u32, cols: u32, data: &[u32]) -> Matrix<Zp> {
        let field = Zp::new(17);
        Matrix {
            shape: (rows, cols),
            data: data.iter().map(|n| field.to_element(*n)).collect(),
            field,
        }
    }

    fn rhs(data: &[u32]) -> Vec<<Zp as crate::rings::Ring>::Element> {
        let field = Zp::new(17);
        data.iter().map(|n| field.to_element(*n)).collect()
    }

    fn unpack(r: Vec<<Zp as crate::rings::Ring>::Element>) -> Vec<u32> {
        let field = Zp::new(17);
        r.iter().map(|i| field.from_element(i)).collect()
    }

    #[test]
    fn solve_trivial() {
        let a = matrix(1, 1, &[12]);
        assert_eq!(unpack(a.solve(&rhs(&[7])).unwrap()), [2]);
    }

    #[test]
    fn solve_square() {
        let a = matrix(3, 3, &[1, 1, 2, 3, 4, 3, 16, 5, 5]);
        assert_eq!(unpack(a.solve(&rhs(&[3, 15, 8])).unwrap()), [2, 3, 16]);
    }

    #[test]
    fn solve_pivoting() {
        let a = matrix(2, 2, &[0, 1, 1, 0]);
        assert_eq!(unpack(a.solve(&rhs(&[5, 6])).unwrap()), [6, 5]);
    }

    #[test]
    #[should_panic]
    fn solve_bad_shape() {
        let a = matrix(3, 3, &[1, 1, 2, 3, 4, 3, 16, 5, 5]);
        let _ = a.solve(&rhs(&[3, 15, 8, 1]));
    }

    #[test]
    fn solve_underdetermined() {
        let a = matrix(2, 3, &[1, 1, 2, 3, 4, 3]);
        assert_eq!(
            a.solve(&rhs(&[3, 15])),
            Err(LinearSolverError::Underdetermined { rank: 2 })
        );

        let a = matrix(4, 4, &[1, 1, 1, 1, 0, 0, 1, 1, 0, 0, 0, 1, 0, 0, 0, 2]);
        assert_eq!(
            a.solve(&rhs(&[1, 15, 1, 2])),
            Err(LinearSolverError::Underdetermined { rank: 3 })
        );

        let a = matrix(3, 3, &[1, 1, 2, 3, 4, 3, 10, 7, 12]);
        assert_eq!(
            a.solve(&rhs(&[3, 15, 12])),
            Err(LinearSolverError::Underdetermined { rank: 2 })
        );
    }

    #[test]
    fn solve_overdetermined() {
        let a = matrix(5, 3, &[1, 1, 2, 3, 4, 3, 9, 0, 11, 1, 1, 7, 2, 3, 8]);
        assert_eq!(unpack(a.solve(&rhs(&[3, 15, 7, 6, 6])).unwrap()), [11, 1, 4]);
    }

    #[test]
    fn solve_inconsistent() {
        let a = matrix(4, 3, &[1, 1, 2, 3, 4, 3, 16, 5, 5, 14, 2, 4]);
        assert_eq!(
            a.solve(&rhs(&[3, 15, 8, 3])),
            Err(LinearSolverError::Inconsistent)
        );
    }
}
