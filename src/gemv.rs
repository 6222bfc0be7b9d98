//! Team-parallel matrix-vector multiplication.

use crate::{team::Worker, ColRef, ComplexField, MatRef, SharedColMut};
use assert2::debug_assert as fancy_debug_assert;

/// Computes `acc = alpha * acc + beta * lhs * rhs`, with the rows of `acc`
/// partitioned among the workers of the team.
///
/// `alpha` equal to `None` means that the value of `acc` is interpreted as
/// zero and never read.
///
/// The routine does not synchronize: each worker owns a contiguous block of
/// rows of `acc` and reads only `lhs` and `rhs`, so a barrier is needed
/// afterwards only when another worker must observe the result.
///
/// # Safety
///
/// Must be called by every worker of the team with identical arguments. The
/// elements of `acc` must not alias `lhs` or `rhs`, and no worker may access
/// them concurrently through another alias.
pub unsafe fn matvec<T: ComplexField>(
    worker: &Worker<'_>,
    acc: SharedColMut<'_, T>,
    lhs: MatRef<'_, T>,
    rhs: ColRef<'_, T>,
    alpha: Option<T>,
    beta: T,
) {
    fancy_debug_assert!(acc.nrows() == lhs.nrows());
    fancy_debug_assert!(rhs.nrows() == lhs.ncols());

    let n = lhs.ncols();
    let (start, end) = worker.split(lhs.nrows());

    for i in start..end {
        let mut dot = T::zero();
        for j in 0..n {
            dot = dot + *lhs.get_unchecked(i, j) * *rhs.get_unchecked(j);
        }
        let value = match alpha {
            Some(alpha) => alpha * acc.read(i) + beta * dot,
            None => beta * dot,
        };
        acc.write(i, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mat, team::Team, Col, ColRef, Mat, SharedColMut};
    use assert_approx_eq::assert_approx_eq;
    use rand::random;

    fn naive(
        acc: &[f64],
        lhs: &Mat<f64>,
        rhs: &[f64],
        alpha: Option<f64>,
        beta: f64,
    ) -> Vec<f64> {
        (0..lhs.nrows())
            .map(|i| {
                let dot: f64 = (0..lhs.ncols()).map(|j| lhs[(i, j)] * rhs[j]).sum();
                alpha.map_or(0.0, |alpha| alpha * acc[i]) + beta * dot
            })
            .collect()
    }

    #[test]
    fn small_accumulate() {
        let lhs = mat![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let rhs = Col::with_dims(|i| (i + 1) as f64, 2);
        let mut acc = Col::with_dims(|i| i as f64, 3);

        let team = Team::new(2);
        {
            let lhs = lhs.as_ref();
            let rhs = rhs.as_ref();
            let acc = SharedColMut::from_mut(acc.as_mut());
            team.run(|worker| unsafe {
                matvec(worker, acc, lhs, rhs, Some(1.0), -1.0);
            });
        }

        // lhs * rhs = [5, 11, 17]
        assert_approx_eq!(acc[0], 0.0 - 5.0);
        assert_approx_eq!(acc[1], 1.0 - 11.0);
        assert_approx_eq!(acc[2], 2.0 - 17.0);
    }

    #[test]
    fn overwrite_ignores_acc() {
        let lhs = mat![[2.0, 0.0], [0.0, 2.0]];
        let rhs = Col::with_dims(|i| (i + 1) as f64, 2);
        let mut acc = Col::with_dims(|_| f64::NAN, 2);

        let team = Team::new(3);
        {
            let lhs = lhs.as_ref();
            let rhs = rhs.as_ref();
            let acc = SharedColMut::from_mut(acc.as_mut());
            team.run(|worker| unsafe {
                matvec(worker, acc, lhs, rhs, None, 1.0);
            });
        }

        assert_approx_eq!(acc[0], 2.0);
        assert_approx_eq!(acc[1], 4.0);
    }

    #[test]
    fn random_matches_naive() {
        for (m, n) in [(1, 1), (4, 7), (16, 3), (33, 33)] {
            let lhs = Mat::with_dims(|_, _| random::<f64>() - 0.5, m, n);
            let rhs_data = (0..n).map(|_| random::<f64>() - 0.5).collect::<Vec<_>>();
            let acc_init = (0..m).map(|_| random::<f64>() - 0.5).collect::<Vec<_>>();

            for team_size in [1, 2, 4] {
                let team = Team::new(team_size);
                let mut acc = Col::with_dims(|i| acc_init[i], m);
                {
                    let lhs = lhs.as_ref();
                    let acc = SharedColMut::from_mut(acc.as_mut());
                    let rhs = unsafe { ColRef::from_raw_parts(rhs_data.as_ptr(), n, 1) };
                    team.run(|worker| unsafe {
                        matvec(worker, acc, lhs, rhs, Some(0.5), 2.0);
                    });
                }

                let expected = naive(&acc_init, &lhs, &rhs_data, Some(0.5), 2.0);
                for i in 0..m {
                    assert_approx_eq!(acc[i], expected[i], 1e-10);
                }
            }
        }
    }

    #[test]
    fn negative_stride_rhs() {
        let lhs = mat![[1.0, 2.0], [3.0, 4.0]];
        // stored back to front, viewed with stride -1 as [1, 2]
        let rhs_data = vec![2.0, 1.0];
        let mut acc = Col::zeros(2);

        let team = Team::new(2);
        {
            let lhs = lhs.as_ref();
            let acc = SharedColMut::from_mut(acc.as_mut());
            let rhs = unsafe { ColRef::from_raw_parts(rhs_data.as_ptr().add(1), 2, -1) };
            team.run(|worker| unsafe {
                matvec(worker, acc, lhs, rhs, None, 1.0);
            });
        }

        // [[1, 2], [3, 4]] * [1, 2]
        assert_approx_eq!(acc[0], 5.0);
        assert_approx_eq!(acc[1], 11.0);
    }

    #[test]
    fn strided_lhs() {
        // transpose of a column major matrix gives a row stride > 1
        let base = mat![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]];
        let lhs = base.as_ref().transpose();
        let rhs = Col::with_dims(|i| (i + 1) as f64, 3);
        let mut acc = Col::zeros(2);

        let team = Team::new(2);
        {
            let rhs = rhs.as_ref();
            let acc = SharedColMut::from_mut(acc.as_mut());
            team.run(|worker| unsafe {
                matvec(worker, acc, lhs, rhs, None, 1.0);
            });
        }

        // [[1, 2, 3], [4, 5, 6]] * [1, 2, 3]
        assert_approx_eq!(acc[0], 14.0);
        assert_approx_eq!(acc[1], 32.0);
    }
}
