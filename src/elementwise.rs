//! Team-parallel element-wise vector primitives.
//!
//! Each routine partitions the rows of the destination among the workers of
//! the team with [`Worker::split`], so every element is written by exactly
//! one worker. The routines do not synchronize: callers place a barrier after
//! the call when another worker must observe the results.

use crate::{team::Worker, ComplexField, SharedColMut};

/// Fills every element of `x` with `value`.
///
/// # Safety
///
/// Must be called by every worker of the team with identical arguments. No
/// worker may access the elements of `x` concurrently through another alias.
#[inline]
pub unsafe fn fill<T: ComplexField>(worker: &Worker<'_>, x: SharedColMut<'_, T>, value: T) {
    let (start, end) = worker.split(x.nrows());
    for i in start..end {
        x.write(i, value);
    }
}

/// Multiplies every element of `x` by `factor`.
///
/// # Safety
///
/// Same preconditions as [`fill`].
#[inline]
pub unsafe fn scale<T: ComplexField>(worker: &Worker<'_>, x: SharedColMut<'_, T>, factor: T) {
    let (start, end) = worker.split(x.nrows());
    for i in start..end {
        x.write(i, factor * x.read(i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{team::Team, Col, SharedColMut};
    use assert2::assert as fancy_assert;

    #[test]
    fn fill_all_rows() {
        for team_size in [1, 2, 5] {
            let team = Team::new(team_size);
            let mut x = Col::<f64>::with_dims(|i| i as f64, 11);
            {
                let shared = SharedColMut::from_mut(x.as_mut());
                team.run(|worker| unsafe {
                    fill(worker, shared, -1.0);
                });
            }
            for i in 0..11 {
                fancy_assert!(x[i] == -1.0);
            }
        }
    }

    #[test]
    fn scale_all_rows() {
        for team_size in [1, 3, 8] {
            let team = Team::new(team_size);
            let mut x = Col::<f64>::with_dims(|i| i as f64 + 1.0, 7);
            {
                let shared = SharedColMut::from_mut(x.as_mut());
                team.run(|worker| unsafe {
                    scale(worker, shared, 2.0);
                });
            }
            for i in 0..7 {
                fancy_assert!(x[i] == 2.0 * (i as f64 + 1.0));
            }
        }
    }

    #[test]
    fn empty_vector() {
        let team = Team::new(4);
        let mut x = Col::<f64>::zeros(0);
        let shared = SharedColMut::from_mut(x.as_mut());
        team.run(|worker| unsafe {
            fill(worker, shared, 1.0);
            scale(worker, shared, 2.0);
        });
    }
}
