//! Triangular solve module.
//!
//! Solves `A * x = alpha * b` in place: on entry `rhs` holds `b`, on exit it
//! holds `x`. `A` is the lower or upper triangle of `triangular`; elements on
//! the other side of the diagonal are never read.
//!
//! Two algorithms are provided. [`Algo::Unblocked`] substitutes one element
//! per barrier cycle, with the trailing update of each pivot spread over the
//! team. [`Algo::Blocked`] substitutes a fixed-width panel at a time: every
//! worker redundantly solves the panel into private scratch, then the team
//! applies the rank-`pb` trailing update in parallel. Both orderings perform
//! the same per-element arithmetic, so the two algorithms (and any team size)
//! produce identical results.
//!
//! A singular explicit diagonal is not detected: the division happens anyway
//! and infinities or NaNs propagate into the solution.

use crate::{
    elementwise::{fill, scale},
    gemv::matvec,
    team::{Team, Worker},
    Algo, ColMut, ColRef, ComplexField, Diag, MatRef, SharedColMut,
};
use assert2::assert as fancy_assert;

const PANEL_WIDTH: usize = 4;

#[inline(always)]
unsafe fn solve_panel_lower_unchecked<T: ComplexField>(
    panel: MatRef<'_, T>,
    x: &mut [T],
    diag: Diag,
) {
    let pb = x.len();
    for i in 0..pb {
        let mut v = x[i];
        for j in 0..i {
            v = v - *panel.get_unchecked(i, j) * x[j];
        }
        if diag == Diag::NonUnit {
            v = v * (*panel.get_unchecked(i, i)).inv();
        }
        x[i] = v;
    }
}

#[inline(always)]
unsafe fn solve_panel_upper_unchecked<T: ComplexField>(
    panel: MatRef<'_, T>,
    x: &mut [T],
    diag: Diag,
) {
    let pb = x.len();
    for i in (0..pb).rev() {
        let mut v = x[i];
        for j in i + 1..pb {
            v = v - *panel.get_unchecked(i, j) * x[j];
        }
        if diag == Diag::NonUnit {
            v = v * (*panel.get_unchecked(i, i)).inv();
        }
        x[i] = v;
    }
}

unsafe fn solve_lower_unblocked<T: ComplexField>(
    worker: &Worker<'_>,
    triangular: MatRef<'_, T>,
    diag: Diag,
    rhs: SharedColMut<'_, T>,
) {
    let m = triangular.nrows();
    for p in 0..m {
        if diag == Diag::NonUnit {
            if worker.is_leader() {
                rhs.write(p, rhs.read(p) * (*triangular.get_unchecked(p, p)).inv());
            }
            // the pivot must be final before anyone reads it
            worker.barrier();
        }
        let x_p = rhs.read(p);

        let trailing = m - p - 1;
        let (start, end) = worker.split(trailing);
        for i in p + 1 + start..p + 1 + end {
            rhs.write(i, rhs.read(i) - *triangular.get_unchecked(i, p) * x_p);
        }
        worker.barrier();
    }
}

unsafe fn solve_upper_unblocked<T: ComplexField>(
    worker: &Worker<'_>,
    triangular: MatRef<'_, T>,
    diag: Diag,
    rhs: SharedColMut<'_, T>,
) {
    let m = triangular.nrows();
    for p in (0..m).rev() {
        if diag == Diag::NonUnit {
            if worker.is_leader() {
                rhs.write(p, rhs.read(p) * (*triangular.get_unchecked(p, p)).inv());
            }
            worker.barrier();
        }
        let x_p = rhs.read(p);

        let (start, end) = worker.split(p);
        for i in start..end {
            rhs.write(i, rhs.read(i) - *triangular.get_unchecked(i, p) * x_p);
        }
        worker.barrier();
    }
}

unsafe fn solve_lower_blocked<T: ComplexField>(
    worker: &Worker<'_>,
    triangular: MatRef<'_, T>,
    diag: Diag,
    rhs: SharedColMut<'_, T>,
) {
    let m = triangular.nrows();
    let mut p = 0;
    while p < m {
        let pb = (m - p).min(PANEL_WIDTH);

        // all workers redundantly solve the panel in private scratch, so the
        // trailing update below never has to wait for a shared pivot block
        let panel = triangular.submatrix_unchecked(p, p, pb, pb);
        let mut local = [T::zero(); PANEL_WIDTH];
        for i in 0..pb {
            local[i] = rhs.read(p + i);
        }
        solve_panel_lower_unchecked(panel, &mut local[..pb], diag);

        // every worker must be done reading the panel rows of `rhs` before
        // the leader overwrites them
        worker.barrier();
        if worker.is_leader() {
            for i in 0..pb {
                rhs.write(p + i, local[i]);
            }
        }

        let trailing = m - p - pb;
        if trailing > 0 {
            let lhs = triangular.submatrix_unchecked(p + pb, p, trailing, pb);
            let x_panel = ColRef::from_raw_parts(local.as_ptr(), pb, 1);
            let acc = rhs.subrows_unchecked(p + pb, trailing);
            matvec(worker, acc, lhs, x_panel, Some(T::one()), -T::one());
        }
        worker.barrier();

        p += pb;
    }
}

unsafe fn solve_upper_blocked<T: ComplexField>(
    worker: &Worker<'_>,
    triangular: MatRef<'_, T>,
    diag: Diag,
    rhs: SharedColMut<'_, T>,
) {
    let m = triangular.nrows();
    let mut remaining = m;
    while remaining > 0 {
        let pb = remaining.min(PANEL_WIDTH);
        let p = remaining - pb;

        let panel = triangular.submatrix_unchecked(p, p, pb, pb);
        let mut local = [T::zero(); PANEL_WIDTH];
        for i in 0..pb {
            local[i] = rhs.read(p + i);
        }
        solve_panel_upper_unchecked(panel, &mut local[..pb], diag);

        worker.barrier();
        if worker.is_leader() {
            for i in 0..pb {
                rhs.write(p + i, local[i]);
            }
        }

        if p > 0 {
            let lhs = triangular.submatrix_unchecked(0, p, p, pb);
            let x_panel = ColRef::from_raw_parts(local.as_ptr(), pb, 1);
            let acc = rhs.subrows_unchecked(0, p);
            matvec(worker, acc, lhs, x_panel, Some(T::one()), -T::one());
        }
        worker.barrier();

        remaining = p;
    }
}

/// Scales `rhs` by `alpha`, or zero-fills it when `alpha` is zero.
///
/// Returns `true` when the solve itself should be skipped.
unsafe fn apply_alpha<T: ComplexField>(
    worker: &Worker<'_>,
    alpha: T,
    rhs: SharedColMut<'_, T>,
) -> bool {
    if alpha == T::zero() {
        fill(worker, rhs, T::zero());
        worker.barrier();
        return true;
    }
    if alpha != T::one() {
        scale(worker, rhs, alpha);
        worker.barrier();
    }
    false
}

/// Solves `triangular * x = alpha * rhs` in place, reading the lower
/// triangle, on the calling worker of a team.
///
/// Returns a status code, currently always zero.
///
/// # Safety
///
/// Must be called by every worker of the team with identical arguments.
/// `triangular` must be square with `rhs.nrows()` rows, `rhs` must not alias
/// `triangular`, and no worker may access the elements of `rhs` concurrently
/// through another alias.
pub unsafe fn solve_lower_triangular_in_place_unchecked<T: ComplexField>(
    worker: &Worker<'_>,
    triangular: MatRef<'_, T>,
    diag: Diag,
    alpha: T,
    rhs: SharedColMut<'_, T>,
    algo: Algo,
) -> i32 {
    if triangular.nrows() == 0 {
        return 0;
    }
    if apply_alpha(worker, alpha, rhs) {
        return 0;
    }
    match algo {
        Algo::Unblocked => solve_lower_unblocked(worker, triangular, diag, rhs),
        Algo::Blocked => solve_lower_blocked(worker, triangular, diag, rhs),
    }
    0
}

/// Solves `triangular * x = alpha * rhs` in place, reading the upper
/// triangle, on the calling worker of a team.
///
/// # Safety
///
/// Same preconditions as [`solve_lower_triangular_in_place_unchecked`].
pub unsafe fn solve_upper_triangular_in_place_unchecked<T: ComplexField>(
    worker: &Worker<'_>,
    triangular: MatRef<'_, T>,
    diag: Diag,
    alpha: T,
    rhs: SharedColMut<'_, T>,
    algo: Algo,
) -> i32 {
    if triangular.nrows() == 0 {
        return 0;
    }
    if apply_alpha(worker, alpha, rhs) {
        return 0;
    }
    match algo {
        Algo::Unblocked => solve_upper_unblocked(worker, triangular, diag, rhs),
        Algo::Blocked => solve_upper_blocked(worker, triangular, diag, rhs),
    }
    0
}

#[track_caller]
#[inline]
fn check_dims<T>(triangular: &MatRef<'_, T>, rhs: &ColMut<'_, T>) {
    fancy_assert!(triangular.nrows() == triangular.ncols());
    fancy_assert!(rhs.nrows() == triangular.nrows());
}

/// Solves `triangular * x = alpha * rhs` in place on the given team, reading
/// the lower triangle and the explicit diagonal of `triangular`.
///
/// Returns a status code, currently always zero.
///
/// # Panics
///
/// Panics if `triangular` is not square, or if `rhs.nrows()` does not match
/// its dimension.
///
/// # Example
///
/// ```
/// use team_kernels::{mat, solve::solve_lower_triangular_in_place, team::Team, Algo, Col};
///
/// let a = mat![
///     [2.0, 0.0],
///     [1.0, 4.0],
/// ];
/// let mut b = Col::with_dims(|i| [6.0, 11.0][i], 2);
///
/// let team = Team::new(2);
/// solve_lower_triangular_in_place(&team, a.as_ref(), 1.0, b.as_mut(), Algo::Unblocked);
///
/// assert_eq!(b[0], 3.0);
/// assert_eq!(b[1], 2.0);
/// ```
#[track_caller]
pub fn solve_lower_triangular_in_place<T: ComplexField>(
    team: &Team,
    triangular: MatRef<'_, T>,
    alpha: T,
    rhs: ColMut<'_, T>,
    algo: Algo,
) -> i32 {
    check_dims(&triangular, &rhs);
    let rhs = SharedColMut::from_mut(rhs);
    team.run(|worker| unsafe {
        solve_lower_triangular_in_place_unchecked(worker, triangular, Diag::NonUnit, alpha, rhs, algo)
    })
}

/// Solves `triangular * x = alpha * rhs` in place on the given team, reading
/// the lower triangle of `triangular`. The diagonal is implicitly `1.0` and
/// is never read.
///
/// See [`solve_lower_triangular_in_place`].
#[track_caller]
pub fn solve_unit_lower_triangular_in_place<T: ComplexField>(
    team: &Team,
    triangular: MatRef<'_, T>,
    alpha: T,
    rhs: ColMut<'_, T>,
    algo: Algo,
) -> i32 {
    check_dims(&triangular, &rhs);
    let rhs = SharedColMut::from_mut(rhs);
    team.run(|worker| unsafe {
        solve_lower_triangular_in_place_unchecked(worker, triangular, Diag::Unit, alpha, rhs, algo)
    })
}

/// Solves `triangular * x = alpha * rhs` in place on the given team, reading
/// the upper triangle and the explicit diagonal of `triangular`.
///
/// See [`solve_lower_triangular_in_place`].
#[track_caller]
pub fn solve_upper_triangular_in_place<T: ComplexField>(
    team: &Team,
    triangular: MatRef<'_, T>,
    alpha: T,
    rhs: ColMut<'_, T>,
    algo: Algo,
) -> i32 {
    check_dims(&triangular, &rhs);
    let rhs = SharedColMut::from_mut(rhs);
    team.run(|worker| unsafe {
        solve_upper_triangular_in_place_unchecked(worker, triangular, Diag::NonUnit, alpha, rhs, algo)
    })
}

/// Solves `triangular * x = alpha * rhs` in place on the given team, reading
/// the upper triangle of `triangular`. The diagonal is implicitly `1.0` and
/// is never read.
///
/// See [`solve_lower_triangular_in_place`].
#[track_caller]
pub fn solve_unit_upper_triangular_in_place<T: ComplexField>(
    team: &Team,
    triangular: MatRef<'_, T>,
    alpha: T,
    rhs: ColMut<'_, T>,
    algo: Algo,
) -> i32 {
    check_dims(&triangular, &rhs);
    let rhs = SharedColMut::from_mut(rhs);
    team.run(|worker| unsafe {
        solve_upper_triangular_in_place_unchecked(worker, triangular, Diag::Unit, alpha, rhs, algo)
    })
}
