//! `team-kernels` core module.
//!
//! This crate contains:
//! - definitions of strided matrix and vector views ([`MatRef`], [`ColMut`], etc.),
//! - a cooperative worker-team execution context ([`team::Team`]),
//! - element-wise fill/scale primitives executed by a team,
//! - a team-parallel matrix-vector multiply kernel,
//! - in-place triangular solve routines built on top of the above.
//!
//! The kernels in this crate are SPMD: every worker of a team enters the same
//! routine together, and the routines synchronize internally through the
//! team's barrier. Shared buffers are mutated under a single-writer-per-element
//! discipline; the barrier placement encodes the data dependencies.

#![warn(rust_2018_idioms)]
#![allow(clippy::too_many_arguments)]

use aligned_vec::CACHELINE_ALIGN;
use assert2::{assert as fancy_assert, debug_assert as fancy_debug_assert};
use core::{
    any::TypeId,
    fmt::Debug,
    marker::PhantomData,
    ops::{Add, Div, Index, IndexMut, Mul, Neg, Sub},
    ptr::NonNull,
};
use reborrow::*;

extern crate alloc;

pub mod elementwise;
pub mod gemv;
pub mod solve;
pub mod team;

/// Complex floating point number type, where the real and imaginary parts each occupy 32 bits.
#[allow(non_camel_case_types)]
pub type c32 = num_complex::Complex32;
/// Complex floating point number type, where the real and imaginary parts each occupy 64 bits.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;

/// Indicates whether the diagonal of a triangular matrix is stored explicitly,
/// or implicitly assumed to be all ones (in which case it is never read).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Diag {
    /// The diagonal is read from the matrix.
    NonUnit,
    /// The diagonal is implicitly `1.0` and is never read.
    Unit,
}

/// Algorithm selector for the triangular solve routines.
///
/// The selector is dispatched once at the entry of each solve, never inside
/// the element loops.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Algo {
    /// Element-at-a-time substitution, one barrier cycle per row.
    Unblocked,
    /// Fixed-width panel substitution: a small sequential solve per panel,
    /// followed by a team-parallel trailing update.
    Blocked,
}

/// Trait that describes a complex number field.
///
/// Real numbers can also be seen as complex numbers, where the imaginary part is always zero.
pub trait ComplexField:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + PartialEq
    + Send
    + Sync
    + Debug
    + 'static
{
    type Real: RealField;

    /// Returns a complex number whose real part is equal to `real`, and a zero imaginary part.
    fn from_real(real: Self::Real) -> Self;

    /// Returns the value representing `0.0`.
    fn zero() -> Self;
    /// Returns the value representing `1.0`.
    fn one() -> Self;

    /// Returns the inverse of the number.
    fn inv(self) -> Self;
    /// Returns the absolute value of the number.
    fn abs(self) -> Self::Real;
}

/// Trait that describes a real number field.
pub trait RealField: ComplexField<Real = Self> + PartialOrd {}

impl RealField for f32 {}
impl ComplexField for f32 {
    type Real = f32;

    #[inline(always)]
    fn from_real(real: Self::Real) -> Self {
        real
    }

    #[inline(always)]
    fn zero() -> Self {
        0.0
    }

    #[inline(always)]
    fn one() -> Self {
        1.0
    }

    #[inline(always)]
    fn inv(self) -> Self {
        1.0 / self
    }

    #[inline(always)]
    fn abs(self) -> Self::Real {
        self.abs()
    }
}

impl RealField for f64 {}
impl ComplexField for f64 {
    type Real = f64;

    #[inline(always)]
    fn from_real(real: Self::Real) -> Self {
        real
    }

    #[inline(always)]
    fn zero() -> Self {
        0.0
    }

    #[inline(always)]
    fn one() -> Self {
        1.0
    }

    #[inline(always)]
    fn inv(self) -> Self {
        1.0 / self
    }

    #[inline(always)]
    fn abs(self) -> Self::Real {
        self.abs()
    }
}

impl ComplexField for c32 {
    type Real = f32;

    #[inline(always)]
    fn from_real(real: Self::Real) -> Self {
        c32 { re: real, im: 0.0 }
    }

    #[inline(always)]
    fn zero() -> Self {
        c32 { re: 0.0, im: 0.0 }
    }

    #[inline(always)]
    fn one() -> Self {
        c32 { re: 1.0, im: 0.0 }
    }

    #[inline(always)]
    fn inv(self) -> Self {
        Self::one() / self
    }

    #[inline(always)]
    fn abs(self) -> Self::Real {
        self.norm()
    }
}

impl ComplexField for c64 {
    type Real = f64;

    #[inline(always)]
    fn from_real(real: Self::Real) -> Self {
        c64 { re: real, im: 0.0 }
    }

    #[inline(always)]
    fn zero() -> Self {
        c64 { re: 0.0, im: 0.0 }
    }

    #[inline(always)]
    fn one() -> Self {
        c64 { re: 1.0, im: 0.0 }
    }

    #[inline(always)]
    fn inv(self) -> Self {
        Self::one() / self
    }

    #[inline(always)]
    fn abs(self) -> Self::Real {
        self.norm()
    }
}

struct MatrixSliceBase<T> {
    ptr: NonNull<T>,
    nrows: usize,
    ncols: usize,
    row_stride: isize,
    col_stride: isize,
}
struct VecSliceBase<T> {
    ptr: NonNull<T>,
    len: usize,
    stride: isize,
}
impl<T> Copy for MatrixSliceBase<T> {}
impl<T> Clone for MatrixSliceBase<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for VecSliceBase<T> {}
impl<T> Clone for VecSliceBase<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

/// Matrix view with general row and column strides.
pub struct MatRef<'a, T> {
    base: MatrixSliceBase<T>,
    _marker: PhantomData<&'a T>,
}

/// Mutable matrix view with general row and column strides.
///
/// For usage examples, see [`MatRef`].
pub struct MatMut<'a, T> {
    base: MatrixSliceBase<T>,
    _marker: PhantomData<&'a mut T>,
}

/// Column vector view with general row stride.
///
/// For usage examples, see [`MatRef`].
pub struct ColRef<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a T>,
}

/// Mutable column vector view with general row stride.
///
/// For usage examples, see [`MatRef`].
pub struct ColMut<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a mut T>,
}

/// Column vector view that may be written to concurrently by the workers of a
/// team.
///
/// The descriptor itself is `Copy` so that every worker of a team can hold its
/// own handle to the same underlying buffer. Element accesses are all unsafe:
/// the caller is responsible for upholding the single-writer rule (every
/// element is written by at most one worker between two barriers, and no
/// worker reads an element while another may be writing it).
pub struct SharedColMut<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a T>,
}

unsafe impl<T: Sync> Sync for MatRef<'_, T> {}
unsafe impl<T: Sync> Send for MatRef<'_, T> {}
unsafe impl<T: Sync> Sync for MatMut<'_, T> {}
unsafe impl<T: Send> Send for MatMut<'_, T> {}

unsafe impl<T: Sync> Sync for ColRef<'_, T> {}
unsafe impl<T: Sync> Send for ColRef<'_, T> {}
unsafe impl<T: Sync> Sync for ColMut<'_, T> {}
unsafe impl<T: Send> Send for ColMut<'_, T> {}

unsafe impl<T: Send + Sync> Sync for SharedColMut<'_, T> {}
unsafe impl<T: Send + Sync> Send for SharedColMut<'_, T> {}

impl<'a, T> Copy for MatRef<'a, T> {}
impl<'a, T> Copy for ColRef<'a, T> {}
impl<'a, T> Copy for SharedColMut<'a, T> {}

impl<'a, T> Clone for MatRef<'a, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Clone for ColRef<'a, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Clone for SharedColMut<'a, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<'b, 'a, T> Reborrow<'b> for MatRef<'a, T> {
    type Target = MatRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for MatRef<'a, T> {
    type Target = MatRef<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        *self
    }
}

impl<'b, 'a, T> Reborrow<'b> for MatMut<'a, T> {
    type Target = MatRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        MatRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for MatMut<'a, T> {
    type Target = MatMut<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        MatMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'b, 'a, T> Reborrow<'b> for ColRef<'a, T> {
    type Target = ColRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for ColRef<'a, T> {
    type Target = ColRef<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        *self
    }
}

impl<'b, 'a, T> Reborrow<'b> for ColMut<'a, T> {
    type Target = ColRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        ColRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for ColMut<'a, T> {
    type Target = ColMut<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        ColMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> IntoConst for MatRef<'a, T> {
    type Target = MatRef<'a, T>;

    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}
impl<'a, T> IntoConst for MatMut<'a, T> {
    type Target = MatRef<'a, T>;

    #[inline]
    fn into_const(self) -> Self::Target {
        MatRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'a, T> IntoConst for ColRef<'a, T> {
    type Target = ColRef<'a, T>;

    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}
impl<'a, T> IntoConst for ColMut<'a, T> {
    type Target = ColRef<'a, T>;

    #[inline]
    fn into_const(self) -> Self::Target {
        ColRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> MatRef<'a, T> {
    /// Returns a matrix slice from the given arguments.
    /// `ptr`: pointer to the first element of the matrix.
    /// `nrows`: number of rows of the matrix.
    /// `ncols`: number of columns of the matrix.
    /// `row_stride`: offset between the first elements of two successive rows in the matrix.
    /// `col_stride`: offset between the first elements of two successive columns in the matrix.
    ///
    /// # Safety
    ///
    /// `ptr` must be non null and properly aligned for type `T`.
    /// For each `i < nrows` and `j < ncols`,
    /// `ptr.offset(i as isize * row_stride + j as isize * col_stride)` must point to a valid
    /// initialized object of type `T`, unless memory pointing to that address is never accessed.
    /// The referenced memory must not be mutated during the lifetime `'a`.
    ///
    /// # Example
    ///
    /// ```
    /// use team_kernels::MatRef;
    ///
    /// let data = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
    /// let m = unsafe { MatRef::from_raw_parts(data.as_ptr(), 2, 3, 1, 2) };
    ///
    /// assert_eq!(m.nrows(), 2);
    /// assert_eq!(m.ncols(), 3);
    /// assert_eq!(m[(1, 2)], 5.0);
    /// ```
    #[inline]
    pub unsafe fn from_raw_parts(
        ptr: *const T,
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
    ) -> Self {
        Self {
            base: MatrixSliceBase::<T> {
                ptr: NonNull::new_unchecked(ptr as *mut T),
                nrows,
                ncols,
                row_stride,
                col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns a pointer to the first (top left) element of the matrix.
    #[inline]
    pub fn as_ptr(self) -> *const T {
        self.base.ptr.as_ptr()
    }

    /// Returns the number of rows of the matrix.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.ncols
    }

    /// Returns the offset between the first elements of two successive rows in the matrix.
    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.row_stride
    }

    /// Returns the offset between the first elements of two successive columns in the matrix.
    #[inline]
    pub fn col_stride(&self) -> isize {
        self.base.col_stride
    }

    /// Returns a pointer to the element at position (i, j) in the matrix.
    #[inline]
    pub fn ptr_at(self, i: usize, j: usize) -> *const T {
        self.base
            .ptr
            .as_ptr()
            .wrapping_offset(i as isize * self.row_stride())
            .wrapping_offset(j as isize * self.col_stride())
    }

    /// Returns a reference to the element at position (i, j), with no bound checks.
    ///
    /// # Safety
    ///
    /// `i < self.nrows()` and `j < self.ncols()` must hold.
    #[inline]
    pub unsafe fn get_unchecked(self, i: usize, j: usize) -> &'a T {
        fancy_debug_assert!(i < self.nrows());
        fancy_debug_assert!(j < self.ncols());
        &*self.ptr_at(i, j)
    }

    /// Returns a reference to the element at position (i, j), or panics if the indices are out of
    /// bounds.
    #[track_caller]
    #[inline]
    pub fn get(self, i: usize, j: usize) -> &'a T {
        fancy_assert!(i < self.nrows());
        fancy_assert!(j < self.ncols());
        unsafe { self.get_unchecked(i, j) }
    }

    /// Returns a view over the submatrix starting at position `(i, j)` with dimensions
    /// `(nrows, ncols)`, with no bound checks.
    ///
    /// # Safety
    ///
    /// The submatrix must be entirely contained within `self`.
    #[inline]
    pub unsafe fn submatrix_unchecked(
        self,
        i: usize,
        j: usize,
        nrows: usize,
        ncols: usize,
    ) -> Self {
        fancy_debug_assert!(i <= self.nrows());
        fancy_debug_assert!(j <= self.ncols());
        fancy_debug_assert!(nrows <= self.nrows() - i);
        fancy_debug_assert!(ncols <= self.ncols() - j);
        Self::from_raw_parts(
            self.ptr_at(i, j),
            nrows,
            ncols,
            self.row_stride(),
            self.col_stride(),
        )
    }

    /// Returns a view over the submatrix starting at position `(i, j)` with dimensions
    /// `(nrows, ncols)`.
    #[track_caller]
    #[inline]
    pub fn submatrix(self, i: usize, j: usize, nrows: usize, ncols: usize) -> Self {
        fancy_assert!(i <= self.nrows());
        fancy_assert!(j <= self.ncols());
        fancy_assert!(nrows <= self.nrows() - i);
        fancy_assert!(ncols <= self.ncols() - j);
        unsafe { self.submatrix_unchecked(i, j, nrows, ncols) }
    }

    /// Returns a view over the transpose of the matrix.
    #[inline]
    pub fn transpose(self) -> Self {
        Self {
            base: MatrixSliceBase {
                ptr: self.base.ptr,
                nrows: self.base.ncols,
                ncols: self.base.nrows,
                row_stride: self.base.col_stride,
                col_stride: self.base.row_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns a column vector view over the `j`-th column, with no bound checks.
    ///
    /// # Safety
    ///
    /// `j < self.ncols()` must hold.
    #[inline]
    pub unsafe fn col_unchecked(self, j: usize) -> ColRef<'a, T> {
        fancy_debug_assert!(j < self.ncols());
        ColRef::from_raw_parts(self.ptr_at(0, j), self.nrows(), self.row_stride())
    }
}

impl<'a, T> MatMut<'a, T> {
    /// Returns a mutable matrix slice from the given arguments.
    ///
    /// # Safety
    ///
    /// Same preconditions as [`MatRef::from_raw_parts`], with the additional requirement that the
    /// referenced memory must not be accessed through any other alias during the lifetime `'a`.
    #[inline]
    pub unsafe fn from_raw_parts(
        ptr: *mut T,
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
    ) -> Self {
        Self {
            base: MatrixSliceBase::<T> {
                ptr: NonNull::new_unchecked(ptr),
                nrows,
                ncols,
                row_stride,
                col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns a mutable pointer to the first (top left) element of the matrix.
    #[inline]
    pub fn as_ptr(&mut self) -> *mut T {
        self.base.ptr.as_ptr()
    }

    /// Returns the number of rows of the matrix.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.ncols
    }

    /// Returns the offset between the first elements of two successive rows in the matrix.
    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.row_stride
    }

    /// Returns the offset between the first elements of two successive columns in the matrix.
    #[inline]
    pub fn col_stride(&self) -> isize {
        self.base.col_stride
    }

    /// Returns a mutable pointer to the element at position (i, j) in the matrix.
    #[inline]
    pub fn ptr_at(&mut self, i: usize, j: usize) -> *mut T {
        self.base
            .ptr
            .as_ptr()
            .wrapping_offset(i as isize * self.base.row_stride)
            .wrapping_offset(j as isize * self.base.col_stride)
    }

    /// Returns a mutable reference to the element at position (i, j), with no bound checks.
    ///
    /// # Safety
    ///
    /// `i < self.nrows()` and `j < self.ncols()` must hold.
    #[inline]
    pub unsafe fn get_unchecked(&mut self, i: usize, j: usize) -> &'a mut T {
        fancy_debug_assert!(i < self.nrows());
        fancy_debug_assert!(j < self.ncols());
        &mut *self.ptr_at(i, j)
    }

    /// Returns a mutable reference to the element at position (i, j), or panics if the indices
    /// are out of bounds.
    #[track_caller]
    #[inline]
    pub fn get(&mut self, i: usize, j: usize) -> &'a mut T {
        fancy_assert!(i < self.nrows());
        fancy_assert!(j < self.ncols());
        unsafe { self.get_unchecked(i, j) }
    }

    /// Returns a mutable column vector view over the `j`-th column, with no bound checks.
    ///
    /// # Safety
    ///
    /// `j < self.ncols()` must hold.
    #[inline]
    pub unsafe fn col_unchecked(mut self, j: usize) -> ColMut<'a, T> {
        fancy_debug_assert!(j < self.ncols());
        let nrows = self.nrows();
        let rs = self.row_stride();
        ColMut::from_raw_parts(self.ptr_at(0, j), nrows, rs)
    }
}

impl<'a, T> ColRef<'a, T> {
    /// Returns a column vector slice from the given arguments.
    /// `ptr`: pointer to the first element of the vector.
    /// `nrows`: number of rows of the vector.
    /// `row_stride`: offset between two successive elements of the vector.
    ///
    /// # Safety
    ///
    /// `ptr` must be non null and properly aligned for type `T`.
    /// For each `i < nrows`, `ptr.offset(i as isize * row_stride)` must point to a valid
    /// initialized object of type `T`, unless memory pointing to that address is never accessed.
    /// The referenced memory must not be mutated during the lifetime `'a`.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *const T, nrows: usize, row_stride: isize) -> Self {
        Self {
            base: VecSliceBase::<T> {
                ptr: NonNull::new_unchecked(ptr as *mut T),
                len: nrows,
                stride: row_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns a pointer to the first element of the vector.
    #[inline]
    pub fn as_ptr(self) -> *const T {
        self.base.ptr.as_ptr()
    }

    /// Returns the number of rows of the vector.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.len
    }

    /// Returns the offset between two successive elements of the vector.
    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.stride
    }

    /// Returns a pointer to the element at position (i) in the vector.
    #[inline]
    pub fn ptr_at(self, i: usize) -> *const T {
        self.base
            .ptr
            .as_ptr()
            .wrapping_offset(i as isize * self.base.stride)
    }

    /// Returns a reference to the element at position (i), with no bound checks.
    ///
    /// # Safety
    ///
    /// `i < self.nrows()` must hold.
    #[inline]
    pub unsafe fn get_unchecked(self, i: usize) -> &'a T {
        fancy_debug_assert!(i < self.nrows());
        &*self.ptr_at(i)
    }

    /// Returns a reference to the element at position (i), or panics if the index is out of
    /// bounds.
    #[track_caller]
    #[inline]
    pub fn get(self, i: usize) -> &'a T {
        fancy_assert!(i < self.nrows());
        unsafe { self.get_unchecked(i) }
    }

    /// Returns a view over the subvector starting at position `i` with `nrows` rows, with no
    /// bound checks.
    ///
    /// # Safety
    ///
    /// The subvector must be entirely contained within `self`.
    #[inline]
    pub unsafe fn subrows_unchecked(self, i: usize, nrows: usize) -> Self {
        fancy_debug_assert!(i <= self.nrows());
        fancy_debug_assert!(nrows <= self.nrows() - i);
        Self::from_raw_parts(self.ptr_at(i), nrows, self.row_stride())
    }
}

impl<'a, T> ColMut<'a, T> {
    /// Returns a mutable column vector slice from the given arguments.
    ///
    /// # Safety
    ///
    /// Same preconditions as [`ColRef::from_raw_parts`], with the additional requirement that the
    /// referenced memory must not be accessed through any other alias during the lifetime `'a`.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *mut T, nrows: usize, row_stride: isize) -> Self {
        Self {
            base: VecSliceBase::<T> {
                ptr: NonNull::new_unchecked(ptr),
                len: nrows,
                stride: row_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns a mutable pointer to the first element of the vector.
    #[inline]
    pub fn as_ptr(&mut self) -> *mut T {
        self.base.ptr.as_ptr()
    }

    /// Returns the number of rows of the vector.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.len
    }

    /// Returns the offset between two successive elements of the vector.
    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.stride
    }

    /// Returns a mutable pointer to the element at position (i) in the vector.
    #[inline]
    pub fn ptr_at(&mut self, i: usize) -> *mut T {
        self.base
            .ptr
            .as_ptr()
            .wrapping_offset(i as isize * self.base.stride)
    }

    /// Returns a mutable reference to the element at position (i), with no bound checks.
    ///
    /// # Safety
    ///
    /// `i < self.nrows()` must hold.
    #[inline]
    pub unsafe fn get_unchecked(&mut self, i: usize) -> &'a mut T {
        fancy_debug_assert!(i < self.nrows());
        &mut *self.ptr_at(i)
    }

    /// Returns a mutable reference to the element at position (i), or panics if the index is out
    /// of bounds.
    #[track_caller]
    #[inline]
    pub fn get(&mut self, i: usize) -> &'a mut T {
        fancy_assert!(i < self.nrows());
        unsafe { self.get_unchecked(i) }
    }
}

impl<'a, T> SharedColMut<'a, T> {
    /// Returns a shared-write column descriptor over the same elements as `col`.
    ///
    /// Creating the descriptor is safe; every element access through it is unsafe and subject to
    /// the single-writer discipline documented on [`SharedColMut`].
    #[inline]
    pub fn from_mut(col: ColMut<'a, T>) -> Self {
        Self {
            base: col.base,
            _marker: PhantomData,
        }
    }

    /// Returns the number of rows of the vector.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.len
    }

    /// Returns the offset between two successive elements of the vector.
    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.stride
    }

    /// Returns a mutable pointer to the element at position (i) in the vector.
    #[inline]
    pub fn ptr_at(self, i: usize) -> *mut T {
        self.base
            .ptr
            .as_ptr()
            .wrapping_offset(i as isize * self.base.stride)
    }

    /// Reads the element at position (i).
    ///
    /// # Safety
    ///
    /// `i < self.nrows()` must hold, and no worker may be writing the element concurrently.
    #[inline]
    pub unsafe fn read(self, i: usize) -> T
    where
        T: Copy,
    {
        fancy_debug_assert!(i < self.nrows());
        *self.ptr_at(i)
    }

    /// Writes `value` to the element at position (i).
    ///
    /// # Safety
    ///
    /// `i < self.nrows()` must hold, and no other worker may be accessing the element
    /// concurrently.
    #[inline]
    pub unsafe fn write(self, i: usize, value: T) {
        fancy_debug_assert!(i < self.nrows());
        *self.ptr_at(i) = value;
    }

    /// Returns a view over the subvector starting at position `i` with `nrows` rows, with no
    /// bound checks.
    ///
    /// # Safety
    ///
    /// The subvector must be entirely contained within `self`.
    #[inline]
    pub unsafe fn subrows_unchecked(self, i: usize, nrows: usize) -> Self {
        fancy_debug_assert!(i <= self.nrows());
        fancy_debug_assert!(nrows <= self.nrows() - i);
        Self {
            base: VecSliceBase {
                ptr: NonNull::new_unchecked(self.ptr_at(i)),
                len: nrows,
                stride: self.base.stride,
            },
            _marker: PhantomData,
        }
    }
}

impl<T> Index<(usize, usize)> for MatRef<'_, T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        (*self).get(i, j)
    }
}

impl<T> Index<usize> for ColRef<'_, T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, i: usize) -> &T {
        (*self).get(i)
    }
}

fn is_vectorizable<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<f32>()
        || TypeId::of::<T>() == TypeId::of::<f64>()
        || TypeId::of::<T>() == TypeId::of::<c32>()
        || TypeId::of::<T>() == TypeId::of::<c64>()
}

#[doc(hidden)]
#[inline]
pub fn align_for<T: 'static>() -> usize {
    if is_vectorizable::<T>() {
        CACHELINE_ALIGN
    } else {
        core::mem::align_of::<T>()
    }
}

#[cold]
fn capacity_overflow_impl() -> ! {
    panic!("capacity overflow")
}

#[cold]
fn capacity_overflow<T>() -> T {
    capacity_overflow_impl();
}

struct RawMat<T: 'static> {
    ptr: NonNull<T>,
    row_capacity: usize,
    col_capacity: usize,
}

impl<T: 'static> RawMat<T> {
    pub fn new(row_capacity: usize, col_capacity: usize) -> Self {
        let cap = row_capacity
            .checked_mul(col_capacity)
            .unwrap_or_else(capacity_overflow);
        let cap_bytes = cap
            .checked_mul(core::mem::size_of::<T>())
            .unwrap_or_else(capacity_overflow);
        if cap_bytes > isize::MAX as usize {
            capacity_overflow::<()>();
        }

        use alloc::alloc::{alloc, handle_alloc_error, Layout};

        let layout = Layout::from_size_align(cap_bytes, align_for::<T>())
            .ok()
            .unwrap_or_else(capacity_overflow);

        let ptr = if layout.size() == 0 {
            NonNull::<T>::dangling()
        } else {
            // SAFETY: we checked that layout has non zero size
            let ptr = unsafe { alloc(layout) } as *mut T;
            if ptr.is_null() {
                handle_alloc_error(layout)
            } else {
                // SAFETY: we checked that the pointer is not null
                unsafe { NonNull::<T>::new_unchecked(ptr) }
            }
        };

        Self {
            ptr,
            row_capacity,
            col_capacity,
        }
    }
}

impl<T> Drop for RawMat<T> {
    fn drop(&mut self) {
        use alloc::alloc::{dealloc, Layout};
        // this cannot overflow because we already allocated this much memory
        let alloc_size =
            self.row_capacity.wrapping_mul(self.col_capacity) * core::mem::size_of::<T>();
        if alloc_size != 0 {
            // SAFETY: this was allocated with alloc::alloc::alloc
            unsafe {
                dealloc(
                    self.ptr.as_ptr() as *mut u8,
                    Layout::from_size_align_unchecked(alloc_size, align_for::<T>()),
                );
            }
        }
    }
}

#[inline]
fn round_up_to(n: usize, k: usize) -> usize {
    (n + (k - 1)) / k * k
}

/// Owning matrix structure stored in column major format.
///
/// The elements are stored so that each column is contiguous, with possible padding at the end of
/// each column so that columns stay cacheline aligned for vectorizable scalar types.
pub struct Mat<T: ComplexField> {
    raw: RawMat<T>,
    nrows: usize,
    ncols: usize,
}

unsafe impl<T: ComplexField> Sync for Mat<T> {}
unsafe impl<T: ComplexField> Send for Mat<T> {}

impl<T: ComplexField> Mat<T> {
    /// Returns a new matrix with dimensions `(0, 0)`. This does not allocate.
    #[inline]
    pub fn new() -> Self {
        Self {
            raw: RawMat::<T> {
                ptr: NonNull::<T>::dangling(),
                row_capacity: 0,
                col_capacity: 0,
            },
            nrows: 0,
            ncols: 0,
        }
    }

    /// Returns a new matrix with dimensions `(nrows, ncols)`, filled with the provided function.
    ///
    /// # Panics
    ///
    /// Panics if the total capacity in bytes exceeds `isize::MAX`.
    pub fn with_dims(f: impl FnMut(usize, usize) -> T, nrows: usize, ncols: usize) -> Self {
        let mut f = f;
        let row_capacity = if nrows == 0 {
            0
        } else {
            round_up_to(nrows, (align_for::<T>() / core::mem::size_of::<T>()).max(1))
        };
        let raw = RawMat::<T>::new(row_capacity, ncols);

        let ptr = raw.ptr.as_ptr();
        for j in 0..ncols {
            let ptr_j = ptr.wrapping_add(j * row_capacity);
            for i in 0..nrows {
                // SAFETY: (i, j) is within the allocation, and T: Copy so there is no drop
                // obligation if `f` panics.
                unsafe { ptr_j.add(i).write(f(i, j)) };
            }
        }

        Self { raw, nrows, ncols }
    }

    /// Returns a new matrix with dimensions `(nrows, ncols)`, filled with zeros.
    ///
    /// # Panics
    ///
    /// Panics if the total capacity in bytes exceeds `isize::MAX`.
    #[inline]
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self::with_dims(|_, _| T::zero(), nrows, ncols)
    }

    /// Returns a pointer to the data of the matrix.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.raw.ptr.as_ptr()
    }

    /// Returns a mutable pointer to the data of the matrix.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.raw.ptr.as_ptr()
    }

    /// Returns the number of rows of the matrix.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Returns the offset between the first elements of two successive rows in the matrix.
    /// Always returns `1` since the matrix is column major.
    #[inline]
    pub fn row_stride(&self) -> isize {
        1
    }

    /// Returns the offset between the first elements of two successive columns in the matrix.
    #[inline]
    pub fn col_stride(&self) -> isize {
        self.raw.row_capacity as isize
    }

    /// Returns a view over the matrix.
    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, T> {
        unsafe {
            MatRef::<'_, T>::from_raw_parts(
                self.as_ptr(),
                self.nrows(),
                self.ncols(),
                1,
                self.col_stride(),
            )
        }
    }

    /// Returns a mutable view over the matrix.
    #[inline]
    pub fn as_mut(&mut self) -> MatMut<'_, T> {
        let nrows = self.nrows();
        let ncols = self.ncols();
        let cs = self.col_stride();
        unsafe { MatMut::<'_, T>::from_raw_parts(self.as_mut_ptr(), nrows, ncols, 1, cs) }
    }
}

impl<T: ComplexField> Default for Mat<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ComplexField> Clone for Mat<T> {
    fn clone(&self) -> Self {
        let this = self.as_ref();
        Self::with_dims(
            |i, j| unsafe { *this.get_unchecked(i, j) },
            self.nrows(),
            self.ncols(),
        )
    }
}

impl<T: ComplexField> Index<(usize, usize)> for Mat<T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        self.as_ref().get(i, j)
    }
}

impl<T: ComplexField> IndexMut<(usize, usize)> for Mat<T> {
    #[track_caller]
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        self.as_mut().get(i, j)
    }
}

/// Owning column vector with contiguous storage.
pub struct Col<T: ComplexField> {
    inner: Mat<T>,
}

impl<T: ComplexField> Col<T> {
    /// Returns a new vector with `nrows` rows, filled with the provided function.
    #[inline]
    pub fn with_dims(f: impl FnMut(usize) -> T, nrows: usize) -> Self {
        let mut f = f;
        Self {
            inner: Mat::with_dims(|i, _| f(i), nrows, 1),
        }
    }

    /// Returns a new vector with `nrows` rows, filled with zeros.
    #[inline]
    pub fn zeros(nrows: usize) -> Self {
        Self::with_dims(|_| T::zero(), nrows)
    }

    /// Returns the number of rows of the vector.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    /// Returns a view over the vector.
    #[inline]
    pub fn as_ref(&self) -> ColRef<'_, T> {
        unsafe { ColRef::from_raw_parts(self.inner.as_ptr(), self.inner.nrows(), 1) }
    }

    /// Returns a mutable view over the vector.
    #[inline]
    pub fn as_mut(&mut self) -> ColMut<'_, T> {
        let nrows = self.inner.nrows();
        unsafe { ColMut::from_raw_parts(self.inner.as_mut_ptr(), nrows, 1) }
    }
}

impl<T: ComplexField> Clone for Col<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ComplexField> Index<usize> for Col<T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, i: usize) -> &T {
        self.inner.as_ref().get(i, 0)
    }
}

impl<T: ComplexField> IndexMut<usize> for Col<T> {
    #[track_caller]
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut T {
        self.inner.as_mut().get(i, 0)
    }
}

/// Returns a [`Mat`] containing the arguments.
///
/// # Example
///
/// ```
/// use team_kernels::mat;
///
/// let m = mat![
///     [0.0, 3.0, 6.0],
///     [1.0, 4.0, 7.0],
///     [2.0, 5.0, 8.0],
/// ];
///
/// assert_eq!(m[(0, 1)], 3.0);
/// assert_eq!(m[(2, 2)], 8.0);
/// ```
#[macro_export]
macro_rules! mat {
    () => {
        {
            compile_error!("number of columns in the matrix is ambiguous");
        }
    };

    ($([$($v:expr),* $(,)?] ),* $(,)?) => {
        {
            let rows = [$([$($v,)*],)*];
            let nrows = rows.len();
            let ncols = rows[0].len();
            $crate::Mat::<_>::with_dims(|i, j| rows[i][j], nrows, ncols)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_slice() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let slice = unsafe { MatRef::from_raw_parts(data.as_ptr(), 2, 3, 3, 1) };

        fancy_assert!(slice.rb().get(0, 0) == &1.0);
        fancy_assert!(slice.rb().get(0, 1) == &2.0);
        fancy_assert!(slice.rb().get(0, 2) == &3.0);

        fancy_assert!(slice.rb().get(1, 0) == &4.0);
        fancy_assert!(slice.rb().get(1, 1) == &5.0);
        fancy_assert!(slice.rb().get(1, 2) == &6.0);

        let t = slice.transpose();
        fancy_assert!(t.nrows() == 3);
        fancy_assert!(t.ncols() == 2);
        fancy_assert!(t.get(2, 1) == &6.0);
    }

    #[test]
    fn basic_slice_mut() {
        let mut data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut slice = unsafe { MatMut::from_raw_parts(data.as_mut_ptr(), 2, 3, 3, 1) };

        *slice.rb_mut().get(0, 0) = -1.0;
        *slice.rb_mut().get(1, 2) = -6.0;

        fancy_assert!(data == [-1.0, 2.0, 3.0, 4.0, 5.0, -6.0]);
    }

    #[test]
    fn subviews() {
        let m = mat![
            [0.0, 4.0, 8.0, 12.0],
            [1.0, 5.0, 9.0, 13.0],
            [2.0, 6.0, 10.0, 14.0],
            [3.0, 7.0, 11.0, 15.0],
        ];

        let sub = m.as_ref().submatrix(1, 2, 2, 2);
        fancy_assert!(sub[(0, 0)] == 9.0);
        fancy_assert!(sub[(0, 1)] == 13.0);
        fancy_assert!(sub[(1, 0)] == 10.0);
        fancy_assert!(sub[(1, 1)] == 14.0);

        let col = unsafe { m.as_ref().col_unchecked(1) };
        fancy_assert!(col[0] == 4.0);
        fancy_assert!(col[3] == 7.0);

        let tail = unsafe { col.subrows_unchecked(2, 2) };
        fancy_assert!(tail[0] == 6.0);
        fancy_assert!(tail[1] == 7.0);
    }

    #[test]
    fn mutable_subviews() {
        let mut m = mat![[1.0, 3.0], [2.0, 4.0]];
        {
            let mm = m.as_mut();
            let mut col = unsafe { mm.col_unchecked(1) };
            *col.get(0) = -3.0;

            let frozen = col.into_const();
            fancy_assert!(frozen[0] == -3.0);
            fancy_assert!(frozen[1] == 4.0);
            let frozen = frozen.into_const();
            fancy_assert!(frozen.nrows() == 2);
        }
        fancy_assert!(m[(0, 1)] == -3.0);

        let frozen = m.as_mut().into_const();
        fancy_assert!(frozen[(1, 0)] == 2.0);
        let frozen = frozen.into_const();
        fancy_assert!(frozen.ncols() == 2);
    }

    #[test]
    fn shared_col() {
        let mut b = Col::<f64>::with_dims(|i| i as f64, 5);
        let shared = SharedColMut::from_mut(b.as_mut());
        unsafe {
            fancy_assert!(shared.read(3) == 3.0);
            shared.write(3, -3.0);
            let tail = shared.subrows_unchecked(3, 2);
            fancy_assert!(tail.read(0) == -3.0);
            fancy_assert!(tail.read(1) == 4.0);
        }
        fancy_assert!(b[3] == -3.0);
    }

    #[test]
    fn matrix_macro() {
        let x = mat![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];

        fancy_assert!(x.nrows() == 2);
        fancy_assert!(x.ncols() == 3);

        fancy_assert!(x[(0, 0)] == 1.0);
        fancy_assert!(x[(0, 1)] == 2.0);
        fancy_assert!(x[(0, 2)] == 3.0);

        fancy_assert!(x[(1, 0)] == 4.0);
        fancy_assert!(x[(1, 1)] == 5.0);
        fancy_assert!(x[(1, 2)] == 6.0);
    }

    #[test]
    fn empty() {
        let m = Mat::<f64>::zeros(0, 0);
        fancy_assert!(m.nrows() == 0);
        fancy_assert!(m.ncols() == 0);

        let c = Col::<f64>::zeros(0);
        fancy_assert!(c.nrows() == 0);
    }

    #[test]
    fn complex_field() {
        fancy_assert!(c64::one().inv() == c64::one());
        fancy_assert!((c64::new(0.0, 2.0).inv() - c64::new(0.0, -0.5)).abs() < 1e-15);
        fancy_assert!(<f64 as ComplexField>::from_real(3.0) == 3.0);
    }
}
