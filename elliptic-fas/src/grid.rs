//! Periodic 3D grids of double-precision cells.
//!
//! A [`Grid`] is a flat [`Array1<f64>`] indexed by
//! `((i % nx) * ny + (j % ny)) * nz + (k % nz)`; every access through signed
//! indices wraps on all three axes. Reductions run as rayon reductions with
//! proper combines.

use ndarray::Array1;
use rayon::prelude::*;

/// Extents of a grid, with the periodic flat-index scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridDims {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// Total number of cells.
    #[inline]
    pub fn points(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Extents as a tuple.
    #[inline]
    pub fn extents(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    /// Flat index of (i, j, k) with periodic wrap on all axes.
    #[inline]
    pub fn index(&self, i: isize, j: isize, k: isize) -> usize {
        let i = i.rem_euclid(self.nx as isize) as usize;
        let j = j.rem_euclid(self.ny as isize) as usize;
        let k = k.rem_euclid(self.nz as isize) as usize;
        (i * self.ny + j) * self.nz + k
    }

    /// Inverse of the flat-index scheme for in-range indices.
    #[inline]
    pub fn unravel(&self, idx: usize) -> (usize, usize, usize) {
        let k = idx % self.nz;
        let j = (idx / self.nz) % self.ny;
        let i = idx / (self.ny * self.nz);
        (i, j, k)
    }

    /// Extents of the next coarser level: each axis halves, rounding up for
    /// odd extents.
    pub fn coarsen(&self) -> GridDims {
        GridDims {
            nx: self.nx.div_ceil(2),
            ny: self.ny.div_ceil(2),
            nz: self.nz.div_ceil(2),
        }
    }

    /// Grid spacing for a cubic domain of the given physical length.
    #[inline]
    pub fn spacing(&self, domain_length: f64) -> f64 {
        domain_length / self.nx as f64
    }
}

/// A 3D field of `f64` cells with periodic indexing.
#[derive(Debug, Clone)]
pub struct Grid {
    dims: GridDims,
    data: Array1<f64>,
}

impl Grid {
    /// Allocate a zero-filled grid.
    pub fn new(dims: GridDims) -> Self {
        Self {
            dims,
            data: Array1::zeros(dims.points()),
        }
    }

    /// Build a grid by sampling `f` at every (i, j, k).
    pub fn from_fn<F: Fn(usize, usize, usize) -> f64>(dims: GridDims, f: F) -> Self {
        let mut grid = Grid::new(dims);
        for idx in 0..dims.points() {
            let (i, j, k) = dims.unravel(idx);
            grid.data[idx] = f(i, j, k);
        }
        grid
    }

    #[inline]
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Total number of cells; equals the storage length.
    #[inline]
    pub fn points(&self) -> usize {
        self.dims.points()
    }

    /// Cell values as a flat slice (storage is contiguous by construction).
    #[inline]
    pub fn values(&self) -> &[f64] {
        self.data.as_slice().expect("grid storage is contiguous")
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        self.data
            .as_slice_mut()
            .expect("grid storage is contiguous")
    }

    /// Value at a flat index.
    #[inline]
    pub fn value(&self, idx: usize) -> f64 {
        self.data[idx]
    }

    /// Value at (i, j, k), wrapping periodically.
    #[inline]
    pub fn at(&self, i: isize, j: isize, k: isize) -> f64 {
        self.data[self.dims.index(i, j, k)]
    }

    /// Set the cell at (i, j, k), wrapping periodically.
    #[inline]
    pub fn set(&mut self, i: isize, j: isize, k: isize, value: f64) {
        let idx = self.dims.index(i, j, k);
        self.data[idx] = value;
    }

    /// Zero every cell.
    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    /// Add a constant to every cell.
    pub fn shift(&mut self, c: f64) {
        self.values_mut().par_iter_mut().for_each(|v| *v += c);
    }

    /// In place `self += coef * other`.
    pub fn add_scaled(&mut self, coef: f64, other: &Grid) {
        debug_assert_eq!(self.dims, other.dims);
        self.values_mut()
            .par_iter_mut()
            .zip(other.values().par_iter())
            .for_each(|(a, &b)| *a += coef * b);
    }

    /// Copy all cells from a grid of the same extents.
    pub fn copy_from(&mut self, other: &Grid) {
        debug_assert_eq!(self.dims, other.dims);
        self.values_mut().copy_from_slice(other.values());
    }

    /// Sum of all cells.
    pub fn total(&self) -> f64 {
        self.values().par_iter().sum()
    }

    /// Mean of all cells.
    pub fn average(&self) -> f64 {
        self.total() / self.points() as f64
    }

    /// Largest cell value.
    pub fn max(&self) -> f64 {
        self.values()
            .par_iter()
            .copied()
            .reduce(|| f64::NEG_INFINITY, f64::max)
    }

    /// Smallest cell value.
    pub fn min(&self) -> f64 {
        self.values()
            .par_iter()
            .copied()
            .reduce(|| f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_index_is_row_major_with_wrap() {
        let d = GridDims::new(4, 3, 2);
        assert_eq!(d.index(0, 0, 0), 0);
        assert_eq!(d.index(0, 0, 1), 1);
        assert_eq!(d.index(0, 1, 0), 2);
        assert_eq!(d.index(1, 0, 0), 6);
        assert_eq!(d.index(3, 2, 1), 23);
        // Negative and overflowing indices wrap.
        assert_eq!(d.index(-1, 0, 0), d.index(3, 0, 0));
        assert_eq!(d.index(4, -3, 5), d.index(0, 0, 1));
        // unravel inverts index for in-range triples.
        for idx in 0..d.points() {
            let (i, j, k) = d.unravel(idx);
            assert_eq!(d.index(i as isize, j as isize, k as isize), idx);
        }
    }

    #[test]
    fn coarsening_rounds_up() {
        assert_eq!(GridDims::new(8, 8, 8).coarsen(), GridDims::new(4, 4, 4));
        assert_eq!(GridDims::new(5, 6, 7).coarsen(), GridDims::new(3, 3, 4));
        assert_eq!(GridDims::new(1, 1, 1).coarsen(), GridDims::new(1, 1, 1));
    }

    #[test]
    fn reductions_and_shift() {
        let dims = GridDims::new(4, 4, 4);
        let mut g = Grid::from_fn(dims, |i, j, k| (i + j + k) as f64);
        assert_relative_eq!(g.max(), 9.0);
        assert_relative_eq!(g.min(), 0.0);
        // Sum over i+j+k for 0..4 each: 3 * 4^2 * (0+1+2+3) = 288
        assert_relative_eq!(g.total(), 288.0);
        assert_relative_eq!(g.average(), 4.5);

        g.shift(1.5);
        assert_relative_eq!(g.average(), 6.0);
        assert_relative_eq!(g.min(), 1.5);

        g.zero();
        assert_eq!(g.total(), 0.0);
    }

    #[test]
    fn add_scaled_accumulates() {
        let dims = GridDims::new(2, 2, 2);
        let mut a = Grid::from_fn(dims, |_, _, _| 1.0);
        let b = Grid::from_fn(dims, |i, _, _| i as f64);
        a.add_scaled(-2.0, &b);
        assert_relative_eq!(a.at(0, 0, 0), 1.0);
        assert_relative_eq!(a.at(1, 0, 0), -1.0);
    }
}
