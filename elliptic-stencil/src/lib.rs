//! Centered finite-difference stencils on periodic 3D grids
//!
//! This crate is the derivative oracle consumed by the `fas` solver: first,
//! second and mixed second derivatives plus the Laplacian, evaluated at a
//! single grid point of a flat `&[f64]` array with periodic wrap on all three
//! axes. Stencils of accuracy order 2, 4, 6 and 8 are provided.
//!
//! Grids are stored with index `((i % nx) * ny + (j % ny)) * nz + (k % nz)`;
//! the grid spacing `h` is passed in by the caller (the solver uses the same
//! spacing along all axes).
//!
//! # Example
//!
//! ```ignore
//! use stencil::{derivative, laplacian, Axis, StencilOrder};
//!
//! let d = derivative(i, j, k, nx, ny, nz, Axis::X, &grid, h, StencilOrder::Fourth);
//! let l = laplacian(i, j, k, nx, ny, nz, &grid, h, StencilOrder::Fourth);
//! ```

/// Spatial axis of a derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Unit step along this axis as an (di, dj, dk) offset.
    #[inline]
    fn step(self) -> (isize, isize, isize) {
        match self {
            Axis::X => (1, 0, 0),
            Axis::Y => (0, 1, 0),
            Axis::Z => (0, 0, 1),
        }
    }
}

/// Accuracy order of the centered stencils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOrder {
    Second,
    Fourth,
    Sixth,
    Eighth,
}

// One-sided weights of the centered first difference; the full stencil is
// antisymmetric, so only the +m side is tabulated.
const FIRST_SECOND: [f64; 1] = [1.0 / 2.0];
const FIRST_FOURTH: [f64; 2] = [2.0 / 3.0, -1.0 / 12.0];
const FIRST_SIXTH: [f64; 3] = [3.0 / 4.0, -3.0 / 20.0, 1.0 / 60.0];
const FIRST_EIGHTH: [f64; 4] = [4.0 / 5.0, -1.0 / 5.0, 4.0 / 105.0, -1.0 / 280.0];

// One-sided weights of the centered second difference (symmetric); the
// center weight is minus the central coefficient below.
const SECOND_SECOND: [f64; 1] = [1.0];
const SECOND_FOURTH: [f64; 2] = [4.0 / 3.0, -1.0 / 12.0];
const SECOND_SIXTH: [f64; 3] = [3.0 / 2.0, -3.0 / 20.0, 1.0 / 90.0];
const SECOND_EIGHTH: [f64; 4] = [8.0 / 5.0, -1.0 / 5.0, 8.0 / 315.0, -1.0 / 560.0];

impl StencilOrder {
    /// Magnitude of the central weight of the second-difference stencil:
    /// 2, 5/2, 49/18, 205/72 for orders 2, 4, 6, 8. The solver's Jacobi
    /// relaxation uses this as the diagonal self-coupling of second
    /// derivatives and Laplacians.
    #[inline]
    pub fn central_coefficient(self) -> f64 {
        match self {
            StencilOrder::Second => 2.0,
            StencilOrder::Fourth => 2.5,
            StencilOrder::Sixth => 49.0 / 18.0,
            StencilOrder::Eighth => 205.0 / 72.0,
        }
    }

    #[inline]
    fn first_weights(self) -> &'static [f64] {
        match self {
            StencilOrder::Second => &FIRST_SECOND,
            StencilOrder::Fourth => &FIRST_FOURTH,
            StencilOrder::Sixth => &FIRST_SIXTH,
            StencilOrder::Eighth => &FIRST_EIGHTH,
        }
    }

    #[inline]
    fn second_weights(self) -> &'static [f64] {
        match self {
            StencilOrder::Second => &SECOND_SECOND,
            StencilOrder::Fourth => &SECOND_FOURTH,
            StencilOrder::Sixth => &SECOND_SIXTH,
            StencilOrder::Eighth => &SECOND_EIGHTH,
        }
    }
}

#[inline]
fn wrap(i: isize, n: usize) -> usize {
    i.rem_euclid(n as isize) as usize
}

#[inline]
fn cell(grid: &[f64], i: isize, j: isize, k: isize, nx: usize, ny: usize, nz: usize) -> f64 {
    grid[(wrap(i, nx) * ny + wrap(j, ny)) * nz + wrap(k, nz)]
}

/// Centered first derivative along `axis` at (i, j, k), scaled by `1/h`.
#[allow(clippy::too_many_arguments)]
pub fn derivative(
    i: usize,
    j: usize,
    k: usize,
    nx: usize,
    ny: usize,
    nz: usize,
    axis: Axis,
    grid: &[f64],
    h: f64,
    order: StencilOrder,
) -> f64 {
    let (di, dj, dk) = axis.step();
    let (i, j, k) = (i as isize, j as isize, k as isize);
    let mut acc = 0.0;
    for (m, w) in order.first_weights().iter().enumerate() {
        let m = (m + 1) as isize;
        acc += w
            * (cell(grid, i + m * di, j + m * dj, k + m * dk, nx, ny, nz)
                - cell(grid, i - m * di, j - m * dj, k - m * dk, nx, ny, nz));
    }
    acc / h
}

/// Pure second derivative along `axis` at (i, j, k), scaled by `1/h²`.
#[allow(clippy::too_many_arguments)]
fn pure_second(
    i: usize,
    j: usize,
    k: usize,
    nx: usize,
    ny: usize,
    nz: usize,
    axis: Axis,
    grid: &[f64],
    h: f64,
    order: StencilOrder,
) -> f64 {
    let (di, dj, dk) = axis.step();
    let (i, j, k) = (i as isize, j as isize, k as isize);
    let mut acc = -order.central_coefficient() * cell(grid, i, j, k, nx, ny, nz);
    for (m, w) in order.second_weights().iter().enumerate() {
        let m = (m + 1) as isize;
        acc += w
            * (cell(grid, i + m * di, j + m * dj, k + m * dk, nx, ny, nz)
                + cell(grid, i - m * di, j - m * dj, k - m * dk, nx, ny, nz));
    }
    acc / (h * h)
}

/// Second derivative with respect to `a1` and `a2` at (i, j, k), scaled by
/// `1/h²`. Equal axes give the pure second difference; distinct axes give the
/// mixed derivative as the tensor product of two first differences, whose
/// central weight is zero.
#[allow(clippy::too_many_arguments)]
pub fn double_derivative(
    i: usize,
    j: usize,
    k: usize,
    nx: usize,
    ny: usize,
    nz: usize,
    a1: Axis,
    a2: Axis,
    grid: &[f64],
    h: f64,
    order: StencilOrder,
) -> f64 {
    if a1 == a2 {
        return pure_second(i, j, k, nx, ny, nz, a1, grid, h, order);
    }
    let (pi, pj, pk) = a1.step();
    let (qi, qj, qk) = a2.step();
    let (i, j, k) = (i as isize, j as isize, k as isize);
    let weights = order.first_weights();
    let mut acc = 0.0;
    for (ma, wa) in weights.iter().enumerate() {
        let ma = (ma + 1) as isize;
        for (mb, wb) in weights.iter().enumerate() {
            let mb = (mb + 1) as isize;
            let pp = cell(
                grid,
                i + ma * pi + mb * qi,
                j + ma * pj + mb * qj,
                k + ma * pk + mb * qk,
                nx,
                ny,
                nz,
            );
            let pm = cell(
                grid,
                i + ma * pi - mb * qi,
                j + ma * pj - mb * qj,
                k + ma * pk - mb * qk,
                nx,
                ny,
                nz,
            );
            let mp = cell(
                grid,
                i - ma * pi + mb * qi,
                j - ma * pj + mb * qj,
                k - ma * pk + mb * qk,
                nx,
                ny,
                nz,
            );
            let mm = cell(
                grid,
                i - ma * pi - mb * qi,
                j - ma * pj - mb * qj,
                k - ma * pk - mb * qk,
                nx,
                ny,
                nz,
            );
            acc += wa * wb * (pp - pm - mp + mm);
        }
    }
    acc / (h * h)
}

/// Laplacian at (i, j, k): the sum of the three pure second derivatives.
#[allow(clippy::too_many_arguments)]
pub fn laplacian(
    i: usize,
    j: usize,
    k: usize,
    nx: usize,
    ny: usize,
    nz: usize,
    grid: &[f64],
    h: f64,
    order: StencilOrder,
) -> f64 {
    pure_second(i, j, k, nx, ny, nz, Axis::X, grid, h, order)
        + pure_second(i, j, k, nx, ny, nz, Axis::Y, grid, h, order)
        + pure_second(i, j, k, nx, ny, nz, Axis::Z, grid, h, order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    const N: usize = 32;

    fn sampled<F: Fn(f64, f64, f64) -> f64>(f: F) -> Vec<f64> {
        let mut grid = vec![0.0; N * N * N];
        for i in 0..N {
            for j in 0..N {
                for k in 0..N {
                    let (x, y, z) = (
                        i as f64 / N as f64,
                        j as f64 / N as f64,
                        k as f64 / N as f64,
                    );
                    grid[(i * N + j) * N + k] = f(x, y, z);
                }
            }
        }
        grid
    }

    #[test]
    fn first_derivative_matches_analytic() {
        let grid = sampled(|x, _, _| (2.0 * PI * x).sin());
        let h = 1.0 / N as f64;

        // Tolerance shrinks with the stencil order.
        let cases = [
            (StencilOrder::Second, 3e-2),
            (StencilOrder::Fourth, 2e-3),
            (StencilOrder::Sixth, 2e-4),
            (StencilOrder::Eighth, 2e-5),
        ];
        for (order, tol) in cases {
            for i in [0, 5, 17, N - 1] {
                let got = derivative(i, 3, 9, N, N, N, Axis::X, &grid, h, order);
                let want = 2.0 * PI * (2.0 * PI * i as f64 / N as f64).cos();
                assert_relative_eq!(got, want, epsilon = tol * 2.0 * PI);
            }
        }
    }

    #[test]
    fn second_derivative_matches_analytic() {
        let grid = sampled(|_, y, _| (2.0 * PI * y).sin());
        let h = 1.0 / N as f64;
        let want = |j: usize| -(2.0 * PI).powi(2) * (2.0 * PI * j as f64 / N as f64).sin();

        for j in [1, 8, 30] {
            let got = double_derivative(
                4,
                j,
                2,
                N,
                N,
                N,
                Axis::Y,
                Axis::Y,
                &grid,
                h,
                StencilOrder::Sixth,
            );
            assert_relative_eq!(got, want(j), epsilon = 1e-3);
        }
    }

    #[test]
    fn mixed_derivative_matches_analytic() {
        let grid = sampled(|x, y, _| (2.0 * PI * x).sin() * (2.0 * PI * y).sin());
        let h = 1.0 / N as f64;

        let (i, j) = (3, 11);
        let got = double_derivative(
            i,
            j,
            0,
            N,
            N,
            N,
            Axis::X,
            Axis::Y,
            &grid,
            h,
            StencilOrder::Fourth,
        );
        let want = (2.0 * PI).powi(2)
            * (2.0 * PI * i as f64 / N as f64).cos()
            * (2.0 * PI * j as f64 / N as f64).cos();
        assert_relative_eq!(got, want, epsilon = 1e-2 * (2.0 * PI).powi(2));
    }

    #[test]
    fn derivatives_of_constant_vanish() {
        let grid = vec![7.5; 4 * 4 * 4];
        for order in [
            StencilOrder::Second,
            StencilOrder::Fourth,
            StencilOrder::Sixth,
            StencilOrder::Eighth,
        ] {
            assert_eq!(
                derivative(1, 2, 3, 4, 4, 4, Axis::Z, &grid, 0.25, order),
                0.0
            );
            assert_relative_eq!(
                laplacian(1, 2, 3, 4, 4, 4, &grid, 0.25, order),
                0.0,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn central_weight_matches_coefficient() {
        // A unit impulse isolates the central weight of the second difference.
        let mut grid = vec![0.0; 8 * 8 * 8];
        grid[(2 * 8 + 3) * 8 + 4] = 1.0;
        let h = 0.5;
        for order in [
            StencilOrder::Second,
            StencilOrder::Fourth,
            StencilOrder::Sixth,
            StencilOrder::Eighth,
        ] {
            let got = double_derivative(2, 3, 4, 8, 8, 8, Axis::X, Axis::X, &grid, h, order);
            assert_relative_eq!(got, -order.central_coefficient() / (h * h), epsilon = 1e-14);
            let lap = laplacian(2, 3, 4, 8, 8, 8, &grid, h, order);
            assert_relative_eq!(
                lap,
                -3.0 * order.central_coefficient() / (h * h),
                epsilon = 1e-13
            );
            // A mixed stencil has no central weight.
            let mixed = double_derivative(2, 3, 4, 8, 8, 8, Axis::X, Axis::Z, &grid, h, order);
            assert_eq!(mixed, 0.0);
        }
    }

    #[test]
    fn periodic_wrap_is_seamless() {
        let grid = sampled(|x, _, _| (2.0 * PI * x).sin());
        let h = 1.0 / N as f64;
        // The stencil at i = 0 reaches across the boundary; for a periodic
        // field this must be as accurate as an interior point.
        let boundary = derivative(0, 0, 0, N, N, N, Axis::X, &grid, h, StencilOrder::Eighth);
        assert_relative_eq!(boundary, 2.0 * PI, epsilon = 1e-5);
        let opposite = derivative(N / 2, 0, 0, N, N, N, Axis::X, &grid, h, StencilOrder::Eighth);
        assert_relative_eq!(opposite, -boundary, epsilon = 1e-9);
    }
}
