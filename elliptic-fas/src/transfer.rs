//! Transfer operators between multigrid levels.
//!
//! Restriction is the 27-point full-weighting kernel (weights 1/8 for the
//! center, 1/16 per face neighbor, 1/32 per edge neighbor, 1/64 per corner),
//! gathered per coarse cell. Prolongation is trilinear interpolation,
//! gathered per fine cell: each fine cell works out which coarse cells reach
//! it, so parallel writes are disjoint by construction and no coloring or
//! atomics are needed.
//!
//! With rounding-up coarsening a fine extent may be odd; a coarse
//! contribution only survives if its target index wraps the same way under
//! the fine extents and under the doubled coarse extents, which drops the
//! ambiguous wrapped contributions instead of double-counting them.

use rayon::prelude::*;

use crate::grid::Grid;

/// Full-weighting restriction of `fine` into `coarse`.
///
/// Every coarse cell (i, j, k) averages the 3×3×3 fine neighborhood of
/// (2i, 2j, 2k) with periodic wrap.
pub fn restrict(fine: &Grid, coarse: &mut Grid) {
    let cdims = coarse.dims();
    coarse
        .values_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, cell)| {
            let (i, j, k) = cdims.unravel(idx);
            let (fi, fj, fk) = (2 * i as isize, 2 * j as isize, 2 * k as isize);
            let mut acc = 0.0;
            for di in -1..=1_isize {
                for dj in -1..=1_isize {
                    for dk in -1..=1_isize {
                        let w = 0.125 * 0.5_f64.powi((di.abs() + dj.abs() + dk.abs()) as i32);
                        acc += w * fine.at(fi + di, fj + dj, fk + dk);
                    }
                }
            }
            *cell = acc;
        });
}

/// Coarse cells reaching fine index `f` along one axis, as
/// (coarse index, number of halvings). At most two contribute.
#[inline]
fn axis_contributions(f: usize, n_fine: usize, n_coarse: usize) -> ([(usize, i32); 2], usize) {
    let doubled = 2 * n_coarse;
    let mut out = [(0usize, 0i32); 2];
    let mut count = 0;
    let f = f as isize;
    for r in [f - n_fine as isize, f, f + n_fine as isize] {
        if r < -1 || r > doubled as isize {
            continue;
        }
        // The scatter target wraps by the fine extents; it only counts when
        // the doubled coarse extents agree on where it lands.
        if r.rem_euclid(doubled as isize) != f.rem_euclid(n_fine as isize) {
            continue;
        }
        for di in -1..=1_isize {
            let twice = r - di;
            if twice.rem_euclid(2) != 0 {
                continue;
            }
            let ci = twice / 2;
            if (0..n_coarse as isize).contains(&ci) {
                out[count] = (ci as usize, di.unsigned_abs() as i32);
                count += 1;
            }
        }
    }
    (out, count)
}

/// Trilinear prolongation of `coarse` into `fine`, overwriting `fine`.
pub fn prolong(coarse: &Grid, fine: &mut Grid) {
    let fdims = fine.dims();
    let cdims = coarse.dims();
    fine.values_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, cell)| {
            let (i, j, k) = fdims.unravel(idx);
            let (ci, ni) = axis_contributions(i, fdims.nx, cdims.nx);
            let (cj, nj) = axis_contributions(j, fdims.ny, cdims.ny);
            let (ck, nk) = axis_contributions(k, fdims.nz, cdims.nz);
            let mut acc = 0.0;
            for &(ia, ha) in &ci[..ni] {
                for &(ja, hb) in &cj[..nj] {
                    for &(ka, hc) in &ck[..nk] {
                        acc += coarse.at(ia as isize, ja as isize, ka as isize)
                            * 0.5_f64.powi(ha + hb + hc);
                    }
                }
            }
            *cell = acc;
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridDims;
    use approx::assert_relative_eq;

    #[test]
    fn restriction_conserves_the_total() {
        // The kernel weights sum to one, so eight fine cells feed each coarse
        // cell: sum(coarse) * 8 == sum(fine) for even extents.
        let fine = Grid::from_fn(GridDims::new(8, 8, 8), |i, j, k| {
            ((i * 37 + j * 11 + k * 5) % 17) as f64 - 5.0
        });
        let mut coarse = Grid::new(GridDims::new(4, 4, 4));
        restrict(&fine, &mut coarse);
        assert_relative_eq!(coarse.total() * 8.0, fine.total(), epsilon = 1e-10);
    }

    #[test]
    fn restriction_of_constant_is_constant() {
        let fine = Grid::from_fn(GridDims::new(6, 6, 6), |_, _, _| 2.25);
        let mut coarse = Grid::new(GridDims::new(3, 3, 3));
        restrict(&fine, &mut coarse);
        for idx in 0..coarse.points() {
            assert_relative_eq!(coarse.value(idx), 2.25, epsilon = 1e-14);
        }
    }

    #[test]
    fn restriction_annihilates_the_checkerboard() {
        let fine = Grid::from_fn(GridDims::new(8, 8, 8), |i, j, k| {
            if (i + j + k) % 2 == 0 { 1.0 } else { -1.0 }
        });
        let mut coarse = Grid::new(GridDims::new(4, 4, 4));
        restrict(&fine, &mut coarse);
        for idx in 0..coarse.points() {
            assert_relative_eq!(coarse.value(idx), 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn prolongation_of_constant_is_constant() {
        let coarse = Grid::from_fn(GridDims::new(4, 4, 4), |_, _, _| -3.5);
        let mut fine = Grid::new(GridDims::new(8, 8, 8));
        prolong(&coarse, &mut fine);
        for idx in 0..fine.points() {
            assert_relative_eq!(fine.value(idx), -3.5, epsilon = 1e-14);
        }
    }

    #[test]
    fn prolongation_spreads_a_delta_trilinearly() {
        let mut coarse = Grid::new(GridDims::new(4, 4, 4));
        coarse.set(1, 1, 1, 1.0);
        let mut fine = Grid::new(GridDims::new(8, 8, 8));
        prolong(&coarse, &mut fine);

        assert_relative_eq!(fine.at(2, 2, 2), 1.0);
        assert_relative_eq!(fine.at(3, 2, 2), 0.5);
        assert_relative_eq!(fine.at(1, 2, 2), 0.5);
        assert_relative_eq!(fine.at(3, 3, 2), 0.25);
        assert_relative_eq!(fine.at(3, 3, 3), 0.125);
        assert_relative_eq!(fine.at(4, 2, 2), 0.0);
        // Total of the trilinear hat is 8x the coarse value.
        assert_relative_eq!(fine.total(), 8.0, epsilon = 1e-13);
    }

    #[test]
    fn restriction_handles_odd_extents() {
        // 5 -> 3 with rounding-up coarsening: a constant still restricts to
        // a constant, and a delta spreads only through genuine wrap overlaps.
        let fine = Grid::from_fn(GridDims::new(5, 5, 5), |_, _, _| 1.75);
        let mut coarse = Grid::new(GridDims::new(3, 3, 3));
        restrict(&fine, &mut coarse);
        for idx in 0..coarse.points() {
            assert_relative_eq!(coarse.value(idx), 1.75, epsilon = 1e-14);
        }

        let mut delta = Grid::new(GridDims::new(5, 5, 5));
        delta.set(0, 0, 0, 1.0);
        restrict(&delta, &mut coarse);
        // Along one axis the delta sits at the center of coarse 0 and next
        // to coarse 2, whose fine position 4 wraps around to it.
        assert_relative_eq!(coarse.at(0, 0, 0), 0.125);
        assert_relative_eq!(coarse.at(2, 0, 0), 0.0625);
        assert_relative_eq!(coarse.at(2, 2, 2), 0.015625);
        assert_eq!(coarse.at(1, 0, 0), 0.0);
    }

    #[test]
    fn prolongation_of_constant_handles_odd_extents() {
        // Per axis every fine cell still gathers weights summing to one.
        let coarse = Grid::from_fn(GridDims::new(3, 3, 3), |_, _, _| -0.75);
        let mut fine = Grid::new(GridDims::new(5, 5, 5));
        prolong(&coarse, &mut fine);
        for idx in 0..fine.points() {
            assert_relative_eq!(fine.value(idx), -0.75, epsilon = 1e-14);
        }
    }

    #[test]
    fn prolongation_drops_ambiguous_wrapped_contributions() {
        // With a 5-wide fine grid over a 3-wide coarse one, the fine wrap
        // and the doubled coarse extents disagree at the seam: coarse 0
        // does not reach fine 4, and coarse 2 does not reach fine 0.
        let mut coarse = Grid::new(GridDims::new(3, 3, 3));
        coarse.set(0, 0, 0, 1.0);
        let mut fine = Grid::new(GridDims::new(5, 5, 5));
        prolong(&coarse, &mut fine);
        assert_relative_eq!(fine.at(0, 0, 0), 1.0);
        assert_relative_eq!(fine.at(1, 0, 0), 0.5);
        assert_relative_eq!(fine.at(1, 1, 1), 0.125);
        assert_eq!(fine.at(4, 0, 0), 0.0);

        coarse.zero();
        coarse.set(2, 2, 2, 1.0);
        prolong(&coarse, &mut fine);
        assert_relative_eq!(fine.at(4, 4, 4), 1.0);
        assert_relative_eq!(fine.at(3, 4, 4), 0.5);
        assert_eq!(fine.at(0, 4, 4), 0.0);
    }

    #[test]
    fn prolongation_wraps_periodically() {
        let mut coarse = Grid::new(GridDims::new(4, 4, 4));
        coarse.set(0, 0, 0, 1.0);
        let mut fine = Grid::new(GridDims::new(8, 8, 8));
        prolong(&coarse, &mut fine);
        // The hat around fine (0,0,0) reaches index -1 == 7 on each axis.
        assert_relative_eq!(fine.at(7, 0, 0), 0.5);
        assert_relative_eq!(fine.at(7, 7, 0), 0.25);
        assert_relative_eq!(fine.at(7, 7, 7), 0.125);
    }

    #[test]
    fn two_grid_cycle_preserves_smooth_fields() {
        use std::f64::consts::PI;
        let n = 16;
        let fine = Grid::from_fn(GridDims::new(n, n, n), |i, j, k| {
            (2.0 * PI * i as f64 / n as f64).sin()
                + 0.5 * (2.0 * PI * j as f64 / n as f64).cos()
                + 0.25 * (2.0 * PI * k as f64 / n as f64).sin()
        });
        let mut coarse = Grid::new(GridDims::new(n / 2, n / 2, n / 2));
        restrict(&fine, &mut coarse);
        let mut back = Grid::new(GridDims::new(n, n, n));
        prolong(&coarse, &mut back);

        // Low-frequency content survives the round trip nearly unchanged.
        let mut err_sq = 0.0;
        let mut norm_sq = 0.0;
        for idx in 0..fine.points() {
            err_sq += (back.value(idx) - fine.value(idx)).powi(2);
            norm_sq += fine.value(idx).powi(2);
        }
        assert!(
            err_sq / norm_sq < 0.02,
            "smooth field distorted: rel err² {}",
            err_sq / norm_sq
        );

        // The highest-frequency mode is wiped out entirely.
        let cb = Grid::from_fn(GridDims::new(n, n, n), |i, j, k| {
            if (i + j + k) % 2 == 0 { 1.0 } else { -1.0 }
        });
        let mut cb_coarse = Grid::new(GridDims::new(n / 2, n / 2, n / 2));
        restrict(&cb, &mut cb_coarse);
        let mut cb_back = Grid::new(GridDims::new(n, n, n));
        prolong(&cb_coarse, &mut cb_back);
        for idx in 0..cb_back.points() {
            assert_relative_eq!(cb_back.value(idx), 0.0, epsilon = 1e-13);
        }
    }
}
