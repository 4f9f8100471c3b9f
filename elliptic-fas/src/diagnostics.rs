//! Residual diagnostics, the singularity check, and solve statistics.

use rayon::prelude::*;

use crate::operator::{self, LevelView};
use crate::solver::FasMultigrid;

/// Counters accumulated across a solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Outer Newton steps taken (all levels, all cycles).
    pub newton_steps: usize,
    /// Inner Jacobi sweeps performed.
    pub inner_sweeps: usize,
    /// Line-search trials that had to shrink λ.
    pub line_search_backtracks: usize,
    /// Inner solves abandoned as stalled.
    pub inner_stalls: usize,
}

/// Shape summary of a finest-level solution.
#[derive(Debug, Clone, Copy)]
pub struct SolutionReport {
    /// True if any cell's sign opposes cell (0, 0, 0).
    pub crosses_zero: bool,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

#[inline]
fn sign(x: f64) -> i32 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

impl FasMultigrid {
    /// `max |F_e(u) − coarse_src_e|` over a level.
    pub fn max_residual(&self, eqn_id: usize, depth: usize) -> f64 {
        let depth_idx = self.levels.depth_index(depth);
        let view = LevelView {
            eqns: &self.eqns,
            u: &self.u,
            v: &self.damping_v,
            rho: &self.rho,
            depth_idx,
            dims: self.levels.dims_at(depth_idx),
            h: self.spacing_at(depth_idx),
            order: self.cfg.stencil_order,
        };
        operator::max_abs_residual(&view, eqn_id, &self.coarse_src[eqn_id][depth_idx])
    }

    /// Largest residual over all equations at a depth.
    pub fn max_residual_all_eqs(&self, depth: usize) -> f64 {
        (0..self.num_fields())
            .map(|e| self.max_residual(e, depth))
            .fold(0.0, f64::max)
    }

    /// Sign and range summary of a field's finest-level solution.
    pub fn solution_report(&self, eqn_id: usize) -> SolutionReport {
        let u = self.solution(eqn_id);
        let reference = sign(u.value(0));
        let crosses_zero = u
            .values()
            .par_iter()
            .any(|&x| sign(x) * reference < 0);
        SolutionReport {
            crosses_zero,
            average: u.average(),
            min: u.min(),
            max: u.max(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> SolveStats {
        self.stats
    }

    /// Log one line of field 0 along the x axis at a depth, for eyeballing
    /// solution profiles.
    pub fn print_solution_strip(&self, depth: usize) {
        let depth_idx = self.levels.depth_index(depth);
        let u = &self.u[0][depth_idx];
        let dims = u.dims();
        let (j, k) = ((dims.ny / 4) as isize, (dims.nz / 4) as isize);
        let line = (0..dims.nx)
            .map(|i| format!("{:.15}", u.at(i as isize, j, k)))
            .collect::<Vec<_>>()
            .join(", ");
        log::info!("values: {{ {line} }}");
    }
}
