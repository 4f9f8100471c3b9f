//! The FAS V-cycle: descent with τ construction, coarse solves, and
//! error-correcting ascent.

use rayon::prelude::*;

use crate::error::Result;
use crate::hierarchy::MIN_DEPTH;
use crate::operator::{self, LevelView};
use crate::solver::FasMultigrid;
use crate::transfer;

impl FasMultigrid {
    /// Build the FAS coarse source at `fine_depth − 1` for every equation:
    /// `τ_c = F(R·u) + R·(τ_f − F(u))`.
    ///
    /// All fields are restricted before any coarse evaluation, so coupled
    /// equations see current values of every field on the coarse level.
    fn build_coarse_sources_at(&mut self, fine_depth: usize) {
        let fine_idx = self.levels.depth_index(fine_depth);
        let coarse_idx = fine_idx - 1;
        let n = self.num_fields();

        for e in 0..n {
            let (coarse, fine) = self.u[e].split_at_mut(fine_idx);
            transfer::restrict(&fine[0], &mut coarse[coarse_idx]);
        }

        for e in 0..n {
            // Fine-level residual, then restricted to the coarse level.
            {
                let view = LevelView {
                    eqns: &self.eqns,
                    u: &self.u,
                    v: &self.damping_v,
                    rho: &self.rho,
                    depth_idx: fine_idx,
                    dims: self.levels.dims_at(fine_idx),
                    h: self.spacing_at(fine_idx),
                    order: self.cfg.stencil_order,
                };
                operator::residual_into(
                    &view,
                    e,
                    &self.coarse_src[e][fine_idx],
                    &mut self.tmp[e][fine_idx],
                );
            }
            {
                let (coarse, fine) = self.tmp[e].split_at_mut(fine_idx);
                transfer::restrict(&fine[0], &mut coarse[coarse_idx]);
            }
            // τ_c = F(R·u) + R·r
            {
                let view = LevelView {
                    eqns: &self.eqns,
                    u: &self.u,
                    v: &self.damping_v,
                    rho: &self.rho,
                    depth_idx: coarse_idx,
                    dims: self.levels.dims_at(coarse_idx),
                    h: self.spacing_at(coarse_idx),
                    order: self.cfg.stencil_order,
                };
                operator::eval_equation_into(&view, e, &mut self.coarse_src[e][coarse_idx]);
            }
            let (dst, src) = (&mut self.coarse_src[e][coarse_idx], &self.tmp[e][coarse_idx]);
            dst.add_scaled(1.0, src);
        }
    }

    /// One V-cycle over the configured depth range.
    pub fn v_cycle(&mut self) -> Result<()> {
        let max_depth = self.cfg.max_depth;
        let iters = self.cfg.max_relax_iters;

        self.smooth(max_depth, iters)?;
        log::info!(
            "initial max residual on the finest grid: {:.6e}",
            self.max_residual_all_eqs(max_depth)
        );

        for depth in ((MIN_DEPTH + 1)..=max_depth).rev() {
            self.build_coarse_sources_at(depth);
        }
        let coarsest = self.levels.depth_index(MIN_DEPTH);
        for e in 0..self.num_fields() {
            let (dst, src) = (&mut self.tmp[e][coarsest], &self.u[e][coarsest]);
            dst.copy_from(src);
        }

        for coarse_depth in MIN_DEPTH..max_depth {
            self.smooth(coarse_depth, iters)?;
            log::info!(
                "upward stroke at depth {coarse_depth}; residual after solving: {:.6e}",
                self.max_residual_all_eqs(coarse_depth)
            );

            let coarse_idx = self.levels.depth_index(coarse_depth);
            let fine_idx = coarse_idx + 1;
            for e in 0..self.num_fields() {
                // tmp holds the pre-solve approximation; turn it into the
                // coarse-grid error.
                let (tmp, u) = (&mut self.tmp[e][coarse_idx], &self.u[e][coarse_idx]);
                tmp.values_mut()
                    .par_iter_mut()
                    .zip(u.values().par_iter())
                    .for_each(|(t, &x)| *t = x - *t);
            }
            for e in 0..self.num_fields() {
                {
                    let (coarse, fine) = self.tmp[e].split_at_mut(fine_idx);
                    transfer::prolong(&coarse[coarse_idx], &mut fine[0]);
                }
                // Correct the finer approximation, saving its prior values
                // into tmp for the next ascent step.
                let (u, t) = (&mut self.u[e][fine_idx], &mut self.tmp[e][fine_idx]);
                u.values_mut()
                    .par_iter_mut()
                    .zip(t.values_mut().par_iter_mut())
                    .for_each(|(uv, tv)| {
                        let prior = *uv;
                        *uv += *tv;
                        *tv = prior;
                    });
            }
        }

        self.smooth(max_depth, iters)?;
        log::info!(
            "final max residual on the finest grid: {:.6e}",
            self.max_residual_all_eqs(max_depth)
        );
        Ok(())
    }

    /// Run `num_cycles` V-cycles, a 10-iteration post-smooth, and the final
    /// solution report.
    pub fn vcycles(&mut self, num_cycles: usize) -> Result<()> {
        if self.uses_sources() && !self.rho_initialized {
            log::warn!("source hierarchies were never initialized; coarse levels will see zero sources");
        }

        for cycle in 0..num_cycles {
            log::info!("V-cycle {} of {num_cycles}", cycle + 1);
            self.v_cycle()?;
        }

        let max_depth = self.cfg.max_depth;
        self.smooth(max_depth, 10)?;
        let final_residual = self.max_residual_all_eqs(max_depth);
        log::info!("final solution residual: {final_residual:.6e}");
        if final_residual >= self.cfg.relaxation_tolerance {
            log::warn!("residual still above tolerance after {num_cycles} cycles");
        }

        for e in 0..self.num_fields() {
            let report = self.solution_report(e);
            if report.crosses_zero {
                log::warn!("solution for field {e} crosses zero; it may be singular at some points");
            } else {
                log::info!(
                    "solution for field {e} stays {} (no singularities)",
                    if report.min >= 0.0 { "positive" } else { "negative" }
                );
            }
            log::info!(
                "field {e} average / min / max: {:.6e} / {:.6e} / {:.6e}",
                report.average,
                report.min,
                report.max
            );
        }
        Ok(())
    }
}
