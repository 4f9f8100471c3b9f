//! Level smoothing: the outer inexact-Newton iteration, the inner pointwise
//! Jacobi relaxation of the linearized system, and the backtracking line
//! search that damps each Newton step.

use crate::error::{FasError, Result};
use crate::hierarchy::MIN_DEPTH;
use crate::operator::{self, LevelView};
use crate::solver::FasMultigrid;

/// Sweep cap after which a non-decreasing inner residual counts as a stall.
const STALL_SWEEPS: usize = 500;

/// Number of line-search trials; λ steps from 1.00 down to 0.01.
const LAMBDA_STEPS: usize = 100;

impl FasMultigrid {
    /// Relax the solution at one depth with up to `max_iters` outer Newton
    /// iterations. Both relaxation schemes currently share this flow.
    ///
    /// An inner-relaxation stall abandons the level (the solve goes on); a
    /// failed line search or a domain error aborts the solve.
    pub(crate) fn smooth(&mut self, depth: usize, max_iters: usize) -> Result<()> {
        let depth_idx = self.levels.depth_index(depth);
        for _ in 0..max_iters {
            // Check first: a perfect guess must not reach the inner solver.
            if self.max_residual_all_eqs(depth) < self.cfg.relaxation_tolerance {
                break;
            }

            // jac_rhs = -(F(u) - coarse_src), norm = Σ (F - src)²
            let mut norm = 0.0;
            for e in 0..self.num_fields() {
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
                norm += operator::fill_newton_rhs(
                    &view,
                    e,
                    &self.coarse_src[e][depth_idx],
                    &mut self.jac_rhs[e][depth_idx],
                );
            }
            self.stats.newton_steps += 1;

            match self.jacobian_relax(depth_idx, norm, 1.0, 0) {
                Ok(()) => {}
                Err(FasError::InnerSolveStalled { sweeps, residual }) => {
                    log::warn!(
                        "unable to solve the Jacobian system at depth {depth} within {sweeps} sweeps (residual² {residual:.3e})"
                    );
                    self.stats.inner_stalls += 1;
                    break;
                }
                Err(err) => return Err(err),
            }

            self.apply_damped_step(depth, depth_idx, norm)?;
        }
        Ok(())
    }

    /// Inner solve of `J(u)·v = jac_rhs` by pointwise Jacobi iteration on the
    /// correction, starting from v = 0.
    ///
    /// Stops once `‖J·v − rhs‖² ≤ min(‖rhs‖^(2(p+1))·C², ‖rhs‖²)`; `norm` is
    /// `‖rhs‖²`. Stalls out when `STALL_SWEEPS` sweeps have not decreased the
    /// residual against the previous sweep.
    fn jacobian_relax(&mut self, depth_idx: usize, norm: f64, c: f64, p: i32) -> Result<()> {
        let n = self.num_fields();
        for e in 0..n {
            self.damping_v[e][depth_idx].zero();
        }
        if norm == 0.0 {
            return Ok(());
        }
        let target = (norm.powi(p + 1) * c * c).min(norm);

        let mut residual = f64::INFINITY;
        let mut sweeps = 0usize;
        while residual >= target {
            // All cells and all equations read the previous sweep's v.
            for e in 0..n {
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
                operator::jacobi_sweep_into(
                    &view,
                    e,
                    &self.jac_rhs[e][depth_idx],
                    &mut self.scratch[e][depth_idx],
                );
            }
            for e in 0..n {
                let (dst, src) = (&mut self.damping_v[e][depth_idx], &self.scratch[e][depth_idx]);
                dst.copy_from(src);
            }
            sweeps += 1;
            self.stats.inner_sweeps += 1;

            let previous = residual;
            residual = 0.0;
            for e in 0..n {
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
                residual += operator::linear_residual_sq(&view, e, &self.jac_rhs[e][depth_idx]);
            }

            if !residual.is_finite() {
                return Err(FasError::OutOfDomain {
                    depth: depth_idx + MIN_DEPTH,
                    detail: "non-finite residual in the inner Jacobi relaxation",
                });
            }
            if sweeps >= STALL_SWEEPS && residual >= previous {
                return Err(FasError::InnerSolveStalled { sweeps, residual });
            }
        }
        Ok(())
    }

    /// Accept `u ← u + λ·v` with λ found by backtracking from 1 in steps of
    /// 0.01, against the residual norm² captured before the step.
    ///
    /// On total failure `u` is restored from the backup taken before the
    /// optimistic step and the solve aborts.
    fn apply_damped_step(&mut self, depth: usize, depth_idx: usize, norm: f64) -> Result<()> {
        let n = self.num_fields();
        for e in 0..n {
            let (dst, src) = (&mut self.scratch[e][depth_idx], &self.u[e][depth_idx]);
            dst.copy_from(src);
        }
        for e in 0..n {
            let (u, v) = (&mut self.u[e][depth_idx], &self.damping_v[e][depth_idx]);
            u.add_scaled(1.0, v);
        }

        let mut saw_nan = false;
        for _ in 0..LAMBDA_STEPS {
            let mut sum = 0.0;
            for e in 0..n {
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
                sum += operator::residual_norm_sq(&view, e, &self.coarse_src[e][depth_idx]);
            }
            // NaN comparisons fail, so a non-finite trial keeps backtracking.
            if sum <= norm {
                return Ok(());
            }
            saw_nan |= sum.is_nan();
            self.stats.line_search_backtracks += 1;
            for e in 0..n {
                let (u, v) = (&mut self.u[e][depth_idx], &self.damping_v[e][depth_idx]);
                u.add_scaled(-0.01, v);
            }
        }

        for e in 0..n {
            let (dst, src) = (&mut self.u[e][depth_idx], &self.scratch[e][depth_idx]);
            dst.copy_from(src);
        }
        if saw_nan {
            return Err(FasError::OutOfDomain {
                depth,
                detail: "non-finite residual norm in the line search",
            });
        }
        Err(FasError::NoDampingFactor { depth })
    }
}
