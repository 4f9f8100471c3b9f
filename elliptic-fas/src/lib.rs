//! Full Approximation Storage (FAS) multigrid for coupled nonlinear elliptic
//! PDEs on periodic uniform 3D grids.
//!
//! The solver finds fields u₁…u_N such that a user-supplied system of
//! coupled nonlinear elliptic equations Fₑ(u₁,…,u_N) = ρₑ holds to a
//! prescribed residual tolerance. Equations are built symbolically as sums
//! of products ("molecules" of "atoms"): spatially varying constants, real
//! powers of a field, and first/second/mixed derivatives or Laplacians of a
//! field. The operator and its Gâteaux derivative are evaluated pointwise
//! from that symbolic form, so no Jacobian is ever assembled.
//!
//! # Features
//!
//! - **FAS V-cycles**: full solutions stored on every level with τ-correction
//! - **Inexact-Newton smoothing**: pointwise Jacobi on the linearized system,
//!   solved to a forcing tolerance, with backtracking line-search damping
//! - **Periodic boundaries** on all three axes; grids coarsen by halving
//!   with rounding up, so extents need not be powers of two
//! - **Data-parallel sweeps**: every grid sweep and reduction runs on rayon
//!
//! # Example
//!
//! ```ignore
//! use fas::{Atom, FasConfig, FasMultigrid, Grid, GridDims};
//!
//! // Solve ∇²u = ρ on a 32³ periodic box.
//! let dims = GridDims::new(32, 32, 32);
//! let mut solver = FasMultigrid::new(vec![Grid::new(dims)], &[2], FasConfig::default())?;
//! solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0)?;
//! solver.init_molecule(0, 1, -1.0)?;
//! solver.add_atom_to_eqn(Atom::Constant, 1, 0)?;
//! // ... set_poly_src_at_pt(0, 1, i, j, k, rho_ijk) over the grid ...
//! solver.initialize_rho_hierarchy();
//! solver.vcycles(5)?;
//! let u = solver.solution(0);
//! ```

pub mod diagnostics;
pub mod equation;
pub mod error;
pub mod grid;
pub mod hierarchy;
pub mod solver;
pub mod transfer;

mod cycle;
mod operator;
mod smoother;

pub use diagnostics::{SolutionReport, SolveStats};
pub use equation::{Atom, Equation, Molecule};
pub use error::{FasError, Result};
pub use grid::{Grid, GridDims};
pub use hierarchy::{Levels, MIN_DEPTH};
pub use solver::{FasConfig, FasMultigrid, RelaxScheme};

// Re-export the stencil vocabulary so callers can build equations without
// depending on the stencil crate directly.
pub use stencil::{Axis, StencilOrder};

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
