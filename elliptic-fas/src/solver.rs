//! Solver construction, configuration and the equation-building API.

use stencil::StencilOrder;

use crate::diagnostics::SolveStats;
use crate::equation::{Atom, Equation};
use crate::error::{FasError, Result};
use crate::grid::Grid;
use crate::hierarchy::{Hierarchy, Levels, MIN_DEPTH};
use crate::transfer;

/// Outer relaxation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxScheme {
    /// Inexact Newton: the linear Newton system is solved only until its
    /// residual drops below the nonlinear residual.
    InexactNewton,
    /// Reserved extension point for a volume-constrained variant; currently
    /// follows the same control flow as [`RelaxScheme::InexactNewton`].
    InexactNewtonConstrained,
}

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct FasConfig {
    /// Depth of the finest level; the coarsest is depth 1.
    pub max_depth: usize,
    /// Maximum outer Newton iterations per smoothing call.
    pub max_relax_iters: usize,
    /// Target for the max-norm residual at every level.
    pub relaxation_tolerance: f64,
    /// Accuracy order of the finite-difference stencils.
    pub stencil_order: StencilOrder,
    /// Physical edge length of the periodic box; the grid spacing at a level
    /// is `domain_length / nx`.
    pub domain_length: f64,
    /// Outer relaxation scheme.
    pub relax_scheme: RelaxScheme,
}

impl Default for FasConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_relax_iters: 50,
            relaxation_tolerance: 1e-8,
            stencil_order: StencilOrder::Second,
            domain_length: 1.0,
            relax_scheme: RelaxScheme::InexactNewton,
        }
    }
}

/// Full Approximation Storage multigrid solver for a coupled system of
/// nonlinear elliptic equations on periodic uniform 3D grids.
///
/// The solver owns one grid hierarchy per named role and per field: the
/// approximation `u`, the FAS source, the Newton right-hand side, the
/// correction, plus two scratch stacks, and one source hierarchy per
/// (equation, molecule) pair. Everything is allocated at construction; no
/// grid is allocated once cycles run.
pub struct FasMultigrid {
    pub(crate) cfg: FasConfig,
    pub(crate) levels: Levels,
    pub(crate) eqns: Vec<Equation>,
    /// Current approximation; the finest grid is the caller's.
    pub(crate) u: Vec<Hierarchy>,
    /// Holds the pre-correction approximation during ascent.
    pub(crate) tmp: Vec<Hierarchy>,
    /// FAS right-hand side τ per level.
    pub(crate) coarse_src: Vec<Hierarchy>,
    /// −F(u), the right-hand side of the linearized solve.
    pub(crate) jac_rhs: Vec<Hierarchy>,
    /// Newton correction v.
    pub(crate) damping_v: Vec<Hierarchy>,
    /// Double buffer for the Jacobi sweep; also backs up `u` in the line
    /// search so failure can restore it exactly.
    pub(crate) scratch: Vec<Hierarchy>,
    /// Per-(equation, molecule) sources feeding `Atom::Constant`.
    pub(crate) rho: Vec<Vec<Hierarchy>>,
    pub(crate) stats: SolveStats,
    pub(crate) rho_initialized: bool,
}

impl FasMultigrid {
    /// Build a solver for `u_finest.len()` coupled fields.
    ///
    /// `u_finest` holds the finest-level approximation of every field (all
    /// grids must share extents) and doubles as the initial guess;
    /// `molecule_counts[e]` fixes how many molecules equation `e` owns, so
    /// that one source hierarchy per molecule can be allocated up front.
    pub fn new(
        u_finest: Vec<Grid>,
        molecule_counts: &[usize],
        config: FasConfig,
    ) -> Result<Self> {
        let mut config = config;
        config.max_depth = config.max_depth.max(MIN_DEPTH);
        let fields = u_finest.len();
        let finest_dims = u_finest
            .first()
            .map(|g| g.dims())
            .unwrap_or(crate::grid::GridDims::new(1, 1, 1));
        for g in &u_finest {
            if g.dims() != finest_dims {
                return Err(FasError::GridSizeMismatch {
                    expected: finest_dims.extents(),
                    got: g.dims().extents(),
                });
            }
        }
        if molecule_counts.len() != fields {
            return Err(FasError::MoleculeCountMismatch {
                fields,
                got: molecule_counts.len(),
            });
        }

        let levels = Levels::new(finest_dims, config.max_depth);
        let finest_idx = levels.finest_index();

        let mut u: Vec<Hierarchy> = Vec::with_capacity(fields);
        for grid in u_finest {
            let mut stack = levels.alloc_hierarchy();
            stack[finest_idx] = grid;
            u.push(stack);
        }

        let alloc_set = |n: usize| -> Vec<Hierarchy> {
            (0..n).map(|_| levels.alloc_hierarchy()).collect()
        };
        let tmp = alloc_set(fields);
        let coarse_src = alloc_set(fields);
        let jac_rhs = alloc_set(fields);
        let damping_v = alloc_set(fields);
        let scratch = alloc_set(fields);
        let rho = molecule_counts.iter().map(|&m| alloc_set(m)).collect();

        let eqns = molecule_counts
            .iter()
            .map(|&m| Equation::with_molecules(m))
            .collect();

        Ok(Self {
            cfg: config,
            levels,
            eqns,
            u,
            tmp,
            coarse_src,
            jac_rhs,
            damping_v,
            scratch,
            rho,
            stats: SolveStats::default(),
            rho_initialized: false,
        })
    }

    /// Number of coupled fields (equal to the number of equations).
    pub fn num_fields(&self) -> usize {
        self.eqns.len()
    }

    pub fn config(&self) -> &FasConfig {
        &self.cfg
    }

    /// Set the constant coefficient of a molecule.
    pub fn init_molecule(&mut self, eqn_id: usize, mol_id: usize, const_coef: f64) -> Result<()> {
        self.check_molecule(eqn_id, mol_id)?;
        self.eqns[eqn_id].molecules[mol_id].const_coef = const_coef;
        Ok(())
    }

    /// Append an atom to a molecule of an equation.
    pub fn add_atom_to_eqn(&mut self, atom: Atom, mol_id: usize, eqn_id: usize) -> Result<()> {
        self.check_molecule(eqn_id, mol_id)?;
        if let Some(u_id) = atom.field() {
            if u_id >= self.num_fields() {
                return Err(FasError::FieldOutOfRange {
                    u_id,
                    fields: self.num_fields(),
                });
            }
        }
        self.eqns[eqn_id].molecules[mol_id].atoms.push(atom);
        Ok(())
    }

    /// Write one finest-level source cell for a molecule's `Atom::Constant`
    /// factors. Indices wrap periodically.
    pub fn set_poly_src_at_pt(
        &mut self,
        eqn_id: usize,
        mol_id: usize,
        i: usize,
        j: usize,
        k: usize,
        value: f64,
    ) -> Result<()> {
        self.check_molecule(eqn_id, mol_id)?;
        let finest = self.levels.finest_index();
        self.rho[eqn_id][mol_id][finest].set(i as isize, j as isize, k as isize, value);
        Ok(())
    }

    /// Restrict every source hierarchy from the finest level down. Call once,
    /// after all source values are set and before running cycles.
    pub fn initialize_rho_hierarchy(&mut self) {
        for eqn_rho in &mut self.rho {
            for stack in eqn_rho.iter_mut() {
                for fine_idx in (1..stack.len()).rev() {
                    let (coarse, fine) = stack.split_at_mut(fine_idx);
                    transfer::restrict(&fine[0], &mut coarse[fine_idx - 1]);
                }
            }
        }
        self.rho_initialized = true;
    }

    /// Finest-level solution of a field.
    pub fn solution(&self, eqn_id: usize) -> &Grid {
        &self.u[eqn_id][self.levels.finest_index()]
    }

    /// Mutable access to the finest-level solution, e.g. to seed an initial
    /// guess.
    pub fn solution_mut(&mut self, eqn_id: usize) -> &mut Grid {
        let finest = self.levels.finest_index();
        &mut self.u[eqn_id][finest]
    }

    /// Consume the solver and hand back the finest-level solutions.
    pub fn into_solutions(mut self) -> Vec<Grid> {
        let finest = self.levels.finest_index();
        self.u
            .iter_mut()
            .map(|stack| std::mem::replace(&mut stack[finest], Grid::new(self.levels.dims_at(0))))
            .collect()
    }

    /// Grid spacing at a depth index.
    pub(crate) fn spacing_at(&self, depth_idx: usize) -> f64 {
        self.levels.dims_at(depth_idx).spacing(self.cfg.domain_length)
    }

    /// True if any equation draws on a source grid.
    pub(crate) fn uses_sources(&self) -> bool {
        self.eqns
            .iter()
            .flat_map(|e| &e.molecules)
            .flat_map(|m| &m.atoms)
            .any(|a| matches!(a, Atom::Constant))
    }

    fn check_molecule(&self, eqn_id: usize, mol_id: usize) -> Result<()> {
        if eqn_id >= self.eqns.len() {
            return Err(FasError::EquationOutOfRange {
                eqn_id,
                eqns: self.eqns.len(),
            });
        }
        let molecules = self.eqns[eqn_id].molecules.len();
        if mol_id >= molecules {
            return Err(FasError::MoleculeOutOfRange {
                eqn_id,
                mol_id,
                molecules,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridDims;

    fn unit_grid(n: usize) -> Grid {
        Grid::from_fn(GridDims::new(n, n, n), |_, _, _| 1.0)
    }

    #[test]
    fn construction_validates_inputs() {
        let cfg = FasConfig::default();
        let mismatched = vec![unit_grid(8), unit_grid(4)];
        assert!(matches!(
            FasMultigrid::new(mismatched, &[1, 1], cfg.clone()),
            Err(FasError::GridSizeMismatch { .. })
        ));

        assert!(matches!(
            FasMultigrid::new(vec![unit_grid(8)], &[1, 2], cfg),
            Err(FasError::MoleculeCountMismatch { .. })
        ));
    }

    #[test]
    fn atom_validation() {
        let mut solver =
            FasMultigrid::new(vec![unit_grid(8)], &[1], FasConfig::default()).unwrap();
        assert!(matches!(
            solver.add_atom_to_eqn(Atom::Lap { u_id: 1 }, 0, 0),
            Err(FasError::FieldOutOfRange { u_id: 1, .. })
        ));
        assert!(matches!(
            solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 3, 0),
            Err(FasError::MoleculeOutOfRange { mol_id: 3, .. })
        ));
        assert!(matches!(
            solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 2),
            Err(FasError::EquationOutOfRange { eqn_id: 2, .. })
        ));
        assert!(solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0).is_ok());
    }

    #[test]
    fn source_restriction_fills_all_levels() {
        let cfg = FasConfig {
            max_depth: 3,
            ..FasConfig::default()
        };
        let mut solver = FasMultigrid::new(vec![unit_grid(8)], &[1], cfg).unwrap();
        solver.add_atom_to_eqn(Atom::Constant, 0, 0).unwrap();
        for i in 0..8 {
            for j in 0..8 {
                for k in 0..8 {
                    solver.set_poly_src_at_pt(0, 0, i, j, k, 2.0).unwrap();
                }
            }
        }
        solver.initialize_rho_hierarchy();
        // Full weighting preserves a constant on every level.
        for depth_idx in 0..3 {
            let rho = &solver.rho[0][0][depth_idx];
            assert!((rho.average() - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn solutions_round_trip() {
        let mut solver =
            FasMultigrid::new(vec![unit_grid(4), unit_grid(4)], &[0, 0], FasConfig::default())
                .unwrap();
        solver.solution_mut(1).shift(1.5);
        assert_eq!(solver.solution(0).average(), 1.0);
        assert_eq!(solver.solution(1).average(), 2.5);
        let grids = solver.into_solutions();
        assert_eq!(grids.len(), 2);
        assert_eq!(grids[1].average(), 2.5);
    }
}
