//! Error types for the FAS multigrid solver.
//!
//! Only genuinely broken solves surface as errors; anomalies like a residual
//! still above tolerance after the last cycle, or a solution crossing zero,
//! are reported through the log instead.

use thiserror::Error;

/// Errors that can occur while building or running a solve.
#[derive(Debug, Error)]
pub enum FasError {
    /// The inner Jacobi relaxation stopped making progress. Recoverable: the
    /// smoother gives up on the current level and the solve continues.
    #[error("inner Jacobi relaxation stalled after {sweeps} sweeps (residual norm² {residual:.3e})")]
    InnerSolveStalled {
        /// Sweeps performed before the stall was detected
        sweeps: usize,
        /// Linear-system residual norm² at the stall
        residual: f64,
    },

    /// The backtracking line search found no step length in (0, 1] that
    /// reduces the residual norm. Fatal: the solve is aborted with the
    /// solution restored to its pre-step values.
    #[error("can't find a suitable damping factor at depth {depth}")]
    NoDampingFactor {
        /// Depth at which the line search failed
        depth: usize,
    },

    /// An operator evaluation left the real domain (fractional power of a
    /// negative base, or a Jacobi update divided by a vanishing diagonal).
    /// Fatal.
    #[error("operator evaluation left the real domain at depth {depth} ({detail})")]
    OutOfDomain {
        /// Depth at which the non-finite value appeared
        depth: usize,
        /// What was being computed
        detail: &'static str,
    },

    /// An atom references a solution field that does not exist.
    #[error("field id {u_id} out of range: the system has {fields} fields")]
    FieldOutOfRange {
        /// The offending field id
        u_id: usize,
        /// Number of fields in the system
        fields: usize,
    },

    /// An equation id is out of range.
    #[error("equation id {eqn_id} out of range: the system has {eqns} equations")]
    EquationOutOfRange {
        /// The offending equation id
        eqn_id: usize,
        /// Number of equations in the system
        eqns: usize,
    },

    /// A molecule id is out of range for its equation.
    #[error("equation {eqn_id} has {molecules} molecules, no molecule {mol_id}")]
    MoleculeOutOfRange {
        /// Equation the molecule was addressed in
        eqn_id: usize,
        /// The offending molecule id
        mol_id: usize,
        /// Number of molecules the equation owns
        molecules: usize,
    },

    /// The finest-level grids handed to the constructor disagree on extents.
    #[error("finest grids must share extents: expected {expected:?}, got {got:?}")]
    GridSizeMismatch {
        /// Extents of the first finest grid
        expected: (usize, usize, usize),
        /// Extents of the offending grid
        got: (usize, usize, usize),
    },

    /// `molecule_counts` does not have one entry per field.
    #[error("molecule_counts has {got} entries for {fields} fields")]
    MoleculeCountMismatch {
        /// Number of fields in the system
        fields: usize,
        /// Length of the provided molecule_counts
        got: usize,
    },
}

/// A specialized `Result` type for solver operations.
pub type Result<T> = std::result::Result<T, FasError>;

impl FasError {
    /// Returns `true` if the error aborts the whole solve rather than a
    /// single level's relaxation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FasError::InnerSolveStalled { .. })
    }
}
