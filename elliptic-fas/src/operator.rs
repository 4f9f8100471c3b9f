//! Pointwise evaluation of the symbolic operators.
//!
//! Three evaluators work on one grid point at one depth: the equation value
//! `F_e(u)`, its Gâteaux derivative `DF_e[u_id](u)` in the direction of the
//! current Newton correction, and the split `(a, b)` of the linearization
//! used by the pointwise Jacobi update, where `b` is the coefficient the
//! center cell of the correction carries and `a` is everything else, so that
//! `a + b·v(i,j,k)` equals the full directional derivative.
//!
//! All evaluators are pure reads of the current grids; whole-grid sweeps
//! parallelize over cells with rayon.

use rayon::prelude::*;
use stencil::{derivative, double_derivative, laplacian, StencilOrder};

use crate::equation::{Atom, Equation};
use crate::grid::{Grid, GridDims};
use crate::hierarchy::Hierarchy;

/// Borrowed view of everything the pointwise evaluators read at one depth.
///
/// Built inline at call sites from individual solver fields so that output
/// grids living in *other* fields can be borrowed mutably at the same time.
pub(crate) struct LevelView<'a> {
    pub eqns: &'a [Equation],
    pub u: &'a [Hierarchy],
    pub v: &'a [Hierarchy],
    pub rho: &'a [Vec<Hierarchy>],
    pub depth_idx: usize,
    pub dims: GridDims,
    pub h: f64,
    pub order: StencilOrder,
}

impl LevelView<'_> {
    #[inline]
    pub fn num_fields(&self) -> usize {
        self.u.len()
    }

    #[inline]
    fn u_at(&self, u_id: usize) -> &Grid {
        &self.u[u_id][self.depth_idx]
    }

    #[inline]
    fn v_at(&self, u_id: usize) -> &Grid {
        &self.v[u_id][self.depth_idx]
    }

    #[inline]
    fn rho_at(&self, eqn_id: usize, mol_id: usize) -> &Grid {
        &self.rho[eqn_id][mol_id][self.depth_idx]
    }

    /// Apply a derivative atom's differential operator to an arbitrary grid.
    #[inline]
    fn apply_operator(&self, atom: &Atom, grid: &Grid, i: usize, j: usize, k: usize) -> f64 {
        let (nx, ny, nz) = self.dims.extents();
        match *atom {
            Atom::D1 { axis, .. } => {
                derivative(i, j, k, nx, ny, nz, axis, grid.values(), self.h, self.order)
            }
            Atom::D2 { axes, .. } => double_derivative(
                i,
                j,
                k,
                nx,
                ny,
                nz,
                axes.0,
                axes.1,
                grid.values(),
                self.h,
                self.order,
            ),
            Atom::Lap { .. } => laplacian(i, j, k, nx, ny, nz, grid.values(), self.h, self.order),
            Atom::Constant | Atom::Poly { .. } => unreachable!("not a differential atom"),
        }
    }

    /// Value of equation `eqn_id` at one point.
    pub fn eval_equation(&self, eqn_id: usize, i: usize, j: usize, k: usize) -> f64 {
        let idx = self.dims.index(i as isize, j as isize, k as isize);
        let mut res = 0.0;
        for (mol_id, mol) in self.eqns[eqn_id].molecules.iter().enumerate() {
            let mut val = mol.const_coef;
            for atom in &mol.atoms {
                val *= match *atom {
                    Atom::Constant => self.rho_at(eqn_id, mol_id).value(idx),
                    Atom::Poly { u_id, exponent } => self.u_at(u_id).value(idx).powf(exponent),
                    _ => self.apply_operator(atom, self.u_at(atom.field().expect("derivative atom")), i, j, k),
                };
            }
            res += val;
        }
        res
    }

    /// Gâteaux derivative of equation `eqn_id` with respect to field
    /// `u_id`, in the direction of the correction stored for `u_id`.
    ///
    /// Per molecule the running pair `(p, d)` holds the product so far and
    /// its derivative; each atom updates `d` using the value of `p` from
    /// before the atom, then updates `p`.
    pub fn eval_directional(&self, eqn_id: usize, u_id: usize, i: usize, j: usize, k: usize) -> f64 {
        let idx = self.dims.index(i as isize, j as isize, k as isize);
        let mut res = 0.0;
        for (mol_id, mol) in self.eqns[eqn_id].molecules.iter().enumerate() {
            let mut p = mol.const_coef;
            let mut d = 0.0;
            for atom in &mol.atoms {
                match *atom {
                    Atom::Constant => {
                        let x = self.rho_at(eqn_id, mol_id).value(idx);
                        p *= x;
                        d *= x;
                    }
                    Atom::Poly { u_id: a_id, exponent } => {
                        let uval = self.u_at(a_id).value(idx);
                        let x = uval.powf(exponent);
                        if a_id == u_id {
                            let vval = self.v_at(u_id).value(idx);
                            d = d * x + p * exponent * uval.powf(exponent - 1.0) * vval;
                        } else {
                            d *= x;
                        }
                        p *= x;
                    }
                    _ => {
                        let a_id = atom.field().expect("derivative atom");
                        let xu = self.apply_operator(atom, self.u_at(a_id), i, j, k);
                        if a_id == u_id {
                            // The derivative of op(u) in direction v is op(v).
                            let xv = self.apply_operator(atom, self.v_at(u_id), i, j, k);
                            d = d * xu + p * xv;
                        } else {
                            d *= xu;
                        }
                        p *= xu;
                    }
                }
            }
            res += d;
        }
        res
    }

    /// Coefficients `(a, b)` of the pointwise Jacobi update for equation
    /// `eqn_id` with respect to its diagonal field.
    ///
    /// `b` collects the coefficient of the correction's center cell: the
    /// central stencil weight of pure second derivatives and Laplacians, and
    /// the whole derivative of polynomial atoms. `a` collects the rest of
    /// the directional derivative, evaluated with the current correction.
    /// Mixed second derivatives have no central weight and first derivatives
    /// no center term, so both feed `a` only.
    pub fn jacobi_coefficients(&self, eqn_id: usize, i: usize, j: usize, k: usize) -> (f64, f64) {
        let u_id = eqn_id;
        let idx = self.dims.index(i as isize, j as isize, k as isize);
        let central = self.order.central_coefficient() / (self.h * self.h);
        let mut coef_a = 0.0;
        let mut coef_b = 0.0;
        for (mol_id, mol) in self.eqns[eqn_id].molecules.iter().enumerate() {
            let mut p = mol.const_coef;
            let mut a = 0.0;
            let mut b = 0.0;
            for atom in &mol.atoms {
                match *atom {
                    Atom::Constant => {
                        let x = self.rho_at(eqn_id, mol_id).value(idx);
                        a *= x;
                        b *= x;
                        p *= x;
                    }
                    Atom::Poly { u_id: a_id, exponent } => {
                        let uval = self.u_at(a_id).value(idx);
                        let x = uval.powf(exponent);
                        if a_id == u_id {
                            b = b * x + p * exponent * uval.powf(exponent - 1.0);
                        } else {
                            b *= x;
                        }
                        a *= x;
                        p *= x;
                    }
                    _ => {
                        let a_id = atom.field().expect("derivative atom");
                        let xu = self.apply_operator(atom, self.u_at(a_id), i, j, k);
                        if a_id == u_id {
                            let xv = self.apply_operator(atom, self.v_at(u_id), i, j, k);
                            let vc = self.v_at(u_id).value(idx);
                            // Pure second derivatives couple the center once,
                            // Laplacians once per axis, mixed ones not at all.
                            let axes = match *atom {
                                Atom::D2 { axes, .. } if axes.0 == axes.1 => 1.0,
                                Atom::Lap { .. } => 3.0,
                                _ => 0.0,
                            };
                            a = a * xu + p * (xv + axes * central * vc);
                            b = b * xu - p * axes * central;
                        } else {
                            a *= xu;
                            b *= xu;
                        }
                        p *= xu;
                    }
                }
            }
            coef_a += a;
            coef_b += b;
        }
        (coef_a, coef_b)
    }
}

/// Evaluate an equation over the whole level into `out`.
pub(crate) fn eval_equation_into(view: &LevelView<'_>, eqn_id: usize, out: &mut Grid) {
    let dims = view.dims;
    out.values_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, cell)| {
            let (i, j, k) = dims.unravel(idx);
            *cell = view.eval_equation(eqn_id, i, j, k);
        });
}

/// Residual `out = src − F(u)` over the whole level.
pub(crate) fn residual_into(view: &LevelView<'_>, eqn_id: usize, src: &Grid, out: &mut Grid) {
    let dims = view.dims;
    out.values_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, cell)| {
            let (i, j, k) = dims.unravel(idx);
            *cell = src.value(idx) - view.eval_equation(eqn_id, i, j, k);
        });
}

/// Fill the Newton right-hand side `out = −(F(u) − src)` and return
/// `Σ (F − src)²` in one sweep.
pub(crate) fn fill_newton_rhs(view: &LevelView<'_>, eqn_id: usize, src: &Grid, out: &mut Grid) -> f64 {
    let dims = view.dims;
    out.values_mut()
        .par_iter_mut()
        .enumerate()
        .map(|(idx, cell)| {
            let (i, j, k) = dims.unravel(idx);
            let t = view.eval_equation(eqn_id, i, j, k) - src.value(idx);
            *cell = -t;
            t * t
        })
        .sum()
}

/// `Σ (F(u) − src)²` over the whole level.
pub(crate) fn residual_norm_sq(view: &LevelView<'_>, eqn_id: usize, src: &Grid) -> f64 {
    let dims = view.dims;
    (0..dims.points())
        .into_par_iter()
        .map(|idx| {
            let (i, j, k) = dims.unravel(idx);
            let t = view.eval_equation(eqn_id, i, j, k) - src.value(idx);
            t * t
        })
        .sum()
}

/// `max |F(u) − src|` over the whole level.
pub(crate) fn max_abs_residual(view: &LevelView<'_>, eqn_id: usize, src: &Grid) -> f64 {
    let dims = view.dims;
    (0..dims.points())
        .into_par_iter()
        .map(|idx| {
            let (i, j, k) = dims.unravel(idx);
            (view.eval_equation(eqn_id, i, j, k) - src.value(idx)).abs()
        })
        .reduce(|| 0.0, f64::max)
}

/// Residual norm² of the linearized system for one equation:
/// `Σ (Σ_{u_id} DF_e[u_id] − rhs)²` with the current correction.
pub(crate) fn linear_residual_sq(view: &LevelView<'_>, eqn_id: usize, rhs: &Grid) -> f64 {
    let dims = view.dims;
    let n = view.num_fields();
    (0..dims.points())
        .into_par_iter()
        .map(|idx| {
            let (i, j, k) = dims.unravel(idx);
            let mut t = 0.0;
            for u_id in 0..n {
                t += view.eval_directional(eqn_id, u_id, i, j, k);
            }
            t -= rhs.value(idx);
            t * t
        })
        .sum()
}

/// One pointwise Jacobi update of the correction for one equation, written
/// into `out` so every cell reads only the previous sweep's correction.
pub(crate) fn jacobi_sweep_into(view: &LevelView<'_>, eqn_id: usize, rhs: &Grid, out: &mut Grid) {
    let dims = view.dims;
    let n = view.num_fields();
    out.values_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, cell)| {
            let (i, j, k) = dims.unravel(idx);
            let (a, b) = view.jacobi_coefficients(eqn_id, i, j, k);
            let mut t = 0.0;
            for u_id in 0..n {
                if u_id != eqn_id {
                    t += view.eval_directional(eqn_id, u_id, i, j, k);
                }
            }
            *cell = (a - rhs.value(idx) + t) / (-b);
        });
}
