//! Bracketed root finding
//!
//! Brent's method: inverse quadratic interpolation and secant steps,
//! falling back to bisection whenever an interpolated step would leave the
//! bracket or converge too slowly.

use thiserror::Error;

/// Why a bracketed search produced no root
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RootError {
    #[error("f(a) = {fa} and f(b) = {fb} do not differ in sign")]
    NotBracketed { fa: f64, fb: f64 },
    #[error("no convergence after {iterations} iterations")]
    NoConvergence { iterations: usize },
}

/// Stopping criteria for [`brent`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Absolute tolerance on x
    pub xtol: f64,
    /// Relative tolerance on x
    pub rtol: f64,
    pub max_iter: usize,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            xtol: 2e-12,
            rtol: 4.0 * f64::EPSILON,
            max_iter: 100,
        }
    }
}

/// Find a root of `f` inside `[a, b]`.
///
/// `f(a)` and `f(b)` must have opposite signs (or one of them be zero). If
/// several roots lie in the bracket, the one returned is whichever the
/// iteration converges to.
pub fn brent<F>(f: F, a: f64, b: f64, tol: &Tolerance) -> Result<f64, RootError>
where
    F: Fn(f64) -> f64,
{
    let mut xpre = a;
    let mut xcur = b;
    let mut fpre = f(xpre);
    let mut fcur = f(xcur);

    // NaN compares false everywhere, so test for a bracket positively.
    let bracketed = (fpre <= 0.0 && fcur >= 0.0) || (fpre >= 0.0 && fcur <= 0.0);
    if !bracketed {
        return Err(RootError::NotBracketed { fa: fpre, fb: fcur });
    }
    if fpre == 0.0 {
        return Ok(xpre);
    }
    if fcur == 0.0 {
        return Ok(xcur);
    }

    let mut xblk = 0.0;
    let mut fblk = 0.0;
    let mut spre = 0.0;
    let mut scur = 0.0;

    for _ in 0..tol.max_iter {
        if fpre != 0.0 && fcur != 0.0 && fpre.is_sign_negative() != fcur.is_sign_negative() {
            xblk = xpre;
            fblk = fpre;
            spre = xcur - xpre;
            scur = spre;
        }
        if fblk.abs() < fcur.abs() {
            xpre = xcur;
            xcur = xblk;
            xblk = xpre;
            fpre = fcur;
            fcur = fblk;
            fblk = fpre;
        }

        let delta = (tol.xtol + tol.rtol * xcur.abs()) / 2.0;
        let sbis = (xblk - xcur) / 2.0;
        if fcur == 0.0 || sbis.abs() < delta {
            return Ok(xcur);
        }

        if spre.abs() > delta && fcur.abs() < fpre.abs() {
            let stry = if xpre == xblk {
                // secant
                -fcur * (xcur - xpre) / (fcur - fpre)
            } else {
                // inverse quadratic interpolation
                let dpre = (fpre - fcur) / (xpre - xcur);
                let dblk = (fblk - fcur) / (xblk - xcur);
                -fcur * (fblk * dblk - fpre * dpre) / (dblk * dpre * (fblk - fpre))
            };
            if 2.0 * stry.abs() < spre.abs().min(3.0 * sbis.abs() - delta) {
                spre = scur;
                scur = stry;
            } else {
                spre = sbis;
                scur = sbis;
            }
        } else {
            spre = sbis;
            scur = sbis;
        }

        xpre = xcur;
        fpre = fcur;
        if scur.abs() > delta {
            xcur += scur;
        } else {
            xcur += if sbis > 0.0 { delta } else { -delta };
        }
        fcur = f(xcur);
    }

    Err(RootError::NoConvergence {
        iterations: tol.max_iter,
    })
}
