//! Cylindrical Bessel functions of the first kind
//!
//! Rational approximations for J0 and J1 on the real line (Hart / Numerical
//! Recipes coefficients, absolute error near 1e-8), which is ample for
//! inverting SPAC coefficients measured to a few percent.

/// Zeroth-order Bessel function of the first kind, J0(x).
pub fn bessel_j0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let num = 57568490574.0
            + y * (-13362590354.0
                + y * (651619640.7 + y * (-11214424.18 + y * (77392.33017 + y * (-184.9052456)))));
        let den = 57568490411.0
            + y * (1029532985.0 + y * (9494680.718 + y * (59272.64853 + y * (267.8532712 + y))));
        num / den
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 0.785398164;
        let p = 1.0
            + y * (-0.1098628627e-2
                + y * (0.2734510407e-4 + y * (-0.2073370639e-5 + y * 0.2093887211e-6)));
        let q = -0.1562499995e-1
            + y * (0.1430488765e-3
                + y * (-0.6911147651e-5 + y * (0.7621095161e-6 - y * 0.934935152e-7)));
        (0.636619772 / ax).sqrt() * (xx.cos() * p - z * xx.sin() * q)
    }
}

/// First-order Bessel function of the first kind, J1(x).
///
/// d/dx J0(x) = -J1(x), which gives the local sensitivity of a SPAC
/// coefficient to the phase argument.
pub fn bessel_j1(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let num = x
            * (72362614232.0
                + y * (-7895059235.0
                    + y * (242396853.1
                        + y * (-2972611.439 + y * (15704.48260 + y * (-30.16036606))))));
        let den = 144725228442.0
            + y * (2300535178.0 + y * (18583304.74 + y * (99447.43394 + y * (376.9991397 + y))));
        num / den
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356194491;
        let p = 1.0
            + y * (0.183105e-2
                + y * (-0.3516396496e-4 + y * (0.2457520174e-5 + y * (-0.240337019e-6))));
        let q = 0.04687499995
            + y * (-0.2002690873e-3
                + y * (0.8449199096e-5 + y * (-0.88228987e-6 + y * 0.105787412e-6)));
        let ans = (0.636619772 / ax).sqrt() * (xx.cos() * p - z * xx.sin() * q);
        if x < 0.0 {
            -ans
        } else {
            ans
        }
    }
}

/// First positive zero of J0.
pub const J0_FIRST_ZERO: f64 = 2.404_825_557_695_773;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_j0_known_values() {
        assert_abs_diff_eq!(bessel_j0(0.0), 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(bessel_j0(1.0), 0.765_197_686_557_966_6, epsilon = 1e-7);
        assert_abs_diff_eq!(bessel_j0(5.0), -0.177_596_771_314_338_3, epsilon = 1e-7);
        assert_abs_diff_eq!(bessel_j0(10.0), -0.245_935_764_451_348_3, epsilon = 1e-7);
        assert_abs_diff_eq!(bessel_j0(J0_FIRST_ZERO), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_j0_is_even() {
        for &x in &[0.3, 2.7, 7.9, 8.1, 25.0] {
            assert_abs_diff_eq!(bessel_j0(-x), bessel_j0(x), epsilon = 1e-14);
        }
    }

    #[test]
    fn test_j1_known_values() {
        assert_abs_diff_eq!(bessel_j1(0.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bessel_j1(1.0), 0.440_050_585_744_933_5, epsilon = 1e-7);
        assert_abs_diff_eq!(bessel_j1(10.0), 0.043_472_746_168_861_44, epsilon = 1e-7);
        assert_abs_diff_eq!(bessel_j1(-1.0), -0.440_050_585_744_933_5, epsilon = 1e-7);
    }

    #[test]
    fn test_j0_continuous_at_branch_point() {
        assert_abs_diff_eq!(bessel_j0(8.0 - 1e-9), bessel_j0(8.0 + 1e-9), epsilon = 1e-7);
    }
}
