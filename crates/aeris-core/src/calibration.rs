//! Compile-time least-squares calibration.
//!
//! The CO2 sensor reads consistently low against a reference instrument, and
//! the offset drifts with temperature. [`LinearModel`] fits an ordinary
//! least squares model over reference measurements entirely in `const`
//! context, so the correction costs nothing at runtime and a bad reference
//! table fails the fit at compile time rather than in the field.

use core::fmt;

/// Pivots smaller than this are treated as zero and fail the fit.
const SINGULAR_EPS: f64 = 1e-12;

/// `f64::abs` is not available in `core`.
const fn abs(value: f64) -> f64 {
    if value < 0.0 { -value } else { value }
}

/// A fitted linear model `y = b0 + b1*x1 + ... + b(B-1)*x(B-1)`.
///
/// `B` is the number of coefficients: one more than the number of input
/// variables, since the intercept gets a coefficient of its own. A model over
/// two variables is a `LinearModel<3>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearModel<const B: usize> {
    beta: [f64; B],
    ok: bool,
}

impl<const B: usize> LinearModel<B> {
    /// Fits the model to `points` by ordinary least squares.
    ///
    /// Each point is `[x1, ..., x(B-1), y]`: the input variables followed by
    /// the observed output. If the normal equations are singular (too few
    /// points, or coincident ones), the model falls back to passing its last
    /// input variable through unchanged and reports [`is_fitted`] as `false`.
    ///
    /// [`is_fitted`]: Self::is_fitted
    pub const fn fit(points: &[[f64; B]]) -> Self {
        // Accumulate the normal equations X'X * beta = X'y directly; the
        // design matrix never needs to be materialized.
        let mut xtx = [[0.0f64; B]; B];
        let mut xty = [0.0f64; B];

        let mut p = 0;
        while p < points.len() {
            let point = points[p];

            // Design vector: leading 1 for the intercept, then the variables.
            let mut x = [1.0f64; B];
            let mut i = 1;
            while i < B {
                x[i] = point[i - 1];
                i += 1;
            }
            let y = point[B - 1];

            let mut row = 0;
            while row < B {
                let mut col = 0;
                while col < B {
                    xtx[row][col] += x[row] * x[col];
                    col += 1;
                }
                xty[row] += x[row] * y;
                row += 1;
            }
            p += 1;
        }

        match solve(xtx, xty) {
            Some(beta) => Self { beta, ok: true },
            None => {
                let mut beta = [0.0; B];
                beta[B - 1] = 1.0;
                Self { beta, ok: false }
            }
        }
    }

    /// Whether the fit succeeded. A model that did not fit passes its last
    /// input variable through [`apply`](Self::apply) unchanged.
    pub const fn is_fitted(&self) -> bool {
        self.ok
    }

    /// The fitted coefficients, intercept first.
    pub const fn coefficients(&self) -> &[f64; B] {
        &self.beta
    }

    /// Evaluates the model at `vars`, which must hold `B - 1` values.
    pub fn apply(&self, vars: &[f64]) -> f64 {
        debug_assert_eq!(vars.len(), B - 1);
        let mut y = self.beta[0];
        for (coefficient, var) in self.beta[1..].iter().zip(vars) {
            y += coefficient * var;
        }
        y
    }
}

impl<const B: usize> fmt::Display for LinearModel<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.beta[0])?;
        for (i, coefficient) in self.beta[1..].iter().enumerate() {
            write!(f, " + {}x{}", coefficient, i + 1)?;
        }
        Ok(())
    }
}

/// Solves `a * x = b` by Gauss-Jordan elimination with partial pivoting.
/// Returns `None` when `a` is singular.
const fn solve<const B: usize>(mut a: [[f64; B]; B], mut b: [f64; B]) -> Option<[f64; B]> {
    let mut col = 0;
    while col < B {
        // Pick the largest remaining entry in this column as the pivot.
        let mut pivot = col;
        let mut row = col + 1;
        while row < B {
            if abs(a[row][col]) > abs(a[pivot][col]) {
                pivot = row;
            }
            row += 1;
        }
        if abs(a[pivot][col]) < SINGULAR_EPS {
            return None;
        }
        if pivot != col {
            let swapped = a[pivot];
            a[pivot] = a[col];
            a[col] = swapped;
            let swapped = b[pivot];
            b[pivot] = b[col];
            b[col] = swapped;
        }

        let diagonal = a[col][col];
        let mut c = 0;
        while c < B {
            a[col][c] /= diagonal;
            c += 1;
        }
        b[col] /= diagonal;

        let mut row = 0;
        while row < B {
            if row != col {
                let factor = a[row][col];
                let mut c = 0;
                while c < B {
                    a[row][c] -= factor * a[col][c];
                    c += 1;
                }
                b[row] -= factor * b[col];
            }
            row += 1;
        }
        col += 1;
    }
    Some(b)
}

/// Reference measurements for the CO2 correction model, one row per
/// simultaneous reading: sensor temperature, sensor CO2 ppm, and the ppm a
/// Temtop reference instrument showed at the same moment.
const CO2_REFERENCE_POINTS: [[f64; 3]; 25] = [
    [13.0, 540.0, 571.0],
    [13.0, 563.0, 631.0],
    [14.0, 580.0, 676.0],
    [15.0, 482.0, 413.0],
    [15.0, 571.0, 561.0],
    [15.0, 582.0, 663.0],
    [15.0, 621.0, 726.0],
    [15.0, 631.0, 704.0],
    [15.0, 686.0, 859.0],
    [15.0, 704.0, 891.0],
    [16.0, 621.0, 752.0],
    [16.0, 600.0, 670.0],
    [16.0, 631.0, 696.0],
    [16.0, 644.0, 751.0],
    [16.0, 723.0, 933.0],
    [17.0, 609.0, 755.0],
    [17.0, 618.0, 767.0],
    [17.0, 637.0, 834.0],
    [17.0, 642.0, 838.0],
    [17.0, 734.0, 1009.0],
    [18.0, 565.0, 681.0],
    [20.0, 530.0, 630.0],
    [21.0, 527.0, 700.0],
    [21.0, 529.0, 703.0],
    [21.0, 553.0, 723.0],
];

/// Correction model for the CO2 sensor: maps (temperature, raw ppm) to the
/// ppm the reference instrument would have shown.
pub const CO2_CORRECTION: LinearModel<3> = LinearModel::fit(&CO2_REFERENCE_POINTS);

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "{actual} != {expected} (within 1e-6)"
        );
    }

    #[test]
    fn fits_a_line_through_three_points() {
        // y = 1.25x - 0.5, give or take the scatter in the middle point.
        const F: LinearModel<2> = LinearModel::fit(&[[1.0, 1.0], [2.0, 1.5], [3.0, 3.5]]);
        assert!(F.is_fitted());
        assert_close(F.coefficients()[0], -0.5);
        assert_close(F.coefficients()[1], 1.25);
        assert_close(F.apply(&[0.0]), -0.5);
        assert_close(F.apply(&[1.0]), 0.75);
    }

    #[test]
    fn fits_a_line_through_a_larger_sample() {
        const F: LinearModel<2> = LinearModel::fit(&[
            [455.0, 491.0],
            [553.0, 663.0],
            [673.0, 945.0],
            [728.0, 1043.0],
            [855.0, 1320.0],
        ]);
        assert_close(F.coefficients()[0], -474.8807657383727);
        assert_close(F.coefficients()[1], 2.094486467123733);
        assert_close(F.apply(&[0.0]), -474.8807657383727);
    }

    #[test]
    fn exactly_determined_two_variable_fit() {
        const F: LinearModel<3> =
            LinearModel::fit(&[[15.0, 20.0, 400.0], [7.0, 17.0, 300.0], [2.0, 15.0, 200.0]]);
        assert!(F.is_fitted());
        assert_close(F.coefficients()[0], -4100.0);
        assert_close(F.coefficients()[1], -100.0);
        assert_close(F.coefficients()[2], 300.0);
    }

    #[test]
    fn coincident_points_cannot_be_fitted() {
        const F: LinearModel<2> = LinearModel::fit(&[[1.0, 1.0], [1.0, 1.0]]);
        assert!(!F.is_fitted());
        // The fallback passes the input through unchanged.
        assert_close(F.apply(&[7.0]), 7.0);
    }

    #[test]
    fn empty_input_cannot_be_fitted() {
        const F: LinearModel<2> = LinearModel::fit(&[]);
        assert!(!F.is_fitted());
    }

    #[test]
    fn co2_correction_matches_the_reference_instrument() {
        assert!(CO2_CORRECTION.is_fitted());
        let beta = CO2_CORRECTION.coefficients();
        assert_close(beta[0], -785.0154794555967);
        assert_close(beta[1], 21.127566360951395);
        assert_close(beta[2], 1.922829941945308);

        assert_close(CO2_CORRECTION.apply(&[16.0, 600.0]), 706.7235474868105);
        assert_close(CO2_CORRECTION.apply(&[17.0, 734.0]), 985.5103260684332);
    }
}
