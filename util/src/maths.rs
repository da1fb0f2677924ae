//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Wrap an angle in radians into the range [-pi, pi].
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float,
{
    let pi_t: T = T::from(std::f64::consts::PI).unwrap();
    let tau_t: T = T::from(std::f64::consts::TAU).unwrap();

    let wrapped = rem_euclid(angle + pi_t, tau_t) - pi_t;

    // rem_euclid can hit exactly tau for values just below -pi due to
    // round-off, which would map to +pi rather than -pi.
    if wrapped > pi_t {
        wrapped - tau_t
    } else {
        wrapped
    }
}

/// Get the signed shortest angular distance from `b` to `a`.
///
/// The result is in the range [-pi, pi], accounting for wrapping.
pub fn ang_dist<T>(a: T, b: T) -> T
where
    T: Float,
{
    wrap_pi(a - b)
}

/// Clamp a value into the range [min, max].
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    let mut ret = value;

    if ret > max {
        ret = max
    }
    if ret < min {
        ret = min
    }

    ret
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::from(0.0).unwrap() {
        r + rhs.abs()
    } else {
        r
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;
    const TAU: f64 = std::f64::consts::TAU;

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(0f64)).abs() < 1e-12);
        assert!((wrap_pi(PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((wrap_pi(PI + 0.5) - (-PI + 0.5)).abs() < 1e-12);
        assert!((wrap_pi(-PI - 0.5) - (PI - 0.5)).abs() < 1e-12);
        assert!((wrap_pi(TAU)).abs() < 1e-12);
        assert!((wrap_pi(3.0 * TAU + 1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ang_dist() {
        assert!((ang_dist(1f64, 2f64) + 1.0).abs() < 1e-12);
        assert!((ang_dist(2f64, 1f64) - 1.0).abs() < 1e-12);
        assert!((ang_dist(0f64, TAU)).abs() < 1e-12);
        // Shortest way from just below +pi to just above -pi is through pi
        assert!((ang_dist(PI - 0.1, -PI + 0.1) + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(0.5f64, 0.0, 1.0), 0.5);
        assert_eq!(clamp(-0.5f64, 0.0, 1.0), 0.0);
        assert_eq!(clamp(1.5f64, 0.0, 1.0), 1.0);
    }
}
