//! Output saturation shared by every controller.

/// Clamp `u` into `[u_min, u_max]`; a missing bound is not applied.
///
/// The low bound is applied first, then the high bound. Callers guarantee
/// `u_min < u_max` when both are present.
pub fn saturate(u: f64, u_min: Option<f64>, u_max: Option<f64>) -> f64 {
    let u = match u_min {
        Some(lo) if u < lo => lo,
        _ => u,
    };
    match u_max {
        Some(hi) if u > hi => hi,
        _ => u,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_both_sides() {
        assert_eq!(saturate(-3.0, Some(0.0), Some(100.0)), 0.0);
        assert_eq!(saturate(130.0, Some(0.0), Some(100.0)), 100.0);
        assert_eq!(saturate(42.0, Some(0.0), Some(100.0)), 42.0);
    }

    #[test]
    fn missing_bounds_are_open() {
        assert_eq!(saturate(-1e6, None, Some(100.0)), -1e6);
        assert_eq!(saturate(1e6, Some(0.0), None), 1e6);
        assert_eq!(saturate(7.0, None, None), 7.0);
    }
}
