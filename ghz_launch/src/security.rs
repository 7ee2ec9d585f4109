//! Security parameter derivation.
//!
//! A source producing GHZ states of fidelity `F` is `epsilon`-close to the
//! ideal state with `epsilon = sqrt(1 - F^2)`. The number of verification
//! rounds `S` bounds the chance of an undetected cheat below `delta`:
//!
//! ```text
//! S = round(log2(4n / ((1 - F) * delta)))      for F < 1
//! S = 10                                       for F = 1
//! ```

use crate::error::DomainError;
use serde::{Deserialize, Serialize};

/// Rounds used when the source is perfect and no statistical bound applies.
pub const PERFECT_SOURCE_ROUNDS: u32 = 10;

/// Derived security parameters for one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SecurityParams {
    pub epsilon: f64,
    #[serde(rename = "S")]
    pub rounds: u32,
}

impl SecurityParams {
    /// Derives `epsilon` and `S` from the experiment parameters.
    pub fn derive(n_nodes: usize, fidelity: f64, delta: f64) -> Result<Self, DomainError> {
        Ok(Self {
            epsilon: derive_epsilon(fidelity)?,
            rounds: derive_s(n_nodes, fidelity, delta)?,
        })
    }
}

/// Returns `sqrt(1 - fidelity^2)`.
pub fn derive_epsilon(fidelity: f64) -> Result<f64, DomainError> {
    check_fidelity(fidelity)?;
    Ok((1.0 - fidelity * fidelity).sqrt())
}

/// Returns the number of verification rounds `S`.
pub fn derive_s(n_nodes: usize, fidelity: f64, delta: f64) -> Result<u32, DomainError> {
    check_nodes(n_nodes)?;
    check_fidelity(fidelity)?;
    check_delta(delta)?;

    if fidelity == 1.0 {
        return Ok(PERFECT_SOURCE_ROUNDS);
    }

    let bound = (4.0 * n_nodes as f64) / ((1.0 - fidelity) * delta);
    if !bound.is_finite() {
        return Err(DomainError::new(
            "delta",
            delta,
            format!("too small for fidelity {}: the round count overflows", fidelity),
        ));
    }
    Ok(bound.log2().round() as u32)
}

pub fn check_nodes(n_nodes: usize) -> Result<(), DomainError> {
    if n_nodes < 2 {
        return Err(DomainError::new("n_nodes", n_nodes, "at least 2 parties are required"));
    }
    Ok(())
}

pub fn check_fidelity(fidelity: f64) -> Result<(), DomainError> {
    // NaN fails both comparisons
    if !(fidelity > 0.0 && fidelity <= 1.0) {
        return Err(DomainError::new("fidelity", fidelity, "must lie in (0, 1]"));
    }
    Ok(())
}

pub fn check_delta(delta: f64) -> Result<(), DomainError> {
    if !(delta > 0.0 && delta < 1.0) {
        return Err(DomainError::new("delta", delta, "must lie in (0, 1)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_perfect_source_uses_fixed_rounds() {
        for n in [2, 3, 10, 100] {
            for delta in [0.5, 0.01, 1e-9] {
                assert_eq!(derive_s(n, 1.0, delta).unwrap(), 10);
            }
        }
    }

    #[test]
    fn test_rounds_for_three_parties() {
        // log2(4 * 3 / (0.1 * 0.01)) = log2(12000) ~ 13.55
        assert_eq!(derive_s(3, 0.9, 0.01).unwrap(), 14);
    }

    #[test]
    fn test_rounds_grow_with_parties() {
        // log2(4 * 8 / (0.01 * 0.05)) = log2(64000) ~ 15.97
        assert_eq!(derive_s(8, 0.99, 0.05).unwrap(), 16);
        assert!(derive_s(64, 0.99, 0.05).unwrap() > derive_s(8, 0.99, 0.05).unwrap());
    }

    #[test]
    fn test_epsilon() {
        assert_eq!(derive_epsilon(1.0).unwrap(), 0.0);
        assert_relative_eq!(derive_epsilon(0.9).unwrap(), 0.19f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(derive_epsilon(0.6).unwrap(), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_fidelity() {
        for bad in [0.0, -0.1, 1.0001, f64::NAN] {
            let err = derive_epsilon(bad).unwrap_err();
            assert_eq!(err.field, "fidelity");
        }
    }

    #[test]
    fn test_invalid_delta() {
        for bad in [0.0, 1.0, -0.5, 2.0, f64::NAN] {
            let err = derive_s(3, 0.9, bad).unwrap_err();
            assert_eq!(err.field, "delta");
        }
        // Rejected even when the perfect-source shortcut would apply
        assert_eq!(derive_s(3, 1.0, 0.0).unwrap_err().field, "delta");
    }

    #[test]
    fn test_underflowing_bound_is_rejected() {
        let err = derive_s(3, 1.0 - 1e-16, 1e-300).unwrap_err();
        assert_eq!(err.field, "delta");

        // Tiny but representable bounds still yield a round count
        assert!(derive_s(3, 0.5, 1e-300).unwrap() > 990);
    }

    #[test]
    fn test_too_few_parties() {
        let err = SecurityParams::derive(1, 1.0, 0.01).unwrap_err();
        assert_eq!(err.field, "n_nodes");
        assert_eq!(err.value, "1");
    }

    proptest! {
        #[test]
        fn prop_epsilon_matches_definition(fidelity in 0.001f64..=1.0) {
            let eps = derive_epsilon(fidelity).unwrap();
            prop_assert!((eps - (1.0 - fidelity * fidelity).sqrt()).abs() < 1e-12);
        }

        #[test]
        fn prop_rounds_match_formula(
            n in 2usize..64,
            fidelity in 0.5f64..0.9999,
            delta in 0.0001f64..0.9,
        ) {
            let expected = ((4.0 * n as f64) / ((1.0 - fidelity) * delta)).log2().round() as u32;
            prop_assert_eq!(derive_s(n, fidelity, delta).unwrap(), expected);
        }
    }
}
