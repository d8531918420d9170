//! Zero out-of-pocket viability
//!
//! A simplified cost-sharing model with a fixed set of branches:
//!
//! | Deductible | Procedure | Facility     | Result                          |
//! |------------|-----------|--------------|---------------------------------|
//! | unknown    | any       | any          | not viable                      |
//! | remaining  | any       | any          | not viable, min(price, remaining) |
//! | met        | imaging   | freestanding | viable, $0                      |
//! | met        | imaging   | hospital     | not viable, coinsurance         |
//! | met        | lab       | any          | viable if coinsurance negligible |
//! | met        | any       | none found   | not viable                      |
//!
//! The hospital-imaging row is an assumption: the imaging benefit is modeled
//! only for non-hospital facilities, so hospital imaging pays coinsurance.

use serde::Serialize;
use totl_common::config::PolicyConfig;

use super::pricing::Candidate;
use super::procedures;
use crate::models::{Accumulator, FacilityClass};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Viability {
    pub viable: bool,
    pub estimated_oop: f64,
    pub reasoning: String,
}

impl Viability {
    fn not_viable(estimated_oop: f64, reasoning: impl Into<String>) -> Self {
        Self {
            viable: false,
            estimated_oop,
            reasoning: reasoning.into(),
        }
    }

    fn zero_cost(reasoning: impl Into<String>) -> Self {
        Self {
            viable: true,
            estimated_oop: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

/// Decide whether the best candidate costs the member nothing
///
/// `candidates` must be ordered cheapest first; `accumulator` is the
/// member's most recent snapshot.
pub fn is_zero_cost_viable(
    accumulator: Option<&Accumulator>,
    cpt_code: &str,
    candidates: &[Candidate],
    policy: &PolicyConfig,
) -> Viability {
    let Some(accumulator) = accumulator else {
        return Viability::not_viable(0.0, "No accumulator data available");
    };

    let remaining = accumulator.deductible_remaining();
    if remaining > 0.0 {
        return match candidates.first() {
            Some(best) => Viability::not_viable(
                best.price.min(remaining),
                format!("Deductible not met (${:.0} remaining)", remaining),
            ),
            None => Viability::not_viable(
                remaining,
                format!("Deductible not met (${:.0} remaining), no pricing data", remaining),
            ),
        };
    }

    let Some(best) = candidates.first() else {
        return Viability::not_viable(0.0, "No pricing data available");
    };

    let coinsurance = best.price * policy.coinsurance_rate;

    if procedures::is_imaging(cpt_code) {
        if best.facility_class != FacilityClass::Hospital {
            Viability::zero_cost("Imaging at freestanding facility ($0 out-of-pocket benefit)")
        } else {
            Viability::not_viable(
                coinsurance,
                format!("Hospital imaging, coinsurance applies (~${:.2})", coinsurance),
            )
        }
    } else if coinsurance < policy.negligible_oop {
        Viability::zero_cost("Low cost lab, effectively $0")
    } else {
        Viability::not_viable(
            coinsurance,
            format!("Coinsurance applies (~${:.2})", coinsurance),
        )
    }
}
