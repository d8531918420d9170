//! Pricing matcher
//!
//! Ranks facilities for a (plan, procedure) pair from historical prices:
//! facilities priced within the parity band of the cheapest one are
//! admitted, then filtered by a distance ceiling that widens with the
//! savings each facility offers against the most expensive one observed.

use serde::Serialize;
use sqlx::SqliteConnection;
use totl_common::config::PolicyConfig;
use totl_common::Result;
use tracing::debug;

use super::geo::GeoService;
use crate::db;
use crate::db::prices::FacilityPrice;
use crate::models::FacilityClass;

/// Name used when neither the facility table nor the EOB carries one
const UNKNOWN_FACILITY: &str = "Unknown Facility";

/// One ranked facility option
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub npi: String,
    pub name: String,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub facility_class: FacilityClass,
    /// Lowest observed allowed amount at this facility
    pub price: f64,
    /// Miles from the member; `None` when it could not be determined
    pub distance_miles: Option<f64>,
    /// Savings versus the most expensive observed facility
    pub savings_vs_max: f64,
}

/// Matcher output for one referral
#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceMatch {
    /// At most `max_candidates` entries, cheapest first
    pub candidates: Vec<Candidate>,
    /// Average observed price minus the cheapest
    pub price_spread: f64,
}

impl PriceMatch {
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Facilities at or below `cheapest × band`, keeping input order
///
/// `prices` must be sorted ascending by price.
pub fn admit_within_band(prices: &[FacilityPrice], band: f64) -> &[FacilityPrice] {
    let Some(cheapest) = prices.first().map(|p| p.min_price) else {
        return prices;
    };
    let threshold = cheapest * band;
    let admitted = prices
        .iter()
        .take_while(|p| p.min_price <= threshold)
        .count();
    &prices[..admitted]
}

/// Drop candidates beyond their distance ceiling, then sort and truncate
///
/// Candidates with unknown distance are kept: no ceiling can be applied.
pub fn rank_candidates(mut candidates: Vec<Candidate>, policy: &PolicyConfig) -> Vec<Candidate> {
    candidates.retain(|c| match c.distance_miles {
        Some(miles) => miles <= policy.distance_ceiling(c.savings_vs_max),
        None => true,
    });
    candidates.sort_by(|a, b| {
        a.price
            .partial_cmp(&b.price)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.npi.cmp(&b.npi))
    });
    candidates.truncate(policy.max_candidates);
    candidates
}

#[derive(Clone)]
pub struct PricingMatcher {
    policy: PolicyConfig,
    geo: GeoService,
}

impl PricingMatcher {
    pub fn new(policy: PolicyConfig, geo: GeoService) -> Self {
        Self { policy, geo }
    }

    /// Ranked candidates for a plan and procedure near a member zip
    ///
    /// Returns an empty match when no prices exist for the pair.
    pub async fn find_candidates(
        &self,
        conn: &mut SqliteConnection,
        plan_id: i64,
        cpt_code: &str,
        member_zip: Option<&str>,
    ) -> Result<PriceMatch> {
        let prices = db::prices::min_price_by_facility(conn, plan_id, cpt_code).await?;
        let (Some(cheapest), Some(most_expensive)) = (prices.first(), prices.last()) else {
            debug!(plan_id, cpt_code, "No price records for procedure");
            return Ok(PriceMatch::default());
        };
        let cheapest = cheapest.min_price;
        let most_expensive = most_expensive.min_price;

        let admitted = admit_within_band(&prices, self.policy.price_band);
        let mut candidates = Vec::with_capacity(admitted.len());

        for price in admitted {
            let savings_vs_max = most_expensive - price.min_price;

            let candidate = match db::facilities::find_by_npi(conn, &price.npi).await? {
                Some(facility) => {
                    let distance_miles = match member_zip {
                        Some(zip) => self.geo.distance_to_facility(zip, &facility).await,
                        None => None,
                    };
                    let address = facility.display_address();
                    Candidate {
                        npi: facility.npi,
                        name: facility.facility_name,
                        address: (!address.is_empty()).then_some(address),
                        zip_code: facility.zip_code,
                        facility_class: facility.facility_class,
                        price: price.min_price,
                        distance_miles,
                        savings_vs_max,
                    }
                }
                None => {
                    let name = price
                        .eob_facility_name
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_FACILITY.to_string());
                    Candidate {
                        npi: price.npi.clone(),
                        facility_class: FacilityClass::infer_from_name(&name),
                        name,
                        address: None,
                        zip_code: None,
                        price: price.min_price,
                        distance_miles: None,
                        savings_vs_max,
                    }
                }
            };
            candidates.push(candidate);
        }

        let candidates = rank_candidates(candidates, &self.policy);
        let average = db::prices::average_price(conn, plan_id, cpt_code)
            .await?
            .unwrap_or(cheapest);

        debug!(
            plan_id,
            cpt_code,
            admitted = admitted.len(),
            returned = candidates.len(),
            "Pricing match complete"
        );

        Ok(PriceMatch {
            candidates,
            price_spread: (average - cheapest).max(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(npi: &str, amount: f64) -> FacilityPrice {
        FacilityPrice {
            npi: npi.to_string(),
            min_price: amount,
            eob_facility_name: None,
        }
    }

    fn candidate(npi: &str, amount: f64, distance: Option<f64>, savings: f64) -> Candidate {
        Candidate {
            npi: npi.to_string(),
            name: format!("Facility {}", npi),
            address: None,
            zip_code: None,
            facility_class: FacilityClass::Freestanding,
            price: amount,
            distance_miles: distance,
            savings_vs_max: savings,
        }
    }

    #[test]
    fn test_band_is_hard_cutoff() {
        let prices = vec![
            price("a", 100.0),
            price("b", 110.0),
            price("c", 110.01),
            price("d", 500.0),
        ];
        let admitted = admit_within_band(&prices, 1.10);
        assert_eq!(admitted.len(), 2);
        assert!(admitted.iter().all(|p| p.min_price <= 110.0));
    }

    #[test]
    fn test_band_on_empty_input() {
        assert!(admit_within_band(&[], 1.10).is_empty());
    }

    #[test]
    fn test_distance_ceiling_widens_with_savings() {
        let policy = PolicyConfig::default();
        let ranked = rank_candidates(
            vec![
                candidate("near", 100.0, Some(9.0), 100.0),
                candidate("mid_too_far", 100.0, Some(12.0), 400.0),
                candidate("mid_ok", 100.0, Some(14.0), 600.0),
                candidate("far_ok", 100.0, Some(24.0), 1500.0),
            ],
            &PolicyConfig {
                max_candidates: 10,
                ..policy
            },
        );
        let npis: Vec<_> = ranked.iter().map(|c| c.npi.as_str()).collect();
        assert_eq!(npis, vec!["far_ok", "mid_ok", "near"]);
    }

    #[test]
    fn test_rank_sorts_and_truncates() {
        let policy = PolicyConfig::default();
        let ranked = rank_candidates(
            vec![
                candidate("c", 103.0, None, 0.0),
                candidate("a", 100.0, Some(1.0), 0.0),
                candidate("d", 104.0, None, 0.0),
                candidate("b", 101.0, Some(2.0), 0.0),
            ],
            &policy,
        );
        let prices: Vec<_> = ranked.iter().map(|c| c.price).collect();
        assert_eq!(prices, vec![100.0, 101.0, 103.0]);
    }
}
