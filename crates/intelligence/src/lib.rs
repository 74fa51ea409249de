//! Lead intelligence — propensity scoring, churn prediction and cohort
//! lifetime-value estimation over a brand's leads.

pub mod churn;
pub mod ltv;
pub mod propensity;
pub mod scorer;

pub use churn::ChurnPredictor;
pub use ltv::LtvEstimator;
pub use propensity::PropensityEngine;
pub use scorer::LeadScorer;
