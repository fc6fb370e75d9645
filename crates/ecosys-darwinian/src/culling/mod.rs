//! Survival policy module
pub mod policy;

pub use self::policy::SurvivalPolicy;
