pub mod harvest_service;

pub use harvest_service::{HarvestService, HarvestServiceConfig};
