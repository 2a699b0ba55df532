//! Commands module - service layer for provisioning and teardown

mod provision;
pub(crate) mod service;
mod teardown;

pub use provision::ProvisionReport;
pub use service::DeployerService;
pub use teardown::{DeletionOutcome, TeardownReport};
