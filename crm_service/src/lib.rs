pub mod client;
pub mod error;
pub mod lead;
pub mod owner;
pub mod owner_record;

#[cfg(test)]
mod fake;

pub use client::{ApiResponse, CrmApi, EntityKind, EntityRef, HttpCrmClient};
pub use error::CrmError;
pub use lead::{relay_lead, LeadOutcome};
pub use owner::{AssignmentResult, OwnerResolver};
pub use owner_record::OwnerRecord;
