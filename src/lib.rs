//! Approval workflow engine for administrative requests.
//!
//! A request moves along the edges of a [`catalogue::StepCatalogue`]; every
//! move is authorised against the requester's organisational hierarchy and
//! recorded in the [`audit::AuditTrail`]. [`service::WorkflowService`] is the
//! entry point.

pub mod audit;
pub mod authorizer;
pub mod catalogue;
pub mod config;
pub mod directory;
pub mod error;
pub mod ids;
pub mod request;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod types;

pub use error::{Result, WorkflowError};
