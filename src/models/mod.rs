//! Record types for the persistence collaborator.

pub mod patient;

pub use patient::{ActionRecord, PatientPatch, PatientRecord, VitalsRecord};
