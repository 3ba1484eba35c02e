//! Business services

pub mod tender_service;

pub use tender_service::{StatusChangeOutcome, TenderService};
