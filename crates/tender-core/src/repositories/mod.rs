//! Repository traits (ports)

pub mod tender_repository;

pub use tender_repository::{
    TenderDetails, TenderListFilter, TenderRepository, URGENT_CHILD_WINDOW_DAYS,
};
