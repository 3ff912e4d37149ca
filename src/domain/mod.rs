pub mod inventory;
pub mod models;
pub mod reconcile;
pub mod recurring;
pub mod scoring;
pub mod submission;
