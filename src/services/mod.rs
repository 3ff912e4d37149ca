pub mod audit;
pub mod checkins;
pub mod notifications;
pub mod reconciler;
