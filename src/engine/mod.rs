pub mod code;
pub mod dispatch;
pub mod fare;
pub mod lifecycle;
pub mod payments;
pub mod registry;
pub mod reports;
