pub mod booking;
pub mod context;
pub mod driver;
pub mod event;
