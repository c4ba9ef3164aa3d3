pub mod agent;
pub mod availability;
pub mod models;
pub mod pricing;
pub mod routes;
mod status;

pub use models::*;
pub use status::BookingStatus;
