pub mod queries;
pub mod routes;
pub mod server;

pub use server::{BookingEvent, Notification, NotificationServer};
