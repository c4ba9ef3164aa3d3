pub mod models;
pub mod routes;
pub mod timeslots;

pub use models::*;
pub use timeslots::{resolve_schedule, Timeslot, TimeslotMessage};
