mod gateway;
pub mod models;
pub mod routes;

pub use gateway::{ManualGateway, PaymentGateway, Settlement};
pub use models::*;
