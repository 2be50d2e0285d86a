pub mod error;
pub mod feeder;
pub mod gatt;
pub mod models;
pub mod settings;
pub mod shield;
