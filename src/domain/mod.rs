pub mod calibration;
pub mod catalog;
pub mod error;
pub mod models;
pub mod ratemeter;
pub mod selection;
pub mod settings;
pub mod state_machine;
