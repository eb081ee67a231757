//! Client-side driver for the CT007 handheld radiation detector.
//!
//! A [`SessionController`](infrastructure::bluetooth::SessionController) finds
//! one detector over BLE, keeps the session alive and publishes typed
//! [`DeviceEvent`](domain::models::DeviceEvent)s. The
//! [`Ratemeter`](domain::ratemeter::Ratemeter) turns the raw per-tick pulse
//! counts into a smoothed CPM and, when the model is calibrated, a dose rate.

pub mod domain;
pub mod infrastructure;
pub mod presentation;
