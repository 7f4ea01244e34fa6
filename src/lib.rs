#![cfg_attr(not(test), no_std)]

//! # airstation-rs
//! ## An air quality station in Rust
//!
//! Features:
//! - Temperature and humidity from a DHT11, read every tick
//! - PM2.5 and PM10 from an SDS011, woken and put to sleep on alternate ticks
//! - Merging of both sensors into one timestamped record
//! - Live readings and the time on a 16x2 character LCD
//! - JSON telemetry published through a serial network co-processor
//!
//! Cargo features:
//! - `log`: route diagnostics to the `log` facade (default, host builds)
//! - `defmt`: route diagnostics to `defmt`
//! - `rp2040`: build the Raspberry Pi Pico firmware binary

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod clock;
pub mod config;
pub mod dht11;
pub mod duty;
pub mod publisher;
pub mod rendering;
pub mod sds011;
pub mod sensors;
pub mod sinks;
pub mod station;
pub mod telemetry;
pub mod timer;
