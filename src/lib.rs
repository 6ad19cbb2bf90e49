#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

//! Control core of a LoRaWAN location tracker.
//!
//! Everything in this library is hardware independent: collaborators such as
//! the radio stack, the GNSS transports and the console are reached through
//! the traits in [`ports`], [`gnss`] and [`status`]. The firmware binary in
//! `main.rs` provides the STM32/embassy implementations.

#[macro_use]
pub mod log;

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod drivers;
pub mod duty_cycle;
pub mod events;
pub mod gnss;
pub mod ports;
pub mod state;
pub mod status;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
