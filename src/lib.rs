//! [LMX2820](https://www.ti.com/product/LMX2820) wideband synthesizer driver.
//!
//! The hardware core is `no_std`: frequency planning, shadow register images
//! with dirty tracking, register programming over an `embedded-hal` SPI
//! device and the reference-switch sequencing used when retuning an LO that
//! shares its reference with sibling devices. Companion drivers cover the
//! LTC5594 IQ demodulator and the LTC2668 DAC biasing the mixers.
//!
//! # Features
//!
//! - `std` (default) - multi-channel [`board`] control with locking and
//!   persisted configuration
//! - `cli` - `lmx2820-regs` register dump tool

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod constants;
pub mod errors;
#[macro_use]
pub mod register;
pub mod refin;
pub mod frequency;
pub mod device;
pub mod lmx2820;
pub mod ltc5594;
pub mod ltc2668;
pub mod sequencer;

#[cfg(feature = "std")]
pub mod config;
#[cfg(feature = "std")]
pub mod board;

#[cfg(test)]
mod mock;

pub use errors::{Error, ErrorKind};
