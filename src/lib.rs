#![no_std]
#![doc = include_str!("../README.md")]

#[cfg(test)]
extern crate std;

mod bus;
mod command;
mod crc;
pub mod ds18b20;
mod pin;
mod result;
mod rom;
mod search;
#[cfg(test)]
mod sim;
mod timing;

pub use bus::Bus;
pub use command::{FunctionCommand, OpCode, RomCommand};
pub use crc::{crc8, crc8_block};
pub use pin::BusPin;
pub use result::Error;
pub use rom::RomCode;
pub use search::SearchState;
