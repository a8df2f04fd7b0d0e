#![deny(rust_2018_idioms)]
#![feature(hash_raw_entry)]

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate anyhow;

#[macro_use]
extern crate log;

pub mod attr;
pub mod checkout;
pub mod collab;
pub mod diff;
pub mod error;
pub mod filter;
pub mod fs;
pub mod index;
pub mod iter;
pub mod lockfile;
pub mod model;
pub mod path;
pub mod pathspec;
pub mod rename;

mod interner;
mod time;

pub use error::BitResult;
