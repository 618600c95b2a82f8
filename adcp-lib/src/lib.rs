#![doc = include_str!("../README.md")]

mod error;

pub mod acquire;
pub mod config;
pub mod ensemble;
pub mod framing;
pub mod sink;

pub use error::{Error, Result};

pub(crate) mod prelude {
    pub use crate::error::{Error, Result};
}
