//! fsaudit - filesystem access audit relay
//!
//! This library exposes the broker abstraction, the producer lifecycle and
//! the record encoding used by the `fsaudit` binary.

pub mod broker;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;
pub mod process;
pub mod producer;
pub mod record;
pub mod relay;
