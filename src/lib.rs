//! Host library for a remote temperature sensor node.
//!
//! The command unit polls the node over an nRF24L01+ link; the node
//! answers every request with the snapshot staged before that request
//! arrived (the transceiver's automatic acknowledgment payload), then
//! refreshes its sensors and stages the next snapshot. The protocol
//! core lives in [`aggregator`] and [`responder`]; [`hal`] defines the
//! peripheral capability traits with simulated implementations by
//! default and Raspberry Pi implementations behind the `hardware`
//! feature.

pub mod aggregator;
pub mod config;
pub mod domain;
pub mod hal;
pub mod responder;
pub mod runtime;
