//! Internal modules for the chain poker client.
//!
//! This library provides the ledger RPC connection, the gateway client,
//! command parsing and rendering used by the cp_client binary.

pub mod commands;
pub mod config;
pub mod display;
pub mod gateway;
pub mod rpc;
