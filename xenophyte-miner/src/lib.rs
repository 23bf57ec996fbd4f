//! Solo CPU miner for the Xenophyte network.
//!
//! The [`network`] module speaks the encrypted seed-node protocol and turns
//! it into [`network::NetworkEvent`]s; the [`cpu_miner`] pool searches the
//! published [`job::JobTemplate`] and hands winning shares back through
//! [`cpu_miner::ShareSink`]. [`daemon::Daemon`] ties the two together.

pub mod config;
pub mod cpu_miner;
pub mod crypto;
pub mod daemon;
pub mod job;
pub mod network;
pub mod stats;
pub mod tracing;
pub mod types;
