//! Cadence Core - Domain types and ports for the sync engine
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `Collection`, `SyncEntry`, `LocalRecord`, `SyncResolution`, record models
//! - **Port definitions** - Traits for adapters: `ISyncProtocol`, `ILocalStore`,
//!   environment providers and the `SyncTelemetry` hook
//! - **Configuration** - YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! The domain module holds plain data with no I/O. Ports define the trait
//! interfaces that adapter crates (`cadence-cache`, `cadence-remote`,
//! `cadence-telemetry`) implement and that `cadence-sync` drives.

pub mod config;
pub mod domain;
pub mod ports;
