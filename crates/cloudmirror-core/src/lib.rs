//! cloudmirror Core - Domain types, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `RemoteId`, `LogicalPath`, `RemoteNode`, `Mapping`, `ExclusionSet`
//! - **Node classifier** - Local entry kind and content-type derivation
//! - **Port definitions** - Traits for adapters: `IRemoteStore`, `IAuthenticator`
//! - **Configuration** - YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure logic with no I/O. Ports define the trait
//! interfaces that adapter crates (`cloudmirror-gdrive`) implement and the
//! reconciliation engine (`cloudmirror-sync`) consumes.

pub mod config;
pub mod domain;
pub mod ports;
