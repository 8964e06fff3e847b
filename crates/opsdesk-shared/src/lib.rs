//! Types shared between the opsdesk clients and tooling

#![warn(unused_crate_dependencies)]

pub mod admin;
pub mod business;
pub mod const_config;
pub mod erp;
pub mod errors;
pub mod id;
pub mod req_args;
pub mod session;
pub mod telemetry;
