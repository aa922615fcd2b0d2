//! Reconciliation core of the Dex auth operator.
//!
//! Each triggering [`event::Event`] is handled by [`controller::reconcile`], which computes the
//! desired Dex configuration and Pebble layer from the charm configuration, relation data and
//! persisted secrets, and then pushes that state to the `dex` workload.

pub mod backend;
pub mod config;
pub mod controller;
pub mod dex_config;
pub mod event;
pub mod issuer;
pub mod layer;
pub mod local;
pub mod product_logging;
pub mod relations;
pub mod state;
pub mod status;
pub mod unit;
pub mod workload;

#[cfg(test)]
pub(crate) mod memory;

pub const APP_NAME: &str = "dex-auth";
pub const OPERATOR_NAME: &str = "dex-auth-operator";
