//! leadsync-core library.
//!
//! Keeps CRM leads in step with clinic appointments. Phone numbers are the
//! client identity ([`identity`]); [`reconcile`] derives leads from
//! appointments, [`dedup`] collapses leads that share a phone, and
//! [`status`] gates funnel moves by role. Persistence sits behind
//! [`store::EntityStore`].
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at the engine seams, `anyhow::Result`
//!   for setup and config glue.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod identity;
pub mod model;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod throttle;
