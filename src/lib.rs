//! Tank-level analytics and hysteresis alerting.
//!
//! Live readings arrive over MQTT ([`ingest`]), are converted to a fill
//! percentage with geometry fetched from the device registry ([`registry`]),
//! and drive a per-(tank, sensor) two-axis alert gate ([`alerts`]) that fans
//! out push and SMS notifications ([`notify`]). Independently, the HTTP
//! gateway ([`routes`]) answers on-demand trend and time-to-empty queries
//! built from the registry's history ([`analytics`]).

pub mod alerts;
pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod notify;
pub mod registry;
pub mod routes;

pub use config::Config;
pub use error::{AlertError, IngestError, NotifyError, RegistryError};
