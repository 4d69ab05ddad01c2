//! Error types for the `tankflow` core.
//!
//! Each external seam gets its own error enum so callers can tell a transient
//! transport failure apart from malformed input or a configuration gap. None of
//! these are fatal: the alert engine and the ingestion supervisor log them and
//! move on to the next reading.

use reqwest::StatusCode;

// ---

/// Failures talking to the device registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry returned {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("registry has no {0}")]
    NotFound(String),

    #[error("could not encode registry document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures delivering to a push or SMS endpoint.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{channel} delivery failed: {source}")]
    Transport {
        channel: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{channel} endpoint returned {status}")]
    Status {
        channel: &'static str,
        status: StatusCode,
    },
}

/// Failures on the streaming ingestion side.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("broker connection failed: {0}")]
    Connect(String),

    #[error("subscribe failed: {0}")]
    Subscribe(#[from] rumqttc::ClientError),

    #[error("unparseable payload on {topic}: {reason}")]
    Payload { topic: String, reason: String },
}

/// Reasons an alert evaluation was abandoned without a state transition.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("tank {tank_id} has no usable geometry (height and capacity must be positive)")]
    GeometryNotConfigured { tank_id: String },
}
