//! Error types for the gateway module.

use thiserror::Error;

/// Errors that can occur while talking to the message broker.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// An AMQP operation failed.
    #[error("broker failure during {operation}: {source}")]
    Broker {
        /// The operation that failed (`connect`, `declare`, `get`, ...).
        operation: &'static str,
        /// The underlying broker error.
        #[source]
        source: lapin::Error,
    },

    /// The transport has no open channel and could not provide one.
    #[error("queue transport unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Creates a broker failure with operation context.
    pub fn broker(operation: &'static str, source: lapin::Error) -> Self {
        Self::Broker { operation, source }
    }
}
