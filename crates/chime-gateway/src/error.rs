use thiserror::Error;

/// Failures of the per-connection protocol.
///
/// `InvalidTimezone` is fatal to bootstrap, `MalformedHeader` and
/// `TransferOverflow` only end the current transfer, `Persistence` only fails
/// the operation that hit it, `CapacityExceeded` refuses the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid admission window: {0}")]
    InvalidWindow(String),

    #[error("Malformed transfer header: {0}")]
    MalformedHeader(String),

    #[error("Transfer overflow: {chunk} byte chunk with {remaining} bytes remaining")]
    TransferOverflow { chunk: usize, remaining: u64 },

    #[error("Persistence error: {0:#}")]
    Persistence(anyhow::Error),

    #[error("Connection capacity exceeded ({0} live connections)")]
    CapacityExceeded(usize),

    #[error("Sink error: {0}")]
    Sink(#[from] std::io::Error),
}

impl ProtocolError {
    /// Errors that abort only the transfer in flight.
    pub fn is_transfer_local(&self) -> bool {
        matches!(self, Self::MalformedHeader(_) | Self::TransferOverflow { .. })
    }
}
