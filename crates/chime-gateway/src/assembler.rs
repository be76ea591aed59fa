//! Reassembly of multimedia transfers from binary frames.
//!
//! ```text
//!                 header ok + begin()
//!  AwaitingHeader ───────────────────> Receiving
//!        ^   │                            │
//!        │   │ malformed                  │ remaining == 0  -> TransferComplete
//!        │<──┘                            │ chunk > remaining -> TransferOverflow
//!        └────────────────────────────────┘
//! ```
//!
//! The assembler does no I/O. It tells the caller where each chunk goes and
//! when a transfer has completed; the caller writes sinks and records messages.

use chime_types::models::MediaKind;

use crate::error::ProtocolError;
use crate::header::TransferHeader;
use crate::sink::SinkName;

/// Outcome of the admission decision taken for a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Chunks are appended to the sink.
    Accept { sink: SinkName },
    /// Chunks are counted and dropped.
    Discard,
}

impl Disposition {
    pub fn sink(&self) -> Option<&SinkName> {
        match self {
            Self::Accept { sink } => Some(sink),
            Self::Discard => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTransfer {
    pub header: TransferHeader,
    pub remaining: u64,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    AwaitingHeader,
    Receiving(ActiveTransfer),
}

/// Emitted once the declared byte count has been consumed exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferComplete {
    pub kind: MediaKind,
    pub sink: Option<SinkName>,
    pub length: u64,
}

/// What the caller must do with the frame it just fed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A header was decoded. Nothing starts until [`TransferAssembler::begin`].
    Header(TransferHeader),
    /// The frame was a chunk of the transfer in flight.
    Chunk {
        /// Where to append the chunk, if the transfer is accepted.
        sink: Option<SinkName>,
        /// Set when this chunk finished the transfer.
        complete: Option<TransferComplete>,
    },
}

/// Per-connection transfer state machine. At most one transfer is in flight.
#[derive(Debug)]
pub struct TransferAssembler {
    client_id: i64,
    state: TransferState,
}

impl TransferAssembler {
    /// `client_id` is the connection's client; headers claiming another
    /// origin are rejected.
    pub fn new(client_id: i64) -> Self {
        Self {
            client_id,
            state: TransferState::AwaitingHeader,
        }
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn is_receiving(&self) -> bool {
        matches!(self.state, TransferState::Receiving(_))
    }

    /// Bytes still expected by the transfer in flight.
    pub fn remaining(&self) -> Option<u64> {
        match &self.state {
            TransferState::Receiving(active) => Some(active.remaining),
            TransferState::AwaitingHeader => None,
        }
    }

    /// Interpret the next binary frame.
    pub fn feed(&mut self, frame: &[u8]) -> Result<Step, ProtocolError> {
        match &mut self.state {
            TransferState::AwaitingHeader => {
                let header = TransferHeader::decode(frame)?;
                if header.client_id != self.client_id {
                    return Err(ProtocolError::MalformedHeader(format!(
                        "header claims client {} on connection of client {}",
                        header.client_id, self.client_id
                    )));
                }
                Ok(Step::Header(header))
            }
            TransferState::Receiving(active) => {
                let chunk = frame.len() as u64;
                if chunk > active.remaining {
                    let remaining = active.remaining;
                    self.state = TransferState::AwaitingHeader;
                    return Err(ProtocolError::TransferOverflow {
                        chunk: frame.len(),
                        remaining,
                    });
                }

                active.remaining -= chunk;
                let sink = active.disposition.sink().cloned();

                if active.remaining > 0 {
                    return Ok(Step::Chunk {
                        sink,
                        complete: None,
                    });
                }

                let complete = TransferComplete {
                    kind: active.header.kind,
                    sink: sink.clone(),
                    length: active.header.length,
                };
                self.state = TransferState::AwaitingHeader;
                Ok(Step::Chunk {
                    sink,
                    complete: Some(complete),
                })
            }
        }
    }

    /// Start receiving chunks for `header` with the chosen disposition.
    pub fn begin(&mut self, header: TransferHeader, disposition: Disposition) -> Result<(), ProtocolError> {
        if let TransferState::Receiving(active) = &self.state {
            return Err(ProtocolError::MalformedHeader(format!(
                "transfer '{}' still has {} bytes outstanding",
                active.header.name, active.remaining
            )));
        }
        if header.length == 0 {
            return Err(ProtocolError::MalformedHeader(
                "declared length must be greater than zero".into(),
            ));
        }

        self.state = TransferState::Receiving(ActiveTransfer {
            remaining: header.length,
            header,
            disposition,
        });
        Ok(())
    }

    /// Switch the transfer in flight to discard, keeping its byte count.
    /// Returns the sink it was writing to.
    pub fn demote(&mut self) -> Option<SinkName> {
        match &mut self.state {
            TransferState::Receiving(active) => {
                match std::mem::replace(&mut active.disposition, Disposition::Discard) {
                    Disposition::Accept { sink } => Some(sink),
                    Disposition::Discard => None,
                }
            }
            TransferState::AwaitingHeader => None,
        }
    }

    /// Drop any transfer in flight. Returns its sink, which holds a partial file.
    pub fn abandon(&mut self) -> Option<SinkName> {
        match std::mem::replace(&mut self.state, TransferState::AwaitingHeader) {
            TransferState::Receiving(active) => match active.disposition {
                Disposition::Accept { sink } => Some(sink),
                Disposition::Discard => None,
            },
            TransferState::AwaitingHeader => None,
        }
    }
}
