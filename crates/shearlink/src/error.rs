use thiserror::Error;

/// Result type alias for shearlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for shearlink.
#[derive(Error, Debug)]
pub enum Error {
    /// The BLE collaborator reported a failure.
    #[error("link error: {0}")]
    Link(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("timed out waiting for a response")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("dive log parse error: {0}")]
    Parse(#[from] PnfError),
}

/// Violations of the transfer protocol. Any of these aborts the
/// operation that observed it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid packet header")]
    InvalidPacketHeader,

    #[error("invalid packet length")]
    InvalidPacketLength,

    #[error("unexpected RDBI response for identifier {id:#06x}")]
    UnexpectedRdbiResponse { id: u16 },

    #[error("RDBI payload for identifier {id:#06x} has length {got}, expected {expected}")]
    InvalidRdbiPayloadLength {
        id: u16,
        expected: usize,
        got: usize,
    },

    #[error("download init rejected with {response:#04x}")]
    UnexpectedInitResponse { response: u8 },

    #[error("unexpected response for block {block}")]
    UnexpectedBlockResponse { block: u8 },
}

/// Failures decoding a Petrel native format log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PnfError {
    #[error("log data length {0} is not a multiple of the record size")]
    UnalignedInput(usize),

    #[error("log data contains no dive")]
    NoDive,
}
