//! High-level device operations: data-identifier reads, the block-wise
//! download sub-protocol, and session teardown.

use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, ProtocolError, Result};
use crate::link::BleLink;
use crate::lre;
use crate::transport::Transport;

pub const SID_RDBI_REQ: u8 = 0x22;
pub const SID_RDBI_RESP: u8 = 0x62;
pub const SID_DOWNLOAD_INIT_REQ: u8 = 0x35;
pub const SID_DOWNLOAD_INIT_RESP: u8 = 0x75;
pub const SID_BLOCK_REQ: u8 = 0x36;
pub const SID_BLOCK_RESP: u8 = 0x76;
pub const SID_QUIT_REQ: u8 = 0x37;
pub const SID_QUIT_RESP: u8 = 0x77;
pub const SID_NEG_RESPONSE: u8 = 0x7F;

const DOWNLOAD_INIT_MODE: u8 = 0x34;
const FLAG_COMPRESSED: u8 = 0x10;

/// Pause while the device stages data, after init and after a rejected
/// init is quit.
const DEVICE_SETTLE: Duration = Duration::from_millis(100);

/// Read a data identifier.
///
/// `expected` is the payload length after the three response header
/// bytes. With `allow_shorter`, a shorter payload is accepted — some
/// identifiers are variable length (firmware version, for one).
pub async fn rdbi<L: BleLink>(
    transport: &Transport<L>,
    id: u16,
    expected: usize,
    allow_shorter: bool,
) -> Result<Vec<u8>> {
    let [hi, lo] = id.to_be_bytes();
    let response = transport
        .transfer(&[SID_RDBI_REQ, hi, lo], expected + 3)
        .await?;

    if response.len() < 3 || response[0] != SID_RDBI_RESP || response[1] != hi || response[2] != lo
    {
        return Err(ProtocolError::UnexpectedRdbiResponse { id }.into());
    }
    let payload = &response[3..];
    if payload.len() != expected && !(allow_shorter && payload.len() < expected) {
        return Err(ProtocolError::InvalidRdbiPayloadLength {
            id,
            expected,
            got: payload.len(),
        }
        .into());
    }
    Ok(payload.to_vec())
}

/// Where a download stands. The quit transition consumes the session, so
/// a finished download cannot request further blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadState {
    InitSent,
    Streaming { block_index: u8 },
}

/// One expanded download block.
pub struct Block {
    pub bytes: Vec<u8>,
    /// Whether the compressed stream signalled end-of-data.
    pub is_final: bool,
}

/// An in-progress block-wise download.
#[derive(Debug)]
pub struct DownloadSession<'a, L: BleLink> {
    transport: &'a Transport<L>,
    compressed: bool,
    max_block: usize,
    state: DownloadState,
}

impl<'a, L: BleLink> DownloadSession<'a, L> {
    /// Initiate a download. A negative response usually means the device
    /// still holds a stale transfer; it is quit and the init retried
    /// once.
    pub async fn start(
        transport: &'a Transport<L>,
        address: u32,
        size: u32,
        compressed: bool,
    ) -> Result<Self> {
        let init = init_request(address, size, compressed);
        let mut response = transport.transfer(&init, 3).await?;

        if response.first() == Some(&SID_NEG_RESPONSE) {
            warn!("download init rejected, quitting stale transfer");
            let _ = transport.transfer(&[SID_QUIT_REQ], 2).await;
            sleep(DEVICE_SETTLE).await;
            response = transport.transfer(&init, 3).await?;
        }
        if response.len() < 3 || response[0] != SID_DOWNLOAD_INIT_RESP {
            return Err(ProtocolError::UnexpectedInitResponse {
                response: response.first().copied().unwrap_or(0),
            }
            .into());
        }
        let max_block = response[2] as usize;
        sleep(DEVICE_SETTLE).await;

        debug!(
            address = format_args!("{address:#010x}"),
            size, compressed, max_block, "download started"
        );
        Ok(Self {
            transport,
            compressed,
            max_block,
            state: DownloadState::InitSent,
        })
    }

    /// Request the next block and return its (expanded) payload.
    pub async fn read_block(&mut self) -> Result<Block> {
        let index = match self.state {
            DownloadState::InitSent => 1,
            DownloadState::Streaming { block_index } => block_index.wrapping_add(1),
        };

        let response = self
            .transport
            .transfer(&[SID_BLOCK_REQ, index], self.max_block + 2)
            .await?;
        if response.len() < 2 || response[0] != SID_BLOCK_RESP || response[1] != index {
            return Err(ProtocolError::UnexpectedBlockResponse { block: index }.into());
        }
        self.state = DownloadState::Streaming { block_index: index };

        let payload = &response[2..];
        if self.compressed {
            let (bytes, is_final) = lre::expand(payload);
            Ok(Block { bytes, is_final })
        } else {
            Ok(Block {
                bytes: payload.to_vec(),
                is_final: false,
            })
        }
    }

    /// Send the transfer-exit request. A surprising confirmation is
    /// logged and ignored; the data is already on the host.
    pub async fn finish(self) {
        match self.transport.transfer(&[SID_QUIT_REQ], 2).await {
            Ok(response) if response == [SID_QUIT_RESP, 0x00] => {}
            Ok(response) => {
                warn!(response = %hex::encode(&response), "unexpected quit confirmation")
            }
            Err(err) => warn!(%err, "quit confirmation failed"),
        }
    }
}

/// Download `size` bytes from `address`, expanding the compressed stream
/// when requested. `on_progress` receives the accumulated output size
/// after every block. Cancellation is checked at each block boundary.
pub async fn download<L: BleLink>(
    transport: &Transport<L>,
    address: u32,
    size: u32,
    compressed: bool,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(usize),
) -> Result<Vec<u8>> {
    let mut session = DownloadSession::start(transport, address, size, compressed).await?;
    let mut output = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let block = session.read_block().await?;
        output.extend_from_slice(&block.bytes);
        on_progress(output.len());

        if compressed {
            if block.is_final {
                break;
            }
        } else if output.len() >= size as usize {
            break;
        }
    }

    if compressed {
        lre::xor_unslide(&mut output);
    }
    session.finish().await;
    Ok(output)
}

/// Release the device from host-connected mode. Failures are ignored;
/// the device drops back to its surface screen on its own timeout.
pub async fn end_session<L: BleLink>(transport: &Transport<L>) {
    if let Err(err) = transport.transfer(&[0x2E, 0x90, 0x20, 0x00], 0).await {
        debug!(%err, "end-session request failed");
    }
}

fn init_request(address: u32, size: u32, compressed: bool) -> Vec<u8> {
    let flags = if compressed { FLAG_COMPRESSED } else { 0x00 };
    let addr = address.to_be_bytes();
    let len = size.to_be_bytes();
    vec![
        SID_DOWNLOAD_INIT_REQ,
        flags,
        DOWNLOAD_INIT_MODE,
        addr[0],
        addr[1],
        addr[2],
        addr[3],
        len[1],
        len[2],
        len[3],
    ]
}
