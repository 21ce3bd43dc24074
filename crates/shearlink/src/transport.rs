//! Request/response transport over one connected BLE link.
//!
//! A background task drains notification chunks into a shared inbound
//! buffer; the foreground serialises request/response exchanges against
//! it. Only one `transfer` may be in flight at a time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::link::{BleLink, LinkWriteType};
use crate::{packet, slip};

/// Hard deadline for one response packet.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// The inbound side: notification chunks behind a mutex, and a
/// single-waiter wake for the reader in `transfer`. Chunk boundaries are
/// kept because every chunk carries its own link frame header.
#[derive(Default, Debug)]
struct Inbound {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    wake: Notify,
}

#[derive(Debug)]
pub struct Transport<L: BleLink> {
    link: Arc<L>,
    write_type: LinkWriteType,
    inbound: Arc<Inbound>,
    reader: JoinHandle<()>,
}

impl<L: BleLink> Transport<L> {
    /// Enable notifications on the link and start the background reader.
    pub async fn new(link: L, write_type: LinkWriteType) -> Result<Self> {
        let link = Arc::new(link);
        link.enable_notifications().await?;
        let mut stream = link.notifications().await?;

        let inbound = Arc::new(Inbound::default());
        let reader = tokio::spawn({
            let inbound = Arc::clone(&inbound);
            async move {
                while let Some(chunk) = stream.next().await {
                    trace!(len = chunk.len(), "notification chunk");
                    inbound.chunks.lock().unwrap().push_back(chunk);
                    inbound.wake.notify_one();
                }
            }
        });

        Ok(Self {
            link,
            write_type,
            inbound,
            reader,
        })
    }

    /// Send one request payload and read one response payload.
    ///
    /// `expected_len` of zero means no response is read. Callers must not
    /// overlap calls on the same transport; responses are matched to
    /// requests purely by order.
    pub async fn transfer(&self, request: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        if !self.link.is_connected().await {
            return Err(Error::Disconnected);
        }
        self.inbound.chunks.lock().unwrap().clear();

        let packet = packet::build(request);
        for frame in slip::encode_frames(&packet) {
            self.link.write(&frame, self.write_type).await?;
        }
        trace!(request = %hex::encode(request), expected_len, "request sent");

        if expected_len == 0 {
            return Ok(Vec::new());
        }
        self.read_slip_packet().await
    }

    async fn read_slip_packet(&self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        let mut decoder = slip::SlipDecoder::new();

        loop {
            while let Some(chunk) = self.inbound.chunks.lock().unwrap().pop_front() {
                if let Some(packet) = decoder.feed_frame(&chunk) {
                    let payload = packet::parse(&packet)?;
                    trace!(response = %hex::encode(payload), "response");
                    return Ok(payload.to_vec());
                }
            }

            if !self.link.is_connected().await {
                return Err(Error::Disconnected);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || timeout(remaining, self.inbound.wake.notified()).await.is_err()
            {
                if !self.link.is_connected().await {
                    return Err(Error::Disconnected);
                }
                return Err(Error::Timeout);
            }
        }
    }

    /// Stop the reader task and close the link.
    pub async fn shutdown(self) -> Result<()> {
        debug!("shutting down transport");
        self.reader.abort();
        self.link.close().await
    }
}

impl<L: BleLink> Drop for Transport<L> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
