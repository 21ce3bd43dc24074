//! Scriptable in-memory link.
//!
//! Frames written by the transport are SLIP-decoded back into request
//! payloads; each completed request consumes the next scripted reply,
//! which is framed the way the device frames responses and fed into the
//! notification stream. The whole protocol stack can be driven against
//! it without a radio; the crate's own transfer and download tests do.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::link::{BleLink, LinkWriteType};
use crate::slip;

/// A request payload the mock has seen, with its arrival time.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub payload: Vec<u8>,
    pub at: Instant,
}

#[derive(Default, Debug)]
struct State {
    decoder: slip::SlipDecoder,
    replies: VecDeque<Option<Vec<u8>>>,
    requests: Vec<SentRequest>,
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    connected: AtomicBool,
}

#[derive(Clone, Debug)]
pub struct MockLink {
    inner: Arc<Inner>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                connected: AtomicBool::new(true),
            }),
        }
    }

    /// Queue a reply payload for the next request.
    pub fn push_reply(&self, payload: &[u8]) {
        self.state().replies.push_back(Some(payload.to_vec()));
    }

    /// Queue a request that gets no reply at all.
    pub fn push_silence(&self) {
        self.state().replies.push_back(None);
    }

    /// Requests seen so far, SLIP-decoded and unwrapped.
    pub fn requests(&self) -> Vec<SentRequest> {
        self.state().requests.clone()
    }

    /// Simulate a dropped connection.
    pub fn drop_connection(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    /// Feed raw notification chunks, bypassing the script.
    pub fn inject_chunks(&self, chunks: &[Vec<u8>]) {
        let state = self.state();
        if let Some(tx) = &state.tx {
            for chunk in chunks {
                let _ = tx.send(chunk.clone());
            }
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap()
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Unwrap a request packet the way the device does.
fn parse_request(packet: &[u8]) -> Option<Vec<u8>> {
    if packet.len() < 4 || packet[0] != 0xFF || packet[1] != 0x01 || packet[3] != 0x00 {
        return None;
    }
    let len = packet[2] as usize;
    packet.get(4..4 + len.checked_sub(1)?).map(|p| p.to_vec())
}

/// Wrap a reply payload in the response packet header.
fn build_response(payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() < 0xFF, "reply too long for length byte");
    let mut packet = Vec::with_capacity(4 + payload.len());
    packet.push(0x01);
    packet.push(0xFF);
    packet.push(payload.len() as u8 + 1);
    packet.push(0x00);
    packet.extend_from_slice(payload);
    packet
}

fn deliver(state: &State, payload: &[u8]) {
    let Some(tx) = &state.tx else { return };
    for frame in slip::encode_frames(&build_response(payload)) {
        let _ = tx.send(frame);
    }
}

#[async_trait]
impl BleLink for MockLink {
    async fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn enable_notifications(&self) -> Result<()> {
        Ok(())
    }

    async fn write(&self, frame: &[u8], _write_type: LinkWriteType) -> Result<()> {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(Error::Disconnected);
        }
        let mut state = self.state();
        if let Some(packet) = state.decoder.feed_frame(frame) {
            let payload =
                parse_request(&packet).ok_or_else(|| Error::Link("malformed request".into()))?;
            state.requests.push(SentRequest {
                payload,
                at: Instant::now(),
            });
            if let Some(reply) = state.replies.pop_front().flatten() {
                deliver(&state, &reply);
            }
        }
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().tx = Some(tx);
        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        })))
    }

    async fn close(&self) -> Result<()> {
        self.inner.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
