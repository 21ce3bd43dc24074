//! The BLE collaborator surface.
//!
//! Hosts own discovery and connection: they locate the Shearwater serial
//! service, pick its write and notify characteristics, and hand the
//! connected link to a [`crate::transport::Transport`]. The core only
//! needs the operations below.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;

/// How link frames are written to the write characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkWriteType {
    WithResponse,
    WithoutResponse,
}

/// One connected BLE link, bound to the serial service's write and
/// notify characteristics.
#[async_trait]
pub trait BleLink: Send + Sync + 'static {
    /// Whether the underlying connection is still up.
    async fn is_connected(&self) -> bool;

    /// Enable notifications on the notify characteristic.
    async fn enable_notifications(&self) -> Result<()>;

    /// Write one link frame to the write characteristic.
    async fn write(&self, frame: &[u8], write_type: LinkWriteType) -> Result<()>;

    /// The stream of notification chunks from the notify characteristic.
    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>>;

    /// Tear the connection down.
    async fn close(&self) -> Result<()>;
}
