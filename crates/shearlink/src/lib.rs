//! Dive log download for Shearwater BLE dive computers.
//!
//! `shearlink` speaks the Shearwater transfer protocol over the BLE
//! serial service — SLIP-framed request/response packets with a
//! block-wise download sub-protocol and two decompression stages — and
//! decodes the Petrel native log format into structured dives.
//!
//! Hosts own BLE discovery and connection. They implement
//! [`link::BleLink`] for their platform, wrap the connected link in a
//! [`transport::Transport`], and drive a [`session::Session`]:
//!
//! ```no_run
//! # async fn demo(link: shearlink::mock::MockLink) -> shearlink::Result<()> {
//! use shearlink::link::LinkWriteType;
//! use shearlink::session::Session;
//! use shearlink::transport::Transport;
//!
//! let transport = Transport::new(link, LinkWriteType::WithoutResponse).await?;
//! let mut session = Session::new(transport);
//!
//! let info = session.read_device_info().await?;
//! println!("{} {}", info.model, info.serial);
//!
//! let candidates = session.download_manifest().await?;
//! let logs = session.download_dives(&candidates, |_| {}).await?;
//! println!("{} dives", logs.len());
//!
//! session.close().await
//! # }
//! ```

mod byteview;

pub mod device;
pub mod dive;
pub mod error;
pub mod link;
pub mod lre;
pub mod manifest;
pub mod mock;
pub mod packet;
pub mod pnf;
pub mod protocol;
pub mod session;
pub mod slip;
pub mod transport;

pub use error::{Error, Result};
