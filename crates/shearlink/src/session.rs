//! Session orchestration over one connected device.

use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::{self, DeviceInfo};
use crate::dive::DiveLog;
use crate::error::Result;
use crate::link::BleLink;
use crate::manifest::{self, DiveCandidate};
use crate::pnf;
use crate::protocol;
use crate::transport::Transport;

/// Pause between consecutive dive downloads.
const INTER_DIVE_PAUSE: Duration = Duration::from_millis(200);

/// Size passed with a dive download request. The compressed stream ends
/// itself with its end marker well before this.
const DIVE_DOWNLOAD_SIZE: u32 = 0xFF_FFFF;

/// Progress of one `download_dives` call. Reported at least once per
/// block and once when a log completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// 1-based index of the dive currently transferring.
    pub current_log_index: usize,
    pub total_logs: usize,
    /// Bytes of the current dive received so far, after expansion.
    pub current_log_bytes: usize,
}

pub struct Session<L: BleLink> {
    transport: Transport<L>,
    cancel: CancellationToken,
    log_base: Option<u32>,
}

impl<L: BleLink> Session<L> {
    pub fn new(transport: Transport<L>) -> Self {
        Self {
            transport,
            cancel: CancellationToken::new(),
            log_base: None,
        }
    }

    /// Token hosts can trip to stop an in-flight download at the next
    /// block boundary. `close` still runs afterwards.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn read_device_info(&self) -> Result<DeviceInfo> {
        let serial = protocol::rdbi(&self.transport, device::DID_SERIAL, 8, false).await?;
        let firmware = protocol::rdbi(&self.transport, device::DID_FIRMWARE, 12, true).await?;
        let hardware = protocol::rdbi(&self.transport, device::DID_HARDWARE, 2, false).await?;
        let hardware = u16::from_be_bytes([hardware[0], hardware[1]]);

        Ok(DeviceInfo {
            serial: device::ascii_or_hex(&serial),
            firmware: device::ascii_or_hex(&firmware),
            hardware,
            model: device::hardware_model_name(hardware),
        })
    }

    async fn log_base(&mut self) -> Result<u32> {
        if let Some(base) = self.log_base {
            return Ok(base);
        }
        let raw = protocol::rdbi(&self.transport, device::DID_LOG_BASE, 9, false).await?;
        let reported = u32::from_be_bytes([raw[1], raw[2], raw[3], raw[4]]);
        let base = device::normalise_log_base(reported);
        debug!(
            reported = format_args!("{reported:#010x}"),
            base = format_args!("{base:#010x}"),
            "log base address"
        );
        self.log_base = Some(base);
        Ok(base)
    }

    /// Scan the on-device manifest. Candidates come back in scan order,
    /// newest dive first.
    pub async fn download_manifest(&mut self) -> Result<Vec<DiveCandidate>> {
        self.log_base().await?;
        let data = protocol::download(
            &self.transport,
            manifest::MANIFEST_ADDRESS,
            manifest::MANIFEST_SIZE,
            false,
            &self.cancel,
            |_| {},
        )
        .await?;

        let candidates = manifest::scan(&data);
        info!(count = candidates.len(), "manifest scanned");
        Ok(candidates)
    }

    /// Download every candidate and decode it. A dive that fails to
    /// decode still comes back, raw bytes intact, with `dive: None`.
    pub async fn download_dives(
        &mut self,
        candidates: &[DiveCandidate],
        mut progress: impl FnMut(DownloadProgress),
    ) -> Result<Vec<DiveLog>> {
        let base = self.log_base().await?;
        let total = candidates.len();
        let mut logs = Vec::with_capacity(total);

        for (i, candidate) in candidates.iter().enumerate() {
            let index = i + 1;
            sleep(INTER_DIVE_PAUSE).await;

            let raw = protocol::download(
                &self.transport,
                base + candidate.address,
                DIVE_DOWNLOAD_SIZE,
                true,
                &self.cancel,
                |bytes| {
                    progress(DownloadProgress {
                        current_log_index: index,
                        total_logs: total,
                        current_log_bytes: bytes,
                    })
                },
            )
            .await?;

            let dive = match pnf::parse(&raw) {
                Ok(mut dive) => {
                    if let Some(offset) = dive.timezone_offset_s {
                        // The device logs wall-clock time as if it were
                        // UTC; shift it back to true UTC.
                        dive.start_time -= offset;
                    }
                    Some(dive)
                }
                Err(err) => {
                    warn!(
                        fingerprint = %hex::encode(candidate.fingerprint),
                        %err,
                        "dive did not decode, keeping raw log"
                    );
                    None
                }
            };

            progress(DownloadProgress {
                current_log_index: index,
                total_logs: total,
                current_log_bytes: raw.len(),
            });
            logs.push(DiveLog {
                fingerprint: candidate.fingerprint,
                raw_data: raw,
                dive,
            });
        }

        Ok(logs)
    }

    /// End the device session and shut the transport down.
    pub async fn close(self) -> Result<()> {
        protocol::end_session(&self.transport).await;
        self.transport.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkWriteType;
    use crate::mock::MockLink;
    use crate::pnf::tests::block;

    async fn session(link: &MockLink) -> Session<MockLink> {
        let transport = Transport::new(link.clone(), LinkWriteType::WithoutResponse)
            .await
            .expect("transport");
        Session::new(transport)
    }

    fn rdbi_reply(id: u16, payload: &[u8]) -> Vec<u8> {
        let mut reply = vec![0x62];
        reply.extend(id.to_be_bytes());
        reply.extend_from_slice(payload);
        reply
    }

    fn push_log_base(link: &MockLink) {
        link.push_reply(&rdbi_reply(
            0x8021,
            &[0x00, 0xDD, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        ));
    }

    /// Script an uncompressed download of `data` in 240-byte blocks.
    fn push_uncompressed_download(link: &MockLink, data: &[u8]) {
        link.push_reply(&[0x75, 0x00, 0xF0]);
        for (i, chunk) in data.chunks(0xF0).enumerate() {
            let mut reply = vec![0x76, (i + 1) as u8];
            reply.extend_from_slice(chunk);
            link.push_reply(&reply);
        }
        link.push_reply(&[0x77, 0x00]);
    }

    /// Script a compressed download whose expanded content is `data`.
    fn push_compressed_download(link: &MockLink, data: &[u8]) {
        let mut obfuscated = data.to_vec();
        for i in (32..obfuscated.len()).rev() {
            obfuscated[i] ^= obfuscated[i - 32];
        }
        let mut codewords: Vec<u16> = obfuscated.iter().map(|&b| 0x100 | u16::from(b)).collect();
        codewords.push(0);

        link.push_reply(&[0x75, 0x00, 0xF0]);
        // One oversized block; the mock does not enforce block sizing.
        let mut reply = vec![0x76, 0x01];
        reply.extend(crate::lre::pack(&codewords));
        link.push_reply(&reply);
        link.push_reply(&[0x77, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_device_info() {
        let link = MockLink::new();
        link.push_reply(&rdbi_reply(0x8010, b"9C5A8BB\0"));
        link.push_reply(&rdbi_reply(0x8011, b"V2.98"));
        link.push_reply(&rdbi_reply(0x8050, &[0x0F, 0x0F]));
        let session = session(&link).await;

        let info = session.read_device_info().await.unwrap();
        assert_eq!(info.serial, "9C5A8BB");
        assert_eq!(info.firmware, "V2.98");
        assert_eq!(info.hardware, 0x0F0F);
        assert_eq!(info.model, "Teric");
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_manifest() {
        let link = MockLink::new();
        push_log_base(&link);

        let mut manifest_data = Vec::new();
        for (i, header) in [0xA5C4u16, 0x5A23, 0xA5C4].iter().enumerate() {
            let mut rec = vec![0u8; 0x20];
            rec[0..2].copy_from_slice(&header.to_be_bytes());
            rec[4..8].copy_from_slice(&[i as u8; 4]);
            rec[20..24].copy_from_slice(&(0x1000u32 * (i as u32 + 1)).to_be_bytes());
            manifest_data.extend(rec);
        }
        manifest_data.extend(vec![0u8; 0x600 - manifest_data.len()]);
        push_uncompressed_download(&link, &manifest_data);

        let mut session = session(&link).await;
        let candidates = session.download_manifest().await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].ordinal, 1);
        assert_eq!(candidates[0].fingerprint, [0; 4]);
        assert_eq!(candidates[0].address, 0x1000);
        assert_eq!(candidates[1].ordinal, 2);
        assert_eq!(candidates[1].address, 0x3000);

        // The manifest read is addressed absolutely, not via the log base.
        let requests = link.requests();
        assert_eq!(
            requests[1].payload,
            vec![0x35, 0x00, 0x34, 0xE0, 0x00, 0x00, 0x00, 0x00, 0x06, 0x00]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_dives_applies_timezone() {
        let mut dive_data = Vec::new();
        dive_data.extend(block(
            0x10,
            &[(12, &1_700_000_000u32.to_be_bytes()), (20, &[21])],
        ));
        dive_data.extend(block(0x14, &[(1, &[6]), (16, &[9]), (17, &1u16.to_be_bytes())]));
        dive_data.extend(block(0x15, &[(26, &480i32.to_be_bytes()), (30, &[1])]));
        dive_data.extend(block(0x01, &[(1, &100u16.to_be_bytes()), (8, &[21])]));
        dive_data.extend(block(0xFF, &[(13, &[8])]));

        let link = MockLink::new();
        push_log_base(&link);
        push_compressed_download(&link, &dive_data);

        let candidate = DiveCandidate {
            ordinal: 1,
            fingerprint: [0xAA, 0x11, 0xBB, 0x22],
            address: 0x1000,
        };

        let mut session = session(&link).await;
        let mut reports = Vec::new();
        let logs = session
            .download_dives(std::slice::from_ref(&candidate), |p| reports.push(p))
            .await
            .unwrap();

        assert_eq!(logs.len(), 1);
        let dive = logs[0].dive.as_ref().expect("parsed dive");
        assert_eq!(dive.timezone_offset_s, Some(32_400));
        assert_eq!(dive.start_time, 1_700_000_000 - 32_400);
        assert_eq!(logs[0].raw_data, dive_data);
        assert_eq!(logs[0].fingerprint, [0xAA, 0x11, 0xBB, 0x22]);

        // Dive data is addressed relative to the normalised log base.
        let requests = link.requests();
        assert_eq!(
            requests[1].payload,
            vec![0x35, 0x10, 0x34, 0xC0, 0x00, 0x10, 0x00, 0xFF, 0xFF, 0xFF]
        );

        assert!(!reports.is_empty());
        let last = reports.last().unwrap();
        assert_eq!(last.current_log_index, 1);
        assert_eq!(last.total_logs, 1);
        assert_eq!(last.current_log_bytes, dive_data.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_dive_becomes_stub_log() {
        // A valid transfer whose content is junk: one empty record.
        let junk = vec![0u8; 32];

        let link = MockLink::new();
        push_log_base(&link);
        push_compressed_download(&link, &junk);

        let candidate = DiveCandidate {
            ordinal: 1,
            fingerprint: [1, 2, 3, 4],
            address: 0x2000,
        };

        let mut session = session(&link).await;
        let logs = session
            .download_dives(std::slice::from_ref(&candidate), |_| {})
            .await
            .unwrap();

        assert_eq!(logs.len(), 1);
        assert!(logs[0].dive.is_none());
        assert_eq!(logs[0].raw_data, junk);
        assert_eq!(logs[0].fingerprint, [1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_sends_end_session() {
        let link = MockLink::new();
        let session = session(&link).await;
        session.close().await.unwrap();

        let requests = link.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payload, vec![0x2E, 0x90, 0x20, 0x00]);
        assert!(!link.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_between_blocks() {
        let link = MockLink::new();
        push_log_base(&link);
        link.push_reply(&[0x75, 0x00, 0xF0]);

        let mut session = session(&link).await;
        session.cancellation_token().cancel();

        let candidate = DiveCandidate {
            ordinal: 1,
            fingerprint: [0; 4],
            address: 0,
        };
        let err = session
            .download_dives(std::slice::from_ref(&candidate), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Cancelled));
    }
}
