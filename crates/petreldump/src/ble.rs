//! btleplug implementation of the core's BLE link.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use shearlink::link::{BleLink, LinkWriteType};
use uuid::{uuid, Uuid};

/// Shearwater BLE serial service.
const DC_SERVICE: Uuid = uuid!("fe25c237-0ece-443c-b0aa-e02033e7029d");

pub struct BtleplugLink {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
}

impl BtleplugLink {
    /// Scan for a device advertising the serial service and connect.
    pub async fn connect(device_id: Option<String>, scan: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no Bluetooth adapter found"))?;

        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(scan).await;

        let mut found = Vec::new();
        for p in adapter.peripherals().await? {
            if let Some(props) = p.properties().await? {
                if props.services.contains(&DC_SERVICE) {
                    found.push(p);
                }
            }
        }
        if found.is_empty() {
            return Err(anyhow!("no dive computer found"));
        }

        let peripheral = match device_id {
            Some(ref target) => found
                .iter()
                .find(|p| format!("{}", p.id()) == *target)
                .cloned()
                .ok_or_else(|| anyhow!("'{}' not found", target))?,
            None => {
                let p = found.into_iter().next().unwrap();
                eprintln!("Using: {}", p.id());
                p
            }
        };

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let write_char = characteristics
            .iter()
            .find(|c| {
                c.service_uuid == DC_SERVICE
                    && c.properties
                        .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
            })
            .cloned()
            .context("write characteristic not found")?;
        let notify_char = characteristics
            .iter()
            .find(|c| c.service_uuid == DC_SERVICE && c.properties.contains(CharPropFlags::NOTIFY))
            .cloned()
            .context("notify characteristic not found")?;

        Ok(Self {
            peripheral,
            write_char,
            notify_char,
        })
    }

    /// The fastest write type the characteristic supports.
    pub fn preferred_write_type(&self) -> LinkWriteType {
        if self
            .write_char
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            LinkWriteType::WithoutResponse
        } else {
            LinkWriteType::WithResponse
        }
    }
}

fn to_link_error(err: btleplug::Error) -> shearlink::Error {
    shearlink::Error::Link(err.to_string())
}

#[async_trait]
impl BleLink for BtleplugLink {
    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn enable_notifications(&self) -> shearlink::Result<()> {
        self.peripheral
            .subscribe(&self.notify_char)
            .await
            .map_err(to_link_error)
    }

    async fn write(&self, frame: &[u8], write_type: LinkWriteType) -> shearlink::Result<()> {
        let write_type = match write_type {
            LinkWriteType::WithResponse => WriteType::WithResponse,
            LinkWriteType::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(&self.write_char, frame, write_type)
            .await
            .map_err(to_link_error)
    }

    async fn notifications(&self) -> shearlink::Result<BoxStream<'static, Vec<u8>>> {
        let uuid = self.notify_char.uuid;
        let stream = self
            .peripheral
            .notifications()
            .await
            .map_err(to_link_error)?;
        Ok(stream
            .filter_map(move |n| async move { (n.uuid == uuid).then_some(n.value) })
            .boxed())
    }

    async fn close(&self) -> shearlink::Result<()> {
        self.peripheral.disconnect().await.map_err(to_link_error)
    }
}
