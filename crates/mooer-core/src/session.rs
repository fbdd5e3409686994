//! Device session - composite operations over one dispatcher.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::dispatch::{DispatchError, Dispatcher, DispatcherConfig, IdentifyInfo, Request, Response};
use crate::events::{SessionEvent, SessionObserver, SessionPhase, TracingObserver};
use crate::files::{BackupArchive, IrContainer};
use crate::preset::{ModuleKind, Preset, check_slot};
use crate::protocol::Command;
use crate::protocol::constants::{
    DEFAULT_MAX_FRAME_LEN, GE150_PRODUCT_ID, HID_INTERFACE, HID_REPORT_SIZE, MAX_PRESET_SLOT,
    MBF_ENTRY_COUNT, MOOER_VENDOR_ID,
};
use crate::transport::{NusbTransport, PacketTransport, TransportError};

/// Pause between discovery attempts while waiting for the device.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// HID interface carrying the control channel.
    pub interface: u8,
    /// Per-attempt response deadline.
    pub timeout_ms: u64,
    /// Resends on timeout or corrupt reply.
    pub retries: u32,
    pub packet_size: usize,
    /// Largest declared frame size accepted from the device.
    pub max_frame_len: usize,
    pub inter_packet_delay_ms: u64,
    /// How long `open` polls for the device.
    pub connect_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vendor_id: MOOER_VENDOR_ID,
            product_id: GE150_PRODUCT_ID,
            interface: HID_INTERFACE,
            timeout_ms: 1000,
            retries: 1,
            packet_size: HID_REPORT_SIZE,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            inter_packet_delay_ms: 10,
            connect_timeout_secs: 5,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: SessionConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl From<&SessionConfig> for DispatcherConfig {
    fn from(config: &SessionConfig) -> Self {
        DispatcherConfig {
            timeout: Duration::from_millis(config.timeout_ms),
            retries: config.retries,
            packet_size: config.packet_size,
            max_frame_len: config.max_frame_len,
            inter_packet_delay: Duration::from_millis(config.inter_packet_delay_ms),
        }
    }
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub written: Vec<u8>,
    /// Slots left alone because the device already holds a named preset.
    pub protected: Vec<u8>,
    /// Empty archive entries.
    pub empty: usize,
}

/// One row of a slot listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetSummary {
    pub slot: u8,
    pub name: String,
    pub empty: bool,
}

/// One connected device and the presets seen on it so far.
pub struct DeviceSession<T: PacketTransport, O: SessionObserver = TracingObserver> {
    dispatcher: Dispatcher<T, O>,
    cache: HashMap<u8, Preset>,
    info: Option<IdentifyInfo>,
}

impl DeviceSession<NusbTransport, TracingObserver> {
    /// Wait for the device, claim it and identify it.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        Self::open_with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: SessionObserver> DeviceSession<NusbTransport, O> {
    pub fn open_with_observer(config: &SessionConfig, observer: Arc<O>) -> Result<Self> {
        let transport = wait_for_device(config, observer.as_ref(), || {
            NusbTransport::open(config.vendor_id, config.product_id, config.interface)
        })?;
        observer.on_event(&SessionEvent::DeviceConnected {
            vid: transport.vendor_id(),
            pid: transport.product_id(),
        });
        let mut session = Self::with_transport(transport, config, observer);
        session.identify()?;
        Ok(session)
    }
}

impl<T: PacketTransport, O: SessionObserver> DeviceSession<T, O> {
    pub fn with_transport(transport: T, config: &SessionConfig, observer: Arc<O>) -> Self {
        Self {
            dispatcher: Dispatcher::with_observer(transport, config.into(), observer),
            cache: HashMap::new(),
            info: None,
        }
    }

    pub fn dispatcher(&mut self) -> &mut Dispatcher<T, O> {
        &mut self.dispatcher
    }

    /// Identity from the last successful `identify`.
    pub fn info(&self) -> Option<&IdentifyInfo> {
        self.info.as_ref()
    }

    pub fn cached_preset(&self, slot: u8) -> Option<&Preset> {
        self.cache.get(&slot)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn emit(&self, event: SessionEvent) {
        self.dispatcher.observer().on_event(&event);
    }

    #[instrument(skip(self))]
    pub fn identify(&mut self) -> Result<IdentifyInfo> {
        let info = match self.dispatcher.send(&Request::Identify)? {
            Response::Identify(info) => info,
            other => return Err(unexpected(Command::Identify, &other)),
        };
        info!(firmware = %info.firmware, device = %info.device_name, "Device identified");
        self.info = Some(info.clone());
        Ok(info)
    }

    #[instrument(skip(self))]
    pub fn read_preset(&mut self, slot: u8) -> Result<Preset> {
        let preset = match self.dispatcher.send(&Request::ReadPreset { slot })? {
            Response::Preset { slot: got, preset } if got == slot => *preset,
            Response::Preset { slot: got, .. } => {
                return Err(DispatchError::UnexpectedResponse {
                    command: Command::Preset.id(),
                    reason: format!("asked for slot {slot}, device sent slot {got}"),
                }
                .into());
            }
            other => return Err(unexpected(Command::Preset, &other)),
        };
        debug!(slot, name = %preset.name(), "Preset read");
        self.cache.insert(slot, preset.clone());
        Ok(preset)
    }

    #[instrument(skip(self, preset), fields(name = %preset.name()))]
    pub fn store_preset(&mut self, slot: u8, preset: &Preset) -> Result<()> {
        let mut preset = preset.clone();
        preset.slot = slot;
        match self
            .dispatcher
            .send(&Request::store_patch(slot, preset.clone()))?
        {
            Response::Ack { .. } => {}
            other => return Err(unexpected(Command::StorePatch, &other)),
        }
        info!(slot, "Preset stored");
        self.cache.insert(slot, preset);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn select_preset(&mut self, slot: u8) -> Result<()> {
        match self.dispatcher.send(&Request::SelectPatch { slot })? {
            Response::ActivePatch { slot: got } if got != slot => Err(anyhow!(
                "device switched to slot {got} instead of {slot}"
            )),
            Response::ActivePatch { .. } | Response::Ack { .. } => Ok(()),
            other => Err(unexpected(Command::ActivePatch, &other)),
        }
    }

    /// Reorder the signal chain of the active patch.
    #[instrument(skip(self))]
    pub fn set_effect_order(&mut self, order: &[ModuleKind]) -> Result<()> {
        match self.dispatcher.send(&Request::effect_order(order)?)? {
            Response::Ack { .. } => {}
            other => return Err(unexpected(Command::PatchSetting, &other)),
        }
        info!(?order, "Effect order set");
        Ok(())
    }

    /// Read slots `start..=end` (either order) and summarize them.
    #[instrument(skip(self))]
    pub fn list_presets(&mut self, start: u8, end: u8) -> Result<Vec<PresetSummary>> {
        check_slot(start, MAX_PRESET_SLOT)?;
        check_slot(end, MAX_PRESET_SLOT)?;
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let total = (end - start) as u64 + 1;

        let mut listing = Vec::with_capacity(total as usize);
        for slot in start..=end {
            let preset = self
                .read_preset(slot)
                .with_context(|| format!("reading slot {slot}"))?;
            listing.push(PresetSummary {
                slot,
                name: preset.name(),
                empty: !preset.is_named(),
            });
            self.emit(SessionEvent::Progress {
                phase: SessionPhase::Listing,
                current: listing.len() as u64,
                total,
            });
        }
        self.emit(SessionEvent::Complete {
            phase: SessionPhase::Listing,
        });
        Ok(listing)
    }

    /// Copy the preset at `from` into `to`. Returns the copied preset.
    pub fn copy_preset(&mut self, from: u8, to: u8) -> Result<Preset> {
        check_slot(to, MAX_PRESET_SLOT)?;
        let preset = self.read_preset(from)?;
        self.store_preset(to, &preset)?;
        info!(from, to, name = %preset.name(), "Preset copied");
        Ok(preset)
    }

    pub fn swap_presets(&mut self, a: u8, b: u8) -> Result<()> {
        if a == b {
            check_slot(a, MAX_PRESET_SLOT)?;
            return Ok(());
        }
        let first = self.read_preset(a)?;
        let second = self.read_preset(b)?;
        self.store_preset(a, &second)?;
        self.store_preset(b, &first)?;
        info!(a, b, "Presets swapped");
        Ok(())
    }

    /// Read every archivable slot. `progress` gets (done, total).
    #[instrument(skip(self, progress))]
    pub fn backup<F: FnMut(usize, usize)>(&mut self, mut progress: F) -> Result<BackupArchive> {
        let mut archive = BackupArchive::default();
        let total = MBF_ENTRY_COUNT;
        for slot in 0..total as u8 {
            let preset = self
                .read_preset(slot)
                .with_context(|| format!("reading slot {slot}"))?;
            archive.set(slot, Some(preset))?;
            progress(slot as usize + 1, total);
            self.emit(SessionEvent::Progress {
                phase: SessionPhase::Backup,
                current: slot as u64 + 1,
                total: total as u64,
            });
        }
        info!(slots = total, named = archive.presets().filter(|p| p.is_named()).count(), "Backup complete");
        self.emit(SessionEvent::Complete {
            phase: SessionPhase::Backup,
        });
        Ok(archive)
    }

    /// Write archive entries back to the device.
    ///
    /// Empty entries are skipped. Without `overwrite`, slots that currently
    /// hold a named preset are left untouched.
    #[instrument(skip(self, archive))]
    pub fn restore(&mut self, archive: &BackupArchive, overwrite: bool) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        let total = archive.entries().len();

        for (index, entry) in archive.entries().iter().enumerate() {
            let slot = index as u8;
            self.emit(SessionEvent::Progress {
                phase: SessionPhase::Restore,
                current: index as u64 + 1,
                total: total as u64,
            });

            let Some(preset) = &entry.preset else {
                report.empty += 1;
                continue;
            };

            if !overwrite {
                let existing = self
                    .read_preset(slot)
                    .with_context(|| format!("checking slot {slot}"))?;
                if existing.is_named() {
                    debug!(slot, existing = %existing.name(), "Slot occupied, skipping");
                    report.protected.push(slot);
                    continue;
                }
            }

            self.store_preset(slot, preset)
                .with_context(|| format!("restoring slot {slot}"))?;
            report.written.push(slot);
        }

        info!(
            written = report.written.len(),
            protected = report.protected.len(),
            empty = report.empty,
            "Restore complete"
        );
        self.emit(SessionEvent::Complete {
            phase: SessionPhase::Restore,
        });
        Ok(report)
    }

    /// Upload the IR payload of a `.gnr` container to a user cabinet slot.
    #[instrument(skip(self, container), fields(bytes = container.ir_data.len()))]
    pub fn upload_ir(&mut self, slot: u8, container: &IrContainer) -> Result<()> {
        if container.ir_data.is_empty() {
            bail!("IR container holds no impulse data");
        }
        let request = Request::UploadCabinet {
            slot,
            data: container.ir_data.clone(),
        };
        match self.dispatcher.send(&request)? {
            Response::Ack { .. } => {}
            other => return Err(unexpected(Command::CabinetUpload, &other)),
        }
        info!(slot, "IR uploaded");
        self.emit(SessionEvent::Complete {
            phase: SessionPhase::IrUpload,
        });
        Ok(())
    }
}

fn unexpected(command: Command, response: &Response) -> anyhow::Error {
    DispatchError::UnexpectedResponse {
        command: command.id(),
        reason: format!("{response:?}"),
    }
    .into()
}

/// Poll `open` until the device appears or the connect timeout passes.
fn wait_for_device<T, O, F>(config: &SessionConfig, observer: &O, mut open: F) -> Result<T>
where
    T: PacketTransport,
    O: SessionObserver,
    F: FnMut() -> Result<T, TransportError>,
{
    info!("Waiting for device...");
    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let max_polls = (timeout.as_millis() / POLL_INTERVAL.as_millis()) as u64 + 1;
    let start = Instant::now();
    let mut poll_count = 0u64;

    loop {
        poll_count += 1;
        observer.on_event(&SessionEvent::Progress {
            phase: SessionPhase::Connecting,
            current: poll_count.min(max_polls),
            total: max_polls,
        });

        match open() {
            Ok(t) => {
                info!(
                    vid = format!("{:04X}", t.vendor_id()),
                    pid = format!("{:04X}", t.product_id()),
                    "Device found after {} polls",
                    poll_count
                );
                return Ok(t);
            }
            Err(TransportError::DeviceNotFound { vid, pid }) => {
                if start.elapsed() >= timeout {
                    return Err(anyhow!(
                        "No device {:04X}:{:04X} after {}s",
                        vid,
                        pid,
                        timeout.as_secs()
                    ));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(e.into()),
        }
    }
}
