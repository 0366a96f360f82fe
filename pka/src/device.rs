/*++

Licensed under the Apache-2.0 license.

File Name:

    device.rs

Abstract:

    File contains the PKA device object: probe, firmware lifecycle driving,
    the synchronous job dispatcher and the device registry.

--*/

use crate::error::{Error, Result};
use crate::fw::{FwSlot, FwState};
use crate::fw_image::{md5_words, timestamp_to_unix, FwSegment, PkaFirmware};
use crate::loader::FirmwareLoader;
use crate::regs::{Elppka, JobStatus, OpMode, PkaConfig};
use crate::sync::{Completion, Gate};
use dwc_pka_emu_bus::{IrqLine, IrqSink, Mmio};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Tunables of one device binding.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Upper bound on one firmware job.
    pub job_timeout: Duration,
    /// Bound on an interruptible firmware drain.
    pub drain_timeout: Duration,
    /// Skip readback MD5 verification after a firmware load.
    pub skip_fw_verify: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(1),
            skip_fw_verify: false,
        }
    }
}

/// Result of one dispatched firmware job.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct JobOutcome {
    /// Hardware stop reason; 0 is a normal stop.
    pub stop_reason: u32,
    /// Condition flags snapshotted by the interrupt handler.
    pub flags: u32,
}

impl JobOutcome {
    pub fn zero_flag(&self) -> bool {
        self.flags & crate::regs::Flags::ZERO::SET.value != 0
    }
}

/// Releases a [`Gate`] on every exit path.
struct GateGuard<'a>(&'a Gate);

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// One physical accelerator instance.
pub struct PkaDevice {
    regs: Elppka,
    dcfg: DeviceConfig,
    /// At most one firmware job in flight.
    core_running: Gate,
    /// At most one firmware load/replace in flight.
    fw_loading: Gate,
    slot: FwSlot,
    fw_state: Mutex<FwState>,
    fw_state_cv: Condvar,
    last_fw_error: Mutex<Option<Error>>,
    completion: Completion,
    saved_flags: Mutex<u32>,
    loader: Arc<dyn FirmwareLoader>,
}

impl PkaDevice {
    /// Bind to a register window: parse the hardware configuration, zero the
    /// operand banks and arm the completion interrupt. Connect the returned
    /// device's [`PkaDevice::irq_line`] to the interrupt source before
    /// dispatching jobs.
    pub fn probe(
        mmio: Arc<dyn Mmio>,
        loader: Arc<dyn FirmwareLoader>,
        dcfg: DeviceConfig,
    ) -> Result<Arc<PkaDevice>> {
        let regs = Elppka::setup(mmio)?;
        Ok(Arc::new(PkaDevice {
            regs,
            dcfg,
            core_running: Gate::new(),
            fw_loading: Gate::new(),
            slot: FwSlot::new(),
            fw_state: Mutex::new(FwState::NoFirmware),
            fw_state_cv: Condvar::new(),
            last_fw_error: Mutex::new(None),
            completion: Completion::new(),
            saved_flags: Mutex::new(0),
            loader,
        }))
    }

    /// The device's completion interrupt line.
    pub fn irq_line(self: &Arc<Self>) -> IrqLine {
        let sink: Arc<dyn IrqSink> = self.clone();
        IrqLine::new(&sink)
    }

    pub fn config(&self) -> &PkaConfig {
        self.regs.config()
    }

    pub fn fw_state(&self) -> FwState {
        *self.fw_state.lock().unwrap()
    }

    fn set_fw_state(&self, state: FwState) {
        *self.fw_state.lock().unwrap() = state;
        self.fw_state_cv.notify_all();
    }

    /// Kick off an asynchronous firmware load, replacing any active image.
    /// Fails `Busy` if another load is already in progress. An automatic
    /// load tolerates a missing blob, leaving the device without firmware.
    pub fn request_firmware(self: &Arc<Self>, name: &str, is_automatic: bool) -> Result<()> {
        if !self.fw_loading.try_acquire() {
            return Err(Error::Busy);
        }
        self.set_fw_state(FwState::Draining);
        // The old image must fully drain before its replacement arrives;
        // jobs started before this point finish against the old firmware.
        if self.slot.take_and_drain(None).is_err() {
            self.fw_loading.release();
            return Err(Error::Fatal);
        }
        self.set_fw_state(FwState::Loading);
        let dev = Arc::clone(self);
        let automatic = is_automatic;
        self.loader.request(
            name,
            Box::new(move |bytes| dev.fw_arrived(automatic, bytes)),
        );
        Ok(())
    }

    /// Block until a load kicked off by [`Self::request_firmware`] settles,
    /// reporting how it went.
    pub fn wait_firmware(&self) -> Result<()> {
        let mut state = self.fw_state.lock().unwrap();
        while *state == FwState::Loading {
            state = self.fw_state_cv.wait(state).unwrap();
        }
        match *state {
            FwState::LoadFailed => {
                drop(state);
                Err(self
                    .last_fw_error
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or(Error::Fatal))
            }
            _ => Ok(()),
        }
    }

    /// Synchronous load: request then wait.
    pub fn setup_firmware(self: &Arc<Self>, name: &str) -> Result<()> {
        self.request_firmware(name, false)?;
        self.wait_firmware()
    }

    /// Drop the active firmware. An interruptible destroy gives up after
    /// `drain_timeout`, restoring the device's reference so the firmware
    /// stays usable; callers retry or treat the failure as transient.
    pub fn destroy_firmware(&self, interruptible: bool) -> Result<()> {
        if !self.fw_loading.try_acquire() {
            return Err(Error::Busy);
        }
        let _gate = GateGuard(&self.fw_loading);
        self.set_fw_state(FwState::Draining);
        let timeout = interruptible.then_some(self.dcfg.drain_timeout);
        match self.slot.take_and_drain(timeout) {
            Ok(_) => {
                self.set_fw_state(FwState::NoFirmware);
                Ok(())
            }
            Err(e) => {
                self.set_fw_state(FwState::Active);
                Err(e)
            }
        }
    }

    /// Tear down the binding: wait out any pending firmware load, then drop
    /// the firmware once every job reference drains.
    pub fn shutdown(&self) {
        self.fw_loading.acquire();
        let _gate = GateGuard(&self.fw_loading);
        self.set_fw_state(FwState::Draining);
        let _ = self.slot.take_and_drain(None);
        self.set_fw_state(FwState::NoFirmware);
    }

    /// Asynchronous completion of a firmware fetch.
    fn fw_arrived(&self, automatic: bool, bytes: Option<Vec<u8>>) {
        let result = match bytes {
            None => Err(Error::NotFound),
            Some(bytes) => PkaFirmware::parse(&bytes).and_then(|fw| {
                self.load_and_verify(&fw)?;
                self.slot.install(Arc::new(fw));
                Ok(())
            }),
        };
        match result {
            Ok(()) => {
                *self.last_fw_error.lock().unwrap() = None;
                self.set_fw_state(FwState::Active);
            }
            Err(Error::NotFound) if automatic => {
                *self.last_fw_error.lock().unwrap() = None;
                self.set_fw_state(FwState::NoFirmware);
            }
            Err(e) => {
                *self.last_fw_error.lock().unwrap() = Some(e);
                self.set_fw_state(FwState::LoadFailed);
            }
        }
        self.fw_loading.release();
    }

    /// Load the RAM segment into firmware RAM, then verify RAM and ROM
    /// regions independently against their tags by hashing the words
    /// actually present in hardware.
    fn load_and_verify(&self, fw: &PkaFirmware) -> Result<()> {
        let cfg = *self.regs.config();
        if let Some(ram) = fw.ram() {
            if ram.words.len() as u32 > cfg.fw_ram_size {
                return Err(Error::InvalidSize);
            }
            self.regs.write_fw_ram(ram.tag.origin, &ram.words)?;
        }
        if self.dcfg.skip_fw_verify {
            return Ok(());
        }
        if let Some(ram) = fw.ram() {
            self.verify_segment("RAM", ram, |at| self.regs.read_fw_ram(at))?;
        }
        if let Some(rom) = fw.rom() {
            let covered = rom.tag.tag_length.saturating_add(rom.tag.md5_coverage);
            if covered > cfg.fw_rom_size {
                return Err(Error::InvalidSize);
            }
            self.verify_segment("ROM", rom, |at| self.regs.read_fw_rom(at))?;
        }
        Ok(())
    }

    fn verify_segment(
        &self,
        kind: &str,
        seg: &FwSegment,
        read_word: impl Fn(u32) -> Result<u32>,
    ) -> Result<()> {
        let tag = &seg.tag;
        let first = tag
            .origin
            .checked_add(tag.tag_length)
            .ok_or(Error::InvalidSize)?;
        let end = first
            .checked_add(tag.md5_coverage)
            .ok_or(Error::InvalidSize)?;
        let mut words = Vec::with_capacity(tag.md5_coverage as usize);
        for at in first..end {
            words.push(read_word(at)?);
        }
        let actual = md5_words(words);
        if actual != tag.md5 {
            return Err(Error::InvalidFirmware(format!(
                "{kind} readback mismatch: built unix {}, {} words covered, expected md5 {} got {}",
                timestamp_to_unix(tag.timestamp),
                tag.md5_coverage,
                hex_str(&tag.md5),
                hex_str(&actual),
            )));
        }
        Ok(())
    }

    /// Claim the core for a load-dispatch-unload sequence, blocking until it
    /// is free. Holds a firmware reference until the lease drops.
    pub fn begin(&self) -> Result<CoreLease<'_>> {
        let token = self.slot.acquire()?;
        self.core_running.acquire();
        Ok(CoreLease { dev: self, token })
    }

    /// Like [`Self::begin`], but fails `Busy` instead of waiting when
    /// another job holds the core.
    pub fn try_begin(&self) -> Result<CoreLease<'_>> {
        let token = self.slot.acquire()?;
        if !self.core_running.try_acquire() {
            return Err(Error::Busy);
        }
        Ok(CoreLease { dev: self, token })
    }

    /// Dispatch one named firmware routine over already-loaded operands and
    /// block until it stops. Serializes with other callers.
    pub fn run(&self, entry_name: &str, size: usize, mode: OpMode, flags: u32) -> Result<JobOutcome> {
        self.begin()?.exec(entry_name, size, mode, flags)
    }

    /// Non-blocking variant of [`Self::run`].
    pub fn try_run(
        &self,
        entry_name: &str,
        size: usize,
        mode: OpMode,
        flags: u32,
    ) -> Result<JobOutcome> {
        self.try_begin()?.exec(entry_name, size, mode, flags)
    }
}

/// Exclusive hold of the PKA core between operand loads and the job they
/// feed. Dropping the lease releases the core-running gate and the
/// firmware reference on every exit path.
pub struct CoreLease<'a> {
    dev: &'a PkaDevice,
    token: crate::fw::FwToken,
}

impl CoreLease<'_> {
    /// Register-level access for operand loads and unloads.
    pub fn pka(&self) -> &Elppka {
        &self.dev.regs
    }

    /// Start `entry_name` with the given operand size and byte-order mode,
    /// then block (bounded) for the completion interrupt.
    pub fn exec(&self, entry_name: &str, size: usize, mode: OpMode, flags: u32) -> Result<JobOutcome> {
        let dev = self.dev;
        let entry = self.token.firmware().symbol(entry_name).ok_or_else(|| {
            Error::InvalidFirmware(format!(
                "no entry point '{entry_name}' in {}",
                self.token.firmware().describe()
            ))
        })?;

        dev.regs.byteswap(mode == OpMode::Rsa)?;
        dev.completion.reset();
        dev.regs.start(entry, flags, size)?;

        let deadline = Instant::now() + dev.dcfg.job_timeout;
        loop {
            if !dev.completion.wait_until(deadline) {
                // No way to know what the core is doing any more; stop it
                // and report. Bank contents are undefined from here on.
                let _ = dev.regs.abort();
                return Err(Error::Timeout);
            }
            match dev.regs.get_status()? {
                JobStatus::InProgress => {
                    // Stale completion from an earlier aborted job. Resetting
                    // here could swallow the real signal, so poll instead.
                    std::thread::sleep(Duration::from_micros(100));
                }
                JobStatus::Done(stop_reason) => {
                    let flags = *dev.saved_flags.lock().unwrap();
                    return Ok(JobOutcome { stop_reason, flags });
                }
            }
        }
    }
}

impl Drop for CoreLease<'_> {
    fn drop(&mut self) {
        self.dev.core_running.release();
    }
}

impl IrqSink for PkaDevice {
    /// Completion interrupt: snapshot the flags register, acknowledge, and
    /// release the waiting job.
    fn irq(&self) {
        if let Ok(flags) = self.regs.flags() {
            *self.saved_flags.lock().unwrap() = flags;
        }
        let _ = self.regs.ack_irq();
        self.completion.signal();
    }
}

fn hex_str(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Explicit device registry handed to crypto contexts instead of global
/// state; contexts bind at construction and cache their device.
pub struct PkaRegistry {
    devices: Mutex<Vec<Arc<PkaDevice>>>,
}

impl PkaRegistry {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, dev: Arc<PkaDevice>) {
        self.devices.lock().unwrap().push(dev);
    }

    /// Drop a device from the registry after quiescing it.
    pub fn unregister(&self, dev: &Arc<PkaDevice>) {
        dev.shutdown();
        self.devices
            .lock()
            .unwrap()
            .retain(|d| !Arc::ptr_eq(d, dev));
    }

    /// First-available policy: the earliest registered device.
    pub fn first_available(&self) -> Option<Arc<PkaDevice>> {
        self.devices.lock().unwrap().first().cloned()
    }
}

impl Default for PkaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
