/*++

Licensed under the Apache-2.0 license.

File Name:

    fw.rs

Abstract:

    File contains the firmware reference accounting used to gate firmware
    replacement on in-flight jobs.

--*/

use crate::error::{Error, Result};
use crate::fw_image::PkaFirmware;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Lifecycle state of a device's firmware slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FwState {
    NoFirmware,
    Loading,
    Active,
    Draining,
    LoadFailed,
}

/// Outstanding job references to one firmware image.
///
/// The count tracks jobs only; the device's own hold on the image is the
/// slot itself. The last token dropped signals the drain waiter.
struct FwRefs {
    count: Mutex<u32>,
    zero: Condvar,
}

impl FwRefs {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            zero: Condvar::new(),
        }
    }

    fn inc(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn dec(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// Wait for the count to reach zero. With a timeout, returns `false` if
    /// references remain when it expires.
    fn wait_zero(&self, timeout: Option<Duration>) -> bool {
        let mut count = self.count.lock().unwrap();
        match timeout {
            None => {
                while *count != 0 {
                    count = self.zero.wait(count).unwrap();
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while *count != 0 {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self.zero.wait_timeout(count, deadline - now).unwrap();
                    count = guard;
                }
                true
            }
        }
    }
}

/// A job's hold on the active firmware. Dropping it releases the reference;
/// the drop of the last token lets a pending replacement proceed.
pub struct FwToken {
    fw: Arc<PkaFirmware>,
    refs: Arc<FwRefs>,
}

impl FwToken {
    pub fn firmware(&self) -> &PkaFirmware {
        &self.fw
    }
}

impl Drop for FwToken {
    fn drop(&mut self) {
        self.refs.dec();
    }
}

pub(crate) struct ActiveFw {
    fw: Arc<PkaFirmware>,
    refs: Arc<FwRefs>,
}

/// The device's single active-firmware slot.
pub(crate) struct FwSlot {
    active: Mutex<Option<ActiveFw>>,
}

impl FwSlot {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    /// Take a job reference on the active firmware.
    pub fn acquire(&self) -> Result<FwToken> {
        let active = self.active.lock().unwrap();
        match active.as_ref() {
            Some(a) => {
                a.refs.inc();
                Ok(FwToken {
                    fw: a.fw.clone(),
                    refs: a.refs.clone(),
                })
            }
            None => Err(Error::NotFound),
        }
    }

    pub fn install(&self, fw: Arc<PkaFirmware>) {
        let mut active = self.active.lock().unwrap();
        *active = Some(ActiveFw {
            fw,
            refs: Arc::new(FwRefs::new()),
        });
    }

    /// Remove the active firmware and wait for its job references to drain.
    /// On timeout the firmware is put back, still usable, and `Cancelled`
    /// is returned.
    pub fn take_and_drain(&self, timeout: Option<Duration>) -> Result<bool> {
        let taken = self.active.lock().unwrap().take();
        let Some(active) = taken else {
            return Ok(false);
        };
        if active.refs.wait_zero(timeout) {
            Ok(true)
        } else {
            let mut slot = self.active.lock().unwrap();
            // A competing install while draining would have to hold the
            // load gate, which our caller owns; the slot is still empty.
            *slot = Some(active);
            Err(Error::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fw_image::FwImageBuilder;
    use std::thread;

    fn firmware() -> Arc<PkaFirmware> {
        let image = FwImageBuilder::new()
            .symbol("modmult", 8)
            .ram_payload(&[1, 2, 3])
            .build();
        Arc::new(PkaFirmware::parse(&image).unwrap())
    }

    #[test]
    fn test_acquire_empty_slot() {
        let slot = FwSlot::new();
        assert!(matches!(slot.acquire(), Err(Error::NotFound)));
    }

    #[test]
    fn test_drain_waits_for_tokens() {
        let slot = Arc::new(FwSlot::new());
        slot.install(firmware());
        let token = slot.acquire().unwrap();
        assert_eq!(token.firmware().symbol("modmult"), Some(8));

        let slot2 = slot.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(token);
        });
        // Blocks until the job token drops.
        assert_eq!(slot.take_and_drain(None).unwrap(), true);
        assert!(!slot2.is_loaded());
        t.join().unwrap();
    }

    #[test]
    fn test_drain_timeout_restores() {
        let slot = FwSlot::new();
        slot.install(firmware());
        let token = slot.acquire().unwrap();
        assert_eq!(
            slot.take_and_drain(Some(Duration::from_millis(20))).err(),
            Some(Error::Cancelled)
        );
        // Firmware is back and still usable.
        assert!(slot.is_loaded());
        assert!(slot.acquire().is_ok());
        drop(token);
        assert_eq!(slot.take_and_drain(None).unwrap(), true);
    }

    #[test]
    fn test_drain_empty() {
        let slot = FwSlot::new();
        assert_eq!(slot.take_and_drain(None).unwrap(), false);
    }
}
