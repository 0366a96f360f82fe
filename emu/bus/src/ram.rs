/*++

Licensed under the Apache-2.0 license.

File Name:

    ram.rs

Abstract:

    File contains implementation of RAM.

--*/

use crate::bus::{Bus, BusError, BusSize};
use crate::mem::Mem;
use std::sync::Mutex;

/// Random Access Memory Device
pub struct Ram {
    /// Data
    data: Mutex<Mem>,
}

impl Ram {
    /// Create new RAM
    ///
    /// # Arguments
    ///
    /// * `data` - Data to be stored in the RAM
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(Mem::new(data)),
        }
    }

    /// Create new zero-filled RAM of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: Mutex::new(Mem::zeroed(len)),
        }
    }

    pub fn mmap_size(&self) -> u32 {
        self.data.lock().unwrap().len() as u32
    }
}

impl Bus for Ram {
    fn read(&self, size: BusSize, addr: u32) -> Result<u32, BusError> {
        self.data.lock().unwrap().read(size, addr).map_err(Into::into)
    }

    fn write(&mut self, size: BusSize, addr: u32, val: u32) -> Result<(), BusError> {
        self.data
            .lock()
            .unwrap()
            .write(size, addr, val)
            .map_err(Into::into)
    }
}

// A RAM behind a shared handle is also a valid word-I/O window; the driver's
// operand load/unload unit tests run against one without any peripheral
// behavior behind it.
impl crate::mmio::Mmio for Ram {
    fn read_reg(&self, offset: u32) -> Result<u32, BusError> {
        self.data
            .lock()
            .unwrap()
            .read(BusSize::Word, offset)
            .map_err(Into::into)
    }

    fn write_reg(&self, offset: u32, val: u32) -> Result<(), BusError> {
        self.data
            .lock()
            .unwrap()
            .write(BusSize::Word, offset, val)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let mut ram = Ram::new(vec![1, 2, 3, 4]);
        assert_eq!(
            ram.read(BusSize::Word, 0).ok(),
            Some(1 | 2 << 8 | 3 << 16 | 4 << 24)
        );
        assert_eq!(ram.write(BusSize::Word, 0, 0xDEAD_BEEF).ok(), Some(()));
        assert_eq!(ram.read(BusSize::Word, 0).ok(), Some(0xDEAD_BEEF));
    }

    #[test]
    fn test_bounds() {
        let ram = Ram::zeroed(16);
        assert_eq!(ram.mmap_size(), 16);
        assert_eq!(
            ram.read(BusSize::Word, 16).err(),
            Some(BusError::LoadAccessFault)
        );
    }
}
