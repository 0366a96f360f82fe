/*++

Licensed under the Apache-2.0 license.

File Name:

    mmio.rs

Abstract:

    File contains the shared-access word I/O trait drivers are written
    against.

--*/

use crate::bus::BusError;

/// Word-granular access to a device register window.
///
/// Unlike [`crate::Bus`], implementations take `&self` and must be safe to
/// share between the thread issuing register accesses and the context that
/// raises the completion interrupt; peripherals typically guard their state
/// with an internal lock.
pub trait Mmio: Send + Sync {
    /// Read the 32-bit register at byte offset `offset`.
    fn read_reg(&self, offset: u32) -> Result<u32, BusError>;

    /// Write the 32-bit register at byte offset `offset`.
    fn write_reg(&self, offset: u32, val: u32) -> Result<(), BusError>;
}
