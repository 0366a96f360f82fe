/*++

Licensed under the Apache-2.0 license.

File Name:

    bus.rs

Abstract:

    File contains definition of the Bus trait.

--*/

/// Access size of a bus transaction.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum BusSize {
    Byte,
    HalfWord,
    Word,
}

impl From<BusSize> for usize {
    fn from(size: BusSize) -> usize {
        match size {
            BusSize::Byte => 1,
            BusSize::HalfWord => 2,
            BusSize::Word => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusError {
    /// Load address misaligned exception
    LoadAddrMisaligned,

    /// Load access fault exception
    LoadAccessFault,

    /// Store address misaligned exception
    StoreAddrMisaligned,

    /// Store access fault exception
    StoreAccessFault,
}

/// Represents an abstract memory bus. Used to read and write from RAM and
/// peripheral addresses.
pub trait Bus {
    /// Read data of specified size from given address
    ///
    /// # Error
    ///
    /// * `BusError` - Exception with cause `BusError::LoadAccessFault` or `BusError::LoadAddrMisaligned`
    fn read(&self, size: BusSize, addr: u32) -> Result<u32, BusError>;

    /// Write data of specified size to given address
    ///
    /// # Error
    ///
    /// * `BusError` - Exception with cause `BusError::StoreAccessFault` or `BusError::StoreAddrMisaligned`
    fn write(&mut self, size: BusSize, addr: u32, val: u32) -> Result<(), BusError>;
}
