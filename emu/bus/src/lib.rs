/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the PKA emulator bus library.

--*/

mod bus;
mod irq;
mod mem;
mod mmio;
mod ram;

pub use crate::bus::{Bus, BusError, BusSize};
pub use crate::irq::{IrqLine, IrqSink};
pub use crate::mem::{Mem, MemError};
pub use crate::mmio::Mmio;
pub use crate::ram::Ram;
