/*++

Licensed under the Apache-2.0 license.

File Name:

    irq.rs

Abstract:

    File contains the interrupt line abstraction connecting a peripheral to
    its driver.

--*/

use std::sync::{Arc, Weak};

/// Receiver side of an interrupt line.
pub trait IrqSink: Send + Sync {
    /// Called from interrupt context when the peripheral asserts its line.
    fn irq(&self);
}

/// One edge-triggered interrupt line.
///
/// Holds only a weak reference to the sink: a peripheral can keep raising a
/// line whose driver has been torn down without keeping the driver alive or
/// faulting.
#[derive(Clone)]
pub struct IrqLine {
    sink: Weak<dyn IrqSink>,
}

impl IrqLine {
    pub fn new(sink: &Arc<dyn IrqSink>) -> Self {
        Self {
            sink: Arc::downgrade(sink),
        }
    }

    /// Assert the line. A no-op once the sink is gone.
    pub fn raise(&self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.irq();
        }
    }
}
