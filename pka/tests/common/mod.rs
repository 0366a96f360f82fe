/*++

Licensed under the Apache-2.0 license.

File Name:

    mod.rs

Abstract:

    File contains shared bring-up helpers for the integration tests.

--*/

use dwc_pka::{DeviceConfig, MemLoader, PkaDevice, PkaRegistry};
use dwc_pka_emu_periph::{standard_firmware, PkaPeriph, PkaPeriphConfig};
use std::sync::Arc;

pub const FW_NAME: &str = "elppka.elpfw";
pub const FW_TIMESTAMP: u32 = 0x1000;

/// Bring up one modeled device with the standard firmware loaded and a
/// registry that knows about it.
pub fn bring_up(
    periph_cfg: PkaPeriphConfig,
    dev_cfg: DeviceConfig,
) -> (PkaPeriph, Arc<PkaDevice>, PkaRegistry) {
    let (periph, dev, registry) = bring_up_no_fw(periph_cfg, dev_cfg);
    dev.setup_firmware(FW_NAME).unwrap();
    (periph, dev, registry)
}

/// Same, but without loading any firmware.
pub fn bring_up_no_fw(
    periph_cfg: PkaPeriphConfig,
    dev_cfg: DeviceConfig,
) -> (PkaPeriph, Arc<PkaDevice>, PkaRegistry) {
    let periph = PkaPeriph::new(periph_cfg);
    let loader = Arc::new(MemLoader::new());
    loader.insert(FW_NAME, standard_firmware(FW_TIMESTAMP));
    let dev = PkaDevice::probe(Arc::new(periph.clone()), loader, dev_cfg).unwrap();
    periph.connect_irq(dev.irq_line());
    let registry = PkaRegistry::new();
    registry.register(dev.clone());
    (periph, dev, registry)
}

pub fn default_setup() -> (PkaPeriph, Arc<PkaDevice>, PkaRegistry) {
    bring_up(PkaPeriphConfig::default(), DeviceConfig::default())
}
