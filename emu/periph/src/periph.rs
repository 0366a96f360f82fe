/*++

Licensed under the Apache-2.0 license.

File Name:

    periph.rs

Abstract:

    File contains the PKA peripheral model: register file, operand banks,
    firmware memories and the worker standing in for the embedded
    microcontroller.

--*/

use crate::image;
use dwc_pka::{offsets, BANK_SLOTS, SLOT_BYTES};
use dwc_pka_emu_bus::{BusError, BusSize, IrqLine, Mem, Mmio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const BANK_BYTES: u32 = BANK_SLOTS * SLOT_BYTES as u32;

/// Hardware build options of the modeled instance.
#[derive(Debug, Clone)]
pub struct PkaPeriphConfig {
    /// Largest RSA operand in bits; a power-of-two multiple of 512.
    pub rsa_size: u32,
    /// Largest ECC operand in bits; a power-of-two multiple of 256.
    pub ecc_size: u32,
    /// Firmware RAM words; a power-of-two multiple of 256.
    pub fw_ram_words: u32,
    /// Firmware ROM words; a power-of-two multiple of 256.
    pub fw_rom_words: u32,
    /// Simulated execution time of one firmware job.
    pub op_delay: Duration,
}

impl Default for PkaPeriphConfig {
    fn default() -> Self {
        Self {
            rsa_size: 2048,
            ecc_size: 512,
            fw_ram_words: 2048,
            fw_rom_words: 1024,
            op_delay: Duration::ZERO,
        }
    }
}

impl PkaPeriphConfig {
    /// Encode as a type-1 build configuration register value.
    fn build_conf(&self) -> u32 {
        let sel = |v: u32, unit: u32| {
            assert!(
                v % unit == 0 && (v / unit).is_power_of_two(),
                "size {v} is not a power-of-two multiple of {unit}"
            );
            (v / unit).trailing_zeros()
        };
        (1 << 30)
            | (sel(self.fw_rom_words, 256) << 11)
            | (sel(self.fw_ram_words, 256) << 8)
            | (sel(self.ecc_size, 256) << 5)
            | (sel(self.rsa_size, 512) << 2)
    }
}

pub(crate) struct PkaState {
    pub cfg: PkaPeriphConfig,
    pub build_conf: u32,
    pub ctrl: u32,
    pub entry: u32,
    pub conf: u32,
    pub flags: u32,
    pub watchdog: u32,
    pub jump_prob: u32,
    pub irq_en: u32,
    pub f_stack: u32,
    pub index: [u32; 4],
    pub stop_reason: u32,
    pub busy: bool,
    pub irq_pending: bool,
    /// Bumped per GO; a worker whose sequence no longer matches was aborted.
    pub op_seq: u64,
    pub banks: [Mem; 4],
    pub fw_ram: Mem,
    pub fw_rom: Mem,
}

struct Inner {
    state: Mutex<PkaState>,
    irq: Mutex<Option<IrqLine>>,
}

/// One modeled PKA instance. Clones share the same hardware state; hand a
/// clone to [`dwc_pka::PkaDevice::probe`] as its register window.
#[derive(Clone)]
pub struct PkaPeriph {
    inner: Arc<Inner>,
}

impl PkaPeriph {
    pub fn new(cfg: PkaPeriphConfig) -> Self {
        let build_conf = cfg.build_conf();
        let mut fw_rom = Mem::zeroed(cfg.fw_rom_words as usize * 4);
        for (i, w) in image::factory_rom_words().iter().enumerate() {
            fw_rom
                .write_word_idx(i as u32, *w)
                .expect("factory ROM exceeds configured ROM size");
        }
        let state = PkaState {
            build_conf,
            ctrl: 0,
            entry: 0,
            conf: 0,
            flags: 0,
            watchdog: 0,
            jump_prob: 0,
            irq_en: 0,
            f_stack: 0,
            index: [0; 4],
            stop_reason: 0,
            busy: false,
            irq_pending: false,
            op_seq: 0,
            banks: [
                Mem::zeroed(BANK_BYTES as usize),
                Mem::zeroed(BANK_BYTES as usize),
                Mem::zeroed(BANK_BYTES as usize),
                Mem::zeroed(BANK_BYTES as usize),
            ],
            fw_ram: Mem::zeroed(cfg.fw_ram_words as usize * 4),
            fw_rom,
            cfg,
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                irq: Mutex::new(None),
            }),
        }
    }

    /// Connect the completion interrupt line.
    pub fn connect_irq(&self, line: IrqLine) {
        *self.inner.irq.lock().unwrap() = Some(line);
    }

    fn rc_value(st: &PkaState) -> u32 {
        (st.busy as u32) << 31 | (st.irq_pending as u32) << 30 | (st.stop_reason & 0xff) << 16
    }

    fn start_op(&self, st: &mut PkaState, val: u32) {
        st.ctrl = val;
        if st.busy {
            // GO while running is ignored by the core.
            return;
        }
        st.busy = true;
        st.stop_reason = 0;
        st.irq_pending = false;
        st.op_seq += 1;
        let seq = st.op_seq;
        let delay = st.cfg.op_delay;
        let inner = self.inner.clone();
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            let mut st = inner.state.lock().unwrap();
            if st.op_seq != seq || !st.busy {
                // Aborted or superseded while we slept.
                return;
            }
            let (reason, flags) = crate::exec::execute(&mut st);
            st.stop_reason = reason;
            st.flags = flags;
            st.busy = false;
            let raise = st.irq_en & (1 << 30) != 0;
            st.irq_pending = raise;
            drop(st);
            if raise {
                let line = inner.irq.lock().unwrap().clone();
                if let Some(line) = line {
                    line.raise();
                }
            }
        });
    }

    fn abort_op(&self, st: &mut PkaState, val: u32) {
        st.ctrl = val;
        if st.busy {
            st.busy = false;
            st.stop_reason = crate::reason::ABORTED;
            st.op_seq += 1;
        }
    }
}

impl Mmio for PkaPeriph {
    fn read_reg(&self, offset: u32) -> Result<u32, BusError> {
        let st = self.inner.state.lock().unwrap();
        match offset {
            offsets::CTRL => Ok(st.ctrl),
            offsets::ENTRY => Ok(st.entry),
            offsets::RC => Ok(Self::rc_value(&st)),
            offsets::BUILD_CONF => Ok(st.build_conf),
            offsets::F_STACK => Ok(st.f_stack),
            offsets::CONF => Ok(st.conf),
            offsets::FLAGS => Ok(st.flags),
            offsets::WATCHDOG => Ok(st.watchdog),
            offsets::JUMP_PROB => Ok(st.jump_prob),
            offsets::IRQ_EN => Ok(st.irq_en),
            offsets::INDEX_I => Ok(st.index[0]),
            offsets::INDEX_J => Ok(st.index[1]),
            offsets::INDEX_K => Ok(st.index[2]),
            offsets::INDEX_L => Ok(st.index[3]),
            _ if (offsets::BANK_A..offsets::BANK_A + 4 * BANK_BYTES).contains(&offset) => {
                let rel = offset - offsets::BANK_A;
                st.banks[(rel / BANK_BYTES) as usize]
                    .read(BusSize::Word, rel % BANK_BYTES)
                    .map_err(Into::into)
            }
            _ if offset >= offsets::FW_RAM
                && offset < offsets::FW_RAM + st.fw_ram.len() as u32 =>
            {
                st.fw_ram
                    .read(BusSize::Word, offset - offsets::FW_RAM)
                    .map_err(Into::into)
            }
            _ if offset >= offsets::FW_ROM
                && offset < offsets::FW_ROM + st.fw_rom.len() as u32 =>
            {
                st.fw_rom
                    .read(BusSize::Word, offset - offsets::FW_ROM)
                    .map_err(Into::into)
            }
            _ => Err(BusError::LoadAccessFault),
        }
    }

    fn write_reg(&self, offset: u32, val: u32) -> Result<(), BusError> {
        let mut st = self.inner.state.lock().unwrap();
        match offset {
            offsets::CTRL => {
                if val & (1 << 31) != 0 {
                    self.start_op(&mut st, val);
                } else {
                    self.abort_op(&mut st, val);
                }
                Ok(())
            }
            offsets::ENTRY => {
                st.entry = val;
                Ok(())
            }
            offsets::RC => {
                if val & (1 << 30) != 0 {
                    st.irq_pending = false;
                }
                Ok(())
            }
            offsets::BUILD_CONF => Err(BusError::StoreAccessFault),
            offsets::F_STACK => {
                st.f_stack = val;
                Ok(())
            }
            offsets::CONF => {
                st.conf = val;
                Ok(())
            }
            offsets::FLAGS => {
                st.flags = val;
                Ok(())
            }
            offsets::WATCHDOG => {
                st.watchdog = val;
                Ok(())
            }
            offsets::JUMP_PROB => {
                st.jump_prob = val;
                Ok(())
            }
            offsets::IRQ_EN => {
                st.irq_en = val;
                Ok(())
            }
            offsets::INDEX_I => {
                st.index[0] = val;
                Ok(())
            }
            offsets::INDEX_J => {
                st.index[1] = val;
                Ok(())
            }
            offsets::INDEX_K => {
                st.index[2] = val;
                Ok(())
            }
            offsets::INDEX_L => {
                st.index[3] = val;
                Ok(())
            }
            _ if (offsets::BANK_A..offsets::BANK_A + 4 * BANK_BYTES).contains(&offset) => {
                let rel = offset - offsets::BANK_A;
                st.banks[(rel / BANK_BYTES) as usize]
                    .write(BusSize::Word, rel % BANK_BYTES, val)
                    .map_err(Into::into)
            }
            _ if offset >= offsets::FW_RAM
                && offset < offsets::FW_RAM + st.fw_ram.len() as u32 =>
            {
                let rel = offset - offsets::FW_RAM;
                st.fw_ram.write(BusSize::Word, rel, val).map_err(Into::into)
            }
            _ if offset >= offsets::FW_ROM
                && offset < offsets::FW_ROM + st.fw_rom.len() as u32 =>
            {
                // ROM is mask-programmed.
                Err(BusError::StoreAccessFault)
            }
            _ => Err(BusError::StoreAccessFault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwc_pka::PkaConfig;

    fn poll_done(periph: &PkaPeriph) -> u32 {
        loop {
            let rc = periph.read_reg(offsets::RC).unwrap();
            if rc & (1 << 31) == 0 {
                return (rc >> 16) & 0xff;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_build_conf_decodes() {
        let periph = PkaPeriph::new(PkaPeriphConfig::default());
        let raw = periph.read_reg(offsets::BUILD_CONF).unwrap();
        let cfg = PkaConfig::parse(raw).unwrap();
        assert_eq!(cfg.rsa_size, 2048);
        assert_eq!(cfg.ecc_size, 512);
        assert_eq!(cfg.fw_ram_size, 2048);
        assert_eq!(cfg.fw_rom_size, 1024);
    }

    #[test]
    fn test_bank_read_write() {
        let periph = PkaPeriph::new(PkaPeriphConfig::default());
        periph.write_reg(offsets::BANK_B + 8, 0xDEAD_BEEF).unwrap();
        assert_eq!(periph.read_reg(offsets::BANK_B + 8).unwrap(), 0xDEAD_BEEF);
        assert_eq!(periph.read_reg(offsets::BANK_A + 8).unwrap(), 0);
    }

    #[test]
    fn test_rom_is_read_only() {
        let periph = PkaPeriph::new(PkaPeriphConfig::default());
        assert_eq!(
            periph.write_reg(offsets::FW_ROM, 1).err(),
            Some(BusError::StoreAccessFault)
        );
    }

    #[test]
    fn test_raw_register_modmult() {
        // Drive a job the way the hardware sees it: firmware word, operands,
        // GO, poll, read back. 3 * 5 mod 7 = 1.
        let periph = PkaPeriph::new(PkaPeriphConfig::default());
        periph
            .write_reg(offsets::FW_RAM, crate::image::opcode::MODMULT)
            .unwrap();
        periph.write_reg(offsets::CONF, 1).unwrap(); // RSA byte order
        periph.write_reg(offsets::BANK_A, 3).unwrap();
        periph.write_reg(offsets::BANK_B, 5).unwrap();
        periph.write_reg(offsets::BANK_D, 7).unwrap();
        periph.write_reg(offsets::ENTRY, 0).unwrap();
        // size 4: base radix 4, partial 1.
        periph
            .write_reg(offsets::CTRL, (1 << 31) | (4 << 8) | 1)
            .unwrap();
        assert_eq!(poll_done(&periph), crate::reason::NORMAL);
        assert_eq!(periph.read_reg(offsets::BANK_A).unwrap(), 1);
    }

    #[test]
    fn test_bad_opcode_reports_reason() {
        let periph = PkaPeriph::new(PkaPeriphConfig::default());
        periph.write_reg(offsets::FW_RAM, 0xFFFF_FFFF).unwrap();
        periph.write_reg(offsets::ENTRY, 0).unwrap();
        periph
            .write_reg(offsets::CTRL, (1 << 31) | (4 << 8) | 1)
            .unwrap();
        assert_eq!(poll_done(&periph), crate::reason::INVALID_OPCODE);
    }
}
