/*++

Licensed under the Apache-2.0 license.

File Name:

    regs.rs

Abstract:

    File contains the register-level primitive layer: operand bank access,
    firmware memory windows, job start/status and hardware configuration
    parsing.

--*/

use crate::error::{Error, Result};
use dwc_pka_emu_bus::Mmio;
use std::sync::Arc;
use tock_registers::interfaces::Readable;
use tock_registers::{register_bitfields, LocalRegisterCopy};

/// Register byte offsets within the PKA window.
pub mod offsets {
    pub const CTRL: u32 = 0x00;
    pub const ENTRY: u32 = 0x04;
    pub const RC: u32 = 0x08;
    pub const BUILD_CONF: u32 = 0x0C;
    pub const F_STACK: u32 = 0x10;
    pub const CONF: u32 = 0x14;
    pub const FLAGS: u32 = 0x18;
    pub const WATCHDOG: u32 = 0x1C;
    pub const JUMP_PROB: u32 = 0x20;
    pub const IRQ_EN: u32 = 0x24;
    pub const INDEX_I: u32 = 0x30;
    pub const INDEX_J: u32 = 0x34;
    pub const INDEX_K: u32 = 0x38;
    pub const INDEX_L: u32 = 0x3C;

    pub const BANK_A: u32 = 0x0400;
    pub const BANK_B: u32 = 0x0C00;
    pub const BANK_C: u32 = 0x1400;
    pub const BANK_D: u32 = 0x1C00;

    pub const FW_RAM: u32 = 0x4000;
    pub const FW_ROM: u32 = 0x8000;
}

register_bitfields![u32,
    pub Ctrl [
        PARTIAL_RADIX OFFSET(0) NUMBITS(8) [],
        BASE_RADIX OFFSET(8) NUMBITS(4) [],
        M521_MODE OFFSET(16) NUMBITS(1) [],
        GO OFFSET(31) NUMBITS(1) [],
    ],
    pub Rc [
        STOP_REASON OFFSET(16) NUMBITS(8) [],
        IRQ OFFSET(30) NUMBITS(1) [],
        BUSY OFFSET(31) NUMBITS(1) [],
    ],
    pub Conf [
        BYTESWAP OFFSET(0) NUMBITS(1) [],
    ],
    pub Flags [
        ZERO OFFSET(0) NUMBITS(1) [],
        CARRY OFFSET(1) NUMBITS(1) [],
        BORROW OFFSET(2) NUMBITS(1) [],
        MEMBIT OFFSET(3) NUMBITS(1) [],
    ],
    pub BuildConf [
        // Type 0 layout
        T0_ALU_SEL OFFSET(0) NUMBITS(3) [],
        T0_RSA_SEL OFFSET(3) NUMBITS(3) [],
        T0_ECC_SEL OFFSET(6) NUMBITS(3) [],
        // Type 1/2 layout
        T1_ALU_SEL OFFSET(0) NUMBITS(2) [],
        T1_RSA_SEL OFFSET(2) NUMBITS(3) [],
        T1_ECC_SEL OFFSET(5) NUMBITS(3) [],
        T1_FW_RAM_SEL OFFSET(8) NUMBITS(3) [],
        T1_FW_ROM_SEL OFFSET(11) NUMBITS(3) [],
        FORMAT OFFSET(30) NUMBITS(2) [],
    ],
];

/// Operand size of a NIST P-521 job; selects the special 580-bit radix mode.
pub const P521_OPERAND_BYTES: usize = 66;

/// Bytes per operand bank slot.
pub const SLOT_BYTES: usize = 0x100;

/// Slots per operand bank.
pub const BANK_SLOTS: u32 = 8;

/// Firmware entry addresses at or above this word address resolve into ROM.
pub const ROM_ENTRY_BASE: u32 = 0x4000;

/// One of the four hardware operand banks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Bank {
    A,
    B,
    C,
    D,
}

impl Bank {
    pub fn base(self) -> u32 {
        match self {
            Bank::A => offsets::BANK_A,
            Bank::B => offsets::BANK_B,
            Bank::C => offsets::BANK_C,
            Bank::D => offsets::BANK_D,
        }
    }
}

/// Operand byte-order convention of a job.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpMode {
    Rsa,
    Ecc,
}

/// Completion state of the core.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum JobStatus {
    /// Busy bit still set.
    InProgress,
    /// Stopped with the given reason code (0 = normal stop).
    Done(u32),
}

/// Hardware configuration parsed from the build configuration register.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PkaConfig {
    /// ALU width in bits.
    pub alu_size: u32,
    /// Largest RSA operand in bits.
    pub rsa_size: u32,
    /// Largest ECC operand in bits.
    pub ecc_size: u32,
    /// Firmware RAM size in words.
    pub fw_ram_size: u32,
    /// Firmware ROM size in words (0 if absent).
    pub fw_rom_size: u32,
    /// Byte offset of the firmware RAM window.
    pub ram_offset: u32,
    /// Byte offset of the firmware ROM window.
    pub rom_offset: u32,
}

impl PkaConfig {
    /// Decode a raw build configuration value. Format type 0 is the original
    /// encoding with fixed firmware memory sizes; types 1 and 2 carry the
    /// firmware memory geometry in the register.
    pub fn parse(raw: u32) -> Result<PkaConfig> {
        let conf = LocalRegisterCopy::<u32, BuildConf::Register>::new(raw);
        match conf.read(BuildConf::FORMAT) {
            0 => Ok(PkaConfig {
                alu_size: 32 << conf.read(BuildConf::T0_ALU_SEL),
                rsa_size: 512 << conf.read(BuildConf::T0_RSA_SEL),
                ecc_size: 256 << conf.read(BuildConf::T0_ECC_SEL),
                fw_ram_size: 2048,
                fw_rom_size: 1024,
                ram_offset: offsets::FW_RAM,
                rom_offset: offsets::FW_ROM,
            }),
            1 | 2 => {
                let rom_sel = conf.read(BuildConf::T1_FW_ROM_SEL);
                Ok(PkaConfig {
                    alu_size: 32 << conf.read(BuildConf::T1_ALU_SEL),
                    rsa_size: 512 << conf.read(BuildConf::T1_RSA_SEL),
                    ecc_size: 256 << conf.read(BuildConf::T1_ECC_SEL),
                    fw_ram_size: 256 << conf.read(BuildConf::T1_FW_RAM_SEL),
                    fw_rom_size: if rom_sel == 0 { 0 } else { 256 << rom_sel },
                    ram_offset: offsets::FW_RAM,
                    rom_offset: offsets::FW_ROM,
                })
            }
            _ => Err(Error::InvalidVersion),
        }
    }
}

/// Radix encoding for an operand size: the power-of-two field size the
/// datapath walks, plus the number of valid words when the operand does not
/// fill it.
fn radix_for(size: usize) -> (u32, u32) {
    let full = size.next_power_of_two().max(16);
    let base = full.trailing_zeros();
    let partial = if full == size {
        0
    } else {
        ((size + 3) / 4) as u32
    };
    (base, partial)
}

/// Register-level handle to one PKA instance.
pub struct Elppka {
    mmio: Arc<dyn Mmio>,
    cfg: PkaConfig,
    watchdog: u32,
}

impl Elppka {
    /// Default watchdog cycle limit written at setup.
    pub const DEFAULT_WATCHDOG: u32 = 100_000;

    /// Probe-time initialization: parse the build configuration, zero the
    /// operand banks and program watchdog, jump probability and interrupt
    /// enable.
    pub fn setup(mmio: Arc<dyn Mmio>) -> Result<Elppka> {
        let raw = mmio.read_reg(offsets::BUILD_CONF)?;
        let cfg = PkaConfig::parse(raw)?;
        let pka = Elppka {
            mmio,
            cfg,
            watchdog: Self::DEFAULT_WATCHDOG,
        };
        pka.zeroize_banks()?;
        pka.mmio.write_reg(offsets::WATCHDOG, pka.watchdog)?;
        pka.mmio.write_reg(offsets::JUMP_PROB, 0)?;
        pka.mmio
            .write_reg(offsets::IRQ_EN, Rc::IRQ::SET.value)?;
        Ok(pka)
    }

    pub fn config(&self) -> &PkaConfig {
        &self.cfg
    }

    fn slot_addr(&self, bank: Bank, index: u32) -> Result<u32> {
        if index >= BANK_SLOTS {
            return Err(Error::InvalidArgument);
        }
        Ok(bank.base() + index * SLOT_BYTES as u32)
    }

    /// Select the operand byte ordering for the next job. Must match the job
    /// type or loaded operands are silently misinterpreted.
    pub fn byteswap(&self, enable: bool) -> Result<()> {
        let val = if enable { Conf::BYTESWAP::SET.value } else { 0 };
        self.mmio.write_reg(offsets::CONF, val)?;
        Ok(())
    }

    /// Load a big-endian RSA operand, right-aligned into the slot's 32-bit
    /// words (least significant word first; a short leading partial word is
    /// zero padded).
    pub fn load_operand_rsa(&self, bank: Bank, index: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > self.cfg.rsa_size as usize / 8 || data.len() > SLOT_BYTES
        {
            return Err(Error::InvalidSize);
        }
        let slot = self.slot_addr(bank, index)?;
        let nwords = (data.len() + 3) / 4;
        let mut padded = vec![0u8; nwords * 4 - data.len()];
        padded.extend_from_slice(data);
        // Written from the last word down, matching the hardware load order.
        for i in (0..nwords).rev() {
            let at = (nwords - 1 - i) * 4;
            let limb = u32::from_be_bytes([
                padded[at],
                padded[at + 1],
                padded[at + 2],
                padded[at + 3],
            ]);
            self.mmio.write_reg(slot + (i as u32) * 4, limb)?;
        }
        Ok(())
    }

    /// Read an RSA operand back as big-endian bytes filling `out`.
    pub fn unload_operand_rsa(&self, bank: Bank, index: u32, out: &mut [u8]) -> Result<()> {
        if out.is_empty() || out.len() > self.cfg.rsa_size as usize / 8 || out.len() > SLOT_BYTES {
            return Err(Error::InvalidSize);
        }
        let slot = self.slot_addr(bank, index)?;
        let nwords = (out.len() + 3) / 4;
        let mut padded = vec![0u8; nwords * 4];
        for i in 0..nwords {
            let limb = self.mmio.read_reg(slot + (i as u32) * 4)?;
            let at = (nwords - 1 - i) * 4;
            padded[at..at + 4].copy_from_slice(&limb.to_be_bytes());
        }
        out.copy_from_slice(&padded[nwords * 4 - out.len()..]);
        Ok(())
    }

    /// Load an ECC operand given as u64 digits, least significant digit
    /// first. Digit `k` lands in slot words `2k` and `2k+1`, each half
    /// byte-reversed — the coordinate word ordering the firmware expects.
    /// The transform is bit-exact and closed under [`Self::unload_operand_ecc`].
    pub fn load_operand_ecc(&self, bank: Bank, index: u32, digits: &[u64]) -> Result<()> {
        if digits.is_empty()
            || digits.len() * 64 > self.cfg.ecc_size as usize
            || digits.len() * 8 > SLOT_BYTES
        {
            return Err(Error::InvalidSize);
        }
        let slot = self.slot_addr(bank, index)?;
        for (k, &digit) in digits.iter().enumerate() {
            let lo = (digit as u32).swap_bytes();
            let hi = ((digit >> 32) as u32).swap_bytes();
            self.mmio.write_reg(slot + (2 * k as u32) * 4, lo)?;
            self.mmio.write_reg(slot + (2 * k as u32 + 1) * 4, hi)?;
        }
        Ok(())
    }

    /// Read an ECC operand back into `out` digits.
    pub fn unload_operand_ecc(&self, bank: Bank, index: u32, out: &mut [u64]) -> Result<()> {
        if out.is_empty()
            || out.len() * 64 > self.cfg.ecc_size as usize
            || out.len() * 8 > SLOT_BYTES
        {
            return Err(Error::InvalidSize);
        }
        let slot = self.slot_addr(bank, index)?;
        for (k, digit) in out.iter_mut().enumerate() {
            let lo = self.mmio.read_reg(slot + (2 * k as u32) * 4)?.swap_bytes();
            let hi = self
                .mmio
                .read_reg(slot + (2 * k as u32 + 1) * 4)?
                .swap_bytes();
            *digit = lo as u64 | ((hi as u64) << 32);
        }
        Ok(())
    }

    /// Kick the core at `entry` with the radix derived from `size` bytes.
    /// A 66-byte operand selects the P-521 580-bit mode.
    pub fn start(&self, entry: u32, flags: u32, size: usize) -> Result<()> {
        for off in [
            offsets::INDEX_I,
            offsets::INDEX_J,
            offsets::INDEX_K,
            offsets::INDEX_L,
            offsets::F_STACK,
        ] {
            self.mmio.write_reg(off, 0)?;
        }
        self.mmio.write_reg(offsets::WATCHDOG, self.watchdog)?;
        self.mmio.write_reg(offsets::ENTRY, entry)?;
        let (base, partial) = radix_for(size);
        let mut ctrl = Ctrl::GO::SET
            + Ctrl::BASE_RADIX.val(base)
            + Ctrl::PARTIAL_RADIX.val(partial);
        if size == P521_OPERAND_BYTES {
            ctrl = ctrl + Ctrl::M521_MODE::SET;
        }
        self.mmio.write_reg(offsets::CTRL, ctrl.value | flags)?;
        Ok(())
    }

    /// Completion state of the current or last job.
    pub fn get_status(&self) -> Result<JobStatus> {
        let rc = LocalRegisterCopy::<u32, Rc::Register>::new(self.mmio.read_reg(offsets::RC)?);
        if rc.is_set(Rc::BUSY) {
            Ok(JobStatus::InProgress)
        } else {
            Ok(JobStatus::Done(rc.read(Rc::STOP_REASON)))
        }
    }

    /// Raw condition flags left by the last job.
    pub fn flags(&self) -> Result<u32> {
        Ok(self.mmio.read_reg(offsets::FLAGS)?)
    }

    /// Acknowledge a pending completion interrupt (write-one-to-clear).
    pub fn ack_irq(&self) -> Result<()> {
        self.mmio.write_reg(offsets::RC, Rc::IRQ::SET.value)?;
        Ok(())
    }

    /// Best-effort stop of a running job. Operand bank contents are
    /// undefined afterwards; the next job must reload everything it needs.
    pub fn abort(&self) -> Result<()> {
        self.mmio.write_reg(offsets::CTRL, 0)?;
        self.mmio.write_reg(offsets::F_STACK, 0)?;
        Ok(())
    }

    /// Zero all slots of all four operand banks.
    pub fn zeroize_banks(&self) -> Result<()> {
        for bank in [Bank::A, Bank::B, Bank::C, Bank::D] {
            for word in 0..(BANK_SLOTS * SLOT_BYTES as u32 / 4) {
                self.mmio.write_reg(bank.base() + word * 4, 0)?;
            }
        }
        Ok(())
    }

    /// Write `words` into firmware RAM starting at word index `at`.
    pub fn write_fw_ram(&self, at: u32, words: &[u32]) -> Result<()> {
        let end = at
            .checked_add(words.len() as u32)
            .ok_or(Error::InvalidSize)?;
        if end > self.cfg.fw_ram_size {
            return Err(Error::InvalidSize);
        }
        for (i, &w) in words.iter().enumerate() {
            self.mmio
                .write_reg(self.cfg.ram_offset + (at + i as u32) * 4, w)?;
        }
        Ok(())
    }

    pub fn read_fw_ram(&self, at: u32) -> Result<u32> {
        if at >= self.cfg.fw_ram_size {
            return Err(Error::InvalidSize);
        }
        Ok(self.mmio.read_reg(self.cfg.ram_offset + at * 4)?)
    }

    pub fn read_fw_rom(&self, at: u32) -> Result<u32> {
        if at >= self.cfg.fw_rom_size {
            return Err(Error::InvalidSize);
        }
        Ok(self.mmio.read_reg(self.cfg.rom_offset + at * 4)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwc_pka_emu_bus::Ram;

    fn pka_over_ram() -> Elppka {
        // A bare RAM window decodes as build config type 0 (all zeros):
        // rsa 512, ecc 256. Large enough to cover the fw windows.
        Elppka::setup(Arc::new(Ram::zeroed(0x10000))).unwrap()
    }

    #[test]
    fn test_config_parse_type0() {
        let cfg = PkaConfig::parse(0b010_010_010).unwrap();
        assert_eq!(cfg.alu_size, 128);
        assert_eq!(cfg.rsa_size, 2048);
        assert_eq!(cfg.ecc_size, 1024);
        assert_eq!(cfg.fw_ram_size, 2048);
        assert_eq!(cfg.fw_rom_size, 1024);
    }

    #[test]
    fn test_config_parse_type1() {
        let raw = (1 << 30) | (0b010 << 11) | (0b011 << 8) | (0b001 << 5) | (0b010 << 2) | 0b00;
        let cfg = PkaConfig::parse(raw).unwrap();
        assert_eq!(cfg.alu_size, 32);
        assert_eq!(cfg.rsa_size, 2048);
        assert_eq!(cfg.ecc_size, 512);
        assert_eq!(cfg.fw_ram_size, 2048);
        assert_eq!(cfg.fw_rom_size, 1024);
    }

    #[test]
    fn test_config_parse_type1_no_rom() {
        let raw = (2 << 30) | (0b000 << 11) | (0b011 << 8);
        let cfg = PkaConfig::parse(raw).unwrap();
        assert_eq!(cfg.fw_rom_size, 0);
    }

    #[test]
    fn test_rsa_operand_roundtrip() {
        let pka = pka_over_ram();
        let data: Vec<u8> = (1..=32).collect();
        pka.load_operand_rsa(Bank::A, 0, &data).unwrap();
        let mut out = vec![0u8; 32];
        pka.unload_operand_rsa(Bank::A, 0, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_rsa_operand_partial_word() {
        let pka = pka_over_ram();
        let data = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x11];
        pka.load_operand_rsa(Bank::B, 3, &data).unwrap();
        let mut out = [0u8; 7];
        pka.unload_operand_rsa(Bank::B, 3, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_rsa_operand_word_placement() {
        // 0x0102030405060708: low word 0x05060708 at slot word 0.
        let mmio = Arc::new(Ram::zeroed(0x10000));
        let pka = Elppka::setup(mmio.clone()).unwrap();
        pka.load_operand_rsa(Bank::A, 1, &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();
        let slot = offsets::BANK_A + SLOT_BYTES as u32;
        assert_eq!(mmio.read_reg(slot).unwrap(), 0x0506_0708);
        assert_eq!(mmio.read_reg(slot + 4).unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_rsa_operand_too_large() {
        let pka = pka_over_ram(); // rsa_size = 512 bits = 64 bytes
        let data = vec![1u8; 65];
        assert_eq!(
            pka.load_operand_rsa(Bank::A, 0, &data).err(),
            Some(Error::InvalidSize)
        );
    }

    #[test]
    fn test_ecc_operand_roundtrip() {
        let pka = pka_over_ram();
        let digits = [0x0011_2233_4455_6677u64, 0x8899_AABB_CCDD_EEFF, 5, 0];
        pka.load_operand_ecc(Bank::D, 7, &digits).unwrap();
        let mut out = [0u64; 4];
        pka.unload_operand_ecc(Bank::D, 7, &mut out).unwrap();
        assert_eq!(out, digits);
    }

    #[test]
    fn test_ecc_operand_word_ordering() {
        let mmio = Arc::new(Ram::zeroed(0x10000));
        let pka = Elppka::setup(mmio.clone()).unwrap();
        pka.load_operand_ecc(Bank::A, 0, &[0x0011_2233_4455_6677])
            .unwrap();
        assert_eq!(mmio.read_reg(offsets::BANK_A).unwrap(), 0x7766_5544);
        assert_eq!(mmio.read_reg(offsets::BANK_A + 4).unwrap(), 0x3322_1100);
    }

    #[test]
    fn test_bad_slot_index() {
        let pka = pka_over_ram();
        assert_eq!(
            pka.load_operand_rsa(Bank::C, 8, &[1, 2, 3, 4]).err(),
            Some(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_start_encodes_radix_and_go() {
        let mmio = Arc::new(Ram::zeroed(0x10000));
        let pka = Elppka::setup(mmio.clone()).unwrap();
        pka.start(0x42, 0, 32).unwrap();
        let ctrl = LocalRegisterCopy::<u32, Ctrl::Register>::new(
            mmio.read_reg(offsets::CTRL).unwrap(),
        );
        assert!(ctrl.is_set(Ctrl::GO));
        assert!(!ctrl.is_set(Ctrl::M521_MODE));
        assert_eq!(ctrl.read(Ctrl::BASE_RADIX), 5);
        assert_eq!(ctrl.read(Ctrl::PARTIAL_RADIX), 0);
        assert_eq!(mmio.read_reg(offsets::ENTRY).unwrap(), 0x42);
    }

    #[test]
    fn test_start_p521_mode() {
        let mmio = Arc::new(Ram::zeroed(0x10000));
        let pka = Elppka::setup(mmio.clone()).unwrap();
        pka.start(7, 0, P521_OPERAND_BYTES).unwrap();
        let ctrl = LocalRegisterCopy::<u32, Ctrl::Register>::new(
            mmio.read_reg(offsets::CTRL).unwrap(),
        );
        assert!(ctrl.is_set(Ctrl::M521_MODE));
        assert_eq!(ctrl.read(Ctrl::BASE_RADIX), 7);
        assert_eq!(ctrl.read(Ctrl::PARTIAL_RADIX), 17);
    }

    #[test]
    fn test_status_decode() {
        let mmio = Arc::new(Ram::zeroed(0x10000));
        let pka = Elppka::setup(mmio.clone()).unwrap();
        assert_eq!(pka.get_status().unwrap(), JobStatus::Done(0));
        mmio.write_reg(offsets::RC, 1 << 31).unwrap();
        assert_eq!(pka.get_status().unwrap(), JobStatus::InProgress);
        mmio.write_reg(offsets::RC, 3 << 16).unwrap();
        assert_eq!(pka.get_status().unwrap(), JobStatus::Done(3));
    }
}
