/*++

Licensed under the Apache-2.0 license.

File Name:

    modmath.rs

Abstract:

    File contains the big-number modular arithmetic primitives layered on
    the job dispatcher.

--*/

use crate::device::{CoreLease, PkaDevice};
use crate::error::{Error, Result};
use crate::regs::{Bank, OpMode};

/// All primitives share one shape: the modulus rides in bank D slot 0, the
/// remaining operands follow the per-routine convention, and the result is
/// read back from the routine's output slot. Every operand must carry the
/// same digit width; callers zero-pad to a common width first.
fn operand_size(m: &[u64], operands: &[&[u64]]) -> Result<usize> {
    if m.is_empty() {
        return Err(Error::InvalidArgument);
    }
    for op in operands {
        if op.len() != m.len() {
            return Err(Error::InvalidArgument);
        }
    }
    Ok(m.len() * 8)
}

fn exec(lease: &CoreLease<'_>, entry: &str, size: usize) -> Result<()> {
    let outcome = lease.exec(entry, size, OpMode::Ecc, 0)?;
    if outcome.stop_reason != 0 {
        return Err(Error::HardwareFault(outcome.stop_reason));
    }
    Ok(())
}

fn unload(lease: &CoreLease<'_>, bank: Bank, ndigits: usize) -> Result<Vec<u64>> {
    let mut out = vec![0u64; ndigits];
    lease.pka().unload_operand_ecc(bank, 0, &mut out)?;
    Ok(out)
}

/// `x * y mod m`
pub fn modmult(dev: &PkaDevice, x: &[u64], y: &[u64], m: &[u64]) -> Result<Vec<u64>> {
    let size = operand_size(m, &[x, y])?;
    let lease = dev.begin()?;
    lease.pka().load_operand_ecc(Bank::A, 0, x)?;
    lease.pka().load_operand_ecc(Bank::B, 0, y)?;
    lease.pka().load_operand_ecc(Bank::D, 0, m)?;
    exec(&lease, "modmult", size)?;
    unload(&lease, Bank::A, m.len())
}

/// `x + y mod m`
pub fn modadd(dev: &PkaDevice, x: &[u64], y: &[u64], m: &[u64]) -> Result<Vec<u64>> {
    let size = operand_size(m, &[x, y])?;
    let lease = dev.begin()?;
    lease.pka().load_operand_ecc(Bank::A, 0, x)?;
    lease.pka().load_operand_ecc(Bank::B, 0, y)?;
    lease.pka().load_operand_ecc(Bank::D, 0, m)?;
    exec(&lease, "modadd", size)?;
    unload(&lease, Bank::A, m.len())
}

/// `x - y mod m`
pub fn modsub(dev: &PkaDevice, x: &[u64], y: &[u64], m: &[u64]) -> Result<Vec<u64>> {
    let size = operand_size(m, &[x, y])?;
    let lease = dev.begin()?;
    lease.pka().load_operand_ecc(Bank::A, 0, x)?;
    lease.pka().load_operand_ecc(Bank::B, 0, y)?;
    lease.pka().load_operand_ecc(Bank::D, 0, m)?;
    exec(&lease, "modsub", size)?;
    unload(&lease, Bank::A, m.len())
}

/// `x^-1 mod m`
pub fn modinv(dev: &PkaDevice, x: &[u64], m: &[u64]) -> Result<Vec<u64>> {
    let size = operand_size(m, &[x])?;
    let lease = dev.begin()?;
    lease.pka().load_operand_ecc(Bank::A, 0, x)?;
    lease.pka().load_operand_ecc(Bank::D, 0, m)?;
    exec(&lease, "modinv", size)?;
    unload(&lease, Bank::C, m.len())
}

/// `x mod m`
pub fn modreduce(dev: &PkaDevice, x: &[u64], m: &[u64]) -> Result<Vec<u64>> {
    let size = operand_size(m, &[x])?;
    let lease = dev.begin()?;
    lease.pka().load_operand_ecc(Bank::C, 0, x)?;
    lease.pka().load_operand_ecc(Bank::D, 0, m)?;
    exec(&lease, "reduce", size)?;
    unload(&lease, Bank::A, m.len())
}

/// `x / y mod m`
pub fn moddiv(dev: &PkaDevice, x: &[u64], y: &[u64], m: &[u64]) -> Result<Vec<u64>> {
    let size = operand_size(m, &[x, y])?;
    let lease = dev.begin()?;
    lease.pka().load_operand_ecc(Bank::C, 0, x)?;
    lease.pka().load_operand_ecc(Bank::A, 0, y)?;
    lease.pka().load_operand_ecc(Bank::D, 0, m)?;
    exec(&lease, "moddiv", size)?;
    unload(&lease, Bank::C, m.len())
}
