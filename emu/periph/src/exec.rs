/*++

Licensed under the Apache-2.0 license.

File Name:

    exec.rs

Abstract:

    File contains the big-number execution of firmware routines over the
    operand banks.

--*/

use crate::image::opcode;
use crate::periph::PkaState;
use crate::reason;
use dwc_pka::{ROM_ENTRY_BASE, SLOT_BYTES};
use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};

const BANK_A: usize = 0;
const BANK_B: usize = 1;
const BANK_C: usize = 2;
const BANK_D: usize = 3;

/// Condition flag bits mirrored into the flags register.
const FLAG_ZERO: u32 = 1 << 0;

struct Job {
    /// Operand size in bytes, decoded from the radix fields.
    size: usize,
    /// RSA (true) vs ECC byte ordering, from the configuration register.
    rsa_order: bool,
}

/// Execute the routine the entry register points at. Returns the stop
/// reason and the resulting condition flags.
pub(crate) fn execute(st: &mut PkaState) -> (u32, u32) {
    let partial = st.ctrl & 0xff;
    let base = (st.ctrl >> 8) & 0xf;
    let size = if partial != 0 {
        (partial * 4) as usize
    } else {
        1usize << base
    };
    let job = Job {
        size,
        rsa_order: st.conf & 1 != 0,
    };

    let opcode = match fetch(st, st.entry) {
        Some(op) => op,
        None => return (reason::BAD_ENTRY, 0),
    };

    match run_op(st, &job, opcode) {
        Ok(flags) => (reason::NORMAL, flags),
        Err(code) => (code, 0),
    }
}

fn fetch(st: &PkaState, entry: u32) -> Option<u32> {
    if entry < ROM_ENTRY_BASE {
        st.fw_ram.read_word_idx(entry).ok()
    } else {
        st.fw_rom.read_word_idx(entry - ROM_ENTRY_BASE).ok()
    }
}

/// Decode the operand at `bank`/`slot` using the job's byte ordering.
fn read_op(st: &PkaState, job: &Job, bank: usize, slot: u32) -> Result<BigUint, u32> {
    let base = slot * SLOT_BYTES as u32;
    let mut word = |i: u32| -> Result<u32, u32> {
        st.banks[bank]
            .read_word_idx(base / 4 + i)
            .map_err(|_| reason::OPERAND_RANGE)
    };
    if job.rsa_order {
        let nwords = (job.size + 3) / 4;
        let mut bytes = Vec::with_capacity(nwords * 4);
        for i in 0..nwords as u32 {
            bytes.extend_from_slice(&word(i)?.to_le_bytes());
        }
        Ok(BigUint::from_bytes_le(&bytes))
    } else {
        let ndigits = job.size / 8;
        let mut bytes = Vec::with_capacity(ndigits * 8);
        for k in 0..ndigits as u32 {
            let lo = word(2 * k)?.swap_bytes();
            let hi = word(2 * k + 1)?.swap_bytes();
            bytes.extend_from_slice(&lo.to_le_bytes());
            bytes.extend_from_slice(&hi.to_le_bytes());
        }
        Ok(BigUint::from_bytes_le(&bytes))
    }
}

/// Encode `val` into `bank`/`slot`, zero padded to the operand size.
fn write_op(
    st: &mut PkaState,
    job: &Job,
    bank: usize,
    slot: u32,
    val: &BigUint,
) -> Result<(), u32> {
    if val.bits() as usize > job.size * 8 {
        return Err(reason::OPERAND_RANGE);
    }
    let mut bytes = val.to_bytes_le();
    let nwords = if job.rsa_order {
        (job.size + 3) / 4
    } else {
        job.size / 4
    };
    bytes.resize(nwords * 4, 0);
    let base = slot * SLOT_BYTES as u32;
    let mut put = |i: u32, w: u32| -> Result<(), u32> {
        st.banks[bank]
            .write_word_idx(base / 4 + i, w)
            .map_err(|_| reason::OPERAND_RANGE)
    };
    if job.rsa_order {
        for i in 0..nwords {
            let w = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
            put(i as u32, w)?;
        }
    } else {
        for k in 0..(nwords / 2) as u32 {
            let at = k as usize * 8;
            let lo = u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
            let hi = u32::from_le_bytes(bytes[at + 4..at + 8].try_into().unwrap());
            put(2 * k, lo.swap_bytes())?;
            put(2 * k + 1, hi.swap_bytes())?;
        }
    }
    Ok(())
}

fn zero_flag(val: &BigUint) -> u32 {
    if val.is_zero() {
        FLAG_ZERO
    } else {
        0
    }
}

/// `x^-1 mod m` via the extended Euclidean algorithm.
fn mod_inv(x: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_zero() || m.is_one() {
        return None;
    }
    let x = BigInt::from(x % m);
    let m = BigInt::from(m.clone());
    let e = x.extended_gcd(&m);
    if !e.gcd.is_one() {
        return None;
    }
    e.x.mod_floor(&m).to_biguint()
}

/// Affine point; `Inf` is the identity and loads/stores as (0, 0).
#[derive(Clone)]
enum Pt {
    Inf,
    At(BigUint, BigUint),
}

fn pt_decode(x: BigUint, y: BigUint, p: &BigUint) -> Pt {
    if x.is_zero() && y.is_zero() {
        Pt::Inf
    } else {
        Pt::At(x % p, y % p)
    }
}

fn sub_mod(a: &BigUint, b: &BigUint, p: &BigUint) -> BigUint {
    ((a + p) - (b % p)) % p
}

fn pt_double(p: &BigUint, a: &BigUint, pt: &Pt) -> Option<Pt> {
    match pt {
        Pt::Inf => Some(Pt::Inf),
        Pt::At(x, y) => {
            if y.is_zero() {
                return Some(Pt::Inf);
            }
            let num = (x * x * 3u32 + a) % p;
            let den = mod_inv(&((y * 2u32) % p), p)?;
            let l = (num * den) % p;
            let x3 = sub_mod(&((&l * &l) % p), &((x * 2u32) % p), p);
            let y3 = sub_mod(&(&l * sub_mod(x, &x3, p) % p), y, p);
            Some(Pt::At(x3, y3))
        }
    }
}

fn pt_add(p: &BigUint, a: &BigUint, p1: &Pt, p2: &Pt) -> Option<Pt> {
    match (p1, p2) {
        (Pt::Inf, other) | (other, Pt::Inf) => Some(other.clone()),
        (Pt::At(x1, y1), Pt::At(x2, y2)) => {
            if x1 == x2 {
                if y1 == y2 {
                    return pt_double(p, a, p1);
                }
                return Some(Pt::Inf);
            }
            let l = (sub_mod(y2, y1, p) * mod_inv(&sub_mod(x2, x1, p), p)?) % p;
            let x3 = sub_mod(&sub_mod(&((&l * &l) % p), x1, p), x2, p);
            let y3 = sub_mod(&(&l * sub_mod(x1, &x3, p) % p), y1, p);
            Some(Pt::At(x3, y3))
        }
    }
}

fn pt_mul(p: &BigUint, a: &BigUint, k: &BigUint, pt: &Pt) -> Option<Pt> {
    let mut acc = Pt::Inf;
    for byte in k.to_bytes_be() {
        for shift in (0..8).rev() {
            acc = pt_double(p, a, &acc)?;
            if (byte >> shift) & 1 == 1 {
                acc = pt_add(p, a, &acc, pt)?;
            }
        }
    }
    Some(acc)
}

fn write_point(st: &mut PkaState, job: &Job, pt: &Pt) -> Result<u32, u32> {
    let (x, y) = match pt {
        Pt::Inf => (BigUint::zero(), BigUint::zero()),
        Pt::At(x, y) => (x.clone(), y.clone()),
    };
    write_op(st, job, BANK_A, 0, &x)?;
    write_op(st, job, BANK_B, 0, &y)?;
    Ok(if matches!(pt, Pt::Inf) { FLAG_ZERO } else { 0 })
}

fn run_op(st: &mut PkaState, job: &Job, opcode: u32) -> Result<u32, u32> {
    if !job.rsa_order && job.size % 8 != 0 {
        return Err(reason::OPERAND_RANGE);
    }
    // Montgomery field size: R = 2^(8 * size).
    let big_r = || BigUint::one() << (job.size * 8);

    match opcode {
        opcode::MODMULT | opcode::MODADD | opcode::MODSUB => {
            let x = read_op(st, job, BANK_A, 0)?;
            let y = read_op(st, job, BANK_B, 0)?;
            let m = read_op(st, job, BANK_D, 0)?;
            if m.is_zero() {
                return Err(reason::ZERO_MODULUS);
            }
            let r = match opcode {
                opcode::MODMULT => (&x * &y) % &m,
                opcode::MODADD => (&x + &y) % &m,
                _ => sub_mod(&(&x % &m), &y, &m),
            };
            write_op(st, job, BANK_A, 0, &r)?;
            Ok(zero_flag(&r))
        }
        opcode::MODINV => {
            let x = read_op(st, job, BANK_A, 0)?;
            let m = read_op(st, job, BANK_D, 0)?;
            if m.is_zero() {
                return Err(reason::ZERO_MODULUS);
            }
            let r = mod_inv(&x, &m).unwrap_or_default();
            write_op(st, job, BANK_C, 0, &r)?;
            Ok(zero_flag(&r))
        }
        opcode::REDUCE => {
            let x = read_op(st, job, BANK_C, 0)?;
            let m = read_op(st, job, BANK_D, 0)?;
            if m.is_zero() {
                return Err(reason::ZERO_MODULUS);
            }
            let r = x % &m;
            write_op(st, job, BANK_A, 0, &r)?;
            Ok(zero_flag(&r))
        }
        opcode::MODDIV => {
            let x = read_op(st, job, BANK_C, 0)?;
            let y = read_op(st, job, BANK_A, 0)?;
            let m = read_op(st, job, BANK_D, 0)?;
            if m.is_zero() {
                return Err(reason::ZERO_MODULUS);
            }
            let r = match mod_inv(&y, &m) {
                Some(y_inv) => ((x % &m) * y_inv) % &m,
                None => BigUint::zero(),
            };
            write_op(st, job, BANK_C, 0, &r)?;
            Ok(zero_flag(&r))
        }
        opcode::CALC_R_INV => {
            let m = read_op(st, job, BANK_D, 0)?;
            if m.is_zero() {
                return Err(reason::ZERO_MODULUS);
            }
            let r = mod_inv(&big_r(), &m).unwrap_or_default();
            write_op(st, job, BANK_C, 0, &r)?;
            Ok(zero_flag(&r))
        }
        opcode::CALC_MP => {
            let m = read_op(st, job, BANK_D, 0)?;
            let r_inv = read_op(st, job, BANK_C, 0)?;
            if m.is_zero() {
                return Err(reason::ZERO_MODULUS);
            }
            // R * R^-1 - 1 = mp * m exactly.
            let mp = if r_inv.is_zero() {
                BigUint::zero()
            } else {
                (big_r() * r_inv - BigUint::one()) / &m
            };
            write_op(st, job, BANK_D, 1, &mp)?;
            Ok(zero_flag(&mp))
        }
        opcode::CALC_R_SQR => {
            let m = read_op(st, job, BANK_D, 0)?;
            if m.is_zero() {
                return Err(reason::ZERO_MODULUS);
            }
            let r = big_r() % &m;
            let r_sqr = (&r * &r) % &m;
            write_op(st, job, BANK_D, 3, &r_sqr)?;
            Ok(zero_flag(&r_sqr))
        }
        opcode::MODEXP => {
            let base = read_op(st, job, BANK_A, 0)?;
            let exp = read_op(st, job, BANK_D, 2)?;
            let m = read_op(st, job, BANK_D, 0)?;
            if m.is_zero() {
                return Err(reason::ZERO_MODULUS);
            }
            let r = base.modpow(&exp, &m);
            write_op(st, job, BANK_A, 0, &r)?;
            Ok(zero_flag(&r))
        }
        opcode::PMULT => {
            let px = read_op(st, job, BANK_A, 0)?;
            let py = read_op(st, job, BANK_B, 0)?;
            let a = read_op(st, job, BANK_A, 6)?;
            let p = read_op(st, job, BANK_D, 0)?;
            let k = read_op(st, job, BANK_D, 7)?;
            if p.is_zero() || p.is_one() {
                return Err(reason::ZERO_MODULUS);
            }
            let pt = pt_decode(px, py, &p);
            let r = pt_mul(&p, &(a % &p), &k, &pt).ok_or(reason::OPERAND_RANGE)?;
            write_point(st, job, &r)
        }
        opcode::PVER => {
            let x = read_op(st, job, BANK_A, 2)?;
            let y = read_op(st, job, BANK_B, 2)?;
            let a = read_op(st, job, BANK_A, 6)?;
            let b = read_op(st, job, BANK_B, 6)?;
            let p = read_op(st, job, BANK_D, 0)?;
            if p.is_zero() || p.is_one() {
                return Err(reason::ZERO_MODULUS);
            }
            let x = x % &p;
            let lhs = (&y * &y) % &p;
            let rhs = ((&x * &x * &x) + (a % &p) * &x + b) % &p;
            Ok(if lhs == rhs { FLAG_ZERO } else { 0 })
        }
        opcode::SHAMIR => {
            let px = read_op(st, job, BANK_A, 0)?;
            let py = read_op(st, job, BANK_B, 0)?;
            let qx = read_op(st, job, BANK_A, 1)?;
            let qy = read_op(st, job, BANK_B, 1)?;
            let a = read_op(st, job, BANK_A, 6)?;
            let p = read_op(st, job, BANK_D, 0)?;
            let u1 = read_op(st, job, BANK_D, 7)?;
            let u2 = read_op(st, job, BANK_D, 6)?;
            if p.is_zero() || p.is_one() {
                return Err(reason::ZERO_MODULUS);
            }
            let a = a % &p;
            let p1 = pt_decode(px, py, &p);
            let p2 = pt_decode(qx, qy, &p);
            let t1 = pt_mul(&p, &a, &u1, &p1).ok_or(reason::OPERAND_RANGE)?;
            let t2 = pt_mul(&p, &a, &u2, &p2).ok_or(reason::OPERAND_RANGE)?;
            let r = pt_add(&p, &a, &t1, &t2).ok_or(reason::OPERAND_RANGE)?;
            write_point(st, job, &r)
        }
        _ => Err(reason::INVALID_OPCODE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(n: u32) -> BigUint {
        BigUint::from(n)
    }

    #[test]
    fn test_mod_inv() {
        // 3 * 5 = 15 = 1 mod 7
        assert_eq!(mod_inv(&big(3), &big(7)), Some(big(5)));
        assert_eq!(mod_inv(&big(4), &big(8)), None);
        assert_eq!(mod_inv(&big(1), &big(1)), None);
    }

    #[test]
    fn test_pt_mul_small_curve() {
        // y^2 = x^3 + 2x + 3 over F_97; G = (3, 6) has small order.
        let p = big(97);
        let a = big(2);
        let g = Pt::At(big(3), big(6));
        // 2G via double must equal G + G.
        let d = pt_double(&p, &a, &g).unwrap();
        let s = pt_add(&p, &a, &g, &g).unwrap();
        match (&d, &s) {
            (Pt::At(x1, y1), Pt::At(x2, y2)) => {
                assert_eq!((x1, y1), (x2, y2));
            }
            _ => panic!("expected affine points"),
        }
        // 5G computed two ways.
        let m5 = pt_mul(&p, &a, &big(5), &g).unwrap();
        let m2 = pt_mul(&p, &a, &big(2), &g).unwrap();
        let m3 = pt_mul(&p, &a, &big(3), &g).unwrap();
        let sum = pt_add(&p, &a, &m2, &m3).unwrap();
        match (&m5, &sum) {
            (Pt::At(x1, y1), Pt::At(x2, y2)) => {
                assert_eq!((x1, y1), (x2, y2));
            }
            (Pt::Inf, Pt::Inf) => {}
            _ => panic!("5G mismatch"),
        }
    }

    #[test]
    fn test_pt_mul_zero_scalar() {
        let p = big(97);
        let a = big(2);
        let g = Pt::At(big(3), big(6));
        assert!(matches!(
            pt_mul(&p, &a, &BigUint::zero(), &g).unwrap(),
            Pt::Inf
        ));
    }
}
