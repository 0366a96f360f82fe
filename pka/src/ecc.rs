/*++

Licensed under the Apache-2.0 license.

File Name:

    ecc.rs

Abstract:

    File contains the elliptic-curve point operations and the SP 800-56A
    public-key validation checks built on the modular primitives.

--*/

use crate::device::PkaDevice;
use crate::error::{Error, Result};
use crate::regs::{Bank, OpMode};
use std::cmp::Ordering;

/// Supported curves.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CurveId {
    NistP256,
    NistP384,
}

/// Curve parameters as least-significant-first u64 digits.
pub struct EccCurve {
    pub name: &'static str,
    pub ndigits: usize,
    pub g_x: &'static [u64],
    pub g_y: &'static [u64],
    pub p: &'static [u64],
    pub n: &'static [u64],
    pub a: &'static [u64],
    pub b: &'static [u64],
}

impl EccCurve {
    /// Base point G.
    pub fn g(&self) -> EccPoint {
        EccPoint {
            x: self.g_x.to_vec(),
            y: self.g_y.to_vec(),
        }
    }
}

static NIST_P256: EccCurve = EccCurve {
    name: "nist_p256",
    ndigits: 4,
    g_x: &[
        0xf4a1_3945_d898_c296,
        0x7703_7d81_2deb_33a0,
        0xf8bc_e6e5_63a4_40f2,
        0x6b17_d1f2_e12c_4247,
    ],
    g_y: &[
        0xcbb6_4068_37bf_51f5,
        0x2bce_3357_6b31_5ece,
        0x8ee7_eb4a_7c0f_9e16,
        0x4fe3_42e2_fe1a_7f9b,
    ],
    p: &[
        0xffff_ffff_ffff_ffff,
        0x0000_0000_ffff_ffff,
        0x0000_0000_0000_0000,
        0xffff_ffff_0000_0001,
    ],
    n: &[
        0xf3b9_cac2_fc63_2551,
        0xbce6_faad_a717_9e84,
        0xffff_ffff_ffff_ffff,
        0xffff_ffff_0000_0000,
    ],
    a: &[
        0xffff_ffff_ffff_fffc,
        0x0000_0000_ffff_ffff,
        0x0000_0000_0000_0000,
        0xffff_ffff_0000_0001,
    ],
    b: &[
        0x3bce_3c3e_27d2_604b,
        0x651d_06b0_cc53_b0f6,
        0xb3eb_bd55_7698_86bc,
        0x5ac6_35d8_aa3a_93e7,
    ],
};

static NIST_P384: EccCurve = EccCurve {
    name: "nist_p384",
    ndigits: 6,
    g_x: &[
        0x3a54_5e38_7276_0ab7,
        0x5502_f25d_bf55_296c,
        0x59f7_41e0_8254_2a38,
        0x6e1d_3b62_8ba7_9b98,
        0x8eb1_c71e_f320_ad74,
        0xaa87_ca22_be8b_0537,
    ],
    g_y: &[
        0x7a43_1d7c_90ea_0e5f,
        0x0a60_b1ce_1d7e_819d,
        0xe9da_3113_b5f0_b8c0,
        0xf8f4_1dbd_289a_147c,
        0x5d9e_98bf_9292_dc29,
        0x3617_de4a_9626_2c6f,
    ],
    p: &[
        0x0000_0000_ffff_ffff,
        0xffff_ffff_0000_0000,
        0xffff_ffff_ffff_fffe,
        0xffff_ffff_ffff_ffff,
        0xffff_ffff_ffff_ffff,
        0xffff_ffff_ffff_ffff,
    ],
    n: &[
        0xecec_196a_ccc5_2973,
        0x581a_0db2_48b0_a77a,
        0xc763_4d81_f437_2ddf,
        0xffff_ffff_ffff_ffff,
        0xffff_ffff_ffff_ffff,
        0xffff_ffff_ffff_ffff,
    ],
    a: &[
        0x0000_0000_ffff_fffc,
        0xffff_ffff_0000_0000,
        0xffff_ffff_ffff_fffe,
        0xffff_ffff_ffff_ffff,
        0xffff_ffff_ffff_ffff,
        0xffff_ffff_ffff_ffff,
    ],
    b: &[
        0x2a85_c8ed_d3ec_2aef,
        0xc656_398d_8a2e_d19d,
        0x0314_088f_5013_875a,
        0x181d_9c6e_fe81_4112,
        0x988e_056b_e3f8_2d19,
        0xb331_2fa7_e23e_e7e4,
    ],
};

/// Parameter-table lookup; the tables themselves come from the platform's
/// curve definitions.
pub fn curve_params(id: CurveId) -> &'static EccCurve {
    match id {
        CurveId::NistP256 => &NIST_P256,
        CurveId::NistP384 => &NIST_P384,
    }
}

/// An affine point; the zero (identity) point is all-zero coordinates.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EccPoint {
    pub x: Vec<u64>,
    pub y: Vec<u64>,
}

impl EccPoint {
    pub fn zero(ndigits: usize) -> Self {
        Self {
            x: vec![0; ndigits],
            y: vec![0; ndigits],
        }
    }

    pub fn ndigits(&self) -> usize {
        self.x.len()
    }

    pub fn is_zero(&self) -> bool {
        vli_is_zero(&self.x) && vli_is_zero(&self.y)
    }
}

/// Outcome of a curve-membership check. A dispatch failure is an `Err`,
/// never conflated with "not on the curve".
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PointCheck {
    OnCurve,
    NotOnCurve,
}

pub fn vli_is_zero(a: &[u64]) -> bool {
    a.iter().all(|&d| d == 0)
}

/// Compare least-significant-first digit arrays of equal width.
pub fn vli_cmp(a: &[u64], b: &[u64]) -> Ordering {
    debug_assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().rev().zip(b.iter().rev()) {
        if x != y {
            return x.cmp(y);
        }
    }
    Ordering::Equal
}

/// Big-endian bytes to digits, left-padding to `ndigits`. Fails if the
/// value does not fit.
pub fn digits_from_be_bytes(bytes: &[u8], ndigits: usize) -> Result<Vec<u64>> {
    if bytes.len() > ndigits * 8 {
        return Err(Error::InvalidParameterSize);
    }
    let mut padded = vec![0u8; ndigits * 8 - bytes.len()];
    padded.extend_from_slice(bytes);
    let mut digits = vec![0u64; ndigits];
    for (i, chunk) in padded.rchunks(8).enumerate() {
        digits[i] = u64::from_be_bytes(chunk.try_into().unwrap());
    }
    Ok(digits)
}

/// Digits to big-endian bytes, full width.
pub fn digits_to_be_bytes(digits: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(digits.len() * 8);
    for d in digits.iter().rev() {
        out.extend_from_slice(&d.to_be_bytes());
    }
    out
}

fn check_widths(curve: &EccCurve, pt: &EccPoint) -> Result<usize> {
    if pt.x.len() != curve.ndigits || pt.y.len() != curve.ndigits {
        return Err(Error::InvalidArgument);
    }
    Ok(curve.ndigits * 8)
}

fn fault_check(stop_reason: u32) -> Result<()> {
    if stop_reason != 0 {
        return Err(Error::HardwareFault(stop_reason));
    }
    Ok(())
}

/// Test whether `pt` satisfies the curve equation. The firmware leaves the
/// verdict in the zero flag: flag set means the point is on the curve.
pub fn pver(dev: &PkaDevice, curve: &EccCurve, pt: &EccPoint) -> Result<PointCheck> {
    let size = check_widths(curve, pt)?;
    let lease = dev.begin()?;
    let pka = lease.pka();
    pka.load_operand_ecc(Bank::A, 2, &pt.x)?;
    pka.load_operand_ecc(Bank::B, 2, &pt.y)?;
    pka.load_operand_ecc(Bank::A, 6, curve.a)?;
    pka.load_operand_ecc(Bank::B, 6, curve.b)?;
    pka.load_operand_ecc(Bank::D, 0, curve.p)?;
    let outcome = lease.exec("pver", size, OpMode::Ecc, 0)?;
    fault_check(outcome.stop_reason)?;
    Ok(if outcome.zero_flag() {
        PointCheck::OnCurve
    } else {
        PointCheck::NotOnCurve
    })
}

/// Scalar multiplication `k * pt`.
pub fn pmult(dev: &PkaDevice, curve: &EccCurve, k: &[u64], pt: &EccPoint) -> Result<EccPoint> {
    let size = check_widths(curve, pt)?;
    if k.len() != curve.ndigits {
        return Err(Error::InvalidArgument);
    }
    let zero = vec![0u64; curve.ndigits];
    let lease = dev.begin()?;
    let pka = lease.pka();
    pka.load_operand_ecc(Bank::A, 0, &pt.x)?;
    pka.load_operand_ecc(Bank::B, 0, &pt.y)?;
    pka.load_operand_ecc(Bank::A, 6, curve.a)?;
    pka.load_operand_ecc(Bank::D, 0, curve.p)?;
    pka.load_operand_ecc(Bank::D, 7, k)?;
    pka.load_operand_ecc(Bank::A, 7, &zero)?;
    let outcome = lease.exec("pmult", size, OpMode::Ecc, 0)?;
    fault_check(outcome.stop_reason)?;
    let mut result = EccPoint::zero(curve.ndigits);
    pka.unload_operand_ecc(Bank::A, 0, &mut result.x)?;
    pka.unload_operand_ecc(Bank::B, 0, &mut result.y)?;
    Ok(result)
}

/// `u1 * P + u2 * Q` in a single pass (Shamir's trick).
pub fn shamir(
    dev: &PkaDevice,
    curve: &EccCurve,
    u1: &[u64],
    u2: &[u64],
    p_pt: &EccPoint,
    q_pt: &EccPoint,
) -> Result<EccPoint> {
    let size = check_widths(curve, p_pt)?;
    check_widths(curve, q_pt)?;
    if u1.len() != curve.ndigits || u2.len() != curve.ndigits {
        return Err(Error::InvalidArgument);
    }
    let lease = dev.begin()?;
    let pka = lease.pka();
    pka.load_operand_ecc(Bank::A, 0, &p_pt.x)?;
    pka.load_operand_ecc(Bank::B, 0, &p_pt.y)?;
    pka.load_operand_ecc(Bank::A, 1, &q_pt.x)?;
    pka.load_operand_ecc(Bank::B, 1, &q_pt.y)?;
    pka.load_operand_ecc(Bank::A, 6, curve.a)?;
    pka.load_operand_ecc(Bank::D, 0, curve.p)?;
    pka.load_operand_ecc(Bank::D, 7, u1)?;
    pka.load_operand_ecc(Bank::D, 6, u2)?;
    let outcome = lease.exec("shamir", size, OpMode::Ecc, 0)?;
    fault_check(outcome.stop_reason)?;
    let mut result = EccPoint::zero(curve.ndigits);
    pka.unload_operand_ecc(Bank::A, 0, &mut result.x)?;
    pka.unload_operand_ecc(Bank::B, 0, &mut result.y)?;
    Ok(result)
}

/// SP 800-56A 5.6.2.3.4 partial public-key validation, the check applied to
/// ephemeral keys: nonzero point, coordinates in `[1, p-1]`, point on the
/// curve.
pub fn is_pubkey_valid_partial(dev: &PkaDevice, curve: &EccCurve, pt: &EccPoint) -> Result<()> {
    check_widths(curve, pt)?;
    if pt.is_zero() {
        return Err(Error::InvalidKey);
    }
    if vli_is_zero(&pt.x) || vli_cmp(&pt.x, curve.p) != Ordering::Less {
        return Err(Error::InvalidKey);
    }
    if vli_is_zero(&pt.y) || vli_cmp(&pt.y, curve.p) != Ordering::Less {
        return Err(Error::InvalidKey);
    }
    match pver(dev, curve, pt)? {
        PointCheck::OnCurve => Ok(()),
        PointCheck::NotOnCurve => Err(Error::InvalidKey),
    }
}

/// SP 800-56A 5.6.2.3.3 full validation: partial checks plus the cofactor
/// identity `n * pt == 0`.
pub fn is_pubkey_valid_full(dev: &PkaDevice, curve: &EccCurve, pt: &EccPoint) -> Result<()> {
    is_pubkey_valid_partial(dev, curve, pt)?;
    let nq = pmult(dev, curve, curve.n, pt)?;
    if nq.is_zero() {
        Ok(())
    } else {
        Err(Error::InvalidKey)
    }
}

/// Derive and fully validate the public key for `private_key`. A validation
/// failure reports `TryAgain`: the caller retries with a fresh private key.
pub fn make_pub_key(dev: &PkaDevice, curve: &EccCurve, private_key: &[u64]) -> Result<EccPoint> {
    if private_key.len() != curve.ndigits {
        return Err(Error::InvalidArgument);
    }
    if vli_is_zero(private_key) || vli_cmp(private_key, curve.n) != Ordering::Less {
        return Err(Error::InvalidKey);
    }
    let pub_key = pmult(dev, curve, private_key, &curve.g())?;
    is_pubkey_valid_full(dev, curve, &pub_key).map_err(|e| match e {
        Error::InvalidKey => Error::TryAgain,
        other => other,
    })?;
    Ok(pub_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn to_big(digits: &[u64]) -> BigUint {
        BigUint::from_bytes_be(&digits_to_be_bytes(digits))
    }

    #[test]
    fn test_digit_byte_roundtrip() {
        let bytes = hex::decode("0102030405060708090a0b0c0d0e0f10").unwrap();
        let digits = digits_from_be_bytes(&bytes, 2).unwrap();
        assert_eq!(digits, [0x090a_0b0c_0d0e_0f10, 0x0102_0304_0506_0708]);
        assert_eq!(digits_to_be_bytes(&digits), bytes);
    }

    #[test]
    fn test_digit_padding() {
        let digits = digits_from_be_bytes(&[0xab], 2).unwrap();
        assert_eq!(digits, [0xab, 0]);
        assert!(digits_from_be_bytes(&[0u8; 17], 2).is_err());
    }

    #[test]
    fn test_vli_cmp() {
        assert_eq!(vli_cmp(&[1, 2], &[1, 2]), Ordering::Equal);
        assert_eq!(vli_cmp(&[0, 1], &[u64::MAX, 0]), Ordering::Greater);
        assert_eq!(vli_cmp(&[5, 0], &[6, 0]), Ordering::Less);
    }

    #[test]
    fn test_curve_tables_satisfy_curve_equation() {
        // G must satisfy y^2 = x^3 + ax + b (mod p) for both tables.
        for id in [CurveId::NistP256, CurveId::NistP384] {
            let curve = curve_params(id);
            let p = to_big(curve.p);
            let x = to_big(curve.g_x);
            let y = to_big(curve.g_y);
            let a = to_big(curve.a);
            let b = to_big(curve.b);
            let lhs = (&y * &y) % &p;
            let rhs = ((&x * &x * &x) + &a * &x + &b) % &p;
            assert_eq!(lhs, rhs, "{}", curve.name);
        }
    }

    #[test]
    fn test_curve_a_is_p_minus_3() {
        for id in [CurveId::NistP256, CurveId::NistP384] {
            let curve = curve_params(id);
            let p = to_big(curve.p);
            let a = to_big(curve.a);
            assert_eq!(a + 3u32, p, "{}", curve.name);
        }
    }
}
