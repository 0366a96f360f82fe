/*++

Licensed under the Apache-2.0 license.

File Name:

    ecdsa.rs

Abstract:

    File contains the ECDSA signature verification adapter: hardware path
    over the ECC layer with a pure-software fallback.

--*/

use crate::device::{PkaDevice, PkaRegistry};
use crate::ecc::{
    curve_params, digits_from_be_bytes, digits_to_be_bytes, is_pubkey_valid_full, shamir, vli_cmp,
    vli_is_zero, CurveId, EccCurve, EccPoint,
};
use crate::error::{Error, Result};
use crate::modmath::{modinv, modmult, modreduce};
use std::cmp::Ordering;
use std::sync::Arc;

/// Decode a DER-encoded signature into fixed-width big-endian `(r, s)`.
fn decode_der_sig(id: CurveId, der: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    match id {
        CurveId::NistP256 => {
            let sig =
                p256::ecdsa::Signature::from_der(der).map_err(|_| Error::InvalidSequence)?;
            let (r, s) = sig.split_bytes();
            Ok((r.to_vec(), s.to_vec()))
        }
        CurveId::NistP384 => {
            let sig =
                p384::ecdsa::Signature::from_der(der).map_err(|_| Error::InvalidSequence)?;
            let (r, s) = sig.split_bytes();
            Ok((r.to_vec(), s.to_vec()))
        }
    }
}

/// Software curve-membership check of a SEC1 public key.
fn check_pub_key_software(id: CurveId, sec1: &[u8]) -> Result<()> {
    match id {
        CurveId::NistP256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(sec1)
            .map(|_| ())
            .map_err(|_| Error::InvalidKey),
        CurveId::NistP384 => p384::ecdsa::VerifyingKey::from_sec1_bytes(sec1)
            .map(|_| ())
            .map_err(|_| Error::InvalidKey),
    }
}

fn verify_software(id: CurveId, pub_key: &[u8], digest: &[u8], der_sig: &[u8]) -> Result<()> {
    use p256::ecdsa::signature::hazmat::PrehashVerifier;
    match id {
        CurveId::NistP256 => {
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(pub_key)
                .map_err(|_| Error::InvalidKey)?;
            let sig =
                p256::ecdsa::Signature::from_der(der_sig).map_err(|_| Error::InvalidSequence)?;
            key.verify_prehash(digest, &sig)
                .map_err(|_| Error::AuthenticationFailed)
        }
        CurveId::NistP384 => {
            let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(pub_key)
                .map_err(|_| Error::InvalidKey)?;
            let sig =
                p384::ecdsa::Signature::from_der(der_sig).map_err(|_| Error::InvalidSequence)?;
            key.verify_prehash(digest, &sig)
                .map_err(|_| Error::AuthenticationFailed)
        }
    }
}

/// Parse an uncompressed SEC1 point for `curve`.
pub(crate) fn decode_sec1_point(curve: &EccCurve, bytes: &[u8]) -> Result<EccPoint> {
    let coord = curve.ndigits * 8;
    if bytes.len() != 1 + 2 * coord || bytes[0] != 0x04 {
        return Err(Error::InvalidParameterSize);
    }
    Ok(EccPoint {
        x: digits_from_be_bytes(&bytes[1..1 + coord], curve.ndigits)?,
        y: digits_from_be_bytes(&bytes[1 + coord..], curve.ndigits)?,
    })
}

pub(crate) fn encode_sec1_point(pt: &EccPoint) -> Vec<u8> {
    let mut out = vec![0x04];
    out.extend_from_slice(&digits_to_be_bytes(&pt.x));
    out.extend_from_slice(&digits_to_be_bytes(&pt.y));
    out
}

/// Pick a device able to serve `curve`, if the registry has one.
pub(crate) fn bind_device(registry: &PkaRegistry, curve: &EccCurve) -> Option<Arc<PkaDevice>> {
    registry
        .first_available()
        .filter(|dev| dev.config().ecc_size as usize >= curve.ndigits * 64)
}

/// ECDSA verification transform.
///
/// Binds to the first capable device at construction and keeps using it;
/// without one, every operation runs on the software fallback.
pub struct EcdsaVerifier {
    curve_id: CurveId,
    curve: &'static EccCurve,
    dev: Option<Arc<PkaDevice>>,
    pub_key: Option<EccPoint>,
}

impl EcdsaVerifier {
    pub fn new(registry: &PkaRegistry, curve_id: CurveId) -> Self {
        let curve = curve_params(curve_id);
        Self {
            curve_id,
            curve,
            dev: bind_device(registry, curve),
            pub_key: None,
        }
    }

    /// True when requests are served by the accelerator.
    pub fn uses_hardware(&self) -> bool {
        self.dev.is_some()
    }

    /// Set and validate the public key (uncompressed SEC1 encoding).
    pub fn set_pub_key(&mut self, sec1: &[u8]) -> Result<()> {
        let pt = decode_sec1_point(self.curve, sec1)?;
        match &self.dev {
            Some(dev) => is_pubkey_valid_full(dev, self.curve, &pt)?,
            None => check_pub_key_software(self.curve_id, sec1)?,
        }
        self.pub_key = Some(pt);
        Ok(())
    }

    /// Verify `der_sig` over `digest`.
    pub fn verify(&self, digest: &[u8], der_sig: &[u8]) -> Result<()> {
        let pub_key = self.pub_key.as_ref().ok_or(Error::InvalidKey)?;
        match &self.dev {
            Some(dev) => self
                .verify_hw(dev, pub_key, digest, der_sig)
                .map_err(|e| match e {
                    // Hardware detail never reaches the caller.
                    Error::HardwareFault(_) => Error::Fatal,
                    other => other,
                }),
            None => verify_software(self.curve_id, &encode_sec1_point(pub_key), digest, der_sig),
        }
    }

    fn verify_hw(
        &self,
        dev: &PkaDevice,
        pub_key: &EccPoint,
        digest: &[u8],
        der_sig: &[u8],
    ) -> Result<()> {
        let curve = self.curve;
        let nd = curve.ndigits;
        let coord = nd * 8;
        let (r_bytes, s_bytes) = decode_der_sig(self.curve_id, der_sig)?;
        let r = digits_from_be_bytes(&r_bytes, nd)?;
        let s = digits_from_be_bytes(&s_bytes, nd)?;

        // 0 < r < n, 0 < s < n
        for v in [&r, &s] {
            if vli_is_zero(v) || vli_cmp(v, curve.n) != Ordering::Less {
                return Err(Error::AuthenticationFailed);
            }
        }

        // Leftmost curve-width bits of the digest, reduced mod n.
        let hash = &digest[..digest.len().min(coord)];
        let e = digits_from_be_bytes(hash, nd)?;
        let e = modreduce(dev, &e, curve.n)?;

        let s1 = modinv(dev, &s, curve.n)?;
        let u1 = modmult(dev, &e, &s1, curve.n)?;
        let u2 = modmult(dev, &r, &s1, curve.n)?;

        // R = u1*G + u2*Q in one pass.
        let res = shamir(dev, curve, &u1, &u2, &curve.g(), pub_key)?;
        if res.is_zero() {
            return Err(Error::AuthenticationFailed);
        }
        let rx = if vli_cmp(&res.x, curve.n) != Ordering::Less {
            modreduce(dev, &res.x, curve.n)?
        } else {
            res.x
        };
        if rx == r {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed)
        }
    }
}
