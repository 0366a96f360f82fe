/*++

Licensed under the Apache-2.0 license.

File Name:

    ecdh.rs

Abstract:

    File contains the ECDH shared-secret adapter: peer validation and scalar
    multiplication on the accelerator, with a software fallback.

--*/

use crate::device::{PkaDevice, PkaRegistry};
use crate::ecc::{
    curve_params, digits_from_be_bytes, digits_to_be_bytes, is_pubkey_valid_partial, make_pub_key,
    pmult, vli_cmp, vli_is_zero, CurveId, EccCurve,
};
use crate::ecdsa::{bind_device, decode_sec1_point, encode_sec1_point};
use crate::error::{Error, Result};
use rand::RngCore;
use std::cmp::Ordering;
use std::sync::Arc;
use zeroize::Zeroizing;

/// ECDH key-agreement transform.
pub struct EcdhContext {
    curve_id: CurveId,
    curve: &'static EccCurve,
    dev: Option<Arc<PkaDevice>>,
    private_key: Option<Zeroizing<Vec<u64>>>,
}

impl EcdhContext {
    pub fn new(registry: &PkaRegistry, curve_id: CurveId) -> Self {
        let curve = curve_params(curve_id);
        Self {
            curve_id,
            curve,
            dev: bind_device(registry, curve),
            private_key: None,
        }
    }

    pub fn uses_hardware(&self) -> bool {
        self.dev.is_some()
    }

    /// Set the private scalar from big-endian bytes; must lie in `[1, n-1]`.
    pub fn set_private_key(&mut self, be_bytes: &[u8]) -> Result<()> {
        let d = digits_from_be_bytes(be_bytes, self.curve.ndigits)?;
        if vli_is_zero(&d) || vli_cmp(&d, self.curve.n) != Ordering::Less {
            return Err(Error::InvalidKey);
        }
        self.private_key = Some(Zeroizing::new(d));
        Ok(())
    }

    /// Generate a private key, retrying until the derived public key passes
    /// full validation (SP 800-56A key-generation rule).
    pub fn generate_private_key(&mut self) -> Result<()> {
        let mut rng = rand::thread_rng();
        let mut bytes = Zeroizing::new(vec![0u8; self.curve.ndigits * 8]);
        loop {
            rng.fill_bytes(&mut bytes);
            let d = digits_from_be_bytes(&bytes, self.curve.ndigits)?;
            if vli_is_zero(&d) || vli_cmp(&d, self.curve.n) != Ordering::Less {
                continue;
            }
            if let Some(dev) = &self.dev {
                match make_pub_key(dev, self.curve, &d) {
                    Ok(_) => {}
                    Err(Error::TryAgain) => continue,
                    Err(e) => return Err(e),
                }
            }
            self.private_key = Some(Zeroizing::new(d));
            return Ok(());
        }
    }

    /// The public key for the configured private key, uncompressed SEC1.
    pub fn public_key(&self) -> Result<Vec<u8>> {
        let d = self.private_key.as_ref().ok_or(Error::InvalidKey)?;
        match &self.dev {
            Some(dev) => {
                let pt = make_pub_key(dev, self.curve, d)?;
                Ok(encode_sec1_point(&pt))
            }
            None => self.public_key_software(d),
        }
    }

    /// Compute the shared secret with `peer` (uncompressed SEC1), returning
    /// the x coordinate as big-endian bytes.
    pub fn compute_shared_secret(&self, peer: &[u8]) -> Result<Vec<u8>> {
        let d = self.private_key.as_ref().ok_or(Error::InvalidKey)?;
        match &self.dev {
            Some(dev) => {
                let peer_pt = decode_sec1_point(self.curve, peer)?;
                // Ephemeral peer keys get the partial check only.
                is_pubkey_valid_partial(dev, self.curve, &peer_pt)?;
                let shared = pmult(dev, self.curve, d, &peer_pt).map_err(|e| match e {
                    Error::HardwareFault(_) => Error::Fatal,
                    other => other,
                })?;
                if shared.is_zero() {
                    return Err(Error::InvalidKey);
                }
                Ok(digits_to_be_bytes(&shared.x))
            }
            None => self.shared_secret_software(d, peer),
        }
    }

    fn public_key_software(&self, d: &[u64]) -> Result<Vec<u8>> {
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        let d_bytes = Zeroizing::new(digits_to_be_bytes(d));
        match self.curve_id {
            CurveId::NistP256 => {
                let key =
                    p256::SecretKey::from_slice(&d_bytes).map_err(|_| Error::InvalidKey)?;
                Ok(key.public_key().to_encoded_point(false).as_bytes().to_vec())
            }
            CurveId::NistP384 => {
                let key =
                    p384::SecretKey::from_slice(&d_bytes).map_err(|_| Error::InvalidKey)?;
                Ok(key.public_key().to_encoded_point(false).as_bytes().to_vec())
            }
        }
    }

    fn shared_secret_software(&self, d: &[u64], peer: &[u8]) -> Result<Vec<u8>> {
        let d_bytes = Zeroizing::new(digits_to_be_bytes(d));
        match self.curve_id {
            CurveId::NistP256 => {
                let key =
                    p256::SecretKey::from_slice(&d_bytes).map_err(|_| Error::InvalidKey)?;
                let peer = p256::PublicKey::from_sec1_bytes(peer).map_err(|_| Error::InvalidKey)?;
                let shared =
                    p256::ecdh::diffie_hellman(key.to_nonzero_scalar(), peer.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            }
            CurveId::NistP384 => {
                let key =
                    p384::SecretKey::from_slice(&d_bytes).map_err(|_| Error::InvalidKey)?;
                let peer = p384::PublicKey::from_sec1_bytes(peer).map_err(|_| Error::InvalidKey)?;
                let shared =
                    p384::ecdh::diffie_hellman(key.to_nonzero_scalar(), peer.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            }
        }
    }
}
