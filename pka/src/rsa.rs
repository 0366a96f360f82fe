/*++

Licensed under the Apache-2.0 license.

File Name:

    rsa.rs

Abstract:

    File contains the RSA adapter: Montgomery precomputation and modular
    exponentiation on the accelerator, with a software fallback for moduli
    beyond the hardware width.

--*/

use crate::device::{CoreLease, PkaDevice, PkaRegistry};
use crate::error::{Error, Result};
use crate::regs::{Bank, OpMode};
use num_bigint::BigUint;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Raw RSA key material. Buffers are zeroed when the material is dropped or
/// replaced.
pub struct RsaKeyMaterial {
    /// Modulus, big-endian, as supplied (a legacy leading zero byte is
    /// preserved for the hardware-width policy and stripped on use).
    n: Zeroizing<Vec<u8>>,
    e: Zeroizing<Vec<u8>>,
    d: Option<Zeroizing<Vec<u8>>>,
}

/// Strip leading zero bytes; an all-zero value collapses to empty.
fn trimmed(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

impl RsaKeyMaterial {
    fn new(n: &[u8], e: &[u8], d: Option<&[u8]>) -> Result<Self> {
        let n_trim = trimmed(n);
        if n_trim.is_empty() || e.is_empty() || trimmed(e).is_empty() {
            return Err(Error::InvalidKey);
        }
        // RSA moduli are odd products of two primes.
        if n_trim[n_trim.len() - 1] & 1 == 0 {
            return Err(Error::InvalidKey);
        }
        if let Some(d) = d {
            if trimmed(d).is_empty() {
                return Err(Error::InvalidKey);
            }
        }
        Ok(Self {
            n: Zeroizing::new(n.to_vec()),
            e: Zeroizing::new(e.to_vec()),
            d: d.map(|d| Zeroizing::new(d.to_vec())),
        })
    }

    /// Significant modulus length in bytes.
    pub fn modulus_size(&self) -> usize {
        trimmed(&self.n).len()
    }
}

/// RSA encrypt/decrypt transform (raw modular exponentiation; padding is a
/// caller concern).
pub struct RsaContext {
    dev: Option<Arc<PkaDevice>>,
    key: Option<RsaKeyMaterial>,
}

impl RsaContext {
    pub fn new(registry: &PkaRegistry) -> Self {
        Self {
            dev: registry.first_available(),
            key: None,
        }
    }

    pub fn set_pub_key(&mut self, n: &[u8], e: &[u8]) -> Result<()> {
        self.key = Some(RsaKeyMaterial::new(n, e, None)?);
        Ok(())
    }

    pub fn set_priv_key(&mut self, n: &[u8], e: &[u8], d: &[u8]) -> Result<()> {
        self.key = Some(RsaKeyMaterial::new(n, e, Some(d))?);
        Ok(())
    }

    /// Output size of either operation, in bytes.
    pub fn max_size(&self) -> Result<usize> {
        Ok(self.key.as_ref().ok_or(Error::InvalidKey)?.modulus_size())
    }

    /// `msg^e mod n`
    pub fn encrypt(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let key = self.key.as_ref().ok_or(Error::InvalidKey)?;
        let e = Zeroizing::new(key.e.to_vec());
        self.modexp(msg, &e, &key.n)
    }

    /// `msg^d mod n`
    pub fn decrypt(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let key = self.key.as_ref().ok_or(Error::InvalidKey)?;
        let d = key.d.as_ref().ok_or(Error::InvalidKey)?;
        let d = Zeroizing::new(d.to_vec());
        self.modexp(msg, &d, &key.n)
    }

    /// Hardware serves moduli up to `rsa_size` bits plus the legacy one-byte
    /// sign allowance in the encoded form; anything longer falls back to
    /// software.
    fn hw_serves(&self, dev: &PkaDevice, n_raw: &[u8]) -> bool {
        n_raw.len() <= dev.config().rsa_size as usize / 8 + 1
    }

    fn modexp(&self, base: &[u8], exp: &[u8], n_raw: &[u8]) -> Result<Vec<u8>> {
        let n = trimmed(n_raw);
        let size = n.len();
        if base.len() > size {
            return Err(Error::InvalidParameterSize);
        }
        // The message must be numerically below the modulus.
        let mut padded = vec![0u8; size - base.len()];
        padded.extend_from_slice(base);
        if padded.as_slice() >= n {
            return Err(Error::InvalidArgument);
        }

        match &self.dev {
            Some(dev) if self.hw_serves(dev, n_raw) => self
                .modexp_hw(dev, &padded, exp, n, size)
                .map_err(|e| match e {
                    Error::HardwareFault(_) => Error::Fatal,
                    other => other,
                }),
            _ => Ok(modexp_software(&padded, exp, n, size)),
        }
    }

    fn modexp_hw(
        &self,
        dev: &PkaDevice,
        base: &[u8],
        exp: &[u8],
        n: &[u8],
        size: usize,
    ) -> Result<Vec<u8>> {
        let lease = dev.begin()?;
        let pka = lease.pka();
        pka.load_operand_rsa(Bank::D, 0, n)?;
        // Montgomery constants are recomputed for every exponentiation; the
        // firmware leaves r_inv in C0, mp in D1 and r^2 in D3 for modexp to
        // consume.
        run_rsa(&lease, "calc_r_inv", size)?;
        run_rsa(&lease, "calc_mp", size)?;
        run_rsa(&lease, "calc_r_sqr", size)?;

        let exp = trimmed(exp);
        if exp.len() > size {
            return Err(Error::InvalidKeySize);
        }
        let mut exp_padded = vec![0u8; size - exp.len()];
        exp_padded.extend_from_slice(exp);
        pka.load_operand_rsa(Bank::A, 0, base)?;
        pka.load_operand_rsa(Bank::D, 2, &exp_padded)?;
        run_rsa(&lease, "modexp", size)?;

        let mut out = vec![0u8; size];
        pka.unload_operand_rsa(Bank::A, 0, &mut out)?;
        Ok(out)
    }
}

fn run_rsa(lease: &CoreLease<'_>, entry: &str, size: usize) -> Result<()> {
    let outcome = lease.exec(entry, size, OpMode::Rsa, 0)?;
    if outcome.stop_reason != 0 {
        return Err(Error::HardwareFault(outcome.stop_reason));
    }
    Ok(())
}

/// Software fallback exponentiation, output padded to the modulus width.
fn modexp_software(base: &[u8], exp: &[u8], n: &[u8], size: usize) -> Vec<u8> {
    let result = BigUint::from_bytes_be(base)
        .modpow(&BigUint::from_bytes_be(exp), &BigUint::from_bytes_be(n));
    let bytes = result.to_bytes_be();
    let mut out = vec![0u8; size - bytes.len()];
    out.extend_from_slice(&bytes);
    out
}
