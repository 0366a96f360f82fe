/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the PKA driver library.

--*/

//! Driver for the DesignWare ELP public key accelerator: a firmware-driven
//! big-number engine with four operand banks, dispatching named firmware
//! routines and layering modular arithmetic, elliptic-curve operations and
//! RSA/ECDSA/ECDH transforms on top.

mod device;
mod ecc;
mod ecdh;
mod ecdsa;
mod error;
mod fw;
mod fw_image;
mod loader;
mod modmath;
mod regs;
mod rsa;
mod sync;

pub use crate::device::{CoreLease, DeviceConfig, JobOutcome, PkaDevice, PkaRegistry};
pub use crate::ecc::{
    curve_params, digits_from_be_bytes, digits_to_be_bytes, is_pubkey_valid_full,
    is_pubkey_valid_partial, make_pub_key, pmult, pver, shamir, vli_cmp, vli_is_zero, CurveId,
    EccCurve, EccPoint, PointCheck,
};
pub use crate::ecdh::EcdhContext;
pub use crate::ecdsa::EcdsaVerifier;
pub use crate::error::{Error, Result};
pub use crate::fw::{FwState, FwToken};
pub use crate::fw_image::{
    md5_words, tagged_segment, timestamp_to_unix, FwImageBuilder, FwSegment, FwSymbol, FwTag,
    PkaFirmware, FW_MAGIC, FW_TIMESTAMP_EPOCH, FW_TIMESTAMP_RESOLUTION, FW_VERSION, TAG_WORDS,
};
pub use crate::loader::{FirmwareLoader, FwCallback, MemLoader};
pub use crate::modmath::{modadd, moddiv, modinv, modmult, modreduce, modsub};
pub use crate::regs::{
    offsets, Bank, BuildConf, Conf, Ctrl, Elppka, Flags, JobStatus, OpMode, PkaConfig, Rc,
    BANK_SLOTS, P521_OPERAND_BYTES, ROM_ENTRY_BASE, SLOT_BYTES,
};
pub use crate::rsa::{RsaContext, RsaKeyMaterial};
