/*++

Licensed under the Apache-2.0 license.

File Name:

    error.rs

Abstract:

    File contains the error taxonomy shared by all PKA layers.

--*/

use dwc_pka_emu_bus::BusError;
use std::fmt;

/// Errors reported by the PKA driver stack.
///
/// The register and dispatch layers return translated kinds from this
/// taxonomy, never raw hardware codes. A nonzero stop reason reported by the
/// firmware itself travels as [`Error::HardwareFault`]; it is a computation
/// outcome, distinct from a dispatch failure.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// Job still running; a status, not a failure.
    InProgress,
    /// No device bound to this context.
    InvalidContext,
    /// Firmware not ready.
    NotInitialized,
    /// Caller supplied a malformed argument.
    InvalidArgument,
    /// Operand size exceeds what the hardware was built for.
    InvalidSize,
    /// Key size unsupported.
    InvalidKeySize,
    /// Unknown algorithm.
    InvalidAlg,
    /// Invalid operation mode.
    InvalidMode,
    /// Key material failed validation.
    InvalidKey,
    /// Invalid IV size.
    InvalidIvSize,
    /// Data not aligned to the required block size.
    InvalidBlockAlignment,
    /// Parameter blob has the wrong size.
    InvalidParameterSize,
    /// Replayed sequence value.
    Replay,
    /// Protocol violation.
    InvalidProtocol,
    /// Capability not implemented.
    NotImplemented,
    /// Module disabled by configuration.
    ModuleDisabled,
    /// Allocation failure.
    OutOfMemory,
    /// Padding check failed.
    InvalidPad,
    /// Malformed sequence while parsing.
    InvalidSequence,
    /// Hardware did not complete in time.
    Timeout,
    /// Operation aborted before completion.
    Cancelled,
    /// Signature or digest comparison failed.
    AuthenticationFailed,
    /// Sequence number space exhausted.
    SequenceOverflow,
    /// Unsupported format version.
    InvalidVersion,
    /// Resource contended; try again once the holder releases it.
    Busy,
    /// Transient failure; retry with new inputs.
    TryAgain,
    /// Temporarily unable to service the request.
    TemporaryFailure,
    /// Register access failed.
    IoFailure,
    /// Unrecoverable hardware fault.
    Fatal,
    /// No firmware loaded, or no such entity.
    NotFound,
    /// Firmware image unusable; carries the image's diagnostic message.
    InvalidFirmware(String),
    /// Nonzero stop reason reported by the firmware for a dispatched job.
    HardwareFault(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InProgress => write!(f, "operation in progress"),
            Error::InvalidContext => write!(f, "no device bound to context"),
            Error::NotInitialized => write!(f, "firmware not ready"),
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::InvalidSize => write!(f, "operand size unsupported by hardware"),
            Error::InvalidKeySize => write!(f, "invalid key size"),
            Error::InvalidAlg => write!(f, "invalid algorithm"),
            Error::InvalidMode => write!(f, "invalid mode"),
            Error::InvalidKey => write!(f, "invalid key"),
            Error::InvalidIvSize => write!(f, "invalid IV size"),
            Error::InvalidBlockAlignment => write!(f, "invalid block alignment"),
            Error::InvalidParameterSize => write!(f, "invalid parameter size"),
            Error::Replay => write!(f, "sequence replay"),
            Error::InvalidProtocol => write!(f, "protocol violation"),
            Error::NotImplemented => write!(f, "not implemented"),
            Error::ModuleDisabled => write!(f, "module disabled"),
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::InvalidPad => write!(f, "invalid padding"),
            Error::InvalidSequence => write!(f, "invalid sequence"),
            Error::Timeout => write!(f, "hardware timeout"),
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::AuthenticationFailed => write!(f, "authentication failed"),
            Error::SequenceOverflow => write!(f, "sequence overflow"),
            Error::InvalidVersion => write!(f, "invalid version"),
            Error::Busy => write!(f, "device busy"),
            Error::TryAgain => write!(f, "try again"),
            Error::TemporaryFailure => write!(f, "temporary failure"),
            Error::IoFailure => write!(f, "register access failure"),
            Error::Fatal => write!(f, "unrecoverable hardware fault"),
            Error::NotFound => write!(f, "not found"),
            Error::InvalidFirmware(msg) => write!(f, "invalid firmware: {msg}"),
            Error::HardwareFault(code) => write!(f, "firmware stop reason {code}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<BusError> for Error {
    fn from(_: BusError) -> Self {
        Error::IoFailure
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_error_translation() {
        let err: Error = BusError::LoadAccessFault.into();
        assert_eq!(err, Error::IoFailure);
    }

    #[test]
    fn test_display_carries_firmware_message() {
        let err = Error::InvalidFirmware("no entry point 'modexp'".to_string());
        assert!(err.to_string().contains("no entry point 'modexp'"));
    }
}
