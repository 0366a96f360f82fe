/*++

Licensed under the Apache-2.0 license.

File Name:

    image.rs

Abstract:

    File contains the factory ROM contents and the standard firmware image
    shipped with the peripheral model.

--*/

use dwc_pka::{tagged_segment, FwImageBuilder, ROM_ENTRY_BASE, TAG_WORDS};

/// Microcode words the sequencer understands; the word a firmware entry
/// point resolves to selects the routine.
pub(crate) mod opcode {
    pub const MODMULT: u32 = 0x504B_0001;
    pub const MODADD: u32 = 0x504B_0002;
    pub const MODSUB: u32 = 0x504B_0003;
    pub const MODINV: u32 = 0x504B_0004;
    pub const REDUCE: u32 = 0x504B_0005;
    pub const MODDIV: u32 = 0x504B_0006;
    pub const PMULT: u32 = 0x504B_0010;
    pub const PVER: u32 = 0x504B_0011;
    pub const SHAMIR: u32 = 0x504B_0012;
    pub const MODEXP: u32 = 0x504B_0020;
    pub const CALC_R_INV: u32 = 0x504B_0021;
    pub const CALC_MP: u32 = 0x504B_0022;
    pub const CALC_R_SQR: u32 = 0x504B_0023;
}

/// Build timestamp baked into the factory ROM tag.
pub const ROM_TIMESTAMP: u32 = 0x0000_524F;

/// The RSA routines live in mask ROM on this part.
pub(crate) fn rom_payload() -> Vec<u32> {
    vec![
        opcode::MODEXP,
        opcode::CALC_R_INV,
        opcode::CALC_MP,
        opcode::CALC_R_SQR,
    ]
}

/// Full hardware ROM contents: embedded tag followed by the routine words.
pub(crate) fn factory_rom_words() -> Vec<u32> {
    tagged_segment(ROM_TIMESTAMP, &rom_payload())
}

const RAM_ROUTINES: [(&str, u32); 9] = [
    ("modmult", opcode::MODMULT),
    ("modadd", opcode::MODADD),
    ("modsub", opcode::MODSUB),
    ("modinv", opcode::MODINV),
    ("reduce", opcode::REDUCE),
    ("moddiv", opcode::MODDIV),
    ("pmult", opcode::PMULT),
    ("pver", opcode::PVER),
    ("shamir", opcode::SHAMIR),
];

const ROM_ROUTINES: [&str; 4] = ["modexp", "calc_r_inv", "calc_mp", "calc_r_sqr"];

/// The canonical firmware image for this peripheral: modular and ECC
/// routines in RAM, the RSA routines resolved into the factory ROM, with
/// tags and digests the driver's readback verification accepts.
pub fn standard_firmware(timestamp: u32) -> Vec<u8> {
    let ram_payload: Vec<u32> = RAM_ROUTINES.iter().map(|(_, op)| *op).collect();
    let mut builder = FwImageBuilder::new()
        .timestamp(timestamp)
        .ram_payload(&ram_payload)
        .rom_payload(&rom_payload());
    for (i, (name, _)) in RAM_ROUTINES.iter().enumerate() {
        builder = builder.symbol(name, TAG_WORDS + i as u32);
    }
    for (i, name) in ROM_ROUTINES.iter().enumerate() {
        builder = builder.symbol(name, ROM_ENTRY_BASE + TAG_WORDS + i as u32);
    }
    builder.build()
}
