/*++

Licensed under the Apache-2.0 license.

File Name:

    fw_image.rs

Abstract:

    File contains the PKA firmware image format: tag structures, image
    parsing and the image builder used by packaging tools and tests.

--*/

use crate::error::{Error, Result};
use md5::{Digest, Md5};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::LayoutVerified;

type U32Le = U32<LittleEndian>;

/// Image magic, "FPLE" when read as little-endian bytes.
pub const FW_MAGIC: u32 = 0x454C_5046;

/// Image format version understood by this parser.
pub const FW_VERSION: u16 = 1;

/// Words occupied by a segment tag in this version.
pub const TAG_WORDS: u32 = 8;

/// Epoch of firmware build timestamps: 2009-11-11T11:00:00Z.
pub const FW_TIMESTAMP_EPOCH: u64 = 1_257_937_200;

/// Build timestamps tick once per 20 seconds.
pub const FW_TIMESTAMP_RESOLUTION: u64 = 20;

/// Convert a tag timestamp to Unix seconds.
pub fn timestamp_to_unix(ts: u32) -> u64 {
    FW_TIMESTAMP_EPOCH + ts as u64 * FW_TIMESTAMP_RESOLUTION
}

/// MD5 over firmware words, each hashed as its little-endian bytes.
pub fn md5_words<I: IntoIterator<Item = u32>>(words: I) -> [u8; 16] {
    let mut md5 = Md5::new();
    for w in words {
        md5.update(w.to_le_bytes());
    }
    md5.finalize().into()
}

/// Tag embedded in the first words of a firmware segment.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FwTag {
    /// Load origin of the segment, in words.
    pub origin: u32,
    /// Words occupied by the tag itself.
    pub tag_length: u32,
    /// Build timestamp, 20-second resolution from [`FW_TIMESTAMP_EPOCH`].
    pub timestamp: u32,
    /// Words covered by `md5`, starting at word `tag_length`.
    pub md5_coverage: u32,
    /// Digest of the covered words.
    pub md5: [u8; 16],
}

impl FwTag {
    fn from_words(kind: &str, words: &[u32]) -> std::result::Result<FwTag, String> {
        if (words.len() as u32) < TAG_WORDS {
            return Err(format!("{kind} segment too short for a tag"));
        }
        let tag_length = words[1];
        if tag_length < 6 || tag_length > words.len() as u32 {
            return Err(format!("{kind} tag length {tag_length} out of range"));
        }
        let mut md5 = [0u8; 16];
        for (i, w) in words[4..8].iter().enumerate() {
            md5[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        Ok(FwTag {
            origin: words[0],
            tag_length,
            timestamp: words[2],
            md5_coverage: words[3],
            md5,
        })
    }

    fn to_words(&self) -> [u32; TAG_WORDS as usize] {
        let mut words = [0u32; TAG_WORDS as usize];
        words[0] = self.origin;
        words[1] = self.tag_length;
        words[2] = self.timestamp;
        words[3] = self.md5_coverage;
        for i in 0..4 {
            words[4 + i] = u32::from_le_bytes(self.md5[i * 4..i * 4 + 4].try_into().unwrap());
        }
        words
    }
}

/// One parsed firmware segment: its tag plus every image word, tag included.
#[derive(Debug, Clone)]
pub struct FwSegment {
    pub tag: FwTag,
    pub words: Vec<u32>,
}

/// A named firmware entry point.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FwSymbol {
    pub name: String,
    pub entry: u32,
}

/// Parsed firmware image.
#[derive(Debug, Clone)]
pub struct PkaFirmware {
    ram: Option<FwSegment>,
    rom: Option<FwSegment>,
    symbols: Vec<FwSymbol>,
}

const HEADER_BYTES: usize = 16;
const SYMBOL_BYTES: usize = 20;
const SYMBOL_NAME_BYTES: usize = 16;

fn rd32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn invalid(msg: String) -> Error {
    Error::InvalidFirmware(msg)
}

/// Reinterpret a byte region as little-endian words.
fn segment_from_bytes(kind: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    let lv = LayoutVerified::<_, [U32Le]>::new_slice_unaligned(bytes)
        .ok_or_else(|| invalid(format!("{kind} segment is not word aligned")))?;
    Ok(lv.into_slice().iter().map(|w| w.get()).collect())
}

impl PkaFirmware {
    /// Parse an image. Failures carry a human-readable description of what
    /// was wrong with the blob.
    pub fn parse(bytes: &[u8]) -> Result<PkaFirmware> {
        if bytes.len() < HEADER_BYTES {
            return Err(invalid(format!("image too short ({} bytes)", bytes.len())));
        }
        let magic = rd32(bytes, 0);
        if magic != FW_MAGIC {
            return Err(invalid(format!("bad magic {magic:#010x}")));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != FW_VERSION {
            return Err(invalid(format!("unsupported image version {version}")));
        }
        let sym_count = u16::from_le_bytes(bytes[6..8].try_into().unwrap()) as usize;
        let ram_words = rd32(bytes, 8) as usize;
        let rom_words = rd32(bytes, 12) as usize;

        let expect = HEADER_BYTES + sym_count * SYMBOL_BYTES + (ram_words + rom_words) * 4;
        if bytes.len() != expect {
            return Err(invalid(format!(
                "image length {} does not match header (expected {expect})",
                bytes.len()
            )));
        }

        let mut symbols = Vec::with_capacity(sym_count);
        for i in 0..sym_count {
            let at = HEADER_BYTES + i * SYMBOL_BYTES;
            let name_bytes = &bytes[at..at + SYMBOL_NAME_BYTES];
            let end = name_bytes
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(SYMBOL_NAME_BYTES);
            let name = std::str::from_utf8(&name_bytes[..end])
                .map_err(|_| invalid(format!("symbol {i} name is not UTF-8")))?;
            if name.is_empty() {
                return Err(invalid(format!("symbol {i} has an empty name")));
            }
            symbols.push(FwSymbol {
                name: name.to_string(),
                entry: rd32(bytes, at + SYMBOL_NAME_BYTES),
            });
        }

        let ram_at = HEADER_BYTES + sym_count * SYMBOL_BYTES;
        let rom_at = ram_at + ram_words * 4;

        let ram = if ram_words > 0 {
            let words = segment_from_bytes("RAM", &bytes[ram_at..rom_at])?;
            let tag = FwTag::from_words("RAM", &words).map_err(invalid)?;
            let covered = tag.tag_length.saturating_add(tag.md5_coverage);
            if covered > words.len() as u32 {
                return Err(invalid(format!(
                    "RAM tag covers {covered} words but segment has {}",
                    words.len()
                )));
            }
            Some(FwSegment { tag, words })
        } else {
            None
        };

        let rom = if rom_words > 0 {
            let words = segment_from_bytes("ROM", &bytes[rom_at..])?;
            let tag = FwTag::from_words("ROM", &words).map_err(invalid)?;
            Some(FwSegment { tag, words })
        } else {
            None
        };

        if ram.is_none() && rom.is_none() {
            return Err(invalid("image carries neither RAM nor ROM".to_string()));
        }

        Ok(PkaFirmware { ram, rom, symbols })
    }

    pub fn ram(&self) -> Option<&FwSegment> {
        self.ram.as_ref()
    }

    pub fn rom(&self) -> Option<&FwSegment> {
        self.rom.as_ref()
    }

    pub fn symbols(&self) -> &[FwSymbol] {
        &self.symbols
    }

    /// Resolve an entry point name to its firmware address.
    pub fn symbol(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.entry)
    }

    /// One-line description used in diagnostics.
    pub fn describe(&self) -> String {
        let ts = self
            .ram
            .as_ref()
            .or(self.rom.as_ref())
            .map(|seg| seg.tag.timestamp)
            .unwrap_or(0);
        format!(
            "pka firmware built at unix {} ({} symbols)",
            timestamp_to_unix(ts),
            self.symbols.len()
        )
    }
}

/// Produce a tagged segment: tag words followed by the payload, with the
/// tag's MD5 covering the payload.
pub fn tagged_segment(timestamp: u32, payload: &[u32]) -> Vec<u32> {
    let tag = FwTag {
        origin: 0,
        tag_length: TAG_WORDS,
        timestamp,
        md5_coverage: payload.len() as u32,
        md5: md5_words(payload.iter().copied()),
    };
    let mut words = tag.to_words().to_vec();
    words.extend_from_slice(payload);
    words
}

/// Builds firmware images in the format [`PkaFirmware::parse`] understands.
pub struct FwImageBuilder {
    timestamp: u32,
    ram_payload: Vec<u32>,
    rom_payload: Option<Vec<u32>>,
    symbols: Vec<(String, u32)>,
}

impl FwImageBuilder {
    pub fn new() -> Self {
        Self {
            timestamp: 0,
            ram_payload: Vec::new(),
            rom_payload: None,
            symbols: Vec::new(),
        }
    }

    pub fn timestamp(mut self, ts: u32) -> Self {
        self.timestamp = ts;
        self
    }

    /// Firmware RAM payload; the builder prepends the tag.
    pub fn ram_payload(mut self, words: &[u32]) -> Self {
        self.ram_payload = words.to_vec();
        self
    }

    /// Record the expected contents of the hardware ROM (payload following
    /// the ROM's embedded tag). Only the resulting tag is stored in the
    /// image; the driver uses it for readback verification.
    pub fn rom_payload(mut self, words: &[u32]) -> Self {
        self.rom_payload = Some(words.to_vec());
        self
    }

    pub fn symbol(mut self, name: &str, entry: u32) -> Self {
        assert!(name.len() < SYMBOL_NAME_BYTES, "symbol name too long");
        self.symbols.push((name.to_string(), entry));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let ram = if self.ram_payload.is_empty() {
            Vec::new()
        } else {
            tagged_segment(self.timestamp, &self.ram_payload)
        };
        let rom = match &self.rom_payload {
            Some(payload) => tagged_segment(self.timestamp, payload)[..TAG_WORDS as usize].to_vec(),
            None => Vec::new(),
        };

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&FW_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&FW_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.symbols.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&(ram.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(rom.len() as u32).to_le_bytes());
        for (name, entry) in &self.symbols {
            let mut name_bytes = [0u8; SYMBOL_NAME_BYTES];
            name_bytes[..name.len()].copy_from_slice(name.as_bytes());
            bytes.extend_from_slice(&name_bytes);
            bytes.extend_from_slice(&entry.to_le_bytes());
        }
        for w in ram.iter().chain(rom.iter()) {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }
}

impl Default for FwImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> Vec<u8> {
        FwImageBuilder::new()
            .timestamp(0x1234)
            .symbol("modmult", TAG_WORDS)
            .symbol("pmult", TAG_WORDS + 1)
            .ram_payload(&[0x10, 0x20, 0x30])
            .build()
    }

    #[test]
    fn test_build_parse_roundtrip() {
        let fw = PkaFirmware::parse(&sample_image()).unwrap();
        assert_eq!(fw.symbol("modmult"), Some(TAG_WORDS));
        assert_eq!(fw.symbol("pmult"), Some(TAG_WORDS + 1));
        assert_eq!(fw.symbol("shamir"), None);
        let ram = fw.ram().unwrap();
        assert_eq!(ram.tag.timestamp, 0x1234);
        assert_eq!(ram.tag.tag_length, TAG_WORDS);
        assert_eq!(ram.tag.md5_coverage, 3);
        assert_eq!(ram.words.len(), TAG_WORDS as usize + 3);
        assert_eq!(&ram.words[TAG_WORDS as usize..], &[0x10, 0x20, 0x30]);
        assert!(fw.rom().is_none());
    }

    #[test]
    fn test_tag_md5_matches_payload() {
        let fw = PkaFirmware::parse(&sample_image()).unwrap();
        let ram = fw.ram().unwrap();
        let digest = md5_words(ram.words[TAG_WORDS as usize..].iter().copied());
        assert_eq!(digest, ram.tag.md5);
    }

    #[test]
    fn test_rom_tag() {
        let rom_payload = [0xAA, 0xBB];
        let image = FwImageBuilder::new()
            .timestamp(7)
            .rom_payload(&rom_payload)
            .symbol("modexp", 0x4000 + TAG_WORDS)
            .build();
        let fw = PkaFirmware::parse(&image).unwrap();
        let rom = fw.rom().unwrap();
        assert_eq!(rom.words.len(), TAG_WORDS as usize);
        assert_eq!(rom.tag.md5_coverage, 2);
        assert_eq!(rom.tag.md5, md5_words(rom_payload.iter().copied()));
    }

    #[test]
    fn test_bad_magic() {
        let mut image = sample_image();
        image[0] ^= 0xFF;
        match PkaFirmware::parse(&image) {
            Err(Error::InvalidFirmware(msg)) => assert!(msg.contains("magic")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_bad_version() {
        let mut image = sample_image();
        image[4] = 9;
        match PkaFirmware::parse(&image) {
            Err(Error::InvalidFirmware(msg)) => assert!(msg.contains("version")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_truncated() {
        let image = sample_image();
        assert!(PkaFirmware::parse(&image[..image.len() - 2]).is_err());
        assert!(PkaFirmware::parse(&[]).is_err());
    }

    #[test]
    fn test_empty_image_rejected() {
        let image = FwImageBuilder::new().build();
        assert!(PkaFirmware::parse(&image).is_err());
    }

    #[test]
    fn test_timestamp_epoch() {
        // 2009-11-11T11:00:00Z plus one tick.
        assert_eq!(timestamp_to_unix(1), 1_257_937_220);
    }
}
