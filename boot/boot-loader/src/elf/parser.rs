//! # ELF Header Parsing
//!
//! Locates and validates an ELF32 big-endian PowerPC executable inside a
//! device byte stream. The image is usually not at offset zero: ROM-style
//! containers embed it at an aligned offset (conventionally `0x4000`), so the
//! stream is probed stride by stride until a valid header appears.

extern crate alloc;

use super::LoadError;
use alloc::vec;
use alloc::vec::Vec;
use boot_memory_addresses::{PhysicalAddress, VirtualAddress};
use boot_services::Device;

/// Probe stride for the embedded-image scan.
pub const SCAN_STEP: u64 = 0x1000;
/// Number of bytes probed from the start of the stream.
pub const SCAN_WINDOW: u64 = 16 * SCAN_STEP;
/// Conventional offset of the image inside a ROM-style container.
pub const CONVENTIONAL_IMAGE_OFFSET: u64 = 0x4000;

const _: () = assert!(CONVENTIONAL_IMAGE_OFFSET < SCAN_WINDOW);

const EHDR_SIZE: usize = 52;
const PHENT_SIZE: usize = 32;

const EI_MAGIC_BYTES: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2MSB: u8 = 2;
const EV_CURRENT: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_PPC: u16 = 20;
const PT_LOAD: u32 = 1;

/// Upper bound on `e_phnum`; anything larger is treated as corruption.
const MAX_SEGMENTS: usize = 64;

/// Bitfield wrapper for `Elf32_Phdr.p_flags` (32-bit)
///
/// Layout (LSB→MSB):
/// - bit 0: execute
/// - bit 1: write
/// - bit 2: read
/// - bits 3..31: reserved
#[bitfield_struct::bitfield(u32)]
pub struct PFlags {
    #[bits(1)]
    pub execute: bool,
    #[bits(1)]
    pub write: bool,
    #[bits(1)]
    pub read: bool,
    #[bits(29)]
    __: u32,
}

/// One `PT_LOAD` entry, widened to `u64` arithmetic.
///
/// Invariant checked at parse time: `filesz <= memsz`.
#[derive(Debug, Clone, Copy)]
pub struct LoadSegment {
    pub vaddr: VirtualAddress,
    pub paddr: PhysicalAddress,
    pub offset: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub flags: PFlags,
}

/// The validated executable header: entry point, where the image sits in the
/// stream, and its loadable segments.
#[derive(Debug)]
pub struct ImageHeader {
    pub entry: VirtualAddress,
    pub image_offset: u64,
    pub segments: Vec<LoadSegment>,
}

impl ImageHeader {
    /// Locate and parse the executable image in `dev`.
    ///
    /// Probing failures (no magic anywhere in the window, or the stream ends
    /// first) yield [`LoadError::NotExecutable`]. Once a header has been
    /// accepted at some offset, any structural problem (bad program-header
    /// entry size, unreadable table, out-of-range counts) is
    /// [`LoadError::InvalidFormat`]: corruption at a position the scan
    /// accepted is a more serious condition than "wrong file type".
    ///
    /// # Errors
    /// See above; no other variants are produced here.
    pub fn parse<D: Device>(dev: &mut D) -> Result<Self, LoadError> {
        let (image_offset, ehdr) = locate(dev)?;

        let e_entry = read_u32(&ehdr, 24);
        let e_phoff = u64::from(read_u32(&ehdr, 28));
        let e_phentsize = read_u16(&ehdr, 42) as usize;
        let e_phnum = read_u16(&ehdr, 44) as usize;

        if e_phentsize != PHENT_SIZE || e_phnum == 0 || e_phnum > MAX_SEGMENTS {
            return Err(LoadError::InvalidFormat);
        }

        let table_offset = image_offset
            .checked_add(e_phoff)
            .ok_or(LoadError::InvalidFormat)?;
        let mut table = vec![0u8; e_phnum * PHENT_SIZE];
        dev.seek(table_offset).map_err(|_| LoadError::InvalidFormat)?;
        dev.read_exact(&mut table)
            .map_err(|_| LoadError::InvalidFormat)?;

        let mut segments = Vec::new();
        for entry in table.chunks_exact(PHENT_SIZE) {
            if read_u32(entry, 0) != PT_LOAD {
                continue;
            }

            let filesz = u64::from(read_u32(entry, 16));
            let memsz = u64::from(read_u32(entry, 20));
            if filesz > memsz {
                return Err(LoadError::InvalidFormat);
            }

            segments.push(LoadSegment {
                vaddr: VirtualAddress::new(u64::from(read_u32(entry, 8))),
                paddr: PhysicalAddress::new(u64::from(read_u32(entry, 12))),
                offset: u64::from(read_u32(entry, 4)),
                filesz,
                memsz,
                flags: PFlags::from_bits(read_u32(entry, 24)),
            });
        }

        Ok(Self {
            entry: VirtualAddress::new(u64::from(e_entry)),
            image_offset,
            segments,
        })
    }
}

/// Probe the stream at [`SCAN_STEP`]-aligned offsets for a valid header.
fn locate<D: Device>(dev: &mut D) -> Result<(u64, [u8; EHDR_SIZE]), LoadError> {
    let mut offset = 0;
    while offset < SCAN_WINDOW {
        let mut ehdr = [0u8; EHDR_SIZE];
        if dev.seek(offset).is_err() || dev.read_exact(&mut ehdr).is_err() {
            // Stream ended inside the window; nothing further can match.
            break;
        }
        if is_candidate(&ehdr) {
            return Ok((offset, ehdr));
        }
        offset += SCAN_STEP;
    }
    Err(LoadError::NotExecutable)
}

/// Whether `ehdr` is a 32-bit big-endian PowerPC executable header.
fn is_candidate(ehdr: &[u8; EHDR_SIZE]) -> bool {
    ehdr[0..4] == EI_MAGIC_BYTES
        && ehdr[4] == ELFCLASS32
        && ehdr[5] == ELFDATA2MSB
        && ehdr[6] == EV_CURRENT
        && read_u16(ehdr, 16) == ET_EXEC
        && read_u16(ehdr, 18) == EM_PPC
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}


#[cfg(test)]
mod tests {
    use super::testing::{Seg, image};
    use super::*;
    use boot_services::RamDevice;

    fn single_segment() -> Vec<u8> {
        image(
            0x0140_0000,
            &[Seg {
                vaddr: 0x0140_0000,
                paddr: 0x0140_0000,
                offset: 0x100,
                payload: vec![0xAA; 16],
                memsz: 0x20,
                flags: 0x5, // R+X
            }],
        )
    }

    #[test]
    fn parses_image_at_offset_zero() {
        let mut dev = RamDevice::new(single_segment());
        let hdr = ImageHeader::parse(&mut dev).unwrap();
        assert_eq!(hdr.image_offset, 0);
        assert_eq!(hdr.entry.as_u64(), 0x0140_0000);
        assert_eq!(hdr.segments.len(), 1);
        let seg = &hdr.segments[0];
        assert_eq!(seg.offset, 0x100);
        assert_eq!(seg.filesz, 16);
        assert_eq!(seg.memsz, 0x20);
        assert!(seg.flags.execute());
        assert!(seg.flags.read());
        assert!(!seg.flags.write());
    }

    #[test]
    fn finds_image_at_conventional_rom_offset() {
        let mut rom = vec![0u8; CONVENTIONAL_IMAGE_OFFSET as usize];
        rom.extend_from_slice(&single_segment());
        let mut dev = RamDevice::new(rom);
        let hdr = ImageHeader::parse(&mut dev).unwrap();
        assert_eq!(hdr.image_offset, CONVENTIONAL_IMAGE_OFFSET);
    }

    #[test]
    fn unaligned_image_is_not_found() {
        let mut rom = vec![0u8; 0x800];
        rom.extend_from_slice(&single_segment());
        let mut dev = RamDevice::new(rom);
        assert!(matches!(
            ImageHeader::parse(&mut dev),
            Err(LoadError::NotExecutable)
        ));
    }

    #[test]
    fn garbage_stream_is_not_executable() {
        let mut dev = RamDevice::new(vec![0x42; 0x2000]);
        assert!(matches!(
            ImageHeader::parse(&mut dev),
            Err(LoadError::NotExecutable)
        ));
    }

    #[test]
    fn wrong_machine_is_not_accepted() {
        let mut bytes = single_segment();
        bytes[18..20].copy_from_slice(&62u16.to_be_bytes()); // EM_X86_64
        let mut dev = RamDevice::new(bytes);
        assert!(matches!(
            ImageHeader::parse(&mut dev),
            Err(LoadError::NotExecutable)
        ));
    }

    #[test]
    fn bad_phentsize_is_invalid_format() {
        let mut bytes = single_segment();
        bytes[42..44].copy_from_slice(&56u16.to_be_bytes());
        let mut dev = RamDevice::new(bytes);
        assert!(matches!(
            ImageHeader::parse(&mut dev),
            Err(LoadError::InvalidFormat)
        ));
    }

    #[test]
    fn truncated_phdr_table_is_invalid_format() {
        let mut bytes = single_segment();
        bytes.truncate(60); // header survives, table does not
        let mut dev = RamDevice::new(bytes);
        assert!(matches!(
            ImageHeader::parse(&mut dev),
            Err(LoadError::InvalidFormat)
        ));
    }

    #[test]
    fn filesz_larger_than_memsz_is_invalid_format() {
        let bytes = image(
            0x1000,
            &[Seg {
                vaddr: 0x1000,
                paddr: 0x1000,
                offset: 0x100,
                payload: vec![0; 64],
                memsz: 8,
                flags: 0,
            }],
        );
        let mut dev = RamDevice::new(bytes);
        assert!(matches!(
            ImageHeader::parse(&mut dev),
            Err(LoadError::InvalidFormat)
        ));
    }
}
