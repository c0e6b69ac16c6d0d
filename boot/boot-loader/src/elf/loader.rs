//! # ELF Segment Loader
//!
//! Places a parsed image's `PT_LOAD` segments into claimed physical memory
//! and reports the entry point plus the stream offset just past the image's
//! file bytes (a compressed secondary payload conventionally sits there).

extern crate alloc;

use super::LoadError;
use super::parser::ImageHeader;
use boot_memory_addresses::VirtualAddress;
use boot_services::{Device, InstructionCache, MemoryClaim};
use log::{debug, warn};

/// Result of a successful image load.
#[derive(Debug, Clone, Copy)]
pub struct LoadedImage {
    /// Address to transfer control to.
    pub entry: VirtualAddress,
    /// Stream offset immediately after the last segment's file bytes.
    /// Exposed for payloads appended to the image; not consumed here.
    pub trailing_offset: u64,
}

/// Load the executable image found in `dev` into memory claimed from `mem`.
///
/// For every segment, `min(filesz, memsz)` bytes are copied from the stream
/// into the claimed range `[vaddr, vaddr + memsz)`, the tail is zeroed, and
/// the instruction cache is flushed over the copied bytes. Segments with
/// nothing to copy are skipped entirely (no claim), matching the original
/// image semantics; a segment whose virtual and physical addresses disagree
/// is loaded at its virtual address and logged as an anomaly.
///
/// # Errors
/// [`LoadError::NotExecutable`] if no image is present (soft);
/// [`LoadError::InvalidFormat`], [`LoadError::ClaimFailed`] or
/// [`LoadError::ReadFailed`] on fatal conditions; by then memory may
/// already be partially populated and the boot sequence must abort.
pub fn load_image<D, M>(dev: &mut D, mem: &mut M) -> Result<LoadedImage, LoadError>
where
    D: Device,
    M: MemoryClaim + InstructionCache,
{
    let header = ImageHeader::parse(dev)?;
    debug!(
        "image at offset {:#x}, entry {}, {} segment(s)",
        header.image_offset,
        header.entry,
        header.segments.len()
    );

    let mut trailing_offset = header.image_offset;
    for seg in &header.segments {
        debug!(
            "segment: filesz={:#010x} memsz={:#010x} offset={:#010x} vaddr={} flags={:?}",
            seg.filesz, seg.memsz, seg.offset, seg.vaddr, seg.flags
        );
        if seg.vaddr.as_u64() != seg.paddr.as_u64() {
            warn!(
                "segment virtual address {} differs from physical {}; loading at the virtual address",
                seg.vaddr, seg.paddr
            );
        }

        let source_offset = header
            .image_offset
            .checked_add(seg.offset)
            .ok_or(LoadError::InvalidFormat)?;
        let file_end = source_offset
            .checked_add(seg.filesz)
            .ok_or(LoadError::InvalidFormat)?;
        trailing_offset = trailing_offset.max(file_end);

        seg.vaddr
            .checked_add(seg.memsz)
            .ok_or(LoadError::InvalidFormat)?;

        let copy_size = seg.filesz.min(seg.memsz);
        if copy_size == 0 {
            continue;
        }
        let copy_len = usize::try_from(copy_size).map_err(|_| LoadError::InvalidFormat)?;

        let region = mem.claim(seg.vaddr.identity_mapped(), seg.memsz, 0)?;
        dev.seek(source_offset).map_err(LoadError::ReadFailed)?;
        dev.read_exact(&mut region[..copy_len])
            .map_err(LoadError::ReadFailed)?;
        region[copy_len..].fill(0);

        mem.flush_range(seg.vaddr, VirtualAddress::new(seg.vaddr.as_u64() + copy_size));
        debug!("segment loaded at {} ({:#x} bytes)", seg.vaddr, seg.memsz);
    }

    Ok(LoadedImage {
        entry: header.entry,
        trailing_offset,
    })
}
