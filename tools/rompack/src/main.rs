//! Wraps an ELF image into a ROM-style container at the offset the boot
//! engine's scan expects.

use boot_loader::elf::parser::CONVENTIONAL_IMAGE_OFFSET;
use std::{env, fs};

fn main() -> std::io::Result<()> {
    // args: <image.elf> <out.rom>
    let mut args = env::args().skip(1);
    let input = args.next().expect("input ELF image");
    let output = args.next().expect("output ROM path");

    let elf = fs::read(&input)?;
    if elf.get(..4) != Some(&[0x7F, b'E', b'L', b'F'][..]) {
        eprintln!("{input}: not an ELF image");
        std::process::exit(1);
    }

    let pad = usize::try_from(CONVENTIONAL_IMAGE_OFFSET).expect("offset fits in usize");
    let mut rom = vec![0u8; pad];
    rom.extend_from_slice(&elf);
    fs::write(&output, &rom)?;

    println!(
        "{output}: {} bytes, image at {CONVENTIONAL_IMAGE_OFFSET:#x}",
        rom.len()
    );
    Ok(())
}
