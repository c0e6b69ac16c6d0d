//! # Secondary-Bootloader Discovery and Handoff
//!
//! The engine a firmware uses to find something to boot, put it in memory,
//! and jump to it, with no return expected.
//!
//! ## Overview
//!
//! Given candidate storage device paths, the engine locates an ELF-formatted
//! program, places its segments into claimed physical memory, and transfers
//! control to its entry point. Media that carry no image directly may carry a
//! CHRP bootinfo descriptor instead, naming a boot script which is evaluated
//! by the firmware's command interpreter (and may itself boot, re-entering
//! the engine).
//!
//! ```text
//! Candidate Sequencer ([`sequencer`])
//!         │  per candidate
//!         ├──► Bootinfo Extractor ([`bootinfo`]) ──► script evaluator
//!         │                                          (may re-enter boot)
//!         └──► Image Loader ([`elf`])
//!                      │ entry address
//!                      ▼
//!             Control Handoff ([`handoff`]) ──► loaded program (one-way)
//! ```
//!
//! ## What you get
//! - A defensive ELF32/BE parser that probes ROM-style containers for the
//!   embedded image ([`elf::parser`]).
//! - Segment placement through an injected physical allocator, with
//!   instruction-cache maintenance ([`elf::loader`]).
//! - The CHRP `<boot-script>` extractor with `&device;` macro substitution
//!   ([`bootinfo`]).
//! - The ordered candidate search with its fatal/non-fatal failure policy
//!   ([`sequencer`]).
//!
//! All firmware dependencies (device I/O, memory claims, cache flushes, the
//! property store, NVRAM, the script evaluator, and the jump itself) are
//! injected through the `boot-services` contracts, so the whole engine runs
//! hosted under plain `cargo test`.
//!
//! ## Failure policy
//!
//! A candidate that cannot be opened, or is not an ELF image, is skipped.
//! A candidate whose accepted image fails mid-load (`InvalidFormat`,
//! `ClaimFailed`, `ReadFailed`) aborts the entire sequence: physical memory
//! may already be partially populated and no later candidate can un-claim
//! it. A handed-off program that returns control is itself a fatal report.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod bootinfo;
pub mod elf;
pub mod handoff;
pub mod sequencer;

pub use crate::elf::LoadError;
pub use crate::elf::loader::{LoadedImage, load_image};
pub use crate::sequencer::{
    BootError, Candidate, FALLBACK_CANDIDATES, MAX_SCRIPT_DEPTH, Sequencer, boot,
};
