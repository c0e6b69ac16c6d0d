//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the raw memory addresses the boot engine moves
//! around: segment load addresses, claim bases, entry points.
//!
//! ## Overview
//!
//! This crate defines a minimal set of types that prevent mixing virtual and
//! physical addresses at compile time while remaining zero-cost wrappers around
//! `u64` values.
//!
//! | Type | Meaning |
//! |----------|----------|
//! | [`MemoryAddress`] | A raw address, either physical or virtual. |
//! | [`VirtualAddress`] | An address as seen by executing code (ELF `p_vaddr`, entry points). |
//! | [`PhysicalAddress`] | An address in the machine's physical map (claim bases). |
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`,
//!   and `Hash`, making them suitable as map keys or for FFI use.
//! - Arithmetic that can wrap is exposed only in checked form
//!   ([`VirtualAddress::checked_add`] and friends); image parsing must treat
//!   overflow as malformed input, never as wraparound.
//! - The firmware this engine serves runs with an identity-mapped address
//!   space, so [`VirtualAddress::identity_mapped`] is the (trivial, but
//!   explicit) bridge to the physical allocator.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

use core::fmt;

/// Principal raw memory address ([virtual](VirtualAddress) or [physical](PhysicalAddress)).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddress(u64);

impl MemoryAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Checked add of a byte count, returning `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryAddress(0x{:08X})", self.0)
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u64())
    }
}

/// Virtual memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **virtual** addresses.
/// It carries the *kind* of address at the type level so a segment's execution
/// address and its physical placement cannot be mixed up silently.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    /// Checked add of a byte count, returning `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(a) => Some(Self(a)),
            None => None,
        }
    }

    /// The physical address this virtual address resolves to under the
    /// firmware's identity mapping.
    ///
    /// Boot-time firmware runs before any translation is set up, so the
    /// mapping is the identity; this method exists to make that assumption a
    /// visible, searchable step instead of a silent cast.
    #[inline]
    #[must_use]
    pub const fn identity_mapped(self) -> PhysicalAddress {
        PhysicalAddress::new(self.as_u64())
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u64())
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

/// Physical memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **physical** addresses
/// (claim bases handed to the firmware's memory allocator).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(MemoryAddress);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    /// Checked add of a byte count, returning `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(a) => Some(Self(a)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:08X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u64())
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_add_detects_overflow() {
        let a = VirtualAddress::new(u64::MAX - 1);
        assert!(a.checked_add(1).is_some());
        assert!(a.checked_add(2).is_none());

        let p = PhysicalAddress::new(u64::MAX);
        assert!(p.checked_add(1).is_none());
    }

    #[test]
    fn identity_mapping_is_value_preserving() {
        let va = VirtualAddress::new(0x0140_0000);
        assert_eq!(va.identity_mapped().as_u64(), va.as_u64());
    }

    #[test]
    fn display_is_hex() {
        let va = VirtualAddress::new(0x4000);
        assert_eq!(format!("{va}"), "0x00004000");
        assert_eq!(format!("{va:?}"), "VA(0x00004000)");
    }
}
