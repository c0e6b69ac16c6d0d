//! # Boot Candidate Sequencing
//!
//! Drives the ordered search for something bootable:
//!
//! ```text
//! explicit path?  ──yes──► image load, then bootinfo script
//!       │no
//!       ▼
//! /options boot-device ──► bootinfo script first, then image load
//!       │
//!       ▼
//! static fallback list ──► image load per entry, in order
//!       │
//!       ▼
//! exhausted: report boot failure
//! ```
//!
//! A persisted device is more likely to carry a structured boot descriptor
//! than a path handed in by a prior evaluation context, which is why the two
//! entry flavors probe in opposite orders.
//!
//! Failure policy: "cannot open" and "not an executable image" advance to
//! the next candidate; every other load failure aborts the sequence, since
//! physical memory may already be partially populated. Success never returns
//! here at all: control has been handed to the loaded program.

extern crate alloc;

use crate::bootinfo;
use crate::elf::LoadError;
use crate::elf::loader::load_image;
use crate::handoff;
use alloc::string::String;
use boot_services::{DeviceUnavailable, FirmwareServices, HandoffReturned};
use core::convert::Infallible;
use log::{debug, error, info, warn};

/// Built-in candidates tried after every other source, in order.
pub const FALLBACK_CANDIDATES: [(&str, &str); 2] = [
    ("hd:2,\\ofclient", ""),
    ("hd:2,\\yaboot", "conf=hd:2,\\yaboot.conf"),
];

/// Upper bound on boot re-entry through evaluated boot scripts. At this
/// depth the bootinfo step is skipped, so a script that keeps booting its
/// own device diagnoses as an exhausted sequence instead of unbounded
/// recursion.
pub const MAX_SCRIPT_DEPTH: usize = 4;

/// A device path plus the argument string handed to the loaded program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: String,
    pub args: String,
}

impl Candidate {
    pub fn new(path: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: args.into(),
        }
    }
}

/// Why the boot sequence ended. There is no success variant: a successful
/// boot transfers control away and this type is never constructed.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    /// Every candidate was tried and none booted.
    #[error("no secondary bootloader found")]
    Exhausted,
    /// A fatal image load failure; see [`LoadError::is_fatal`].
    #[error("fatal image load failure")]
    Load(#[source] LoadError),
    /// A handed-off program returned control.
    #[error(transparent)]
    HandoffReturned(#[from] HandoffReturned),
}

/// One boot attempt over a set of firmware services.
pub struct Sequencer<'a, P: FirmwareServices> {
    services: &'a mut P,
    depth: usize,
}

impl<'a, P: FirmwareServices> Sequencer<'a, P> {
    pub fn new(services: &'a mut P) -> Self {
        Self::nested(services, 0)
    }

    /// A sequencer re-entered from an evaluated boot script. `depth` counts
    /// the nesting level and is bounded by [`MAX_SCRIPT_DEPTH`].
    pub fn nested(services: &'a mut P, depth: usize) -> Self {
        Self { services, depth }
    }

    /// Run the candidate sequence. Returns only on failure; on success the
    /// machine belongs to the loaded program.
    pub fn run(mut self, explicit: Option<Candidate>) -> BootError {
        match self.sequence(explicit) {
            Ok(never) => match never {},
            Err(err) => err,
        }
    }

    fn sequence(&mut self, explicit: Option<Candidate>) -> Result<Infallible, BootError> {
        if let Some(candidate) = explicit {
            info!("boot: explicit candidate {}", candidate.path);
            self.try_image(&candidate)?;
            self.try_bootinfo(&candidate.path);
        } else if let Some(candidate) = self.persisted_candidate() {
            info!(
                "boot: persisted candidate {} {}",
                candidate.path, candidate.args
            );
            self.try_bootinfo(&candidate.path);
            self.try_image(&candidate)?;
        }

        for (path, args) in FALLBACK_CANDIDATES {
            self.try_image(&Candidate::new(path, args))?;
        }

        error!("boot failure: no secondary bootloader found");
        Err(BootError::Exhausted)
    }

    /// Attempt to load and hand off an executable image from the candidate.
    /// `Ok(())` means "did not boot, keep sequencing"; `Err` aborts.
    fn try_image(&mut self, candidate: &Candidate) -> Result<(), BootError> {
        debug!("boot: trying {} {}", candidate.path, candidate.args);
        let mut dev = match self.services.open(&candidate.path) {
            Ok(dev) => dev,
            Err(DeviceUnavailable) => {
                debug!("boot: cannot open {}", candidate.path);
                return Ok(());
            }
        };

        match load_image(&mut dev, &mut *self.services) {
            Ok(image) => {
                drop(dev);
                Err(handoff::commit_and_transfer(
                    self.services,
                    candidate,
                    &image,
                ))
            }
            Err(LoadError::NotExecutable) => {
                debug!("boot: {} is not an executable image", candidate.path);
                Ok(())
            }
            Err(fatal) => {
                error!("boot: aborting, {} failed to load: {fatal}", candidate.path);
                Err(BootError::Load(fatal))
            }
        }
    }

    /// Extract and evaluate a bootinfo script, if the medium carries one and
    /// the re-entry bound allows it.
    fn try_bootinfo(&mut self, path: &str) {
        if self.depth >= MAX_SCRIPT_DEPTH {
            warn!("boot: script re-entry depth {} reached; skipping bootinfo", self.depth);
            return;
        }
        bootinfo::run_bootinfo(&mut *self.services, path);
    }

    /// The candidate persisted in the configuration store, if any.
    ///
    /// `boot-device` may carry inline arguments after the first space;
    /// otherwise `boot-args` is consulted separately.
    fn persisted_candidate(&mut self) -> Option<Candidate> {
        let options = self.services.find_node("/options")?;
        let device = prop_string(self.services.get_property(options, "boot-device")?);

        if let Some((path, args)) = device.split_once(' ') {
            Some(Candidate::new(path, args))
        } else {
            let args = self
                .services
                .get_property(options, "boot-args")
                .map(prop_string)
                .unwrap_or_default();
            Some(Candidate::new(device, args))
        }
    }
}

/// Boot from the ordered candidate sources. Returns only the failure report;
/// success hands the machine away.
pub fn boot<P: FirmwareServices>(services: &mut P, explicit: Option<Candidate>) -> BootError {
    Sequencer::new(services).run(explicit)
}

/// Decode a string property, dropping the conventional NUL terminator.
fn prop_string(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
