//! # Control Handoff
//!
//! The terminal step of a successful load: record what is being booted for
//! diagnostics and retry avoidance across reboots, then jump. The jump is
//! one-way; this module's only return value is the report that it was not.

extern crate alloc;

use crate::elf::loader::LoadedImage;
use crate::sequencer::{BootError, Candidate};
use alloc::vec::Vec;
use boot_services::{ConfigStore, ControlTransfer, Nvram};
use log::{error, info, warn};

/// Persist the chosen candidate and transfer control to the loaded image.
///
/// On the success path this function does not return; the returned
/// [`BootError`] is always the (fatal) observation that the handed-off
/// program gave control back. Chosen recording is best-effort and never
/// blocks the transfer.
pub fn commit_and_transfer<P>(
    services: &mut P,
    candidate: &Candidate,
    image: &LoadedImage,
) -> BootError
where
    P: ConfigStore + Nvram + ControlTransfer,
{
    record_chosen(services, candidate);
    services.persist();

    info!(
        "boot: transferring control to {} {} at {}",
        candidate.path, candidate.args, image.entry
    );
    match services.transfer(image.entry) {
        Ok(never) => match never {},
        Err(returned) => {
            error!("boot: {returned}");
            BootError::HandoffReturned(returned)
        }
    }
}

/// Record the chosen boot path and arguments under `/chosen`.
fn record_chosen<P: ConfigStore>(services: &mut P, candidate: &Candidate) {
    let Some(chosen) = services.find_node("/chosen") else {
        warn!("boot: no /chosen node; boot path not recorded");
        return;
    };
    services.set_property(chosen, "bootpath", &nul_terminated(&candidate.path));
    services.set_property(chosen, "bootargs", &nul_terminated(&candidate.args));
}

/// String properties are stored NUL-terminated, device-tree style.
fn nul_terminated(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len() + 1);
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    bytes
}
