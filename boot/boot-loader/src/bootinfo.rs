//! # CHRP Bootinfo Script Extraction
//!
//! Some boot media carry no directly loadable image but a small tag-delimited
//! text descriptor naming a boot script, e.g.:
//!
//! ```text
//! <chrp-boot>
//! <description>Debian/GNU Linux Installation</description>
//! <boot-script>boot &device;:\install\yaboot</boot-script>
//! </chrp-boot>
//! ```
//!
//! The descriptor lives in a companion file next to the device path. The
//! script body is captured between `<boot-script>` and `</boot-script>`, the
//! `&device;` macro is replaced with the real device path, and the result is
//! handed to the firmware's command interpreter. Every failure here is soft:
//! "no structured boot script on this medium".

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use boot_services::{Device, DeviceIo, ScriptEvaluator};
use log::{debug, warn};

/// Companion-file suffix appended to the device path.
pub const BOOTINFO_SUFFIX: &str = ",ppc\\bootinfo.txt";

/// Case-insensitive sentinel that must open the descriptor.
const SENTINEL: &[u8; 11] = b"<chrp-boot>";

/// Capacity of the tag-name and script buffers. Bytes beyond this are
/// dropped, never written out of bounds; the loss is surfaced via
/// [`BootScript::truncated`].
const CAPACITY: usize = 256;

/// Macro token replaced by the device path.
const DEVICE_MACRO: &str = "&device;";

/// A fixed-capacity byte accumulator with an explicit overflow marker.
struct BoundedBuf {
    bytes: Vec<u8>,
    truncated: bool,
}

impl BoundedBuf {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            truncated: false,
        }
    }

    fn push(&mut self, byte: u8) {
        if self.bytes.len() < CAPACITY {
            self.bytes.push(byte);
        } else {
            self.truncated = true;
        }
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.truncated = false;
    }
}

/// A boot script recovered from a descriptor, macro already substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootScript {
    pub text: String,
    /// The descriptor's script body exceeded the buffer capacity and lost
    /// its tail.
    pub truncated: bool,
}

/// Extract the boot script for `device_path`, if its medium carries a
/// descriptor. `None` means "not applicable": missing companion file, wrong
/// sentinel, or a descriptor that ends before `</boot-script>`.
pub fn extract_script<IO: DeviceIo>(io: &mut IO, device_path: &str) -> Option<BootScript> {
    let path = format!("{device_path}{BOOTINFO_SUFFIX}");
    debug!("bootinfo: trying {path}");
    let Ok(mut dev) = io.open(&path) else {
        debug!("bootinfo: cannot open {path}");
        return None;
    };

    let mut sentinel = [0u8; SENTINEL.len()];
    if dev.read_exact(&mut sentinel).is_err() || !sentinel.eq_ignore_ascii_case(SENTINEL) {
        return None;
    }

    let mut tag = BoundedBuf::new();
    let mut in_tag = false;
    let mut capturing = false;
    let mut script = BoundedBuf::new();
    loop {
        let mut byte = [0u8; 1];
        match dev.read(&mut byte) {
            Ok(1) => {}
            // EOF or read failure before the closing tag: not applicable.
            _ => return None,
        }
        match byte[0] {
            b'<' => {
                in_tag = true;
                tag.clear();
            }
            b'>' => {
                in_tag = false;
                if tag.bytes.eq_ignore_ascii_case(b"boot-script") {
                    capturing = true;
                } else if tag.bytes.eq_ignore_ascii_case(b"/boot-script") {
                    break;
                }
            }
            b => {
                if in_tag {
                    tag.push(b);
                } else if capturing {
                    script.push(b);
                }
            }
        }
    }

    if script.truncated {
        warn!("bootinfo: script body exceeded {CAPACITY} bytes; tail dropped");
    }
    let text = String::from_utf8_lossy(&script.bytes);
    Some(BootScript {
        text: substitute_device(&text, device_path),
        truncated: script.truncated,
    })
}

/// Replace `&device;` and everything up to (and including) the following `:`
/// with the device path. The path is expected to supply its own delimiter in
/// canonical form, so the dropped span is not re-inserted. A script without
/// the token, or without the delimiter, passes through unchanged.
fn substitute_device(script: &str, device_path: &str) -> String {
    let Some(start) = script.find(DEVICE_MACRO) else {
        return script.to_string();
    };
    let after = &script[start + DEVICE_MACRO.len()..];
    let Some(colon) = after.find(':') else {
        return script.to_string();
    };

    let mut fixed = String::with_capacity(script.len() + device_path.len());
    fixed.push_str(&script[..start]);
    fixed.push_str(device_path);
    fixed.push_str(&after[colon + 1..]);
    fixed
}

/// Extract and immediately evaluate the boot script for `device_path`.
/// Returns whether a script was handed to the evaluator. Evaluation itself
/// may never return control: a successful boot inside the script re-enters
/// the engine.
pub fn run_bootinfo<P>(services: &mut P, device_path: &str) -> bool
where
    P: DeviceIo + ScriptEvaluator,
{
    let Some(script) = extract_script(services, device_path) else {
        return false;
    };
    debug!("bootinfo: evaluating \"{}\"", script.text);
    services.evaluate(&script.text);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use boot_services::{DeviceUnavailable, RamDevice};

    /// A device namespace holding exactly one file.
    struct OneFile {
        path: String,
        content: Vec<u8>,
    }

    impl OneFile {
        fn descriptor(device_path: &str, content: &str) -> Self {
            Self {
                path: format!("{device_path}{BOOTINFO_SUFFIX}"),
                content: content.as_bytes().to_vec(),
            }
        }
    }

    impl DeviceIo for OneFile {
        type Handle = RamDevice;

        fn open(&mut self, path: &str) -> Result<RamDevice, DeviceUnavailable> {
            if path == self.path {
                Ok(RamDevice::new(self.content.clone()))
            } else {
                Err(DeviceUnavailable)
            }
        }
    }

    #[test]
    fn substitutes_the_device_macro() {
        let mut io = OneFile::descriptor(
            "cd:",
            "<chrp-boot><boot-script>boot &device;:\\install\\yaboot</boot-script>",
        );
        let script = extract_script(&mut io, "cd:").unwrap();
        assert_eq!(script.text, "boot cd:\\install\\yaboot");
        assert!(!script.truncated);
    }

    #[test]
    fn sentinel_comparison_is_case_insensitive() {
        let mut io = OneFile::descriptor("hd:", "<CHRP-BOOT><Boot-Script>go</BOOT-SCRIPT>");
        let script = extract_script(&mut io, "hd:").unwrap();
        assert_eq!(script.text, "go");
    }

    #[test]
    fn wrong_sentinel_is_not_applicable() {
        let mut io = OneFile::descriptor("hd:", "<html><boot-script>go</boot-script>");
        assert!(extract_script(&mut io, "hd:").is_none());
    }

    #[test]
    fn missing_companion_file_is_not_applicable() {
        let mut io = OneFile::descriptor("hd:", "<chrp-boot><boot-script>go</boot-script>");
        assert!(extract_script(&mut io, "cd:").is_none());
    }

    #[test]
    fn unterminated_script_is_not_applicable() {
        let mut io = OneFile::descriptor("hd:", "<chrp-boot><boot-script>go go go");
        assert!(extract_script(&mut io, "hd:").is_none());
    }

    #[test]
    fn extraction_is_idempotent() {
        let mut io = OneFile::descriptor(
            "hd:2",
            "<chrp-boot><boot-script>boot &device;:\\yaboot</boot-script>",
        );
        let first = extract_script(&mut io, "hd:2").unwrap();
        let second = extract_script(&mut io, "hd:2").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn oversized_script_is_truncated_not_rejected() {
        let body = "x".repeat(CAPACITY + 50);
        let mut io = OneFile::descriptor(
            "hd:",
            &format!("<chrp-boot><boot-script>{body}</boot-script>"),
        );
        let script = extract_script(&mut io, "hd:").unwrap();
        assert!(script.truncated);
        assert_eq!(script.text.len(), CAPACITY);
    }

    #[test]
    fn embedded_tags_are_not_captured_into_the_script() {
        let mut io = OneFile::descriptor(
            "hd:",
            "<chrp-boot><boot-script>run<icon size=64,64>now</boot-script>",
        );
        let script = extract_script(&mut io, "hd:").unwrap();
        assert_eq!(script.text, "runnow");
    }

    #[test]
    fn script_without_macro_passes_through() {
        assert_eq!(substitute_device("boot hd:\\yaboot", "cd:"), "boot hd:\\yaboot");
    }

    #[test]
    fn macro_without_delimiter_passes_through() {
        assert_eq!(substitute_device("boot &device; now", "cd:"), "boot &device; now");
    }
}
