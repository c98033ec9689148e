//! Locate an attached MegaLeaf controller.
//!
//! udev publishes a stable symlink for every USB serial device under
//! `/dev/serial/by-id/`. The controller's entry starts with [`DEVICE_NAME_PREFIX`]
//! followed by its serial number.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

/// Directory of stable serial-device symlinks.
pub const BY_ID_DIR: &str = "/dev/serial/by-id";

/// Name prefix of a MegaLeaf controller's entry in [`BY_ID_DIR`].
pub const DEVICE_NAME_PREFIX: &str = "usb-cerber-os_MegaLeaf_CDC_Controller_";

/// Path of the first attached controller, if any.
#[must_use]
pub fn find_controller() -> Option<PathBuf> {
    find_controller_in(Path::new(BY_ID_DIR))
}

/// Path of the first controller entry in `dir`, if any.
///
/// Entries are compared by name so the choice is stable when several controllers are
/// attached. A missing or unreadable directory finds nothing.
#[must_use]
pub fn find_controller_in(dir: &Path) -> Option<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("cannot list {}: {err}", dir.display());
            return None;
        }
    };

    let found = entries
        .filter_map(core::result::Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(DEVICE_NAME_PREFIX))
        })
        .map(|entry| entry.path())
        .min();
    debug!("controller discovery in {}: {found:?}", dir.display());
    found
}
