// key.rs — Build key hashing
//
// A build key fingerprints everything that can change the bits of a
// compiled kernel image: the binary-format version, the target triplet,
// the raw machine-description bytes and (optionally) user-supplied extra
// compiler flags. Identical inputs must hash identically across process
// restarts; bumping BINARY_FORMAT_VERSION force-invalidates every
// previously built binary after an incompatible toolchain or layout
// change.

use std::fmt;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};

/// Bumped whenever a change in okc or the device image layout makes
/// previously built binaries incompatible (e.g. renamed image files).
pub const BINARY_FORMAT_VERSION: &str = "2";

/// A stable, printable fingerprint of one build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildKey([u8; 32]);

impl BuildKey {
    /// Hash the build inputs. `extra_flags` participates only when the
    /// caller decided it should (see `BuildOptions::extra_flags_in_key`).
    pub fn compute(
        target_triplet: &str,
        machine_description: &[u8],
        extra_flags: Option<&str>,
    ) -> BuildKey {
        let mut hasher = Sha256::new();
        hasher.update(BINARY_FORMAT_VERSION.as_bytes());
        hasher.update(target_triplet.as_bytes());
        hasher.update(machine_description);
        if let Some(flags) = extra_flags {
            hasher.update(flags.as_bytes());
        }
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        BuildKey(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering (64 characters), safe for file names.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            let _ = write!(s, "{:02x}", b);
        }
        s
    }
}

impl fmt::Display for BuildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Fingerprint of a raw byte blob, used for program identity in the cache
/// directory layout.
pub fn content_key(bytes: &[u8]) -> BuildKey {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    BuildKey(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_identical_keys() {
        let a = BuildKey::compute("tcele-tut-llvm", b"<adf></adf>", Some("-O2"));
        let b = BuildKey::compute("tcele-tut-llvm", b"<adf></adf>", Some("-O2"));
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), b.to_hex());
    }

    #[test]
    fn any_input_difference_changes_the_key() {
        let base = BuildKey::compute("tcele-tut-llvm", b"<adf></adf>", None);
        assert_ne!(
            base,
            BuildKey::compute("tce-tut-llvm", b"<adf></adf>", None)
        );
        assert_ne!(
            base,
            BuildKey::compute("tcele-tut-llvm", b"<adf version=\"2\"></adf>", None)
        );
        assert_ne!(
            base,
            BuildKey::compute("tcele-tut-llvm", b"<adf></adf>", Some(""))
        );
    }

    #[test]
    fn hex_is_printable_and_fixed_length() {
        let key = BuildKey::compute("tce-tut-llvm", b"x", None);
        let hex = key.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
