// config.rs — Per-device build configuration and process-wide options
//
// BuildConfig is created once per device at initialization and owns the
// resolved machine description, the device memory layout and the mutex
// that serializes the compile pipeline for that device. Options come from
// the environment, mirroring the runtime's configuration switches.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{BuildError, Result};
use crate::key::BuildKey;
use crate::layout::{Addressing, MemoryRegions, DEFAULT_PRIVATE_MEM_SIZE};
use crate::machine::MachineDescription;

// ── Process-wide options ─────────────────────────────────────────────────

/// Knobs read once from the environment.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Use in-tree launcher sources and include paths instead of the
    /// installed data directory (`OKC_BUILDING`).
    pub in_tree_build: bool,
    /// Size of the carved-out private-memory segment
    /// (`OKC_PRIVATE_MEM_SIZE`).
    pub private_mem_budget: u32,
    /// User-supplied extra compiler flags (`OKC_EXTRA_FLAGS`).
    pub extra_flags: String,
    /// Whether the extra flags participate in the build key
    /// (`OKC_EXTRA_FLAGS_IN_KEY`). On by default so flag changes
    /// invalidate cached binaries.
    pub extra_flags_in_key: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            in_tree_build: false,
            private_mem_budget: DEFAULT_PRIVATE_MEM_SIZE,
            extra_flags: String::new(),
            extra_flags_in_key: true,
        }
    }
}

impl BuildOptions {
    pub fn from_env() -> Self {
        let mut opts = BuildOptions::default();
        opts.in_tree_build = env_bool("OKC_BUILDING", false);
        if let Ok(v) = env::var("OKC_PRIVATE_MEM_SIZE") {
            if let Ok(n) = v.parse() {
                opts.private_mem_budget = n;
            }
        }
        if let Ok(v) = env::var("OKC_EXTRA_FLAGS") {
            opts.extra_flags = v;
        }
        opts.extra_flags_in_key = env_bool("OKC_EXTRA_FLAGS_IN_KEY", true);
        opts
    }

    /// The extra-flags string as it participates in the build key, or
    /// `None` when excluded.
    pub fn keyed_extra_flags(&self) -> Option<&str> {
        if self.extra_flags_in_key && !self.extra_flags.is_empty() {
            Some(&self.extra_flags)
        } else {
            None
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => !matches!(v.as_str(), "" | "0" | "false" | "no"),
        Err(_) => default,
    }
}

// ── Per-device configuration ─────────────────────────────────────────────

/// Everything the compile pipeline needs to know about one device.
///
/// The compile mutex serializes toolchain invocations against this
/// device; the external toolchain is not safely reentrant on its shared
/// machine-local cache state. Different devices compile independently.
#[derive(Debug)]
pub struct BuildConfig {
    machine_file: PathBuf,
    machine: MachineDescription,
    regions: MemoryRegions,
    addressing: Addressing,
    options: BuildOptions,
    compile_lock: Mutex<()>,
}

impl BuildConfig {
    /// Resolve the machine-description path to an absolute one (the image
    /// generator runs in the output directory, so a relative ADF path
    /// would break), read it, and capture the device memory layout.
    pub fn new(
        machine_file: impl AsRef<Path>,
        regions: MemoryRegions,
        addressing: Addressing,
        options: BuildOptions,
    ) -> Result<Self> {
        let machine_file = fs::canonicalize(machine_file.as_ref()).map_err(|e| {
            BuildError::config(format!(
                "can't find ADF file {}: {}",
                machine_file.as_ref().display(),
                e
            ))
        })?;
        let machine = MachineDescription::from_file(&machine_file)?;
        log::info!(
            "multicore: {} cores: {}",
            machine.core_count > 1,
            machine.core_count
        );
        Ok(BuildConfig {
            machine_file,
            machine,
            regions,
            addressing,
            options,
            compile_lock: Mutex::new(()),
        })
    }

    pub fn machine_file(&self) -> &Path {
        &self.machine_file
    }

    pub fn machine(&self) -> &MachineDescription {
        &self.machine
    }

    pub fn regions(&self) -> &MemoryRegions {
        &self.regions
    }

    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn core_count(&self) -> u32 {
        self.machine.core_count
    }

    /// Compute the device's build key from the current ADF bytes.
    pub fn build_key(&self) -> Result<BuildKey> {
        let adf = fs::read(&self.machine_file).map_err(|e| {
            BuildError::config(format!(
                "can't read ADF file {}: {}",
                self.machine_file.display(),
                e
            ))
        })?;
        Ok(BuildKey::compute(
            self.machine.target_triplet(),
            &adf,
            self.options.keyed_extra_flags(),
        ))
    }

    /// Acquire the per-device compile lock. A poisoned lock only means a
    /// previous compile panicked; artifacts are idempotent, so the lock is
    /// still usable.
    pub(crate) fn lock_compile(&self) -> MutexGuard<'_, ()> {
        self.compile_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
