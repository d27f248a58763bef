// layout.rs — Address layout resolution
//
// Derives the linker/preprocessor flags the external compiler needs from
// the address-space topology, the physical memory layout and the
// addressing mode. The numeric rules mirror the device's launcher ABI;
// in particular the private-segment base gains the command-queue size
// whenever command-queue memory is separate from global memory, even
// though the two decisions look independent. Downstream flag
// compatibility depends on that coupling.
//
// Preconditions: MachineDescription parsed.
// Postconditions: a LayoutFlags value whose optional members follow the
//   emission rules documented on each field.
// Failure modes: Config error when no GLOBAL or PRIVATE space exists, when
//   the command-queue region is smaller than one packet, or when its base
//   precedes the data base under relative addressing.
// Side effects: none.

use std::fmt::Write as _;

use crate::error::{BuildError, Result};
use crate::machine::MachineDescription;

/// Command-queue packet size in bytes (AQL dispatch packet).
pub const AQL_PACKET_LENGTH: u32 = 64;

/// Default size of the carved-out private-memory segment when no override
/// is configured.
pub const DEFAULT_PRIVATE_MEM_SIZE: u32 = 2048;

/// Placeholder expanded by the standalone build script's environment,
/// letting one generated harness be relinked at different global offsets.
pub const STANDALONE_GLOBAL_OFFSET_VAR: &str = "${STANDALONE_GLOBAL_AS_OFFSET}";

// ── Inputs ───────────────────────────────────────────────────────────────

/// Physical layout of the device's data and command-queue memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegions {
    pub data_size: u32,
    pub data_base: u32,
    pub cq_size: u32,
    pub cq_base: u32,
}

/// Whether device pointers are region-relative or physical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    Relative,
    Absolute,
}

// ── Output ───────────────────────────────────────────────────────────────

/// Resolved flag set. Optional members are emitted only under the
/// conditions noted on each field; `None` means the flag is omitted from
/// the command line entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutFlags {
    /// Always emitted: command-queue slot count, minus one for the
    /// sentinel slot.
    pub queue_length: u32,
    /// Initial stack pointer. Emitted only when private memory is
    /// separate from global memory.
    pub init_sp: Option<u32>,
    /// (private address-space name, segment base). Emitted together with
    /// `init_sp`.
    pub private_data_start: Option<(String, u32)>,
    /// Global address-space name for the standalone data-start override.
    /// Emitted only for standalone builds with absolute addressing; the
    /// offset itself is a build-script variable.
    pub standalone_data_start: Option<String>,
    /// Command-queue base address. Emitted only when command-queue memory
    /// is separate from global memory.
    pub queue_start: Option<u32>,
}

impl LayoutFlags {
    /// Render the flag set in the spelling the external compiler expects.
    pub fn to_compiler_args(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "-DQUEUE_LENGTH={} ", self.queue_length);
        if let (Some(sp), Some((name, start))) = (self.init_sp, &self.private_data_start) {
            let _ = write!(out, "--init-sp={} --data-start={},{}", sp, name, start);
        }
        if let Some(global_name) = &self.standalone_data_start {
            // Appends to the data-start option when one is already open.
            if self.private_data_start.is_some() {
                let _ = write!(out, ",{},{}", global_name, STANDALONE_GLOBAL_OFFSET_VAR);
            } else {
                let _ = write!(
                    out,
                    " --data-start={},{}",
                    global_name, STANDALONE_GLOBAL_OFFSET_VAR
                );
            }
        }
        if let Some(qs) = self.queue_start {
            let _ = write!(out, " -DQUEUE_START={} ", qs);
        }
        out
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────

/// Compute the flag set for one build.
///
/// `private_mem_budget` is the configurable size reserved for automatic
/// allocations; it is skipped entirely in standalone mode, since a
/// standalone build cannot isolate automatic allocations from the rest of
/// the address space.
pub fn resolve_layout(
    machine: &MachineDescription,
    mem: &MemoryRegions,
    addressing: Addressing,
    standalone: bool,
    private_mem_budget: u32,
) -> Result<LayoutFlags> {
    if mem.cq_size < AQL_PACKET_LENGTH {
        return Err(BuildError::config(format!(
            "command-queue size {:#x} is smaller than one packet ({} bytes)",
            mem.cq_size, AQL_PACKET_LENGTH
        )));
    }
    if addressing == Addressing::Relative && mem.cq_base < mem.data_base {
        return Err(BuildError::config(format!(
            "command-queue base {:#x} precedes the data base {:#x}",
            mem.cq_base, mem.data_base
        )));
    }

    let global = machine
        .global_space()
        .ok_or_else(|| BuildError::config("couldn't find the global address space"))?;
    let private = machine
        .private_space()
        .ok_or_else(|| BuildError::config("couldn't find the private address space"))?;

    let queue_length = mem.cq_size / AQL_PACKET_LENGTH - 1;

    let mut init_sp = None;
    let mut private_data_start = None;
    if machine.separate_private_mem() {
        let mut data_start = mem.data_size;
        if machine.separate_cq_mem() {
            data_start += mem.cq_size;
        }
        // The stack pointer starts at the top of the private segment; the
        // budget term vanishes in standalone mode.
        let mut sp = data_start;
        if !standalone {
            sp += private_mem_budget;
        }
        if addressing == Addressing::Absolute {
            data_start += mem.data_base;
            sp += mem.data_base;
        }
        init_sp = Some(sp);
        private_data_start = Some((private.name.clone(), data_start));
    }

    let standalone_data_start = if standalone && addressing == Addressing::Absolute {
        Some(global.name.clone())
    } else {
        None
    };

    let queue_start = if machine.separate_cq_mem() {
        let base = match addressing {
            Addressing::Relative => mem.cq_base - mem.data_base,
            Addressing::Absolute => mem.cq_base,
        };
        Some(base)
    } else {
        None
    };

    Ok(LayoutFlags {
        queue_length,
        init_sp,
        private_data_start,
        standalone_data_start,
        queue_start,
    })
}
