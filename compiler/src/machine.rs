// machine.rs — Machine description (ADF) reader
//
// Extracts endianness, core count and the address-space table from an
// architecture description file by scanning at the text level. No XML
// parsing — the markers okc needs have fixed spellings, so simple string
// operations are enough and keep us byte-compatible with files the full
// toolchain accepts.

use std::fs;
use std::path::Path;

use crate::error::{BuildError, Result};

// ── Address-space numerical ids ──────────────────────────────────────────

/// Private (stack/automatic) memory role.
pub const ASID_PRIVATE: u32 = 0;
/// Global (buffer) memory role.
pub const ASID_GLOBAL: u32 = 1;
/// Command-queue memory role.
pub const ASID_COMMAND_QUEUE: u32 = 5;

// ── Data types ───────────────────────────────────────────────────────────

/// One named address space and the numerical role ids attached to it.
/// A single space may carry several ids ("merged" regions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpace {
    pub name: String,
    pub ids: Vec<u32>,
}

impl AddressSpace {
    pub fn has_id(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }
}

/// The subset of the architecture description the build pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineDescription {
    pub little_endian: bool,
    pub core_count: u32,
    pub address_spaces: Vec<AddressSpace>,
}

impl MachineDescription {
    /// Read and scan an ADF file.
    ///
    /// Fails with a `Config` error if the file is missing, empty or
    /// unreadable, or if a declared core count is zero.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read(path).map_err(|e| {
            BuildError::config(format!("can't read ADF file {}: {}", path.display(), e))
        })?;
        if raw.is_empty() {
            return Err(BuildError::config(format!(
                "ADF file {} is empty",
                path.display()
            )));
        }
        Self::from_adf_text(&String::from_utf8_lossy(&raw))
    }

    /// Scan ADF text for the endianness marker, the core-count attribute
    /// and the address-space table.
    pub fn from_adf_text(text: &str) -> Result<Self> {
        let little_endian = text.contains("<little-endian");
        let core_count = parse_core_count(text)?;
        let address_spaces = parse_address_spaces(text)?;
        Ok(MachineDescription {
            little_endian,
            core_count,
            address_spaces,
        })
    }

    /// LLVM target triplet matching the machine's endianness.
    pub fn target_triplet(&self) -> &'static str {
        if self.little_endian {
            "tcele-tut-llvm"
        } else {
            "tce-tut-llvm"
        }
    }

    /// The address space carrying the GLOBAL id, if any. Exactly one is
    /// expected; the first match wins.
    pub fn global_space(&self) -> Option<&AddressSpace> {
        self.address_spaces.iter().find(|a| a.has_id(ASID_GLOBAL))
    }

    /// The address space carrying the PRIVATE id, if any.
    pub fn private_space(&self) -> Option<&AddressSpace> {
        self.address_spaces.iter().find(|a| a.has_id(ASID_PRIVATE))
    }

    /// True when private memory lives in its own region rather than being
    /// merged into the global one. Derived from the global space's id set,
    /// never configured directly.
    pub fn separate_private_mem(&self) -> bool {
        self.global_space()
            .map(|g| !g.has_id(ASID_PRIVATE))
            .unwrap_or(true)
    }

    /// True when command-queue memory is not merged into the global region.
    pub fn separate_cq_mem(&self) -> bool {
        self.global_space()
            .map(|g| !g.has_id(ASID_COMMAND_QUEUE))
            .unwrap_or(true)
    }
}

// ── Scanning helpers ─────────────────────────────────────────────────────

/// Parse the optional `core-count` attribute of the `<adf>` root tag.
/// Absent attribute defaults to 1; a declared count of 0 is a fatal
/// configuration error, not a silent default.
fn parse_core_count(text: &str) -> Result<u32> {
    let Some(tag_start) = text.find("<adf") else {
        return Ok(1);
    };
    let tag = match text[tag_start..].find('>') {
        Some(end) => &text[tag_start..tag_start + end],
        None => &text[tag_start..],
    };
    let Some(attr) = tag.find("core-count=\"") else {
        return Ok(1);
    };
    let rest = &tag[attr + "core-count=\"".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let cores: u32 = digits
        .parse()
        .map_err(|_| BuildError::config(format!("bad core-count attribute: {:?}", rest)))?;
    if cores == 0 {
        return Err(BuildError::config("core-count must be at least 1"));
    }
    Ok(cores)
}

/// Collect every `<address-space name="...">` block and the
/// `<numerical-id>` elements inside it.
fn parse_address_spaces(text: &str) -> Result<Vec<AddressSpace>> {
    let mut spaces = Vec::new();
    let mut cursor = 0;
    while let Some(rel) = text[cursor..].find("<address-space") {
        let open = cursor + rel;
        let body_end = text[open..]
            .find("</address-space>")
            .map(|e| open + e)
            .unwrap_or(text.len());
        let block = &text[open..body_end];

        let name = attribute_value(block, "name=\"").ok_or_else(|| {
            BuildError::config("address-space element without a name attribute")
        })?;

        let mut ids = Vec::new();
        let mut id_cursor = 0;
        while let Some(idrel) = block[id_cursor..].find("<numerical-id>") {
            let start = id_cursor + idrel + "<numerical-id>".len();
            let end = block[start..]
                .find("</numerical-id>")
                .map(|e| start + e)
                .ok_or_else(|| {
                    BuildError::config(format!("unterminated numerical-id in space {}", name))
                })?;
            let id: u32 = block[start..end].trim().parse().map_err(|_| {
                BuildError::config(format!(
                    "bad numerical-id {:?} in space {}",
                    &block[start..end],
                    name
                ))
            })?;
            ids.push(id);
            id_cursor = end;
        }

        spaces.push(AddressSpace { name, ids });
        cursor = body_end;
    }
    Ok(spaces)
}

fn attribute_value(block: &str, marker: &str) -> Option<String> {
    let start = block.find(marker)? + marker.len();
    let end = block[start..].find('"')? + start;
    Some(block[start..end].to_string())
}
