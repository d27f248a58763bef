// descriptor.rs — Kernel descriptor glue generation
//
// Emits the small C source that exposes a kernel's per-workgroup entry
// points under the address-space-qualified calling convention the
// launcher expects, plus the `dummy_argbuffer` function-pointer global
// that pins the entry point so the linker cannot drop it. The text is
// also forwarded to the runtime's descriptor cache for non-compilation
// consumers such as argument packing.

use std::io;

use crate::machine::ASID_GLOBAL;

/// Suffix of the address-space-qualified entry procedure.
pub const ENTRY_SYMBOL_SUFFIX: &str = "_workgroup_argbuffer";

/// Name of the symbol the linker is told to keep (`-k`).
pub const PINNED_SYMBOL: &str = "dummy_argbuffer";

/// Kernel facts the build pipeline needs from the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelMetadata {
    pub name: String,
    /// Address space of pointer arguments; normally the GLOBAL id.
    pub global_as_id: u32,
}

impl KernelMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        KernelMetadata {
            name: name.into(),
            global_as_id: ASID_GLOBAL,
        }
    }

    /// Qualified name of the entry procedure in the compiled program.
    pub fn entry_symbol(&self) -> String {
        format!("{}{}", self.name, ENTRY_SYMBOL_SUFFIX)
    }

    /// Symbol under which the runtime caches kernel metadata (`-k` target
    /// of the first compiler stage).
    pub fn metadata_symbol(&self) -> String {
        format!("_{}_md", self.name)
    }
}

/// Receives the generated descriptor text (and its byte length, implied
/// by the slice) for the runtime's own kernel-metadata cache. External
/// collaborator; the pipeline only requires that storage succeeds.
pub trait DescriptorSink {
    fn store(&mut self, kernel: &KernelMetadata, specialized: bool, content: &[u8])
        -> io::Result<()>;
}

/// Sink for builds with no runtime attached (offline CLI use).
pub struct NullDescriptorSink;

impl DescriptorSink for NullDescriptorSink {
    fn store(
        &mut self,
        _kernel: &KernelMetadata,
        _specialized: bool,
        _content: &[u8],
    ) -> io::Result<()> {
        Ok(())
    }
}

/// Generate the descriptor glue source for one kernel.
pub fn descriptor_source(kernel: &KernelMetadata) -> String {
    let name = &kernel.name;
    let as_id = kernel.global_as_id;
    format!(
        "\n#include <okc_device.h>\n\
         void _okc_kernel_{name}_workgroup(uint8_t* args, uint8_t*, \
         uint32_t, uint32_t, uint32_t);\n\
         void _okc_kernel_{name}_workgroup_fast(uint8_t* args, uint8_t*, \
         uint32_t, uint32_t, uint32_t);\n\
         void {name}{entry}(\
         uint8_t __attribute__((address_space({as_id})))* args, \
         uint8_t __attribute__((address_space({as_id})))* ctx, \
         uint32_t, uint32_t, uint32_t);\n\
         void* {pinned} = {name}{entry};\n",
        name = name,
        entry = ENTRY_SYMBOL_SUFFIX,
        as_id = as_id,
        pinned = PINNED_SYMBOL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glue_declares_qualified_entry_and_pin() {
        let meta = KernelMetadata::new("vecadd");
        let src = descriptor_source(&meta);
        assert!(src.contains("void vecadd_workgroup_argbuffer("));
        assert!(src.contains("__attribute__((address_space(1)))"));
        assert!(src.contains("void* dummy_argbuffer = vecadd_workgroup_argbuffer;"));
        assert!(src.contains("#include <okc_device.h>"));
    }

    #[test]
    fn symbols_follow_kernel_name() {
        let meta = KernelMetadata::new("fft_radix2");
        assert_eq!(meta.entry_symbol(), "fft_radix2_workgroup_argbuffer");
        assert_eq!(meta.metadata_symbol(), "_fft_radix2_md");
    }
}
