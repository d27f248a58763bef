// standalone.rs — Standalone reproduction harness generation
//
// Snapshots the live state of one kernel dispatch — global-memory buffer
// contents, the packed argument buffer and the serialized execution
// context — into a self-contained C program plus a build script and a
// simulator script, so the dispatch can be replayed offline without the
// runtime. The snapshot data goes into statically-initialized arrays to
// keep initialization time out of the measured execution time.
//
// Artifact naming uses an explicit run counter owned by the calling
// session and passed in by reference, so repeated captures within one
// process get distinct names and parallel test runs stay deterministic.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::info;

use crate::cache::CacheEntry;
use crate::config::BuildConfig;
use crate::descriptor::KernelMetadata;
use crate::error::{io_at, BuildError, Result};
use crate::pipeline::tcecc_command_line;

/// Name of the relinked standalone program, relative to the entry dir.
pub const STANDALONE_TPEF: &str = "standalone.tpef";

// ── Run counter ──────────────────────────────────────────────────────────

/// Disambiguates harness artifacts across repeated captures. Created once
/// per session at process start; shared across all kernels that session
/// compiles.
#[derive(Debug, Default)]
pub struct RunCounter {
    next: u32,
}

impl RunCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn take(&mut self) -> u32 {
        let n = self.next;
        self.next += 1;
        n
    }
}

// ── Inputs ───────────────────────────────────────────────────────────────

/// Read access to live device global memory. External collaborator; the
/// generator only pulls the byte ranges the buffer arguments reference.
pub trait DeviceMemory {
    fn read(&self, start_address: u32, out: &mut [u8]) -> io::Result<()>;
}

/// One pointer-typed kernel argument referencing device global memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferArg {
    /// Device start address of the buffer.
    pub start_address: u32,
    /// Buffer length in bytes.
    pub size: u32,
    /// Byte offset inside the packed argument buffer where this buffer's
    /// device pointer is embedded (patched by the generated init routine).
    pub arg_offset: u32,
}

/// Mirror of the runtime's live queue-entry fields the harness replays.
/// Field meaning must stay byte-compatible with the dispatch packet in
/// `okc_device.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDescriptor {
    pub work_dim: u32,
    pub local_size: [u32; 3],
}

/// Everything captured from one live dispatch.
pub struct StandaloneRequest<'a> {
    pub kernel: &'a KernelMetadata,
    pub dispatch: DispatchDescriptor,
    /// Packed argument buffer exactly as enqueued.
    pub arg_buffer: &'a [u8],
    /// Serialized execution-context structure.
    pub context: &'a [u8],
    pub buffer_args: &'a [BufferArg],
    /// The kernel's input bitcode, reused by the build script.
    pub bitcode: &'a std::path::Path,
}

/// Paths of the three generated artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessArtifacts {
    pub source: PathBuf,
    pub build_script: PathBuf,
    pub sim_script: PathBuf,
}

// ── Generator ────────────────────────────────────────────────────────────

/// Capture device state for one dispatch and write the harness artifacts
/// into the kernel's cache entry directory.
pub fn generate_harness(
    config: &BuildConfig,
    entry: &CacheEntry,
    memory: &dyn DeviceMemory,
    req: &StandaloneRequest<'_>,
    counter: &mut RunCounter,
) -> Result<HarnessArtifacts> {
    let run = counter.take();
    let source = entry.dir().join(format!("standalone_{}.c", run));
    let build_script = entry.dir().join(format!("standalone_{}_build", run));
    let sim_script = entry.dir().join(format!("standalone_{}_ttasim", run));

    let text = harness_source(memory, req)?;
    fs::write(&source, text).map_err(io_at(&source))?;

    let inputs = format!("{} {}", source.display(), req.bitcode.display());
    let command = tcecc_command_line(
        config,
        &entry.descriptor_source(),
        &inputs,
        &entry.linked_bitcode(),
        STANDALONE_TPEF,
        req.kernel,
        "-D_STANDALONE_MODE=1",
        true,
    )?;
    fs::write(&build_script, format!("{}\n", command)).map_err(io_at(&build_script))?;

    let sim = sim_script_text(config, req);
    fs::write(&sim_script, sim).map_err(io_at(&sim_script))?;

    info!(
        "standalone harness {} for kernel {} written to {}",
        run,
        req.kernel.name,
        entry.dir().display()
    );

    Ok(HarnessArtifacts {
        source,
        build_script,
        sim_script,
    })
}

// ── Source emission ──────────────────────────────────────────────────────

fn harness_source(memory: &dyn DeviceMemory, req: &StandaloneRequest<'_>) -> Result<String> {
    let mut out = String::with_capacity(4096);
    let name = &req.kernel.name;
    let as_id = req.kernel.global_as_id;

    out.push_str("#include <okc_device.h>\n\n");
    out.push_str("#undef ALIGN4\n");
    out.push_str("#define ALIGN4 __attribute__ ((aligned (4)))\n\n");

    // One statically-initialized array per global buffer argument,
    // content copied out of live device memory.
    for buf in req.buffer_args {
        let mut bytes = vec![0u8; buf.size as usize];
        memory.read(buf.start_address, &mut bytes).map_err(|e| {
            BuildError::config(format!(
                "can't snapshot device memory at {:#x} ({} bytes): {}",
                buf.start_address, buf.size, e
            ))
        })?;
        emit_byte_array(
            &mut out,
            "__global__",
            &format!("buffer_{:x}", buf.start_address),
            &bytes,
        );
    }

    // Scalars (plus the embedded buffer addresses, patched below) live in
    // one array; the execution context in another.
    emit_byte_array(&mut out, "__global__", "arg_buffer", req.arg_buffer);
    emit_byte_array(&mut out, "__global__", "ctx_buffer", req.context);

    out.push_str("__global__ int __completion_signal = 0;\n\n");

    let _ = writeln!(
        out,
        "void {name}_workgroup_argbuffer(\
         uint8_t __attribute__((address_space({as_id})))* args, \
         uint8_t __attribute__((address_space({as_id})))* ctx, \
         uint32_t, uint32_t, uint32_t);",
    );
    out.push_str("__cq__ ALIGN4 struct AQLDispatchPacket standalone_packet;\n\n");

    out.push_str("__attribute__((noinline))\n");
    out.push_str("void initialize_kernel_launch() {\n");

    // Patch the embedded device pointers to the generated arrays.
    out.push_str("\t__global__ uint32_t* global_buffer_addr = 0;\n");
    for buf in req.buffer_args {
        let _ = writeln!(
            out,
            "\tglobal_buffer_addr = (__global__ uint32_t*)(arg_buffer + {});",
            buf.arg_offset
        );
        let _ = writeln!(
            out,
            "\t*global_buffer_addr = (uint32_t)buffer_{:x};",
            buf.start_address
        );
    }

    out.push_str("\t__cq__ uint32_t* aql_read_iter = (__cq__ uint32_t*) (QUEUE_START + OKC_CQ_READ);\n");
    out.push_str("\t*aql_read_iter = 0;\n");

    out.push_str("\tstandalone_packet.header = (uint32_t)(1 << AQL_PACKET_KERNEL_DISPATCH);\n");
    let _ = writeln!(
        out,
        "\tstandalone_packet.dimensions = (uint32_t){};",
        req.dispatch.work_dim
    );
    let _ = writeln!(
        out,
        "\tstandalone_packet.workgroup_size_x = (uint32_t){};",
        req.dispatch.local_size[0]
    );
    let _ = writeln!(
        out,
        "\tstandalone_packet.workgroup_size_y = (uint32_t){};",
        req.dispatch.local_size[1]
    );
    let _ = writeln!(
        out,
        "\tstandalone_packet.workgroup_size_z = (uint32_t){};",
        req.dispatch.local_size[2]
    );
    out.push_str("\tstandalone_packet.reserved1 = (uint32_t)ctx_buffer;\n");
    out.push_str("\tstandalone_packet.kernarg_address_low = (uint32_t)arg_buffer;\n");
    let _ = writeln!(
        out,
        "\tstandalone_packet.kernel_object_low = (uint32_t)&{name}_workgroup_argbuffer;",
    );
    out.push_str("\tstandalone_packet.cmd_metadata_low = (uint32_t)&__completion_signal;\n");
    out.push_str("}\n");

    Ok(out)
}

fn emit_byte_array(out: &mut String, qualifier: &str, name: &str, bytes: &[u8]) {
    let _ = write!(out, "{} ALIGN4 char {}[] = {{", qualifier, name);
    for (i, b) in bytes.iter().enumerate() {
        if i % 16 == 0 {
            out.push_str("\n\t");
        }
        let _ = write!(out, "0x{:02x}", b);
        if i + 1 < bytes.len() {
            out.push_str(", ");
        }
    }
    out.push_str("\n};\n\n");
}

fn sim_script_text(config: &BuildConfig, req: &StandaloneRequest<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "mach {};", config.machine_file().display());
    let _ = writeln!(out, "prog {};", STANDALONE_TPEF);
    let _ = writeln!(out, "run;");
    // Dump each snapshot buffer as words for verification.
    for buf in req.buffer_args {
        let _ = writeln!(
            out,
            "x /u w /n {} buffer_{:x};",
            buf.size / 4,
            buf.start_address
        );
    }
    out
}
