// pipeline.rs — Multi-stage external build orchestration
//
// Turns a kernel's bitcode into a binary image runnable on the target
// machine: descriptor glue → two-stage compile/link → entry-address
// lookup → instruction/data image generation, with a best-effort
// disassembly dump in between. Every stage is gated on "output artifact
// already exists", so a warm cache short-circuits the whole pipeline.
//
// Preconditions: BuildConfig resolved; input bitcode present on disk.
// Postconditions: the cache entry holds the image, target object and
//   entry metadata, or an error is returned and the entry stays partial
//   (partial entries are re-driven to completion on the next call).
// Failure modes: nonzero tool exit (fatal except for the disassembler),
//   missing artifacts, entry symbol not found.
// Side effects: subprocess invocations, cache directory writes.
//
// Stages after descriptor emission run while holding the per-device
// compile mutex; see config.rs for the rationale.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::cache::{CacheStore, KernelEntryMetadata, TARGET_OBJECT};
use crate::config::BuildConfig;
use crate::descriptor::{descriptor_source, DescriptorSink, KernelMetadata, PINNED_SYMBOL};
use crate::error::{io_at, BuildError, Result};
use crate::exec::{run_checked, ToolRunner};
use crate::key::content_key;
use crate::layout::{resolve_layout, Addressing};
use crate::loader;

// ── Toolchain and launcher locations ─────────────────────────────────────

const COMPILER: &str = "tcecc";
const DISASSEMBLER: &str = "tcedisasm";
const IMAGE_GENERATOR: &str = "generatebits";
const OPGEN: &str = "tceopgen";
const EXTGEN: &str = "tceoclextgen";

/// Launcher sources shipped with okc; the in-tree copy is used while
/// developing (`OKC_BUILDING`), the installed copy otherwise.
const IN_TREE_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../runtime/device");
const INSTALL_DATA_DIR: &str = "/usr/share/okc/device";

// ── Requests and results ─────────────────────────────────────────────────

/// One kernel build. `bitcode` is the already-lowered kernel module
/// produced by the runtime's IR stage.
pub struct CompileRequest<'a> {
    pub kernel: &'a KernelMetadata,
    pub bitcode: &'a Path,
    pub program_key: &'a str,
    pub device_index: u32,
    pub specialized: bool,
    /// Additional compiler switches, typically the include switch from
    /// `prepare_vendor_extensions`. Empty when the machine has no custom
    /// operations.
    pub extra_switches: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledKernel {
    pub entry_address: u32,
    pub cache_dir: PathBuf,
    pub image: PathBuf,
}

// ── Pipeline ─────────────────────────────────────────────────────────────

pub struct CompilePipeline<'a> {
    config: &'a BuildConfig,
    cache: &'a CacheStore,
    runner: &'a dyn ToolRunner,
}

impl<'a> CompilePipeline<'a> {
    pub fn new(
        config: &'a BuildConfig,
        cache: &'a CacheStore,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        CompilePipeline {
            config,
            cache,
            runner,
        }
    }

    /// Build one kernel, or return the cached result.
    pub fn compile(
        &self,
        req: &CompileRequest<'_>,
        sink: &mut dyn DescriptorSink,
    ) -> Result<CompiledKernel> {
        let entry = self.cache.entry(
            req.program_key,
            req.device_index,
            &req.kernel.name,
            req.specialized,
        );
        entry.ensure_dir()?;
        let build_key = self.config.build_key()?;

        // Best-effort hit check before taking the compile lock. The
        // authoritative per-stage checks run again inside it; see
        // cache.rs for why the cross-process variant of this race is
        // benign.
        if entry.is_complete() {
            debug!("cache hit for kernel {}", req.kernel.name);
            let meta = KernelEntryMetadata::load(&entry.entry_metadata())?;
            return Ok(CompiledKernel {
                entry_address: meta.address,
                cache_dir: entry.dir().to_owned(),
                image: entry.binary_image(),
            });
        }

        let _guard = self.config.lock_compile();

        let target_object = entry.target_object();
        if !target_object.exists() {
            // Stage 1: descriptor glue, written next to the variant dirs
            // and handed to the runtime's metadata cache.
            let content = descriptor_source(req.kernel);
            let desc_path = entry.descriptor_source();
            fs::write(&desc_path, &content).map_err(io_at(&desc_path))?;
            sink.store(req.kernel, req.specialized, content.as_bytes())
                .map_err(|e| BuildError::io(&desc_path, e))?;

            // Stage 2: link launcher + glue + kernel bitcode into one
            // optimized module (captured on disk for the standalone
            // harness), then assemble against the machine description.
            let input = req.bitcode.display().to_string();
            let cmd = tcecc_command_line(
                self.config,
                &desc_path,
                &input,
                &entry.linked_bitcode(),
                &target_object.display().to_string(),
                req.kernel,
                req.extra_switches,
                false,
            )?;
            info!("build command:\n{}", cmd);
            run_checked(self.runner, &cmd)?;

            // Stage 3: disassembly dump for diagnostics, warning-only.
            let disasm_cmd = format!(
                "{} -n {} {} > {}",
                DISASSEMBLER,
                self.config.machine_file().display(),
                target_object.display(),
                entry.disassembly().display(),
            );
            match self.runner.run(&disasm_cmd) {
                Ok(status) if status.success() => {}
                _ => warn!("error while running {} (diagnostics only)", DISASSEMBLER),
            }
        }

        // Stage 4: locate the entry procedure and persist its address.
        if !entry.entry_metadata().exists() {
            let symbol = req.kernel.entry_symbol();
            let address = loader::entry_point_address(&target_object, &symbol)?;
            let meta = KernelEntryMetadata {
                kernel: req.kernel.name.clone(),
                symbol,
                address: address as u32,
                build_key: build_key.to_hex(),
            };
            meta.store(&entry.entry_metadata())?;
        }

        // Stage 5: instruction/data image generation. The tool resolves
        // --program relative to its working directory, so run it inside
        // the cache entry.
        if !entry.binary_image().exists() {
            let cmd = format!(
                "cd {} && {} --dmemwidthinmaus 4 --piformat=bin2n --diformat=bin2n \
                 --program {} {}",
                entry.dir().display(),
                IMAGE_GENERATOR,
                TARGET_OBJECT,
                self.config.machine_file().display(),
            );
            info!("running {}:\n{}", IMAGE_GENERATOR, cmd);
            run_checked(self.runner, &cmd)?;
        }

        if !entry.binary_image().exists() {
            return Err(BuildError::artifact(
                entry.binary_image(),
                "binary image missing after image generation reported success",
            ));
        }

        let meta = KernelEntryMetadata::load(&entry.entry_metadata())?;
        Ok(CompiledKernel {
            entry_address: meta.address,
            cache_dir: entry.dir().to_owned(),
            image: entry.binary_image(),
        })
    }

    /// Generate the vendor-extension header for this machine if it is not
    /// cached yet, and return the include switch that makes the custom
    /// hardware operations visible to compiled kernels.
    ///
    /// The header is shared across kernels and named by a hash of the
    /// machine description. Generation goes through a temp file and a
    /// rename so concurrent builders never observe a half-written header.
    pub fn prepare_vendor_extensions(&self) -> Result<String> {
        let adf = fs::read(self.config.machine_file())
            .map_err(io_at(self.config.machine_file()))?;
        let machine_hash = content_key(&adf).to_hex();
        let header = self.cache.vendor_extension_header(&machine_hash);

        if !header.exists() {
            let machine_dir = self.cache.machine_dir();
            fs::create_dir_all(&machine_dir).map_err(io_at(&machine_dir))?;
            let tempfile = machine_dir.join(format!(".devext.{}", std::process::id()));

            let opgen_cmd = format!("{} > {}", OPGEN, tempfile.display());
            info!("running: {}", opgen_cmd);
            run_checked(self.runner, &opgen_cmd)?;

            let extgen_cmd = format!(
                "{} {} >> {}",
                EXTGEN,
                self.config.machine_file().display(),
                tempfile.display()
            );
            info!("running: {}", extgen_cmd);
            run_checked(self.runner, &extgen_cmd)?;

            fs::rename(&tempfile, &header).map_err(io_at(&header))?;
        }

        // gnu-keywords is needed for the inline asm blocks the generated
        // header contains; -fasm doesn't reach the frontend.
        Ok(format!(
            "-fgnu-keywords -Dasm=__asm__ -include {}",
            header.display()
        ))
    }
}

// ── Command-line construction ────────────────────────────────────────────

/// Build the two-stage compiler command line: bitcode link first (the
/// intermediate module is kept on disk), then assembly against the
/// machine description. Shared by the normal build and the standalone
/// harness build script, which flips `standalone` and forces absolute
/// addressing.
#[allow(clippy::too_many_arguments)]
pub(crate) fn tcecc_command_line(
    config: &BuildConfig,
    descriptor_src: &Path,
    input_src: &str,
    program_bc: &Path,
    output_tpef: &str,
    kernel: &KernelMetadata,
    extra_params: &str,
    standalone: bool,
) -> Result<String> {
    let multicore = config.core_count() > 1;
    let main_c = if multicore {
        "tta_device_main_dthread.c"
    } else {
        "tta_device_main.c"
    };
    let data_dir = if config.options().in_tree_build {
        IN_TREE_DATA_DIR
    } else {
        INSTALL_DATA_DIR
    };
    let device_main_src = format!("{}/{}", data_dir, main_c);
    let include_switch = format!("-I {}", data_dir);

    let multicore_flags = if multicore {
        " -ldthread -lsync-lu -llockunit"
    } else {
        ""
    };
    let endian_flags = if config.machine().little_endian {
        "--little-endian"
    } else {
        ""
    };

    // The standalone harness is relinked for a fixed physical placement.
    let addressing = if standalone {
        Addressing::Absolute
    } else {
        config.addressing()
    };
    let layout = resolve_layout(
        config.machine(),
        config.regions(),
        addressing,
        standalone,
        config.options().private_mem_budget,
    )?;

    let extra_flags = format!(
        "{} {} {} {} {} -k {}",
        extra_params,
        multicore_flags,
        config.options().extra_flags,
        endian_flags,
        layout.to_compiler_args(),
        PINNED_SYMBOL,
    );

    Ok(format!(
        "{compiler} -llwpr {includes} {device_main} {descriptor} {input} -k {md_symbol} \
         -g -O3 --emit-llvm -o {program_bc} {extra};\
         {compiler} -a {adf} {program_bc} -O3 -o {output} {extra}",
        compiler = COMPILER,
        includes = include_switch,
        device_main = device_main_src,
        descriptor = descriptor_src.display(),
        input = input_src,
        md_symbol = kernel.metadata_symbol(),
        program_bc = program_bc.display(),
        extra = extra_flags,
        adf = config.machine_file().display(),
        output = output_tpef,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::layout::MemoryRegions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    const ADF: &str = r#"<adf core-count="4">
  <little-endian/>
  <address-space name="data"><numerical-id>1</numerical-id></address-space>
  <address-space name="private"><numerical-id>0</numerical-id></address-space>
  <address-space name="cq"><numerical-id>5</numerical-id></address-space>
</adf>"#;

    fn test_config() -> BuildConfig {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "okc_pipeline_unit_{}_{}.adf",
            std::process::id(),
            n
        ));
        fs::write(&path, ADF).unwrap();
        BuildConfig::new(
            &path,
            MemoryRegions {
                data_size: 0x8000,
                data_base: 0,
                cq_size: 0x400,
                cq_base: 0x8000,
            },
            Addressing::Relative,
            BuildOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn command_line_links_then_assembles() {
        let config = test_config();
        let kernel = KernelMetadata::new("vecadd");
        let cmd = tcecc_command_line(
            &config,
            Path::new("/cache/vecadd/descriptor.kernel_obj.c"),
            "/cache/vecadd/general/parallel.bc",
            Path::new("/cache/vecadd/general/program.bc"),
            "/cache/vecadd/general/parallel.tpef",
            &kernel,
            "",
            false,
        )
        .unwrap();

        let stages: Vec<&str> = cmd.split(';').collect();
        assert_eq!(stages.len(), 2);
        assert!(stages[0].contains("--emit-llvm"));
        assert!(stages[0].contains("-k _vecadd_md"));
        assert!(stages[0].contains("tta_device_main_dthread.c"));
        assert!(stages[1].starts_with("tcecc -a "));
        assert!(stages[1].contains("program.bc"));
        assert!(cmd.contains("--little-endian"));
        assert!(cmd.contains("-ldthread -lsync-lu -llockunit"));
        assert!(cmd.contains("-k dummy_argbuffer"));
        assert!(cmd.contains("-DQUEUE_LENGTH=15"));
    }

    #[test]
    fn standalone_forces_absolute_addressing() {
        let config = test_config();
        let kernel = KernelMetadata::new("vecadd");
        let cmd = tcecc_command_line(
            &config,
            Path::new("/d/descriptor.kernel_obj.c"),
            "standalone_0.c /d/parallel.bc",
            Path::new("/d/program.bc"),
            "standalone.tpef",
            &kernel,
            "-D_STANDALONE_MODE=1",
            true,
        )
        .unwrap();
        assert!(cmd.contains("-D_STANDALONE_MODE=1"));
        // Absolute standalone builds get the relinkable global data-start.
        assert!(cmd.contains("${STANDALONE_GLOBAL_AS_OFFSET}"));
    }
}
