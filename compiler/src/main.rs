use clap::Parser;
use std::path::PathBuf;

use okc::config::{BuildConfig, BuildOptions};
use okc::descriptor::{KernelMetadata, NullDescriptorSink};
use okc::exec::ShellRunner;
use okc::key::content_key;
use okc::layout::{Addressing, MemoryRegions};
use okc::pipeline::{CompilePipeline, CompileRequest};

#[derive(Parser, Debug)]
#[command(
    name = "okc",
    version,
    about = "OpenASIP Kernel Compiler — builds device binary images from kernel bitcode"
)]
struct Cli {
    /// Lowered kernel bitcode module
    bitcode: PathBuf,

    /// Kernel name (entry procedure is <name>_workgroup_argbuffer)
    #[arg(short, long)]
    kernel: String,

    /// Architecture description file of the target machine
    #[arg(long)]
    adf: PathBuf,

    /// Build cache directory
    #[arg(long, default_value = ".okc-cache")]
    cache_dir: PathBuf,

    /// Device index within the cache layout
    #[arg(long, default_value_t = 0)]
    device_index: u32,

    /// Build a launch-parameter-specialized variant
    #[arg(long)]
    specialize: bool,

    /// Data memory size in bytes
    #[arg(long, default_value_t = 0x8000)]
    dmem_size: u32,

    /// Data memory physical base address
    #[arg(long, default_value_t = 0)]
    dmem_base: u32,

    /// Command-queue memory size in bytes
    #[arg(long, default_value_t = 0x400)]
    cq_size: u32,

    /// Command-queue memory physical base address
    #[arg(long, default_value_t = 0x8000)]
    cq_base: u32,

    /// Device uses absolute (physical) addressing
    #[arg(long)]
    absolute: bool,

    /// Also generate the vendor-extension header for this machine
    #[arg(long)]
    devext: bool,

    /// Print build phases
    #[arg(long)]
    verbose: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("okc: bitcode = {}", cli.bitcode.display());
        eprintln!("okc: adf     = {}", cli.adf.display());
        eprintln!("okc: kernel  = {}", cli.kernel);
    }

    let regions = MemoryRegions {
        data_size: cli.dmem_size,
        data_base: cli.dmem_base,
        cq_size: cli.cq_size,
        cq_base: cli.cq_base,
    };
    let addressing = if cli.absolute {
        Addressing::Absolute
    } else {
        Addressing::Relative
    };

    let config = match BuildConfig::new(&cli.adf, regions, addressing, BuildOptions::from_env()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("okc: error: {}", e);
            std::process::exit(2);
        }
    };

    // Program identity for the cache layout: fingerprint of the bitcode.
    let bitcode_bytes = match std::fs::read(&cli.bitcode) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("okc: error: {}: {}", cli.bitcode.display(), e);
            std::process::exit(2);
        }
    };
    let program_key = content_key(&bitcode_bytes).to_hex();

    let cache = okc::cache::CacheStore::new(&cli.cache_dir);
    let runner = ShellRunner;
    let pipeline = CompilePipeline::new(&config, &cache, &runner);

    // With --devext the machine's custom-operation header is generated
    // first and its include switch joins the compile command line.
    let devext_switch = if cli.devext {
        match pipeline.prepare_vendor_extensions() {
            Ok(switch) => {
                if cli.verbose {
                    eprintln!("okc: vendor extension switch: {}", switch);
                }
                switch
            }
            Err(e) => {
                eprintln!("okc: error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        String::new()
    };

    let kernel = KernelMetadata::new(&cli.kernel);
    let request = CompileRequest {
        kernel: &kernel,
        bitcode: &cli.bitcode,
        program_key: &program_key,
        device_index: cli.device_index,
        specialized: cli.specialize,
        extra_switches: &devext_switch,
    };

    let mut sink = NullDescriptorSink;
    match pipeline.compile(&request, &mut sink) {
        Ok(compiled) => {
            if cli.verbose {
                eprintln!("okc: cache entry = {}", compiled.cache_dir.display());
            }
            println!(
                "{} {:#x} {}",
                cli.kernel,
                compiled.entry_address,
                compiled.image.display()
            );
        }
        Err(e) => {
            eprintln!("okc: error: {}", e);
            std::process::exit(1);
        }
    }
}
