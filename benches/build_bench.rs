use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use okc::key::BuildKey;
use okc::layout::{resolve_layout, Addressing, MemoryRegions};
use okc::machine::MachineDescription;

// Hot paths of the build frontend: everything that runs before the first
// toolchain subprocess. The subprocess stages dominate wall time in a cold
// build, but these run on every warm call too.

const SMALL_ADF: &str = r#"<adf>
  <little-endian/>
  <address-space name="data"><numerical-id>1</numerical-id></address-space>
  <address-space name="private"><numerical-id>0</numerical-id></address-space>
  <address-space name="cq"><numerical-id>5</numerical-id></address-space>
</adf>"#;

/// Machine description with `n` filler address spaces around the three
/// standard ones, approximating a fully-specified multi-bus design file.
fn generate_adf(n_spaces: usize) -> String {
    let mut adf = String::from("<adf core-count=\"4\">\n  <little-endian/>\n");
    adf.push_str("  <address-space name=\"data\"><numerical-id>1</numerical-id></address-space>\n");
    adf.push_str(
        "  <address-space name=\"private\"><numerical-id>0</numerical-id></address-space>\n",
    );
    adf.push_str("  <address-space name=\"cq\"><numerical-id>5</numerical-id></address-space>\n");
    for i in 0..n_spaces {
        adf.push_str(&format!(
            "  <address-space name=\"scratch_{i}\"><numerical-id>{}</numerical-id>\
             </address-space>\n",
            i + 16
        ));
    }
    adf.push_str("</adf>\n");
    adf
}

const MEM: MemoryRegions = MemoryRegions {
    data_size: 0x8000,
    data_base: 0x4000_0000,
    cq_size: 0x400,
    cq_base: 0x4000_8000,
};

fn bench_build_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_key");

    group.bench_function("small_adf", |b| {
        b.iter(|| {
            let key = BuildKey::compute(
                black_box("tcele-tut-llvm"),
                black_box(SMALL_ADF.as_bytes()),
                None,
            );
            black_box(key.to_hex());
        });
    });

    for n_spaces in [8_usize, 64, 512] {
        let adf = generate_adf(n_spaces);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}spaces", n_spaces)),
            &adf,
            |b, adf| {
                b.iter(|| {
                    black_box(BuildKey::compute(
                        black_box("tcele-tut-llvm"),
                        black_box(adf.as_bytes()),
                        Some("-ffast-math"),
                    ));
                });
            },
        );
    }

    group.finish();
}

fn bench_machine_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_parse");

    for n_spaces in [0_usize, 8, 64] {
        let adf = generate_adf(n_spaces);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}spaces", n_spaces)),
            &adf,
            |b, adf| {
                b.iter(|| {
                    let m = MachineDescription::from_adf_text(black_box(adf)).unwrap();
                    black_box(m);
                });
            },
        );
    }

    group.finish();
}

fn bench_layout_resolution(c: &mut Criterion) {
    let machine = MachineDescription::from_adf_text(SMALL_ADF).unwrap();
    let mut group = c.benchmark_group("layout");

    for (label, addressing, standalone) in [
        ("relative", Addressing::Relative, false),
        ("absolute", Addressing::Absolute, false),
        ("standalone", Addressing::Absolute, true),
    ] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let flags = resolve_layout(
                    black_box(&machine),
                    black_box(&MEM),
                    addressing,
                    standalone,
                    2048,
                )
                .unwrap();
                black_box(flags.to_compiler_args());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build_key,
    bench_machine_parse,
    bench_layout_resolution,
);
criterion_main!(benches);
