// okc — OpenASIP Kernel Compiler
//
// Library root. Cross-compiles lowered kernel bitcode into binary images
// for software-defined TTA accelerators by driving the external OpenASIP
// toolchain, with content-addressed build caching and standalone
// reproduction harness generation.

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod exec;
pub mod key;
pub mod layout;
pub mod loader;
pub mod machine;
pub mod pipeline;
pub mod standalone;
