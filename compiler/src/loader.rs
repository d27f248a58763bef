// loader.rs — Target-object loading boundary
//
// Resolves the kernel entry procedure's start address from the compiled
// target-object artifact. All parse failures from the object library are
// translated into `Parse` errors wrapped with the artifact path here;
// nothing foreign crosses this boundary.

use std::fs;
use std::path::Path;

use object::{Object, ObjectSymbol};

use crate::error::{io_at, BuildError, Result};

/// Look up `symbol` in the artifact's symbol table and return its start
/// address.
///
/// Failure modes: `Io` when the artifact can't be read, `Parse` when the
/// object is malformed, `Artifact` when the symbol is absent (an
/// ABI mismatch with the launcher glue).
pub fn entry_point_address(artifact: &Path, symbol: &str) -> Result<u64> {
    let data = fs::read(artifact).map_err(io_at(artifact))?;
    let file = object::File::parse(&*data)
        .map_err(|e| BuildError::parse(artifact, e.to_string()))?;
    for sym in file.symbols() {
        if sym.name() == Ok(symbol) {
            return Ok(sym.address());
        }
    }
    Err(BuildError::artifact(
        artifact,
        format!("couldn't find entry procedure `{}` in the compiled program", symbol),
    ))
}
