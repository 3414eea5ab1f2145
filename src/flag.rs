//! Recording the secret flag returned by BYE.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Byte length of a well-formed secret flag.
pub const SECRET_FLAG_LEN: usize = 64;

/// Returns true if `flag` has the expected secret flag length.
pub fn is_well_formed(flag: &[u8]) -> bool {
    flag.len() == SECRET_FLAG_LEN
}

/// Append `flag` as one line to `path`, creating the file if needed.
pub fn record(path: &Path, flag: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(flag)?;
    file.write_all(b"\n")?;
    file.sync_all()
}
