//! The file a window manager's stdout and stderr are redirected into.
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    os::unix::fs::OpenOptionsExt,
    path::Path,
};

use chrono::{DateTime, Local};

/// Written before every start so runs can be told apart in the file.
pub fn separator(at: DateTime<Local>) -> String {
    format!("------------[ {}\n", at.format("%a %b %e %H:%M:%S %Y"))
}

/// Opens `path` for appending (creating it rw-r--r--) and writes the
/// separator line.
pub fn open(path: &Path) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(path)?;
    file.write_all(separator(Local::now()).as_bytes())?;
    Ok(file)
}
