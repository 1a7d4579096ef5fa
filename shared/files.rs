// ========================================================================================
//
//                                 Text source access
//
// ========================================================================================
//
// Every input of the tool (the VCF stream, the population file and the identifier
// lists) is line-oriented text. This module turns a path, `-`, or nothing at all
// (standard input) into a buffered reader, transparently decompressing gzip and
// BGZF input detected from its magic bytes.

use ahash::AHashSet;
use flate2::bufread::MultiGzDecoder;
use log::debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Path value that selects standard input.
pub const STDIN_PATH: &str = "-";

/// Opens `path` (or standard input when `path` is `None` or `-`) for line reading.
pub fn open_text_source(path: Option<&Path>) -> io::Result<Box<dyn BufRead>> {
    match path {
        Some(path) if path.as_os_str() != STDIN_PATH => {
            let file = File::open(path).map_err(|e| {
                io::Error::new(e.kind(), format!("Opening {}: {e}", path.display()))
            })?;
            debug!("Reading text source {}", path.display());
            wrap_decompression(BufReader::new(file))
        }
        _ => {
            debug!("Reading text source from standard input");
            wrap_decompression(io::stdin().lock())
        }
    }
}

fn wrap_decompression<R: BufRead + 'static>(mut reader: R) -> io::Result<Box<dyn BufRead>> {
    if peek_gzip_magic(&mut reader)? {
        debug!("Detected gzip-compressed input");
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

fn peek_gzip_magic<R: BufRead>(reader: &mut R) -> io::Result<bool> {
    let buffered = reader.fill_buf()?;
    Ok(buffered.len() >= 2 && is_gzip_magic(&[buffered[0], buffered[1]]))
}

fn is_gzip_magic(magic: &[u8; 2]) -> bool {
    magic[0] == 0x1F && magic[1] == 0x8B
}

/// Reads one identifier per line (the first whitespace-separated token).
///
/// Blank lines and `#` comments are skipped, and repeated identifiers are kept once,
/// at their first position.
pub fn read_identifier_list(path: &Path) -> io::Result<Vec<String>> {
    let reader = open_text_source(Some(path))?;
    let mut seen = AHashSet::new();
    let mut identifiers = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let content = line.split('#').next().unwrap_or("");
        if let Some(identifier) = content.split_whitespace().next() {
            if seen.insert(identifier.to_owned()) {
                identifiers.push(identifier.to_owned());
            }
        }
    }

    debug!(
        "Read {} identifiers from {}",
        identifiers.len(),
        path.display()
    );
    Ok(identifiers)
}
