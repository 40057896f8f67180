//! Environment block parsing.
//!
//! A process environment block is a run of NUL-terminated `NAME=VALUE`
//! entries. Windows ends the block with an empty entry (a double NUL in
//! UTF-16 code units); Linux bounds it by the `env_start..env_end` range and
//! stores plain bytes.
//!
//! These functions only ever see a *complete* copy of the block. Detecting a
//! torn copy is the job of the OS backend, which never hands a short buffer
//! to the parser.

use thiserror::Error;

/// Upper bound for an environment block copied out of another process.
pub const MAX_BLOCK_LEN: usize = 16 * 1024 * 1024;

/// Structural problems with a complete environment block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironBlockError {
    #[error("block is not terminated")]
    MissingTerminator,

    #[error("wide block has odd byte length {0}")]
    OddLength(usize),

    #[error("block length {0} exceeds the 16 MiB limit")]
    TooLarge(usize),
}

/// Parse a UTF-16 environment block given as raw little-endian bytes.
pub fn parse_wide_block(bytes: &[u8]) -> Result<Vec<String>, EnvironBlockError> {
    if bytes.len() > MAX_BLOCK_LEN {
        return Err(EnvironBlockError::TooLarge(bytes.len()));
    }
    if bytes.len() % 2 != 0 {
        return Err(EnvironBlockError::OddLength(bytes.len()));
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let entries = split_entries(&units, Terminator::EmptyEntry)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| String::from_utf16(entry).ok())
        .filter(|entry| is_variable(entry))
        .collect())
}

/// Parse a byte environment block as laid out in a Linux address space.
pub fn parse_narrow_block(bytes: &[u8]) -> Result<Vec<String>, EnvironBlockError> {
    if bytes.len() > MAX_BLOCK_LEN {
        return Err(EnvironBlockError::TooLarge(bytes.len()));
    }

    let entries = split_entries(bytes, Terminator::EndOfBlock)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| std::str::from_utf8(entry).ok())
        .filter(|entry| is_variable(entry))
        .map(str::to_owned)
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    /// The block must end with an empty entry.
    EmptyEntry,
    /// The block may end with an empty entry or simply at the last NUL.
    EndOfBlock,
}

/// Split a block into its NUL-terminated entries, stopping at the first
/// empty entry.
fn split_entries<T>(units: &[T], terminator: Terminator) -> Result<Vec<&[T]>, EnvironBlockError>
where
    T: Copy + Default + PartialEq,
{
    let nul = T::default();
    let mut entries = Vec::new();
    let mut rest = units;

    loop {
        let Some(end) = rest.iter().position(|unit| *unit == nul) else {
            return match (terminator, rest.is_empty()) {
                (Terminator::EndOfBlock, true) => Ok(entries),
                _ => Err(EnvironBlockError::MissingTerminator),
            };
        };

        if end == 0 {
            return Ok(entries);
        }

        entries.push(&rest[..end]);
        rest = &rest[end + 1..];
    }
}

/// True for `NAME=VALUE` entries. Per-drive working directory entries such
/// as `=C:=C:\work` and entries without a separator are dropped.
fn is_variable(entry: &str) -> bool {
    match entry.find('=') {
        Some(0) | None => false,
        Some(_) => true,
    }
}
