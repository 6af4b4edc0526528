//! Error taxonomy shared by every fallible operation in this crate.
//!
//! The reference C driver reports failures through `errno`; here each kind
//! becomes its own `Error` variant. Doc comments on each variant note the
//! `errno` value it replaces, for readers porting call sites from the C API.

/// Errors produced while mounting a volume, opening a file or directory, or
/// reading/seeking within one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An argument was invalid for reasons not covered by a more specific
    /// variant (e.g. a directory path other than the root). Analogous to
    /// `EFAULT`/`EINVAL` in the reference source.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// No directory entry matched the requested name. Analogous to `ENOENT`.
    #[error("no such file")]
    NotFound,

    /// The matched entry is a directory or volume label, not a regular file.
    /// Analogous to `EISDIR`.
    #[error("entry is a directory or volume label")]
    IsDirectory,

    /// A sector index, seek offset, or cluster computation fell outside its
    /// valid range. Analogous to `ERANGE`/`ENXIO`.
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),

    /// The boot sector or FAT failed a consistency check: bad signature,
    /// non-FAT16 geometry, or mismatched FAT mirrors. Treated as fatal and
    /// never recovered from. Analogous to `EINVAL`.
    #[error("malformed FAT16 volume: {0}")]
    MalformedVolume(String),

    /// The underlying sector device failed to satisfy a read. Analogous to
    /// `EIO`.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
