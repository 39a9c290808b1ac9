use std::io;

use thiserror::Error;

/// Failure raised while building a normalized record.
///
/// Normalization itself is permissive: malformed headers, parameters or
/// attributes degrade silently. The only failure that escapes is the body
/// stream refusing to seek or read, which is passed through untouched.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Io(#[from] io::Error),
}
