//! Source transforms run by the build filesystem.
//!
//! A transform turns one source file into the bytes of a derived file. The
//! filesystem decides when to run it; the transform only reads its source
//! through the store it is handed.

mod swc;

pub use swc::SwcTransform;

use crate::makefs::Store;
use std::io;
use thiserror::Error;

/// Transform failure.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to read source: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("emit error: {0}")]
    Emit(String),

    #[error("transform produced no output")]
    NoOutput,

    #[error("no transpiler for {0}: built without the `swc` feature")]
    Unsupported(String),

    #[error("{0}")]
    Failed(String),
}

/// Builds a destination file from a source file.
///
/// Implemented for any `Fn(&dyn Store, &str, &str) -> Result<Vec<u8>, TransformError>`,
/// so closures can be registered directly. Closures need annotated parameter
/// and return types.
pub trait Transform: Send + Sync {
    /// Produce the bytes for `dst` from `src`, reading through `fs`.
    fn transform(&self, fs: &dyn Store, dst: &str, src: &str) -> Result<Vec<u8>, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(&dyn Store, &str, &str) -> Result<Vec<u8>, TransformError> + Send + Sync,
{
    fn transform(&self, fs: &dyn Store, dst: &str, src: &str) -> Result<Vec<u8>, TransformError> {
        self(fs, dst, src)
    }
}
