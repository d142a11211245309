use std::path::PathBuf;

use crate::ast::NodeId;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GlFuzzError {
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("can not inline call: {0}")]
    CannotInline(String),

    #[error("can not remove returns: {0}")]
    CannotRemoveReturns(String),

    #[error("incompatible donor: {0}")]
    IncompatibleDonor(String),

    #[error("reduction failed: {0}")]
    FailedReduction(String),

    #[error("Reduction loop detected, candidate hash `{hash:016x}` was accepted before")]
    ReductionLoop { hash: u64 },

    #[error("node `{child}` is not a child of `{parent}`")]
    ChildDoesNotExist { parent: NodeId, child: NodeId },

    #[error("`{parent_kind}` nodes do not support child replacement")]
    ReplaceUnsupported { parent_kind: &'static str },

    #[error("judge failed: {0}")]
    Judge(String),

    #[error("shader has no main function")]
    NoMainFunction,

    #[error("invalid shader job `{0}`")]
    InvalidShaderJob(String),

    #[error("OS Error: {errno}, caused by: {path:?}")]
    Io { errno: std::io::Error, path: PathBuf },
}

impl GlFuzzError {
    /// Failures local to one transformation or opportunity; the caller may
    /// try something else.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CannotInline(_)
                | Self::CannotRemoveReturns(_)
                | Self::IncompatibleDonor(_)
                | Self::FailedReduction(_)
                | Self::ChildDoesNotExist { .. }
        )
    }
}

/// Attach the path to an I/O error.
pub fn io_error(errno: std::io::Error, path: impl Into<PathBuf>) -> GlFuzzError {
    GlFuzzError::Io {
        errno,
        path: path.into(),
    }
}
