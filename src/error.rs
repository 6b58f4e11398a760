//! 流水线错误分类

use serde::{Deserialize, Serialize};

use crate::sink::SinkError;
use crate::types::outline::OutlineViolation;
use crate::types::project::ProjectId;
use crate::types::state::RunStage;

/// 错误种类，写入运行状态与Sink的失败备注
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientSources,
    InvalidOutline,
    WritingIncomplete,
    SinkPersistence,
    Generation,
    Cancelled,
    ProjectNotFound,
    InvalidProject,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InsufficientSources => "insufficient_sources",
            ErrorKind::InvalidOutline => "invalid_outline",
            ErrorKind::WritingIncomplete => "writing_incomplete",
            ErrorKind::SinkPersistence => "sink_persistence",
            ErrorKind::Generation => "generation",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ProjectNotFound => "project_not_found",
            ErrorKind::InvalidProject => "invalid_project",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

/// 流水线错误
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(
        "insufficient sources: found {found}, required {required} after {attempts} research attempts"
    )]
    InsufficientSources {
        found: usize,
        required: usize,
        attempts: u32,
    },

    #[error("invalid outline after {attempts} attempts: {violation}")]
    InvalidOutline {
        attempts: u32,
        violation: OutlineViolation,
    },

    /// 只作为警告使用，不会终止运行
    #[error("section '{title}' is below target: {actual} of {target} words")]
    WritingIncomplete {
        title: String,
        target: u32,
        actual: usize,
    },

    #[error("sink operation '{operation}' failed after {attempts} attempts: {source}")]
    SinkPersistence {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: SinkError,
    },

    #[error("generation failed during {stage}: {message}")]
    Generation { stage: &'static str, message: String },

    #[error("run cancelled before {before}")]
    Cancelled { before: RunStage },

    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("invalid project: {0}")]
    InvalidProject(String),

    #[error("illegal run state transition: {from} -> {to}")]
    InvalidTransition { from: RunStage, to: RunStage },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InsufficientSources { .. } => ErrorKind::InsufficientSources,
            PipelineError::InvalidOutline { .. } => ErrorKind::InvalidOutline,
            PipelineError::WritingIncomplete { .. } => ErrorKind::WritingIncomplete,
            PipelineError::SinkPersistence { .. } => ErrorKind::SinkPersistence,
            PipelineError::Generation { .. } => ErrorKind::Generation,
            PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
            PipelineError::ProjectNotFound(_) => ErrorKind::ProjectNotFound,
            PipelineError::InvalidProject(_) => ErrorKind::InvalidProject,
            PipelineError::InvalidTransition { .. } => ErrorKind::Internal,
        }
    }

    /// 除字数不足外，其余错误都会终止运行
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::WritingIncomplete { .. })
    }

    pub(crate) fn generation(stage: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::Generation {
            stage,
            message: err.to_string(),
        }
    }
}
