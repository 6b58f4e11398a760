use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, PipelineError};
use crate::types::outline::Outline;
use crate::types::project::{ProjectId, ProjectInfo};
use crate::types::section::{SectionDocument, WrittenSection};
use crate::types::source::ResearchResult;

/// 运行阶段，只能向前推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Initialized,
    Researching,
    Researched,
    Outlining,
    Outlined,
    Writing,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStage::Initialized => "initialized",
            RunStage::Researching => "researching",
            RunStage::Researched => "researched",
            RunStage::Outlining => "outlining",
            RunStage::Outlined => "outlined",
            RunStage::Writing => "writing",
            RunStage::Completed => "completed",
            RunStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

impl RunStage {
    fn rank(&self) -> u8 {
        match self {
            RunStage::Initialized => 0,
            RunStage::Researching => 1,
            RunStage::Researched => 2,
            RunStage::Outlining => 3,
            RunStage::Outlined => 4,
            RunStage::Writing => 5,
            RunStage::Completed => 6,
            RunStage::Failed => 7,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Completed | RunStage::Failed)
    }

    /// 只允许前进一步；失败可从任何非终态进入
    pub fn can_advance_to(&self, next: RunStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RunStage::Failed => true,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

/// 状态机唯一的转换规则：只能前进一步，进入终态时记录结束时间
///
/// 按字段借用，可与research、outline的引用同时存在。
pub fn advance_stage(
    stage: &mut RunStage,
    finished_at: &mut Option<DateTime<Utc>>,
    next: RunStage,
) -> Result<(), PipelineError> {
    if !stage.can_advance_to(next) {
        return Err(PipelineError::InvalidTransition {
            from: *stage,
            to: next,
        });
    }
    *stage = next;
    if next.is_terminal() {
        *finished_at = Some(Utc::now());
    }
    Ok(())
}

/// 运行失败的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
    /// 失败发生时所处的阶段
    pub stage: RunStage,
}

/// 单次运行的状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRunState {
    pub run_id: Uuid,
    pub project_id: ProjectId,
    pub project: ProjectInfo,
    pub stage: RunStage,
    pub research: Option<ResearchResult>,
    pub outline: Option<Outline>,
    pub sections: Vec<WrittenSection>,
    pub error: Option<RunError>,
    /// 不致命的问题，如章节字数不足
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProjectRunState {
    pub fn new(project_id: ProjectId, project: ProjectInfo) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            project_id,
            project,
            stage: RunStage::Initialized,
            research: None,
            outline: None,
            sections: Vec::new(),
            error: None,
            warnings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// 推进到下一个阶段
    pub fn advance(&mut self, next: RunStage) -> Result<(), PipelineError> {
        advance_stage(&mut self.stage, &mut self.finished_at, next)
    }

    /// 记录失败并进入终态
    pub fn fail(&mut self, err: &PipelineError) {
        let stage = self.stage;
        if self.advance(RunStage::Failed).is_ok() {
            self.error = Some(RunError {
                kind: err.kind(),
                message: err.to_string(),
                stage,
            });
        }
    }

    pub fn is_completed(&self) -> bool {
        self.stage == RunStage::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.stage == RunStage::Failed
    }

    /// 已写成章节的输出文档
    pub fn documents(&self) -> Vec<SectionDocument> {
        self.sections.iter().map(SectionDocument::from).collect()
    }

    pub fn total_word_count(&self) -> usize {
        self.sections.iter().map(|s| s.total_word_count()).sum()
    }
}
