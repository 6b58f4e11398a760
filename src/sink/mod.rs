//! 项目存储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::outline::Outline;
use crate::types::project::{ProjectId, ProjectInfo};
use crate::types::section::WrittenSection;
use crate::types::source::ResearchResult;
use crate::types::state::RunStage;

pub mod file;
pub mod memory;

pub use file::FileSink;
pub use memory::InMemorySink;

/// Sink侧记录的项目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Researching,
    Researched,
    Outlining,
    Outlined,
    Writing,
    Completed,
    Failed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Researching => "researching",
            ProjectStatus::Researched => "researched",
            ProjectStatus::Outlining => "outlining",
            ProjectStatus::Outlined => "outlined",
            ProjectStatus::Writing => "writing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

impl From<RunStage> for ProjectStatus {
    fn from(stage: RunStage) -> Self {
        match stage {
            RunStage::Initialized => ProjectStatus::Draft,
            RunStage::Researching => ProjectStatus::Researching,
            RunStage::Researched => ProjectStatus::Researched,
            RunStage::Outlining => ProjectStatus::Outlining,
            RunStage::Outlined => ProjectStatus::Outlined,
            RunStage::Writing => ProjectStatus::Writing,
            RunStage::Completed => ProjectStatus::Completed,
            RunStage::Failed => ProjectStatus::Failed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("project {0} not found")]
    NotFound(ProjectId),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// 外部项目存储
///
/// 所有写操作按 (项目, 阶段) 幂等：重复写入同一章节不会产生重复记录。
#[async_trait]
pub trait ProjectSink: Send + Sync {
    /// 保存调研结果，状态置为researched
    async fn save_research(
        &self,
        project_id: ProjectId,
        research: &ResearchResult,
    ) -> Result<(), SinkError>;

    /// 保存大纲，状态置为outlined
    async fn save_outline(&self, project_id: ProjectId, outline: &Outline)
    -> Result<(), SinkError>;

    /// 保存一个顶层章节；is_final为true时状态置为completed，否则为writing
    async fn save_section(
        &self,
        project_id: ProjectId,
        section: &WrittenSection,
        is_final: bool,
    ) -> Result<(), SinkError>;

    async fn update_status(
        &self,
        project_id: ProjectId,
        status: ProjectStatus,
        note: Option<&str>,
    ) -> Result<(), SinkError>;

    async fn lookup(&self, project_id: ProjectId) -> Result<ProjectInfo, SinkError>;
}

/// 一个项目在Sink中的完整记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: ProjectId,
    pub info: ProjectInfo,
    pub status: ProjectStatus,
    pub status_note: Option<String>,
    pub research: Option<ResearchResult>,
    pub outline: Option<Outline>,
    pub sections: Vec<WrittenSection>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn new(project_id: ProjectId, info: ProjectInfo) -> Self {
        let now = Utc::now();
        Self {
            project_id,
            info,
            status: ProjectStatus::Draft,
            status_note: None,
            research: None,
            outline: None,
            sections: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 新的调研结果使此前的大纲与章节失效
    pub fn apply_research(&mut self, research: &ResearchResult) {
        self.research = Some(research.clone());
        self.outline = None;
        self.sections.clear();
        self.set_status(ProjectStatus::Researched, None);
    }

    /// 新的大纲使此前写成的章节失效
    pub fn apply_outline(&mut self, outline: &Outline) {
        self.outline = Some(outline.clone());
        self.sections.clear();
        self.set_status(ProjectStatus::Outlined, None);
    }

    /// 按标题覆盖已有章节，保持首次写入的位置
    pub fn apply_section(&mut self, section: &WrittenSection, is_final: bool) {
        match self.sections.iter_mut().find(|s| s.title == section.title) {
            Some(existing) => *existing = section.clone(),
            None => self.sections.push(section.clone()),
        }
        let status = if is_final {
            ProjectStatus::Completed
        } else {
            ProjectStatus::Writing
        };
        self.set_status(status, None);
    }

    pub fn set_status(&mut self, status: ProjectStatus, note: Option<&str>) {
        self.status = status;
        self.status_note = note.map(str::to_string);
        self.updated_at = Utc::now();
    }
}
