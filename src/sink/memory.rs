use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ProjectRecord, ProjectSink, ProjectStatus, SinkError};
use crate::types::outline::Outline;
use crate::types::project::{ProjectId, ProjectInfo};
use crate::types::section::WrittenSection;
use crate::types::source::ResearchResult;

/// Sink元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkMetadata {
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// 按操作名统计的写入次数
    pub write_counts: HashMap<String, u64>,
}

impl Default for SinkMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            last_updated: Utc::now(),
            write_counts: HashMap::new(),
        }
    }
}

/// 一次写操作的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Research,
    Outline,
    Section { title: String, is_final: bool },
    Status(ProjectStatus),
}

#[derive(Debug, Default)]
struct MemoryStore {
    records: HashMap<ProjectId, ProjectRecord>,
    events: Vec<(ProjectId, SinkEvent)>,
    metadata: SinkMetadata,
}

impl MemoryStore {
    fn record_mut(&mut self, project_id: ProjectId) -> Result<&mut ProjectRecord, SinkError> {
        self.records
            .get_mut(&project_id)
            .ok_or(SinkError::NotFound(project_id))
    }

    fn log(&mut self, project_id: ProjectId, event: SinkEvent) {
        let key = match &event {
            SinkEvent::Research => "save_research",
            SinkEvent::Outline => "save_outline",
            SinkEvent::Section { .. } => "save_section",
            SinkEvent::Status(_) => "update_status",
        };
        *self
            .metadata
            .write_counts
            .entry(key.to_string())
            .or_insert(0) += 1;
        self.metadata.last_updated = Utc::now();
        self.events.push((project_id, event));
    }
}

/// 进程内的项目存储
#[derive(Debug, Default)]
pub struct InMemorySink {
    store: RwLock<MemoryStore>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新项目，已存在时保持原记录
    pub async fn register(&self, project_id: ProjectId, info: ProjectInfo) {
        let mut store = self.store.write().await;
        store
            .records
            .entry(project_id)
            .or_insert_with(|| ProjectRecord::new(project_id, info));
    }

    pub async fn record(&self, project_id: ProjectId) -> Option<ProjectRecord> {
        let store = self.store.read().await;
        store.records.get(&project_id).cloned()
    }

    /// 指定项目的写操作序列
    pub async fn events(&self, project_id: ProjectId) -> Vec<SinkEvent> {
        let store = self.store.read().await;
        store
            .events
            .iter()
            .filter(|(id, _)| *id == project_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub async fn metadata(&self) -> SinkMetadata {
        let store = self.store.read().await;
        store.metadata.clone()
    }
}

#[async_trait]
impl ProjectSink for InMemorySink {
    async fn save_research(
        &self,
        project_id: ProjectId,
        research: &ResearchResult,
    ) -> Result<(), SinkError> {
        let mut store = self.store.write().await;
        store.record_mut(project_id)?.apply_research(research);
        store.log(project_id, SinkEvent::Research);
        Ok(())
    }

    async fn save_outline(
        &self,
        project_id: ProjectId,
        outline: &Outline,
    ) -> Result<(), SinkError> {
        let mut store = self.store.write().await;
        store.record_mut(project_id)?.apply_outline(outline);
        store.log(project_id, SinkEvent::Outline);
        Ok(())
    }

    async fn save_section(
        &self,
        project_id: ProjectId,
        section: &WrittenSection,
        is_final: bool,
    ) -> Result<(), SinkError> {
        let mut store = self.store.write().await;
        store.record_mut(project_id)?.apply_section(section, is_final);
        store.log(
            project_id,
            SinkEvent::Section {
                title: section.title.clone(),
                is_final,
            },
        );
        Ok(())
    }

    async fn update_status(
        &self,
        project_id: ProjectId,
        status: ProjectStatus,
        note: Option<&str>,
    ) -> Result<(), SinkError> {
        let mut store = self.store.write().await;
        store.record_mut(project_id)?.set_status(status, note);
        store.log(project_id, SinkEvent::Status(status));
        Ok(())
    }

    async fn lookup(&self, project_id: ProjectId) -> Result<ProjectInfo, SinkError> {
        let store = self.store.read().await;
        store
            .records
            .get(&project_id)
            .map(|r| r.info.clone())
            .ok_or(SinkError::NotFound(project_id))
    }
}
