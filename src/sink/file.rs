use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ProjectRecord, ProjectSink, ProjectStatus, SinkError};
use crate::types::outline::Outline;
use crate::types::project::{ProjectId, ProjectInfo};
use crate::types::section::WrittenSection;
use crate::types::source::ResearchResult;

/// 以JSON文件保存项目记录，每个项目一个文件
pub struct FileSink {
    data_dir: PathBuf,
    /// 串行化读改写
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn record_path(&self, project_id: ProjectId) -> PathBuf {
        self.data_dir.join(format!("{}.json", project_id))
    }

    /// 登记新项目，已存在时保持原记录
    pub async fn register(&self, project_id: ProjectId, info: ProjectInfo) -> Result<(), SinkError> {
        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(self.record_path(project_id)).await? {
            return Ok(());
        }
        self.write_record(&ProjectRecord::new(project_id, info)).await
    }

    pub async fn read_record(&self, project_id: ProjectId) -> Result<ProjectRecord, SinkError> {
        let path = self.record_path(project_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SinkError::NotFound(project_id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// 先写临时文件再重命名，避免留下半截记录
    async fn write_record(&self, record: &ProjectRecord) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.record_path(record.project_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), status = %record.status, "project record written");
        Ok(())
    }

    async fn modify<F>(&self, project_id: ProjectId, apply: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut ProjectRecord) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read_record(project_id).await?;
        apply(&mut record);
        self.write_record(&record).await
    }
}

#[async_trait]
impl ProjectSink for FileSink {
    async fn save_research(
        &self,
        project_id: ProjectId,
        research: &ResearchResult,
    ) -> Result<(), SinkError> {
        self.modify(project_id, |r| r.apply_research(research)).await
    }

    async fn save_outline(
        &self,
        project_id: ProjectId,
        outline: &Outline,
    ) -> Result<(), SinkError> {
        self.modify(project_id, |r| r.apply_outline(outline)).await
    }

    async fn save_section(
        &self,
        project_id: ProjectId,
        section: &WrittenSection,
        is_final: bool,
    ) -> Result<(), SinkError> {
        self.modify(project_id, |r| r.apply_section(section, is_final))
            .await
    }

    async fn update_status(
        &self,
        project_id: ProjectId,
        status: ProjectStatus,
        note: Option<&str>,
    ) -> Result<(), SinkError> {
        self.modify(project_id, |r| r.set_status(status, note)).await
    }

    async fn lookup(&self, project_id: ProjectId) -> Result<ProjectInfo, SinkError> {
        Ok(self.read_record(project_id).await?.info)
    }
}
