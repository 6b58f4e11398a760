use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::citation::CitationStyle;

/// 项目标识，由外部系统分配
pub type ProjectId = u64;

/// 项目基本信息，运行开始时创建，之后只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProjectInfo")]
pub struct ProjectInfo {
    topic: String,
    citation_style: CitationStyle,
}

#[derive(Deserialize)]
struct RawProjectInfo {
    topic: String,
    #[serde(default)]
    citation_style: CitationStyle,
}

impl TryFrom<RawProjectInfo> for ProjectInfo {
    type Error = PipelineError;

    fn try_from(raw: RawProjectInfo) -> Result<Self, Self::Error> {
        ProjectInfo::new(raw.topic, raw.citation_style)
    }
}

impl ProjectInfo {
    pub fn new(topic: impl Into<String>, citation_style: CitationStyle) -> Result<Self, PipelineError> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(PipelineError::InvalidProject(
                "topic must not be empty".to_string(),
            ));
        }
        Ok(Self {
            topic,
            citation_style,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn citation_style(&self) -> CitationStyle {
        self.citation_style
    }
}
