//! 语言模型抽象

use anyhow::Result;
use async_trait::async_trait;

pub mod client;

pub use client::LLMClient;

/// 文本生成能力，各阶段只依赖这一接口
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 以系统提示词为上下文，对用户提示词生成回复
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
