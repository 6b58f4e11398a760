use std::sync::Arc;

use anyhow::Result;

use crate::{
    config::Config,
    llm::{LLMClient, LanguageModel},
};

#[derive(Clone)]
pub struct GeneratorContext {
    /// 文本生成能力，各阶段共享
    pub llm: Arc<dyn LanguageModel>,
    /// 配置，流水线构建后不再修改
    pub config: Config,
}

impl GeneratorContext {
    /// 以配置中的模型服务创建上下文
    pub fn new(config: Config) -> Result<Self> {
        let llm = LLMClient::new(config.llm.clone())?;
        Ok(Self {
            llm: Arc::new(llm),
            config,
        })
    }

    /// 使用指定的模型实现创建上下文
    pub fn with_model(config: Config, llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm, config }
    }
}
