//! 提示词组装与模型调用

use std::future::Future;

use anyhow::Result;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::llm::LanguageModel;
use crate::utils::json::parse_json_response;

/// 单次模型调用的参数
pub struct AgentExecuteParams {
    pub prompt_sys: String,
    pub prompt_user: String,
    /// 日志标签
    pub log_tag: String,
}

/// Prompt模板配置
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// 系统提示词
    pub system_prompt: &'static str,
    /// 开头的说明性指令
    pub opening_instruction: &'static str,
    /// 结尾的强调性指令
    pub closing_instruction: &'static str,
}

/// 提示词中的一段材料
pub struct PromptMaterial {
    pub heading: String,
    pub body: String,
}

impl PromptMaterial {
    pub fn new(heading: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            body: body.into(),
        }
    }
}

impl PromptTemplate {
    /// 按 开头指令 - 材料 - 结尾指令 的顺序拼装用户提示词，空材料会被跳过
    pub fn build_user_prompt(&self, materials: &[PromptMaterial]) -> String {
        let mut prompt = String::from(self.opening_instruction);
        prompt.push_str("\n\n");
        for material in materials.iter().filter(|m| !m.body.trim().is_empty()) {
            prompt.push_str(&format!("## {}\n{}\n\n", material.heading, material.body.trim()));
        }
        prompt.push_str(self.closing_instruction);
        prompt
    }

    pub fn params(&self, materials: &[PromptMaterial], log_tag: impl Into<String>) -> AgentExecuteParams {
        AgentExecuteParams {
            prompt_sys: self.system_prompt.to_string(),
            prompt_user: self.build_user_prompt(materials),
            log_tag: log_tag.into(),
        }
    }
}

/// 生成文本
pub async fn prompt(llm: &dyn LanguageModel, params: &AgentExecuteParams) -> Result<String> {
    debug!("🤖 {} 生成中...", params.log_tag);
    let text = llm.generate(&params.prompt_sys, &params.prompt_user).await?;
    Ok(text.trim().to_string())
}

/// 生成符合T的JSON结构并解析
pub async fn extract<T>(llm: &dyn LanguageModel, params: &AgentExecuteParams) -> Result<T>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = serde_json::to_string_pretty(&schemars::schema_for!(T))?;
    let user_prompt = format!(
        "{}\n\nRespond with a single JSON object only, no commentary, matching this JSON schema:\n```json\n{}\n```",
        params.prompt_user, schema
    );
    debug!("🤖 {} 结构化生成中...", params.log_tag);
    let response = llm.generate(&params.prompt_sys, &user_prompt).await?;
    parse_json_response(&response)
}

/// 对单次生成失败做有限次重试
pub async fn with_generation_retries<T, F, Fut>(attempts: u32, log_tag: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!("⚠️ {} 生成失败 (第 {} / {} 次): {}", log_tag, attempt, attempts, e);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Verdict {
        ok: bool,
    }

    const TEMPLATE: PromptTemplate = PromptTemplate {
        system_prompt: "You judge things.",
        opening_instruction: "Judge the following.",
        closing_instruction: "Be fair.",
    };

    #[test]
    fn test_build_user_prompt_skips_empty_materials() {
        let prompt = TEMPLATE.build_user_prompt(&[
            PromptMaterial::new("Topic", "Remote work"),
            PromptMaterial::new("Notes", "   "),
        ]);
        assert_eq!(prompt, "Judge the following.\n\n## Topic\nRemote work\n\nBe fair.");
    }

    #[tokio::test]
    async fn test_extract_appends_schema_and_parses() {
        let model = ScriptedModel::new().on("You judge things.", ["```json\n{\"ok\": true}\n```"]);
        let params = TEMPLATE.params(&[PromptMaterial::new("Topic", "x")], "judge");
        let verdict: Verdict = extract(&model, &params).await.unwrap();
        assert!(verdict.ok);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.contains("JSON schema"));
    }

    #[tokio::test]
    async fn test_with_generation_retries_recovers() {
        let model = ScriptedModel::new().on("You judge things.", ["not json", "{\"ok\": false}"]);
        let params = TEMPLATE.params(&[], "judge");
        let verdict: Verdict = with_generation_retries(2, "judge", || extract(&model, &params))
            .await
            .unwrap();
        assert!(!verdict.ok);
        assert_eq!(model.calls().len(), 2);
    }
}
