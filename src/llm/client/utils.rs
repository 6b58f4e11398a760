use crate::config::LLMConfig;

/// 长提示词的阈值（字节）
const LONG_PROMPT_BYTES: usize = 32 * 1024;

/// 根据提示词长度选择模型，返回首选模型与兜底模型
pub fn evaluate_befitting_model(
    llm_config: &LLMConfig,
    system_prompt: &str,
    user_prompt: &str,
) -> (String, Option<String>) {
    if system_prompt.len() + user_prompt.len() <= LONG_PROMPT_BYTES
        && llm_config.model_efficient != llm_config.model_powerful
    {
        return (
            llm_config.model_efficient.clone(),
            Some(llm_config.model_powerful.clone()),
        );
    }
    if system_prompt.len() + user_prompt.len() <= LONG_PROMPT_BYTES {
        return (llm_config.model_efficient.clone(), None);
    }
    (llm_config.model_powerful.clone(), None)
}
