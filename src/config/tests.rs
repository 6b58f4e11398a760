#[cfg(test)]
mod tests {
    use crate::config::{
        Config, LLMConfig, LLMProvider, OutlineConfig, ResearchConfig, SinkConfig, WritingConfig,
    };
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.output_path, PathBuf::from("./thesis.docs"));
        assert!(!config.verbose);
        assert!(config.tools.serper_api_key.is_none());
    }

    #[test]
    fn test_llm_provider_default() {
        let provider = LLMProvider::default();
        assert_eq!(provider, LLMProvider::OpenAI);
    }

    #[test]
    fn test_llm_provider_from_str() {
        assert_eq!(
            "openai".parse::<LLMProvider>().unwrap(),
            LLMProvider::OpenAI
        );
        assert_eq!(
            "DeepSeek".parse::<LLMProvider>().unwrap(),
            LLMProvider::DeepSeek
        );
        assert_eq!(
            "anthropic".parse::<LLMProvider>().unwrap(),
            LLMProvider::Anthropic
        );
        assert_eq!(
            "ollama".parse::<LLMProvider>().unwrap(),
            LLMProvider::Ollama
        );

        assert!("invalid".parse::<LLMProvider>().is_err());
    }

    #[test]
    fn test_llm_provider_display() {
        assert_eq!(LLMProvider::OpenAI.to_string(), "openai");
        assert_eq!(LLMProvider::Moonshot.to_string(), "moonshot");
        assert_eq!(LLMProvider::OpenRouter.to_string(), "openrouter");
        assert_eq!(LLMProvider::Gemini.to_string(), "gemini");
    }

    #[test]
    fn test_llm_config_default() {
        let config = LLMConfig::default();

        assert_eq!(config.provider, LLMProvider::OpenAI);
        // api_key may be empty if env var is not set
        assert!(!config.api_base_url.is_empty());
        assert!(!config.model_efficient.is_empty());
        assert!(!config.model_powerful.is_empty());
        assert_eq!(config.max_tokens, 131072);
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_delay_ms, 5000);
    }

    #[test]
    fn test_stage_config_defaults() {
        let research = ResearchConfig::default();
        assert_eq!(research.min_sources, 10);
        assert_eq!(research.max_attempts, 3);
        assert_eq!(research.min_relevance_score, 0.3);
        assert_eq!(research.max_content_chars, 15000);

        let outline = OutlineConfig::default();
        assert_eq!(outline.max_attempts, 2);
        assert_eq!(outline.target_document_words, 10000);

        let writing = WritingConfig::default();
        assert_eq!(writing.max_attempts, 2);
        assert_eq!(writing.ceiling_ratio, 1.5);

        let sink = SinkConfig::default();
        assert_eq!(sink.retry_attempts, 3);
        assert_eq!(sink.data_dir, PathBuf::from(".thesis/projects"));
    }

    #[test]
    fn test_from_file_with_partial_sections() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("thesis.toml");

        let content = r#"
output_path = "./out"

[llm]
provider = "deepseek"
model_efficient = "deepseek-chat"

[research]
min_sources = 12
max_parallel_fetches = 8

[tools]
serper_api_key = "serper-key"
"#;
        std::fs::write(&config_path, content).unwrap();

        let config = Config::from_file(&config_path).unwrap();
        assert_eq!(config.output_path, PathBuf::from("./out"));
        assert_eq!(config.llm.provider, LLMProvider::DeepSeek);
        assert_eq!(config.llm.model_efficient, "deepseek-chat");
        assert_eq!(config.research.min_sources, 12);
        assert_eq!(config.research.max_parallel_fetches, 8);
        // Unspecified fields keep their defaults
        assert_eq!(config.research.max_attempts, 3);
        assert_eq!(config.writing.max_attempts, 2);
        assert_eq!(config.tools.serper_api_key.as_deref(), Some("serper-key"));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(&PathBuf::from("/nonexistent/thesis.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("thesis.toml");
        std::fs::write(&config_path, "this is = = not toml").unwrap();

        assert!(Config::from_file(&config_path).is_err());
    }
}
