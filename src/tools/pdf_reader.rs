use async_trait::async_trait;
use tracing::{debug, warn};

use super::{PdfExtractor, PdfInput, ToolError, looks_like_pdf};
use crate::utils::text::{clean_text, truncate_intelligently};

/// PDF正文提取
pub struct PdfReader {
    client: reqwest::Client,
    max_content_chars: usize,
}

impl PdfReader {
    pub fn new(client: reqwest::Client, max_content_chars: usize) -> Self {
        Self {
            client,
            max_content_chars,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ToolError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Request {
                tool: "pdf_reader",
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http {
                tool: "pdf_reader",
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !content_type.contains("application/pdf") && !looks_like_pdf(url) {
            return Err(ToolError::InvalidResponse {
                tool: "pdf_reader",
                message: format!("{} is not a PDF ({})", url, content_type),
            });
        }

        let bytes = response.bytes().await.map_err(|e| ToolError::Request {
            tool: "pdf_reader",
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    /// 在阻塞线程上解析PDF
    async fn extract_text(&self, bytes: Vec<u8>, origin: String) -> Result<String, ToolError> {
        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ToolError::InvalidResponse {
                tool: "pdf_reader",
                message: e.to_string(),
            })?
            .map_err(|e| ToolError::InvalidResponse {
                tool: "pdf_reader",
                message: format!("{:?}", e),
            })?;

        let text = clean_text(&extracted);
        if text.trim().is_empty() {
            warn!("⚠️ PDF未提取到文本，可能是扫描件: {}", origin);
            return Err(ToolError::EmptyContent {
                tool: "pdf_reader",
                url: origin,
            });
        }
        debug!(chars = text.len(), "pdf extracted");
        Ok(truncate_intelligently(&text, self.max_content_chars))
    }
}

#[async_trait]
impl PdfExtractor for PdfReader {
    async fn extract_pdf(&self, input: PdfInput) -> Result<String, ToolError> {
        match input {
            PdfInput::Url(url) => {
                let bytes = self.download(&url).await?;
                self.extract_text(bytes, url).await
            }
            PdfInput::Bytes(bytes) => self.extract_text(bytes, "<inline pdf>".to_string()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_pdf_bytes_are_rejected() {
        let reader = PdfReader::new(reqwest::Client::new(), 1000);
        let result = reader
            .extract_pdf(PdfInput::Bytes(b"definitely not a pdf".to_vec()))
            .await;
        assert!(result.is_err());
    }
}
