use super::{
    AnalyzeCodeRequest, ApiError, ApiResult, AppliedFix, ApplyFixRequest, ArchiveUpload,
    ExplanationRequest, ExportRequest, FeedbackRequest, FileContent, FixSuggestion,
    GenerateFixRequest, ReviewBackend,
};
use crate::config::Config;
use crate::issues::{AnalysisHandle, AnalysisResult, Explanation};
use crate::util::truncate;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

const ANALYZE_ZIP: &str = "api/v1/analysis/analyze-zip";
const ANALYZE_CODE: &str = "api/v1/analysis/analyze-code";
const GENERATE_FIX: &str = "api/v1/analysis/generate-fix";
const APPLY_FIX: &str = "api/v1/analysis/apply-fix";
const EXPORT_PROJECT: &str = "api/v1/analysis/export-project";
const FILES: &str = "api/v1/files";
const EXPLAIN: &str = "api/v1/explanations/explain";
const FEEDBACK: &str = "api/v1/feedback/explanation";

/// Longest error body kept for display
const MAX_DETAIL_CHARS: usize = 200;

/// HTTP implementation of [`ReviewBackend`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = parse_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("flamingo-review/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.backend_url(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> ApiResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self.client.post(url).json(body).send().await?;
        decode_json(response).await
    }
}

/// Parse the configured base URL so relative endpoint paths join under it,
/// including any path prefix (`http://host/review` → `http://host/review/`).
pub(crate) fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("Invalid backend URL '{}': {}", raw, e))?;
    if url.cannot_be_a_base() {
        return Err(anyhow::anyhow!("Backend URL '{}' cannot be used as a base", raw));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Pull the `detail` field out of an error body, falling back to the text.
pub(crate) fn extract_detail(body: &str, fallback: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => truncate(&other.to_string(), MAX_DETAIL_CHARS),
            None => truncate(trimmed, MAX_DETAIL_CHARS),
        },
        _ => truncate(trimmed, MAX_DETAIL_CHARS),
    }
}

async fn ensure_success(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let fallback = status.canonical_reason().unwrap_or("request failed");
    Err(ApiError::Status {
        status: status.as_u16(),
        detail: extract_detail(&body, fallback),
    })
}

async fn decode_json<R: DeserializeOwned>(response: Response) -> ApiResult<R> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Err(ApiError::Malformed("empty response body".to_string()));
    }
    serde_json::from_str(&text)
        .map_err(|e| ApiError::Malformed(format!("{} in {}", e, truncate(&text, MAX_DETAIL_CHARS))))
}

impl ReviewBackend for HttpBackend {
    async fn analyze_archive(&self, upload: ArchiveUpload) -> ApiResult<AnalysisResult> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str("application/zip")?;
        let form = Form::new().part("zip_file", part);
        let url = self.endpoint(ANALYZE_ZIP)?;
        let response = self.client.post(url).multipart(form).send().await?;
        decode_json(response).await
    }

    async fn analyze_code(&self, request: AnalyzeCodeRequest) -> ApiResult<AnalysisResult> {
        self.post_json(ANALYZE_CODE, &request).await
    }

    async fn fetch_file(&self, path: String, handle: AnalysisHandle) -> ApiResult<String> {
        let mut url = self.endpoint(FILES)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("path", &path);
            query.append_pair("session_id", &handle.session_id);
            if let Some(temp_dir) = &handle.temp_dir {
                query.append_pair("temp_dir", temp_dir);
            }
        }
        let response = self.client.get(url).send().await?;
        let file: FileContent = decode_json(response).await?;
        Ok(file.content)
    }

    async fn fetch_explanation(&self, request: ExplanationRequest) -> ApiResult<Explanation> {
        self.post_json(EXPLAIN, &request).await
    }

    async fn generate_fix(&self, request: GenerateFixRequest) -> ApiResult<FixSuggestion> {
        self.post_json(GENERATE_FIX, &request).await
    }

    async fn apply_fix(&self, request: ApplyFixRequest) -> ApiResult<AppliedFix> {
        let applied: AppliedFix = self.post_json(APPLY_FIX, &request).await?;
        if !applied.success {
            return Err(ApiError::Rejected(
                applied
                    .message
                    .unwrap_or_else(|| "fix was not applied".to_string()),
            ));
        }
        Ok(applied)
    }

    async fn submit_feedback(&self, request: FeedbackRequest) -> ApiResult<()> {
        let url = self.endpoint(FEEDBACK)?;
        let response = self.client.post(url).json(&request).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn export_project(&self, handle: AnalysisHandle) -> ApiResult<Vec<u8>> {
        let url = self.endpoint(EXPORT_PROJECT)?;
        let body = ExportRequest {
            session_id: &handle.session_id,
            temp_dir: handle.temp_dir.as_deref(),
        };
        let response = self.client.post(url).json(&body).send().await?;
        let bytes = ensure_success(response).await?.bytes().await?;
        if bytes.is_empty() {
            return Err(ApiError::Malformed("export returned no data".to_string()));
        }
        Ok(bytes.to_vec())
    }
}
