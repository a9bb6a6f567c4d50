use anyhow::Context;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{
    ApplyResponse, CoverLetter, ExtractedText, JobPage, JobSummary, LoginRequest, LoginResponse,
    MatchDetails, ProfileResponse, ResumeAnalysisResponse, ResumeInfo, ResumeSuggestions,
    ResumeVersions, SignupRequest, SignupResponse, UpdateProfileRequest, UploadResponse,
};
use crate::search::{PageRequest, SearchMode};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthorized,

    #[error("Server returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Decode(String),

    #[error("Cannot build request URL from base {0}")]
    InvalidBaseUrl(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// The calls the search screen makes. Futures are `Send` so the controller
/// can run them on spawned tasks.
pub trait JobApi: Send + Sync + 'static {
    fn fetch_page(&self, request: &PageRequest) -> impl Future<Output = ApiResult<JobPage>> + Send;

    fn analyze_match(
        &self,
        job_id: &str,
        email: &str,
    ) -> impl Future<Output = ApiResult<MatchDetails>> + Send;
}

pub struct HttpJobApi {
    client: Client,
    base_url: Url,
}

impl HttpJobApi {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn page_url(&self, request: &PageRequest) -> ApiResult<Url> {
        let mut url = match request.mode {
            SearchMode::Keyword => self.endpoint(&["api", "jobs"])?,
            SearchMode::ResumeMatch => {
                self.endpoint(&["api", "jobs", "vector-search", request.user_email.as_str()])?
            }
        };
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &request.page.to_string())
                .append_pair("limit", &request.page_size.to_string());
            if request.mode == SearchMode::Keyword {
                query.append_pair("email", &request.user_email);
                if let Some(keyword) = &request.keyword {
                    query.append_pair("search", keyword);
                }
            }
        }
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        debug!("Response status: {}", status);

        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let detail = error_detail(&body).unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            });
            warn!("API error {}: {}", status, detail);
            return Err(ApiError::Status { status, detail });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    // --- Job listings ---

    pub async fn job_details(&self, job_id: &str) -> ApiResult<JobSummary> {
        let url = self.endpoint(&["api", "jobs", job_id])?;
        info!("Fetching job details: {}", url);
        self.send_json(self.client.get(url)).await
    }

    pub async fn applied_jobs(&self, email: &str, page: u32, limit: u32) -> ApiResult<JobPage> {
        let mut url = self.endpoint(&["api", "jobs", "applied", email])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &limit.to_string());
        info!("Fetching applied jobs page {}", page);
        self.send_json(self.client.get(url)).await
    }

    pub async fn mark_applied(&self, job_id: &str, email: &str) -> ApiResult<ApplyResponse> {
        let mut url = self.endpoint(&["api", "jobs", job_id, "apply"])?;
        url.query_pairs_mut().append_pair("email", email);
        info!("Marking job {} as applied", job_id);
        self.send_json(self.client.post(url)).await
    }

    // --- AI artifacts ---

    pub async fn cover_letter(&self, job_id: &str, email: &str) -> ApiResult<CoverLetter> {
        let url = self.endpoint(&["api", "jobs", job_id, "cover-letter", email])?;
        info!("Requesting cover letter for job {}", job_id);
        self.send_json(self.client.post(url)).await
    }

    pub async fn enhance_resume(&self, job_id: &str, email: &str) -> ApiResult<ResumeSuggestions> {
        let url = self.endpoint(&["api", "jobs", job_id, "enhance-resume", email])?;
        info!("Requesting resume enhancements for job {}", job_id);
        self.send_json(self.client.post(url)).await
    }

    // --- Users ---

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        let url = self.endpoint(&["api", "users", "login"])?;
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        info!("Logging in as {}", email);
        self.send_json(self.client.post(url).json(&request)).await
    }

    pub async fn signup(&self, request: &SignupRequest) -> ApiResult<SignupResponse> {
        let url = self.endpoint(&["api", "users", "signup"])?;
        info!("Creating account for {}", request.email);
        self.send_json(self.client.post(url).json(request)).await
    }

    pub async fn profile(&self, email: &str) -> ApiResult<ProfileResponse> {
        let url = self.endpoint(&["api", "users", email])?;
        info!("Fetching profile for {}", email);
        self.send_json(self.client.get(url)).await
    }

    pub async fn update_profile(
        &self,
        email: &str,
        request: &UpdateProfileRequest,
    ) -> ApiResult<ProfileResponse> {
        let url = self.endpoint(&["api", "users", email])?;
        info!("Updating profile for {}", email);
        self.send_json(self.client.put(url).json(request)).await
    }

    // --- Resumes ---

    fn resume_url(&self, email: &str, version: Option<u32>) -> ApiResult<Url> {
        match version {
            Some(v) => self.endpoint(&["resumes", email, "version", &v.to_string()]),
            None => self.endpoint(&["resumes", email]),
        }
    }

    fn resume_action_url(&self, email: &str, action: &str, version: Option<u32>) -> ApiResult<Url> {
        let mut url = self.endpoint(&["resumes", email, action])?;
        if let Some(v) = version {
            url.query_pairs_mut().append_pair("version", &v.to_string());
        }
        Ok(url)
    }

    pub async fn upload_resume(
        &self,
        email: &str,
        file_name: &str,
        content_type: &str,
        contents: Vec<u8>,
    ) -> ApiResult<UploadResponse> {
        let url = self.endpoint(&["resumes", "upload"])?;
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = Form::new()
            .part("file", part)
            .text("email", email.to_string());
        info!("Uploading resume {} for {}", file_name, email);
        self.send_json(self.client.post(url).multipart(form)).await
    }

    pub async fn resume(&self, email: &str, version: Option<u32>) -> ApiResult<ResumeInfo> {
        let url = self.resume_url(email, version)?;
        info!("Fetching resume for {}", email);
        self.send_json(self.client.get(url)).await
    }

    pub async fn resume_versions(&self, email: &str) -> ApiResult<ResumeVersions> {
        let url = self.endpoint(&["resumes", email, "versions"])?;
        info!("Fetching resume versions for {}", email);
        self.send_json(self.client.get(url)).await
    }

    pub async fn extract_resume_text(
        &self,
        email: &str,
        version: Option<u32>,
    ) -> ApiResult<ExtractedText> {
        let url = self.resume_action_url(email, "extract-text", version)?;
        info!("Extracting resume text for {}", email);
        self.send_json(self.client.post(url)).await
    }

    pub async fn analyze_resume(
        &self,
        email: &str,
        version: Option<u32>,
    ) -> ApiResult<ResumeAnalysisResponse> {
        let url = self.resume_action_url(email, "analyze", version)?;
        info!("Requesting resume analysis for {}", email);
        self.send_json(self.client.post(url)).await
    }

    pub async fn latest_resume_analysis(&self, email: &str) -> ApiResult<ResumeAnalysisResponse> {
        let url = self.endpoint(&["resumes", email, "latest-analysis"])?;
        self.send_json(self.client.get(url)).await
    }
}

impl JobApi for HttpJobApi {
    async fn fetch_page(&self, request: &PageRequest) -> ApiResult<JobPage> {
        let url = self.page_url(request)?;
        info!("Fetching {:?} page {}: {}", request.mode, request.page, url);
        self.send_json(self.client.get(url)).await
    }

    async fn analyze_match(&self, job_id: &str, email: &str) -> ApiResult<MatchDetails> {
        let url = self.endpoint(&["api", "jobs", job_id, "match-analysis", email])?;
        info!("Requesting match analysis for job {}", job_id);
        self.send_json(self.client.post(url)).await
    }
}

/// FastAPI reports failures as `{"detail": "..."}`.
fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => match value.get("detail") {
            Some(serde_json::Value::String(detail)) => Some(detail.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(trimmed.to_string()),
        },
        Err(_) => Some(trimmed.to_string()),
    }
}
