use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::{
    ApiError, ApiErrorKind, JobPage, JobStatusReport, PresetRecord, ProcessRequest, RemoteStatus,
    UploadReceipt, UploadSource,
};

const UPLOAD_FIELD: &str = "mod_file";

#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Root of the versioned API, e.g. `http://localhost:8080/api/v1`.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Uploads of large mods get their own, longer budget.
    pub upload_timeout: Duration,
    pub bearer_token: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(300),
            bearer_token: None,
        }
    }
}

/// Remote operations of the mod-enhancement service.
#[async_trait::async_trait]
pub trait ModApi: Send + Sync {
    async fn upload(&self, source: &UploadSource) -> Result<UploadReceipt, ApiError>;

    async fn presets(&self) -> Result<Vec<PresetRecord>, ApiError>;

    async fn request_processing(
        &self,
        server_job_id: &str,
        request: &ProcessRequest,
    ) -> Result<(), ApiError>;

    async fn job_status(&self, server_job_id: &str) -> Result<JobStatusReport, ApiError>;

    /// Resolves a fresh, short-lived download location. Never cached.
    async fn download_location(&self, server_job_id: &str) -> Result<String, ApiError>;

    /// One page of the caller's jobs, optionally narrowed to one status.
    async fn job_history(
        &self,
        page: u32,
        limit: u32,
        status: Option<RemoteStatus>,
    ) -> Result<JobPage, ApiError>;
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PresetList {
    #[serde(default)]
    presets: Vec<PresetRecord>,
}

#[derive(Debug, Deserialize)]
struct DownloadLink {
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug)]
pub struct ReqwestModApi {
    settings: ApiSettings,
    base: Url,
    client: reqwest::Client,
    credential: Arc<RwLock<Option<String>>>,
}

impl ReqwestModApi {
    pub fn new(settings: ApiSettings) -> Result<Self, ApiError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| ApiError::new(ApiErrorKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::new(
                ApiErrorKind::InvalidUrl,
                format!("{} cannot be used as an api root", settings.base_url),
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ApiError::new(ApiErrorKind::Transport, err.to_string()))?;

        let credential = Arc::new(RwLock::new(settings.bearer_token.clone()));
        Ok(Self {
            settings,
            base,
            client,
            credential,
        })
    }

    /// Swaps the bearer credential attached to subsequent requests.
    pub fn set_credential(&self, token: Option<String>) {
        if let Ok(mut guard) = self.credential.write() {
            *guard = token;
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was rejected in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.credential.read().ok().and_then(|guard| guard.clone());
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> Result<Response, ApiError> {
        self.authorize(builder)
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, context))
    }
}

#[async_trait::async_trait]
impl ModApi for ReqwestModApi {
    async fn upload(&self, source: &UploadSource) -> Result<UploadReceipt, ApiError> {
        const CONTEXT: &str = "Upload failed";
        let file = tokio::fs::File::open(&source.path)
            .await
            .map_err(|err| ApiError::new(ApiErrorKind::Transport, format!("{CONTEXT}: {err}")))?;
        let length = file
            .metadata()
            .await
            .map_err(|err| ApiError::new(ApiErrorKind::Transport, format!("{CONTEXT}: {err}")))?
            .len();

        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length).file_name(source.file_name.clone());
        let form = Form::new().part(UPLOAD_FIELD, part);

        let request = self
            .client
            .post(self.endpoint(&["mods", "upload"]))
            .timeout(self.settings.upload_timeout)
            .multipart(form);
        let response = self.send(request, CONTEXT).await?;
        read_json(response, CONTEXT).await
    }

    async fn presets(&self) -> Result<Vec<PresetRecord>, ApiError> {
        const CONTEXT: &str = "Failed to fetch presets";
        let request = self
            .client
            .get(self.endpoint(&["presets", ""]))
            .timeout(self.settings.request_timeout);
        let response = self.send(request, CONTEXT).await?;
        let list: PresetList = read_json(response, CONTEXT).await?;
        Ok(list.presets)
    }

    async fn request_processing(
        &self,
        server_job_id: &str,
        request: &ProcessRequest,
    ) -> Result<(), ApiError> {
        const CONTEXT: &str = "Processing request failed";
        let builder = self
            .client
            .post(self.endpoint(&["mods", "jobs", server_job_id, "process"]))
            .timeout(self.settings.request_timeout)
            .json(request);
        let response = self.send(builder, CONTEXT).await?;
        let _: serde_json::Value = read_json(response, CONTEXT).await?;
        Ok(())
    }

    async fn job_status(&self, server_job_id: &str) -> Result<JobStatusReport, ApiError> {
        const CONTEXT: &str = "Status check failed";
        let request = self
            .client
            .get(self.endpoint(&["mods", "jobs", server_job_id]))
            .timeout(self.settings.request_timeout);
        let response = self.send(request, CONTEXT).await?;
        read_json(response, CONTEXT).await
    }

    async fn download_location(&self, server_job_id: &str) -> Result<String, ApiError> {
        const CONTEXT: &str = "Download failed";
        let request = self
            .client
            .get(self.endpoint(&["mods", "jobs", server_job_id, "download"]))
            .timeout(self.settings.request_timeout);
        let response = self.send(request, CONTEXT).await?;
        let link: DownloadLink = read_json(response, CONTEXT).await?;
        link.download_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                ApiError::new(
                    ApiErrorKind::Malformed,
                    format!("{CONTEXT}: response has no download url"),
                )
            })
    }

    async fn job_history(
        &self,
        page: u32,
        limit: u32,
        status: Option<RemoteStatus>,
    ) -> Result<JobPage, ApiError> {
        const CONTEXT: &str = "Failed to fetch jobs";
        let mut url = self.endpoint(&["mods", "jobs"]);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &page.to_string())
                .append_pair("limit", &limit.to_string());
            if let Some(status) = status {
                query.append_pair("status", &status.to_string());
            }
        }
        let request = self
            .client
            .get(url)
            .timeout(self.settings.request_timeout);
        let response = self.send(request, CONTEXT).await?;
        read_json(response, CONTEXT).await
    }
}

/// Decodes a success body, or turns a non-success response into
/// `ServerRejected` carrying the server's `{ "error": ... }` text. When that
/// payload is missing or unreadable the generic `context` text is used.
async fn read_json<T: DeserializeOwned>(response: Response, context: &str) -> Result<T, ApiError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| map_reqwest_error(err, context))?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorPayload>(&body)
            .ok()
            .and_then(|payload| payload.error)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| format!("{context} (http {})", status.as_u16()));
        return Err(ApiError::new(
            ApiErrorKind::ServerRejected(status.as_u16()),
            message,
        ));
    }

    serde_json::from_slice(&body)
        .map_err(|err| ApiError::new(ApiErrorKind::Malformed, format!("{context}: {err}")))
}

fn map_reqwest_error(err: reqwest::Error, context: &str) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(ApiErrorKind::Timeout, format!("{context}: request timed out"));
    }
    ApiError::new(ApiErrorKind::Transport, format!("{context}: {err}"))
}
