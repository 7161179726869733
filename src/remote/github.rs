use super::{BlobStore, FetchOutcome};
use crate::config::GithubConfig;
use crate::errors::{AppError, AppResult};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::Read;
use url::Url;

const MAX_BLOB_BYTES: u64 = 100 * 1024 * 1024;
const USER_AGENT: &str = concat!("ems-console/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize)]
struct ContentEnvelope {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Reads and writes files through the GitHub repository contents API.
#[derive(Clone)]
pub struct GithubStore {
    config: GithubConfig,
    base_url: Url,
    agent: ureq::Agent,
}

impl GithubStore {
    pub fn new(config: GithubConfig) -> AppResult<Self> {
        let base_url = Url::parse(&config.api_base)
            .map_err(|error| AppError::Config(format!("invalid github.apiBase {}: {}", config.api_base, error)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!("invalid github.apiBase {}", config.api_base)));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build();
        Ok(Self {
            config,
            base_url,
            agent,
        })
    }

    fn contents_url(&self, path: &str) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AppError::Config("github.apiBase cannot carry a path".to_string()))?;
            segments
                .pop_if_empty()
                .extend(["repos", self.config.owner.as_str(), self.config.repo.as_str(), "contents"])
                .extend(path.split('/').filter(|segment| !segment.is_empty()));
        }
        Ok(url)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let mut request = self
            .agent
            .request(method, url)
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.config.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        request
    }

    /// Raw contents API body for `path`; `Ok(None)` when it does not exist on `revision`.
    fn get_contents(&self, path: &str, revision: &str) -> AppResult<Option<String>> {
        let mut url = self.contents_url(path)?;
        url.query_pairs_mut().append_pair("ref", revision);

        match self.request("GET", url.as_str()).call() {
            Ok(response) => response
                .into_string()
                .map(Some)
                .map_err(|error| AppError::Remote(format!("failed to read response: {}", error))),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(error) => Err(map_ureq_error(error)),
        }
    }

    fn get_envelope(&self, path: &str, revision: &str) -> AppResult<Option<ContentEnvelope>> {
        self.get_contents(path, revision)?
            .map(|body| {
                serde_json::from_str::<ContentEnvelope>(&body)
                    .map_err(|error| AppError::Decode(format!("unexpected contents response: {}", error)))
            })
            .transpose()
    }

    fn download(&self, download_url: &str) -> AppResult<Vec<u8>> {
        let response = self
            .request("GET", download_url)
            .set("Accept", "application/octet-stream")
            .call()
            .map_err(map_ureq_error)?;
        read_limited(response.into_reader(), MAX_BLOB_BYTES)
    }

    fn try_fetch(&self, path: &str, revision: &str) -> AppResult<FetchOutcome> {
        let Some(envelope) = self.get_envelope(path, revision)? else {
            return Ok(FetchOutcome::missing(format!("{} not found", self.describe(path, revision))));
        };

        let inline = envelope
            .content
            .as_deref()
            .filter(|content| !content.trim().is_empty())
            .filter(|_| envelope.encoding.as_deref().map_or(true, |encoding| encoding == "base64"));

        let bytes = match (inline, envelope.download_url.as_deref()) {
            (Some(content), _) => decode_content(content)?,
            (None, Some(download_url)) => self.download(download_url)?,
            (None, None) => {
                return Err(AppError::Decode(
                    "contents response carried neither content nor download_url".to_string(),
                ))
            }
        };
        Ok(FetchOutcome::found(bytes, envelope.sha))
    }
}

impl BlobStore for GithubStore {
    fn fetch(&self, path: &str, revision: &str) -> FetchOutcome {
        match self.try_fetch(path, revision) {
            Ok(outcome) => {
                if let Some(bytes) = &outcome.bytes {
                    tracing::debug!(path = %path, revision = %revision, size = bytes.len(), "fetched remote blob");
                }
                outcome
            }
            Err(error) => {
                tracing::warn!(path = %path, revision = %revision, error = %error, "remote fetch failed");
                FetchOutcome::missing(error.to_string())
            }
        }
    }

    fn put(&self, path: &str, revision: &str, bytes: &[u8], message: &str) -> AppResult<()> {
        let sha = self.get_envelope(path, revision)?.and_then(|envelope| envelope.sha);
        let payload = PutContentRequest {
            message,
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
            branch: revision,
            sha,
        };
        let body = serde_json::to_string(&payload)?;
        let url = self.contents_url(path)?;

        self.request("PUT", url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(map_ureq_error)?;
        tracing::info!(path = %path, revision = %revision, size = bytes.len(), "wrote remote blob");
        Ok(())
    }

    fn list(&self, dir: &str, revision: &str) -> AppResult<Vec<String>> {
        let Some(body) = self.get_contents(dir, revision)? else {
            return Ok(Vec::new());
        };
        let entries = serde_json::from_str::<Vec<DirectoryEntry>>(&body)
            .map_err(|error| AppError::Decode(format!("{} is not a directory listing: {}", dir, error)))?;
        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|entry| entry.kind == "file")
            .map(|entry| entry.name)
            .collect();
        names.sort();
        Ok(names)
    }

    fn describe(&self, path: &str, revision: &str) -> String {
        format!("github:{}/{}@{}:{}", self.config.owner, self.config.repo, revision, path)
    }

    fn secrets(&self) -> Vec<String> {
        self.config.token.iter().cloned().collect()
    }
}

fn decode_content(content: &str) -> AppResult<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

/// Reads at most `limit` bytes; a longer body is an error rather than a truncated blob.
fn read_limited(reader: impl Read, limit: u64) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.take(limit + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(AppError::Remote(format!("download exceeds {} bytes", limit)));
    }
    Ok(bytes)
}

fn map_ureq_error(error: ureq::Error) -> AppError {
    match error {
        ureq::Error::Status(code, response) => {
            let detail = response
                .into_string()
                .ok()
                .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
                .and_then(|body| body.message);
            match (code, detail) {
                (404, _) => AppError::NotFound("remote path not found".to_string()),
                (401 | 403, Some(message)) => AppError::Remote(format!("authorization failed ({}): {}", code, message)),
                (401 | 403, None) => AppError::Remote(format!("authorization failed ({})", code)),
                (_, Some(message)) => AppError::Remote(format!("HTTP {}: {}", code, message)),
                (_, None) => AppError::Remote(format!("HTTP {}", code)),
            }
        }
        ureq::Error::Transport(transport) => AppError::Remote(format!("request failed: {}", transport)),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_content, read_limited, GithubStore};
    use crate::config::GithubConfig;
    use crate::remote::BlobStore;

    fn store() -> GithubStore {
        GithubStore::new(GithubConfig {
            api_base: "https://api.github.com/".to_string(),
            owner: "plant".to_string(),
            repo: "line-data".to_string(),
            token: Some("tok-123456".to_string()),
            ..GithubConfig::default()
        })
        .expect("store")
    }

    #[test]
    fn builds_contents_url_per_segment() {
        let url = store().contents_url("historical_data/history.db").expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/plant/line-data/contents/historical_data/history.db"
        );
    }

    #[test]
    fn decodes_wrapped_base64() {
        let bytes = decode_content("aGVs\nbG8=\n").expect("decode");
        assert_eq!(bytes, b"hello");
        assert!(decode_content("***").is_err());
    }

    #[test]
    fn describes_location_and_exposes_token_for_redaction() {
        let store = store();
        assert_eq!(
            store.describe("a/b.db", "main"),
            "github:plant/line-data@main:a/b.db"
        );
        assert_eq!(store.secrets(), vec!["tok-123456".to_string()]);
    }

    #[test]
    fn oversized_download_is_an_error() {
        assert_eq!(read_limited(&b"12345"[..], 5).expect("at limit"), b"12345");
        let error = read_limited(&b"123456"[..], 5).expect_err("over limit");
        assert!(error.to_string().starts_with("REMOTE_FAILURE"));
    }

    #[test]
    fn rejects_non_base_api_url() {
        let result = GithubStore::new(GithubConfig {
            api_base: "mailto:ops@example.com".to_string(),
            ..GithubConfig::default()
        });
        assert!(result.is_err());
    }
}
