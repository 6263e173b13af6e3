use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::domain::WorkflowName;
use crate::error::FetchError;
use crate::layout;

/// One object in the store. `name` is the full object path, including the
/// storage root prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub name: String,
}

/// Capability interface over the blob store. Prefix arguments are relative
/// to `root_prefix`; returned object names are full paths.
pub trait ObjectStore: Send + Sync {
    /// Fixed storage path under which all relative paths are resolved,
    /// ending in `/`.
    fn root_prefix(&self) -> &str;

    /// All objects whose name starts with `root_prefix + prefix`. Finite,
    /// possibly empty, order unspecified but stable within one call.
    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>, FetchError>;

    /// Objects and directory prefixes one path segment below
    /// `root_prefix + prefix`.
    fn list_children(&self, prefix: &str) -> Result<Vec<RemoteObject>, FetchError>;

    /// Fetch one object to `local_path`, creating parent directories as
    /// needed. Any failure (network, missing object, local I/O) surfaces as
    /// `FetchError::Transfer`.
    fn transfer(&self, relative_path: &str, local_path: &Path) -> Result<(), FetchError>;
}

/// Blob store client over the Google Cloud Storage JSON API, unauthenticated
/// (public-read buckets).
#[derive(Clone)]
pub struct GcsHttpClient {
    client: Client,
    bucket: String,
    root: String,
    api_base: String,
    media_base: String,
}

impl GcsHttpClient {
    pub fn new(bucket: &str, workflow: &WorkflowName) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("simfetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::StorageHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| FetchError::StorageHttp(err.to_string()))?;

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            root: layout::root_prefix(workflow.as_str()),
            api_base: "https://storage.googleapis.com/storage/v1/b".to_string(),
            media_base: "https://storage.googleapis.com".to_string(),
        })
    }

    fn list(&self, prefix: &str, delimiter: Option<&str>) -> Result<Vec<RemoteObject>, FetchError> {
        let url = format!("{}/{}/o", self.api_base, self.bucket);
        let full_prefix = format!("{}{}", self.root, prefix);
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let response = self.send_with_retries(|| {
                let mut request = self
                    .client
                    .get(&url)
                    .query(&[("prefix", full_prefix.as_str())]);
                if let Some(delimiter) = delimiter {
                    request = request.query(&[("delimiter", delimiter)]);
                }
                if let Some(token) = &page_token {
                    request = request.query(&[("pageToken", token.as_str())]);
                }
                request
            })?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response
                    .text()
                    .unwrap_or_else(|_| "storage listing failed".to_string());
                return Err(FetchError::StorageStatus { status, message });
            }
            let page: ListPage = response
                .json()
                .map_err(|err| FetchError::StorageHttp(err.to_string()))?;
            objects.extend(
                page.prefixes
                    .into_iter()
                    .map(|name| RemoteObject { name }),
            );
            objects.extend(
                page.items
                    .into_iter()
                    .map(|item| RemoteObject { name: item.name }),
            );
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(objects)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, FetchError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::StorageHttp(err.to_string()));
                }
            }
        }
    }

    fn write_response_to_file(
        &self,
        mut response: reqwest::blocking::Response,
        local_path: &Path,
    ) -> Result<(), FetchError> {
        let parent = local_path
            .parent()
            .ok_or_else(|| FetchError::Filesystem("destination has no parent".to_string()))?;
        fs::create_dir_all(parent).map_err(|err| FetchError::Filesystem(err.to_string()))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".simfetch")
            .tempfile_in(parent)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        io::copy(&mut response, &mut temp)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        temp.persist(local_path)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl ObjectStore for GcsHttpClient {
    fn root_prefix(&self) -> &str {
        &self.root
    }

    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>, FetchError> {
        self.list(prefix, None)
    }

    fn list_children(&self, prefix: &str) -> Result<Vec<RemoteObject>, FetchError> {
        self.list(prefix, Some("/"))
    }

    fn transfer(&self, relative_path: &str, local_path: &Path) -> Result<(), FetchError> {
        let url = format!("{}/{}/{}{}", self.media_base, self.bucket, self.root, relative_path);
        let response = self
            .send_with_retries(|| self.client.get(&url))
            .map_err(|err| FetchError::Transfer {
                path: relative_path.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Transfer {
                path: relative_path.to_string(),
                message: format!("storage returned status {}", response.status().as_u16()),
            });
        }
        self.write_response_to_file(response, local_path)
            .map_err(|err| FetchError::Transfer {
                path: relative_path.to_string(),
                message: err.to_string(),
            })
    }
}

#[derive(Deserialize)]
struct ListPage {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(default)]
    prefixes: Vec<String>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListItem {
    name: String,
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
