// SharePoint REST client for the watched document library

use crate::config::DocumentStoreConfig;
use crate::errors::ConnectivityError;
use crate::models::{FileDescriptor, UploadReceipt};
use crate::store::DocumentStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const ODATA_JSON: &str = "application/json;odata=nometadata";
const MAX_ERROR_BODY: usize = 512;

/// How the client proves its identity to the site
#[derive(Debug, Clone)]
pub enum SharePointCredentials {
    /// Username/password sent on every request
    Basic { username: String, password: String },
    /// Username/password exchanged for a bearer token (OAuth2 password grant)
    OAuth2Password {
        username: String,
        password: String,
        client_id: String,
        token_url: String,
    },
}

impl SharePointCredentials {
    pub fn from_config(config: &DocumentStoreConfig) -> Self {
        match (&config.token_url, &config.client_id) {
            (Some(token_url), Some(client_id)) => SharePointCredentials::OAuth2Password {
                username: config.username.clone(),
                password: config.password.clone(),
                client_id: client_id.clone(),
                token_url: token_url.clone(),
            },
            _ => SharePointCredentials::Basic {
                username: config.username.clone(),
                password: config.password.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ODataCollection<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpFile {
    name: String,
    server_relative_url: String,
    time_created: DateTime<Utc>,
    time_last_modified: DateTime<Utc>,
    #[serde(default)]
    length: Option<serde_json::Value>,
}

impl From<SpFile> for FileDescriptor {
    fn from(file: SpFile) -> Self {
        // Edm.Int64 comes back as a JSON string
        let size = match &file.length {
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
            Some(v) => v.as_u64().unwrap_or(0),
            None => 0,
        };
        FileDescriptor {
            name: file.name,
            path: file.server_relative_url,
            created_at: file.time_created,
            modified_at: file.time_last_modified,
            size,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpUploaded {
    server_relative_url: String,
}

/// SharePoint document library client
pub struct SharePointClient {
    client: Client,
    site_url: String,
    credentials: SharePointCredentials,
    token: Mutex<Option<String>>,
}

impl SharePointClient {
    /// Create a client for `site_url` with the given request timeout
    pub fn new(
        site_url: &str,
        credentials: SharePointCredentials,
        timeout_seconds: u64,
    ) -> Result<Self, ConnectivityError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ConnectivityError::RequestFailed {
                url: site_url.to_string(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            site_url: site_url.trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    pub fn from_config(config: &DocumentStoreConfig) -> Result<Self, ConnectivityError> {
        Self::new(
            &config.site_url,
            SharePointCredentials::from_config(config),
            config.timeout_seconds,
        )
    }

    fn files_url(&self, folder: &str) -> String {
        format!(
            "{}/_api/web/GetFolderByServerRelativeUrl('{}')/Files",
            self.site_url,
            odata_literal(folder)
        )
    }

    fn file_content_url(&self, path: &str) -> String {
        format!(
            "{}/_api/web/GetFileByServerRelativeUrl('{}')/$value",
            self.site_url,
            odata_literal(path)
        )
    }

    fn upload_url(&self, folder: &str, name: &str) -> String {
        format!(
            "{}/add(url='{}',overwrite=true)",
            self.files_url(folder),
            odata_literal(name)
        )
    }

    /// Apply credentials, acquiring a bearer token first if needed
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ConnectivityError> {
        match &self.credentials {
            SharePointCredentials::Basic { username, password } => {
                Ok(request.basic_auth(username, Some(password)))
            }
            SharePointCredentials::OAuth2Password {
                username,
                password,
                client_id,
                token_url,
            } => {
                let mut cached = self.token.lock().await;
                let token = match cached.as_ref() {
                    Some(token) => token.clone(),
                    None => {
                        let token = self
                            .acquire_token(username, password, client_id, token_url)
                            .await?;
                        *cached = Some(token.clone());
                        token
                    }
                };
                Ok(request.bearer_auth(token))
            }
        }
    }

    /// Exchange the credential pair for an access token
    #[instrument(skip(self, password))]
    async fn acquire_token(
        &self,
        username: &str,
        password: &str,
        client_id: &str,
        token_url: &str,
    ) -> Result<String, ConnectivityError> {
        debug!("Acquiring access token");
        let params = [
            ("grant_type", "password"),
            ("client_id", client_id),
            ("username", username),
            ("password", password),
        ];

        let response = self
            .client
            .post(token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ConnectivityError::AuthenticationFailed(format!("Token request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectivityError::AuthenticationFailed(format!(
                "Token request failed with status {}: {}",
                status,
                truncate(&body)
            )));
        }

        let token_response: serde_json::Value = response.json().await.map_err(|e| {
            ConnectivityError::AuthenticationFailed(format!(
                "Failed to parse token response: {}",
                e
            ))
        })?;

        token_response
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ConnectivityError::AuthenticationFailed(
                    "Token response missing access_token field".to_string(),
                )
            })
    }

    /// Send an authorized request and map non-2xx statuses to errors
    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, ConnectivityError> {
        let request = self.authorize(request).await?;
        let response = request
            .send()
            .await
            .map_err(|e| ConnectivityError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            // Force a fresh token on the next call
            *self.token.lock().await = None;
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ConnectivityError::NotFound(url.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(ConnectivityError::UnexpectedStatus {
            url: url.to_string(),
            status: status.as_u16(),
            body: truncate(&body),
        })
    }
}

#[async_trait]
impl DocumentStore for SharePointClient {
    #[instrument(skip(self))]
    async fn list_files(&self, folder: &str) -> Result<Vec<FileDescriptor>, ConnectivityError> {
        let url = self.files_url(folder);
        let request = self.client.get(&url).header(header::ACCEPT, ODATA_JSON);
        let response = self.send(request, &url).await?;

        let listing: ODataCollection<SpFile> =
            response
                .json()
                .await
                .map_err(|e| ConnectivityError::InvalidResponse {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;

        let files: Vec<FileDescriptor> = listing.value.into_iter().map(Into::into).collect();
        info!(file_count = files.len(), "Retrieved files from SharePoint");
        Ok(files)
    }

    #[instrument(skip(self))]
    async fn download_file(&self, path: &str) -> Result<Vec<u8>, ConnectivityError> {
        let url = self.file_content_url(path);
        let response = self.send(self.client.get(&url), &url).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ConnectivityError::RequestFailed {
                url: url.clone(),
                reason: format!("Failed to read response body: {}", e),
            })?;

        debug!(size = bytes.len(), "Downloaded file");
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn upload_file(
        &self,
        folder: &str,
        name: &str,
        data: &[u8],
    ) -> Result<UploadReceipt, ConnectivityError> {
        let url = self.upload_url(folder, name);
        let request = self
            .client
            .post(&url)
            .header(header::ACCEPT, ODATA_JSON)
            .body(data.to_vec());
        let response = self.send(request, &url).await?;

        let path = match response.json::<SpUploaded>().await {
            Ok(uploaded) => uploaded.server_relative_url,
            Err(e) => {
                warn!(error = %e, "Upload response had no ServerRelativeUrl");
                format!("{}/{}", folder.trim_end_matches('/'), name)
            }
        };

        info!(path = %path, "File uploaded to SharePoint");
        Ok(UploadReceipt {
            path,
            size: data.len() as u64,
        })
    }
}

/// Escape a value for use inside a quoted OData string literal in a URL path
fn odata_literal(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('#', "%23")
        .replace('?', "%3F")
        .replace('\'', "''")
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SharePointClient {
        SharePointClient::new(
            "https://contoso.sharepoint.com/sites/Team/",
            SharePointCredentials::Basic {
                username: "user".to_string(),
                password: "pass".to_string(),
            },
            30,
        )
        .unwrap()
    }

    #[test]
    fn test_odata_literal_doubles_quotes() {
        assert_eq!(odata_literal("O'Brien's.xlsx"), "O''Brien''s.xlsx");
        assert_eq!(odata_literal("100%#1?.xlsx"), "100%25%231%3F.xlsx");
    }

    #[test]
    fn test_urls_are_built_from_trimmed_site() {
        let client = client();
        assert_eq!(
            client.files_url("/sites/Team/Shared Documents/Dump"),
            "https://contoso.sharepoint.com/sites/Team/_api/web/GetFolderByServerRelativeUrl('/sites/Team/Shared Documents/Dump')/Files"
        );
        assert_eq!(
            client.upload_url("/Out", "update_a.xlsx"),
            "https://contoso.sharepoint.com/sites/Team/_api/web/GetFolderByServerRelativeUrl('/Out')/Files/add(url='update_a.xlsx',overwrite=true)"
        );
        assert!(client.file_content_url("/Dump/a.xlsx").ends_with("('/Dump/a.xlsx')/$value"));
    }

    #[test]
    fn test_sp_file_length_parses_string_and_number() {
        let json = r#"{"value":[
            {"Name":"a.xlsx","ServerRelativeUrl":"/Dump/a.xlsx","TimeCreated":"2024-05-01T10:00:00Z","TimeLastModified":"2024-05-01T11:00:00Z","Length":"2048"},
            {"Name":"b.xlsx","ServerRelativeUrl":"/Dump/b.xlsx","TimeCreated":"2024-05-01T10:00:00Z","TimeLastModified":"2024-05-01T10:00:00Z","Length":10}
        ]}"#;
        let listing: ODataCollection<SpFile> = serde_json::from_str(json).unwrap();
        let files: Vec<FileDescriptor> = listing.value.into_iter().map(Into::into).collect();

        assert_eq!(files[0].size, 2048);
        assert_eq!(files[1].size, 10);
        assert_eq!(files[0].modified_at.to_rfc3339(), "2024-05-01T11:00:00+00:00");
    }

    #[test]
    fn test_credentials_from_config() {
        let mut config = crate::config::Settings::default().document_store;
        assert!(matches!(
            SharePointCredentials::from_config(&config),
            SharePointCredentials::Basic { .. }
        ));

        config.token_url = Some("https://login.example.com/token".to_string());
        config.client_id = Some("cx-automation".to_string());
        assert!(matches!(
            SharePointCredentials::from_config(&config),
            SharePointCredentials::OAuth2Password { .. }
        ));
    }
}
