//! Google Sheets v4 backend, authorised with a service-account key.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SheetsConfig;
use crate::sheets::{cell_text, SheetsError, Worksheet};

const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
/// Refresh tokens this long before Google says they expire.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Supplies bearer tokens for Google API calls.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, SheetsError>;
}

/// A fixed token, for tests or tokens minted outside the process.
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, SheetsError> {
        Ok(self.0.clone())
    }
}

/// The fields we need from a downloaded service-account JSON key.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// OAuth2 JWT-bearer flow for service accounts. Tokens are cached until shortly before expiry.
pub struct ServiceAccountAuth {
    client: Client,
    key: ServiceAccountKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, client: Client) -> Self {
        Self {
            client,
            key,
            cached: Mutex::new(None),
        }
    }

    pub fn from_file(path: &Path, client: Client) -> Result<Self, SheetsError> {
        let credentials_error = |message: String| SheetsError::Credentials {
            path: path.display().to_string(),
            message,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| credentials_error(e.to_string()))?;
        let key: ServiceAccountKey =
            serde_json::from_str(&raw).map_err(|e| credentials_error(e.to_string()))?;
        Ok(Self::new(key, client))
    }

    fn signed_assertion(&self) -> Result<String, SheetsError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_SLACK {
                return Ok(token.token.clone());
            }
        }

        let assertion = self.signed_assertion()?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = ensure_success(response).await?.json().await?;
        debug!(expires_in = token.expires_in, "Obtained Google access token");

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }
}

/// Base URLs for the Google APIs; overridable so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub sheets: String,
    pub drive: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            sheets: "https://sheets.googleapis.com".to_string(),
            drive: "https://www.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

pub struct GoogleWorksheet {
    client: Client,
    auth: Arc<dyn AccessTokenProvider>,
    sheets_base: String,
    spreadsheet_id: String,
    tab: String,
}

impl GoogleWorksheet {
    /// Authorises with the configured service account and opens the configured tab.
    pub async fn open(config: &SheetsConfig) -> Result<Self, SheetsError> {
        let client = Client::builder().build()?;
        let auth: Arc<dyn AccessTokenProvider> = match &config.access_token {
            Some(token) => Arc::new(StaticToken(token.clone())),
            None => Arc::new(ServiceAccountAuth::from_file(
                &config.service_account_json,
                client.clone(),
            )?),
        };
        Self::connect(
            client,
            auth,
            GoogleEndpoints::default(),
            config.sheet_id.as_deref(),
            &config.sheet_name,
            &config.tab,
        )
        .await
    }

    /// Resolves the spreadsheet (by id, else by Drive title lookup) and binds to `tab`.
    pub async fn connect(
        client: Client,
        auth: Arc<dyn AccessTokenProvider>,
        endpoints: GoogleEndpoints,
        sheet_id: Option<&str>,
        sheet_name: &str,
        tab: &str,
    ) -> Result<Self, SheetsError> {
        let spreadsheet_id = match sheet_id {
            Some(id) => id.to_string(),
            None => find_spreadsheet(&client, auth.as_ref(), &endpoints.drive, sheet_name).await?,
        };
        info!(spreadsheet_id = %spreadsheet_id, tab, "Opened worksheet");

        Ok(Self {
            client,
            auth,
            sheets_base: endpoints.sheets.trim_end_matches('/').to_string(),
            spreadsheet_id,
            tab: tab.to_string(),
        })
    }

    /// `'tab'` or `'tab'!A5`, URL-encoded for use as a path segment.
    fn range(&self, cell: Option<&str>) -> String {
        let quoted = format!("'{}'", self.tab.replace('\'', "''"));
        let range = match cell {
            Some(cell) => format!("{quoted}!{cell}"),
            None => quoted,
        };
        urlencoding::encode(&range).into_owned()
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.sheets_base, self.spreadsheet_id, range
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SheetsError> {
        let token = self.auth.access_token().await?;
        ensure_success(request.bearer_auth(token).send().await?).await
    }
}

#[async_trait]
impl Worksheet for GoogleWorksheet {
    async fn get_all_values(&self) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = self.values_url(&self.range(None));
        let body: ValueRange = self.send(self.client.get(url)).await?.json().await?;
        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn append_row(&self, row: &[String]) -> Result<(), SheetsError> {
        let url = format!("{}:append", self.values_url(&self.range(Some("A1"))));
        let request = self
            .client
            .post(url)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "majorDimension": "ROWS", "values": [row] }));
        self.send(request).await?;
        Ok(())
    }

    async fn update(&self, start_cell: &str, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        let url = self.values_url(&self.range(Some(start_cell)));
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "majorDimension": "ROWS", "values": rows }));
        self.send(request).await?;
        Ok(())
    }
}

async fn find_spreadsheet(
    client: &Client,
    auth: &dyn AccessTokenProvider,
    drive_base: &str,
    name: &str,
) -> Result<String, SheetsError> {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    let query = format!("name = '{escaped}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false");
    let token = auth.access_token().await?;

    let response = client
        .get(format!("{}/drive/v3/files", drive_base.trim_end_matches('/')))
        .query(&[
            ("q", query.as_str()),
            ("fields", "files(id,name)"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ])
        .bearer_auth(token)
        .send()
        .await?;
    let list: FileList = ensure_success(response).await?.json().await?;

    list.files
        .into_iter()
        .next()
        .map(|f| f.id)
        .ok_or_else(|| SheetsError::SpreadsheetNotFound(name.to_string()))
}

async fn ensure_success(response: Response) -> Result<Response, SheetsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SheetsError::Api {
        status: status.as_u16(),
        message,
    })
}
