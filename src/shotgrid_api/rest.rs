use std::{
    fmt,
    io::{BufWriter, Write},
    path::Path,
};

use async_trait::async_trait;
use fs_err as fs;
use log::{debug, trace};
use reqwest::{
    header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Request, Response, StatusCode, Url,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::auth::get_access_token;

use super::{EntityType, Filter, RawEntity, ShotgridApiClient, ShotgridApiError, ShotgridCredentials};

/// Content type that selects the `[field, relation, value]` filter syntax on
/// the search endpoint.
const ARRAY_FILTER_CONTENT_TYPE: &str = "application/vnd+shotgun.api3_array+json";

const SESSION_TOKEN_HEADER: &str = "Shotgun-Session-Token";

/// Largest page the search endpoint will return.
const PAGE_SIZE: usize = 500;

const DOWNLOAD_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Deserialize)]
struct ManyResponse {
    data: Vec<RawEntity>,
}

#[derive(Debug, Deserialize)]
struct SingleResponse {
    data: RawEntity,
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    data: Map<String, Value>,
    links: UploadLinks,
}

#[derive(Debug, Deserialize)]
struct UploadLinks {
    upload: String,
    complete_upload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    title: Option<String>,
    detail: Option<String>,
}

pub struct RestClient {
    credentials: ShotgridCredentials,
    site_origin: String,
    api_base: String,
    access_token: RwLock<Option<SecretString>>,
    client: Client,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "RestClient({})", self.api_base)
    }
}

impl RestClient {
    /// Build a client for the site in `credentials` and fetch an initial
    /// access token, so bad credentials surface before any other work.
    pub async fn connect(credentials: ShotgridCredentials) -> Result<Self, ShotgridApiError> {
        Self::connect_with(credentials, Client::new()).await
    }

    async fn connect_with(credentials: ShotgridCredentials, client: Client) -> Result<Self, ShotgridApiError> {
        let site = Url::parse(&credentials.server_url)
            .map_err(|err| ShotgridApiError::InvalidServerUrl(format!("{}: {}", credentials.server_url, err)))?;

        let site_origin = site.origin().ascii_serialization();
        let api_base = format!("{}/api/v1", credentials.server_url.trim_end_matches('/'));

        let client = Self {
            credentials,
            site_origin,
            api_base,
            access_token: RwLock::new(None),
            client,
        };

        client.refresh_access_token().await?;

        Ok(client)
    }

    async fn refresh_access_token(&self) -> Result<(), ShotgridApiError> {
        let Some(api_key) = &self.credentials.api_key else {
            return Err(ShotgridApiError::MissingAuth);
        };

        let token = get_access_token(
            &self.client,
            &self.api_base,
            &self.credentials.script_name,
            api_key,
        )
        .await?;

        debug!("Fetched a new ShotGrid access token");

        let mut access_token = self.access_token.write().await;
        *access_token = Some(token);

        Ok(())
    }

    /// Execute a request generated by the given function, fetching a fresh
    /// access token and retrying once if the current one was rejected.
    async fn execute_with_auth_retry<F>(&self, make_request: F) -> Result<Response, ShotgridApiError>
    where
        F: Fn(&Client) -> Result<Request, ShotgridApiError> + Send,
    {
        let mut request = make_request(&self.client)?;
        self.attach_headers(&mut request).await;

        trace!("{} {}", request.method(), request.url());
        let response = self.client.execute(request).await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                debug!("Access token was rejected, retrying with a new one...");
                self.refresh_access_token().await?;

                let mut new_request = make_request(&self.client)?;
                self.attach_headers(&mut new_request).await;

                Ok(self.client.execute(new_request).await?)
            }
            _ => Ok(response),
        }
    }

    async fn attach_headers(&self, request: &mut Request) {
        let access_token = self.access_token.read().await;

        if let Some(token) = access_token.as_ref() {
            let bearer = format!("Bearer {}", token.expose_secret());

            if let Ok(mut value) = HeaderValue::from_str(&bearer) {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
            }
        }
    }

    /// Links returned by the API are usually site-relative paths.
    fn resolve_link(&self, link: &str) -> String {
        if link.starts_with('/') {
            format!("{}{}", self.site_origin, link)
        } else {
            link.to_owned()
        }
    }

    fn is_on_site(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.origin().ascii_serialization() == self.site_origin,
            Err(_) => false,
        }
    }

    fn entity_url(&self, entity: EntityType) -> String {
        format!("{}/entity/{}", self.api_base, entity.api_name())
    }
}

#[async_trait]
impl ShotgridApiClient for RestClient {
    async fn find(
        &self,
        entity: EntityType,
        filters: &[Filter],
        fields: &[&str],
    ) -> Result<Vec<RawEntity>, ShotgridApiError> {
        let url = format!("{}/_search", self.entity_url(entity));
        let fields = if fields.is_empty() {
            "id".to_owned()
        } else {
            fields.join(",")
        };
        let body = json!({ "filters": filters });
        let page_size = PAGE_SIZE.to_string();

        let mut records = Vec::new();
        for page in 1.. {
            let page_number = page.to_string();

            let response = self
                .execute_with_auth_retry(|client| {
                    Ok(client
                        .post(&url)
                        .query(&[
                            ("fields", fields.as_str()),
                            ("page[size]", page_size.as_str()),
                            ("page[number]", page_number.as_str()),
                        ])
                        .header(CONTENT_TYPE, ARRAY_FILTER_CONTENT_TYPE)
                        .json(&body)
                        .build()?)
                })
                .await?;

            let batch: ManyResponse = read_json(response).await?;
            let batch_len = batch.data.len();
            records.extend(batch.data);

            if batch_len < PAGE_SIZE {
                break;
            }
        }

        debug!(
            "Found {} {} record(s) matching {:?}",
            records.len(),
            entity.type_name(),
            filters
        );

        Ok(records)
    }

    async fn create(
        &self,
        entity: EntityType,
        data: Map<String, Value>,
    ) -> Result<RawEntity, ShotgridApiError> {
        let url = self.entity_url(entity);
        let fields: Vec<&str> = data.keys().map(String::as_str).collect();
        let fields = fields.join(",");

        let response = self
            .execute_with_auth_retry(|client| {
                Ok(client
                    .post(&url)
                    .query(&[("options[fields]", fields.as_str())])
                    .json(&data)
                    .build()?)
            })
            .await?;

        let created: SingleResponse = read_json(response).await?;
        Ok(created.data)
    }

    async fn upload(
        &self,
        entity: EntityType,
        id: u64,
        path: &Path,
        field: &str,
    ) -> Result<(), ShotgridApiError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_owned();

        let url = format!("{}/{}/{}/_upload", self.entity_url(entity), id, field);

        let response = self
            .execute_with_auth_retry(|client| {
                Ok(client
                    .get(&url)
                    .query(&[("filename", file_name.as_str())])
                    .build()?)
            })
            .await?;

        let upload_target: UploadUrlResponse = read_json(response).await?;
        let mut upload_info = upload_target.data;

        let contents = fs::read(path)?;
        let upload_url = self.resolve_link(&upload_target.links.upload);
        debug!("Uploading {} byte(s) to {}", contents.len(), upload_url);

        // Presigned storage URLs reject extra authorization headers.
        let response = if self.is_on_site(&upload_url) {
            self.execute_with_auth_retry(|client| {
                Ok(client
                    .put(&upload_url)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(contents.clone())
                    .build()?)
            })
            .await?
        } else {
            self.client
                .put(&upload_url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(contents)
                .send()
                .await?
        };

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(error_from_body(status, body));
        }

        // Site-hosted storage answers the PUT with the id of the stored
        // upload, which the completion call needs.
        if let Ok(Value::Object(put_response)) = serde_json::from_str::<Value>(&body) {
            if let Some(Value::Object(data)) = put_response.get("data") {
                upload_info.extend(data.clone());
            }
        }

        if let Some(complete_upload) = upload_target.links.complete_upload {
            let complete_url = self.resolve_link(&complete_upload);
            let payload = json!({ "upload_info": upload_info, "upload_data": {} });

            let response = self
                .execute_with_auth_retry(|client| Ok(client.post(&complete_url).json(&payload).build()?))
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await?;
                return Err(error_from_body(status, body));
            }
        }

        Ok(())
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64, ShotgridApiError> {
        let url = self.resolve_link(url);

        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.credentials.api_key {
            if let Ok(mut value) = HeaderValue::from_str(api_key.expose_secret()) {
                value.set_sensitive(true);
                request = request.header(SESSION_TOKEN_HEADER, value);
            }
        }

        let mut response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status, body));
        }

        match write_body(&mut response, destination).await {
            Ok(written) => Ok(written),
            Err(err) => {
                // Don't leave a truncated file behind to be mistaken for a
                // finished download.
                if let Err(remove_err) = fs::remove_file(destination) {
                    debug!("Could not remove partial download: {}", remove_err);
                }
                Err(err)
            }
        }
    }
}

async fn write_body(response: &mut Response, destination: &Path) -> Result<u64, ShotgridApiError> {
    let mut file = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, fs::File::create(destination)?);
    let mut written = 0;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)?;
        written += chunk.len() as u64;
    }

    file.flush()?;

    Ok(written)
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ShotgridApiError> {
    let status = response.status();
    let body = response.text().await?;

    // Some errors will be reported through HTTP status codes, handled here.
    if status.is_success() {
        match serde_json::from_str(&body) {
            Ok(parsed) => Ok(parsed),
            Err(source) => Err(ShotgridApiError::BadResponseJson { body, source }),
        }
    } else {
        Err(error_from_body(status, body))
    }
}

/// ShotGrid reports most failures as a JSON:API style `errors` list. Anything
/// else is kept verbatim.
fn error_from_body(status: StatusCode, body: String) -> ShotgridApiError {
    let messages: Vec<String> = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => parsed
            .errors
            .into_iter()
            .filter_map(|entry| match (entry.title, entry.detail) {
                (Some(title), Some(detail)) => Some(format!("{}: {}", title, detail)),
                (Some(message), None) | (None, Some(message)) => Some(message),
                (None, None) => None,
            })
            .collect(),
        Err(_) => Vec::new(),
    };

    if messages.is_empty() {
        ShotgridApiError::ResponseError { status, body }
    } else {
        ShotgridApiError::ApiError {
            message: format!("{} ({})", messages.join("; "), status),
        }
    }
}
