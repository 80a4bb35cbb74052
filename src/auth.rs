//! Exchanging script credentials for a REST API access token.

use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::shotgrid_api::ShotgridApiError;

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
}

pub async fn get_access_token(
    client: &Client,
    api_base: &str,
    script_name: &str,
    api_key: &SecretString,
) -> Result<SecretString, ShotgridApiError> {
    let response = client
        .post(format!("{}/auth/access_token", api_base))
        .header(header::ACCEPT, "application/json")
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", script_name),
            ("client_secret", api_key.expose_secret().as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ShotgridApiError::ResponseError { status, body });
    }

    let parsed: AccessTokenResponse = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(source) => return Err(ShotgridApiError::BadResponseJson { body, source }),
    };

    match parsed.access_token {
        Some(token) if !token.is_empty() => Ok(SecretString::new(token)),
        _ => Err(ShotgridApiError::MissingAccessToken),
    }
}
