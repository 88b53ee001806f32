use std::fmt;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Stage};

pub const PASSWORD_GRANT: &str = "password";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchanges credentials for a bearer token using the OAuth2 password grant.
pub fn fetch_token(
    client: &Client,
    token_url: &str,
    credentials: &Credentials,
) -> Result<String, IngestError> {
    let form = [
        ("grant_type", PASSWORD_GRANT),
        ("username", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
    ];
    let mut request = client.post(token_url).form(&form);
    if let Some(client_id) = &credentials.client_id {
        request = request.basic_auth(client_id, credentials.client_secret.as_deref());
    }

    let response = request.send().map_err(|err| IngestError::Http {
        stage: Stage::Authentication,
        message: err.to_string(),
    })?;
    let status = response.status();
    let body = response.text().map_err(|err| IngestError::Http {
        stage: Stage::Authentication,
        message: err.to_string(),
    })?;
    if !status.is_success() {
        return Err(IngestError::HttpStatus {
            stage: Stage::Authentication,
            status: status.as_u16(),
            message: body,
        });
    }
    parse_token(&body)
}

pub fn parse_token(body: &str) -> Result<String, IngestError> {
    let token: TokenResponse =
        serde_json::from_str(body).map_err(|err| IngestError::RemoteProtocol {
            stage: Stage::Authentication,
            message: format!("no access_token in token response: {err}"),
        })?;
    Ok(token.access_token)
}
