// Access token acquisition. A token is obtained once per run, either
// straight from the settings or by exchanging client credentials.

use crate::config::Settings;
use crate::error::{ImportError, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A ready-made bearer token.
    Token(String),
    ClientCredentials {
        client_id: String,
        client_secret: String,
        audience: String,
    },
}

impl Credentials {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if let Some(token) = &settings.token {
            return Ok(Credentials::Token(token.clone()));
        }
        match (&settings.client_id, &settings.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Credentials::ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                audience: settings.audience.clone(),
            }),
            _ => Err(ImportError::Config(
                "no credentials: set CATALOG_IMPORTER_TOKEN, or CATALOG_IMPORTER_CLIENT_ID and CATALOG_IMPORTER_CLIENT_SECRET"
                    .into(),
            )),
        }
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
    grant_type: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Turn credentials into a bearer token, calling `POST /oauth/token`
/// when needed.
pub fn acquire_token(client: &Client, base_url: &str, credentials: &Credentials) -> Result<String> {
    let (client_id, client_secret, audience) = match credentials {
        Credentials::Token(token) => return Ok(token.clone()),
        Credentials::ClientCredentials {
            client_id,
            client_secret,
            audience,
        } => (client_id, client_secret, audience),
    };

    let url = format!("{}/oauth/token", base_url.trim_end_matches('/'));
    tracing::debug!(%url, "requesting access token");
    let res = client
        .post(&url)
        .json(&TokenRequest {
            client_id,
            client_secret,
            audience,
            grant_type: "token",
        })
        .send()?;

    if !res.status().is_success() {
        let status = res.status();
        let txt = res.text().unwrap_or_default();
        return Err(ImportError::Transport(format!(
            "token request failed with status {}: {}",
            status, txt
        )));
    }
    let body: TokenResponse = res
        .json()
        .map_err(|e| ImportError::Transport(format!("parsing token response: {}", e)))?;
    Ok(body.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_takes_precedence() {
        let settings = Settings {
            token: Some("tok".into()),
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            ..Settings::default()
        };
        assert_eq!(
            Credentials::from_settings(&settings).unwrap(),
            Credentials::Token("tok".into())
        );
    }

    #[test]
    fn client_credentials_need_both_halves() {
        let settings = Settings {
            client_id: Some("id".into()),
            ..Settings::default()
        };
        assert!(matches!(
            Credentials::from_settings(&settings),
            Err(ImportError::Config(_))
        ));

        let settings = Settings {
            client_secret: Some("secret".into()),
            ..settings
        };
        match Credentials::from_settings(&settings).unwrap() {
            Credentials::ClientCredentials { audience, .. } => {
                assert_eq!(audience, crate::config::DEFAULT_AUDIENCE)
            }
            other => panic!("unexpected credentials {:?}", other),
        }
    }
}
