//! Google OAuth2 authorization-code login

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use udulib_common::config::GoogleOAuthConfig;
use url::Url;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const SCOPES: &str = "openid email profile";

/// Identity returned by the userinfo endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    /// Stable Google account id
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleOAuth {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GoogleOAuth {
    /// `None` when client id or secret is missing
    pub fn from_config(config: &GoogleOAuthConfig) -> Result<Option<Self>> {
        if !config.is_configured() {
            return Ok(None);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build OAuth HTTP client")?;
        Ok(Some(Self {
            client,
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone().unwrap_or_default(),
            redirect_uri: config.redirect_uri.clone(),
        }))
    }

    /// Consent page URL carrying the one-time `state`
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
                ("access_type", "online"),
                ("prompt", "select_account"),
            ],
        )?;
        Ok(url.into())
    }

    /// Exchange an authorization code and fetch the account profile
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleProfile> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("redirect_uri", &self.redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("Token request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Token endpoint returned {}: {}", status, body);
        }
        let token: TokenResponse = response.json().await.context("Malformed token response")?;

        let response = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("Userinfo request failed")?;
        if !response.status().is_success() {
            bail!("Userinfo endpoint returned {}", response.status());
        }
        let profile: GoogleProfile = response.json().await.context("Malformed userinfo response")?;
        debug!("Google login for {} (sub={})", profile.email, profile.sub);
        Ok(profile)
    }
}

/// Frontend redirect carrying the issued token
pub fn frontend_redirect(base: &str, token: &str) -> Result<String> {
    let url = Url::parse_with_params(base, &[("token", token)])?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> GoogleOAuthConfig {
        GoogleOAuthConfig {
            client_id: Some("client-1".into()),
            client_secret: Some("secret".into()),
            ..GoogleOAuthConfig::default()
        }
    }

    #[test]
    fn test_unconfigured_is_none() {
        assert!(GoogleOAuth::from_config(&GoogleOAuthConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_authorize_url_params() {
        let oauth = GoogleOAuth::from_config(&configured()).unwrap().unwrap();
        let url = Url::parse(&oauth.authorize_url("st4te").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["state"], "st4te");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "openid email profile");
    }

    #[test]
    fn test_frontend_redirect() {
        let url = frontend_redirect("http://localhost:3000/auth/callback", "a.b.c").unwrap();
        assert_eq!(url, "http://localhost:3000/auth/callback?token=a.b.c");
    }
}
