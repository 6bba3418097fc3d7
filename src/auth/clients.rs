use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;

use crate::{config::Config, AppError, AppResult, GetField};

/// Talks to the hosted identity provider. Passwords, email confirmation and
/// token issuance all live there; we only keep the resulting user id and
/// access token in the session.
#[derive(Clone)]
pub struct IdentityProvider {
    http_client: reqwest::Client,
    auth_url: String,
    api_key: String,
    recovery_redirect: String,
}

#[derive(Debug, Clone)]
pub struct Tokens {
    pub user_id: String,
    pub access_token: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

impl IdentityProvider {
    pub fn from_config(config: &Config) -> anyhow::Result<IdentityProvider> {
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(
            IdentityProvider {
                http_client,
                auth_url: config.auth_url.trim_end_matches('/').to_owned(),
                api_key: config.auth_api_key.clone(),
                recovery_redirect: format!(
                    "{}/auth/reset-password/callback",
                    config.site_url.trim_end_matches('/'),
                ),
            }
        )
    }

    fn request(&self, method: reqwest::Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}/auth/v1{path}", self.auth_url))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer.unwrap_or(self.api_key.as_str()))
    }

    /// Registers a new account. Provider-side refusals (weak password,
    /// address already registered, ...) come back as 400 with the provider's
    /// own wording.
    pub async fn sign_up(&self, email: &str, password: &str) -> AppResult<()> {
        let response = self.request(reqwest::Method::POST, "/signup", None)
            .json(&Credentials { email, password })
            .send()
            .await?;

        refusal_to_bad_request(response).await
    }

    /// Exchanges an email and password for tokens. `None` when the provider
    /// refuses the credentials.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<Option<Tokens>> {
        let response = self.request(reqwest::Method::POST, "/token?grant_type=password", None)
            .json(&Credentials { email, password })
            .send()
            .await?;

        if response.status().is_client_error() {
            tracing::debug!(status = %response.status(), "identity provider refused credentials");
            return Ok(None);
        }

        let body: Value = response.error_for_status()?.json().await?;
        Ok(Some(Tokens {
            user_id: body.get_obj_field("user")?.get_str_field("id")?,
            access_token: body.get_str_field("access_token")?,
        }))
    }

    /// Asks the provider to email a password-reset link pointing back at
    /// `/auth/reset-password/callback`.
    pub async fn recover(&self, email: &str) -> AppResult<()> {
        #[derive(Serialize)]
        struct Recover<'a> {
            email: &'a str,
        }

        self.request(reqwest::Method::POST, "/recover", None)
            .query(&[("redirect_to", self.recovery_redirect.as_str())])
            .json(&Recover { email })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Resolves an access token to its user id. `None` when the token is
    /// invalid or expired.
    pub async fn user_id(&self, access_token: &str) -> AppResult<Option<String>> {
        let response = self.request(reqwest::Method::GET, "/user", Some(access_token))
            .send()
            .await?;

        if response.status().is_client_error() {
            return Ok(None);
        }

        let body: Value = response.error_for_status()?.json().await?;
        Ok(Some(body.get_str_field("id")?))
    }

    pub async fn update_password(&self, access_token: &str, password: &str) -> AppResult<()> {
        #[derive(Serialize)]
        struct UpdateUser<'a> {
            password: &'a str,
        }

        let response = self.request(reqwest::Method::PUT, "/user", Some(access_token))
            .json(&UpdateUser { password })
            .send()
            .await?;

        refusal_to_bad_request(response).await
    }
}

async fn refusal_to_bad_request(response: Response) -> AppResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body: Value = response.json().await.unwrap_or(Value::Null);
    if status.is_client_error() {
        return Err(AppError::bad_request(provider_message(&body)));
    }

    Err(format!("identity provider answered {status}: {body}").into())
}

/// The provider reports errors under different keys depending on the endpoint.
fn provider_message(body: &Value) -> String {
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| body.get_str_field(key).ok())
        .unwrap_or_else(|| "request was rejected by the identity provider".to_owned())
}
