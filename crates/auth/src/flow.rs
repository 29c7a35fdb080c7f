//! Authorization-code flow helpers.

use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AuthError;

/// Random bytes per `state`, hex encoded on the wire.
const STATE_BYTES: usize = 16;

/// Client registration for the authorization endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub auth_endpoint: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

/// A prepared authorization page and the `state` it must echo back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

impl OAuthClientConfig {
    /// Builds the authorization page URL with a fresh `state` token.
    pub fn authorization_request(&self) -> Result<AuthorizationRequest, AuthError> {
        let state = generate_state();
        let mut url = Url::parse(&self.auth_endpoint)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", &state);
        Ok(AuthorizationRequest { url, state })
    }
}

/// Extracts the authorization code from the redirect the page ended on.
///
/// `error=access_denied` means the user declined and maps to
/// [`AuthError::Cancelled`].
pub fn extract_auth_code(redirect: &str, expected_state: &str) -> Result<String, AuthError> {
    let url = Url::parse(redirect)?;
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(if error == "access_denied" {
            AuthError::Cancelled
        } else {
            AuthError::Denied(error)
        });
    }
    if !state.is_some_and(|state| validate_state(&state, expected_state)) {
        return Err(AuthError::StateMismatch);
    }
    code.filter(|code| !code.is_empty())
        .ok_or(AuthError::MissingCode)
}

/// Fresh anti-forgery `state` for one authorization page.
pub fn generate_state() -> String {
    let bytes: [u8; STATE_BYTES] = rand::thread_rng().r#gen();
    hex::encode(bytes)
}

/// Checks the `state` echoed by the redirect. Equal-length inputs are
/// compared over every byte.
pub fn validate_state(received: &str, expected: &str) -> bool {
    let (received, expected) = (received.as_bytes(), expected.as_bytes());
    received.len() == expected.len()
        && received
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (r, e)| diff | (r ^ e))
            == 0
}
