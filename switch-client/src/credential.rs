//! Credential exchange: `GET Token` with the signed request headers.

use serde::Deserialize;
use url::Url;

use switch_common::{
    AccessCredential, ConnectionProfile, SignatureScheme, SwitchError, SwitchResult, TokenRequest,
};

use crate::http::{HttpMethod, HttpRequest, HttpTransport};

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(rename = "AccessToken")]
    access_token: Option<String>,
}

/// Builds the token call for `profile` against the secure base address.
pub(crate) fn token_request(
    credential_base: &Url,
    profile: &ConnectionProfile,
    scheme: SignatureScheme,
) -> SwitchResult<HttpRequest> {
    let url = credential_base
        .join("Token")
        .map_err(|err| SwitchError::Configuration(format!("token address: {err}")))?;
    let signed = TokenRequest::for_profile(profile, scheme)?;

    let mut headers = vec![("Accept", "application/json".to_string())];
    headers.extend(signed.headers());

    Ok(HttpRequest {
        method: HttpMethod::Get,
        url,
        headers,
        body: None,
    })
}

/// Exchanges the profile's key and signature for an access credential.
pub(crate) async fn exchange(
    transport: &dyn HttpTransport,
    credential_base: &Url,
    profile: &ConnectionProfile,
    scheme: SignatureScheme,
) -> SwitchResult<AccessCredential> {
    let request = token_request(credential_base, profile, scheme)?;
    let response = transport
        .execute(request)
        .await
        .map_err(|err| SwitchError::Credential {
            status: None,
            message: err.to_string(),
        })?;

    if response.status != 200 {
        return Err(SwitchError::Credential {
            status: Some(response.status),
            message: response.body,
        });
    }

    let parsed: TokenResponse =
        serde_json::from_str(&response.body).map_err(|err| SwitchError::Credential {
            status: Some(response.status),
            message: format!("unreadable token response: {err}"),
        })?;
    match parsed.access_token {
        Some(token) if !token.is_empty() => Ok(AccessCredential::new(token, profile.expires_at())),
        _ => Err(SwitchError::Credential {
            status: Some(response.status),
            message: "token response has no AccessToken".into(),
        }),
    }
}
