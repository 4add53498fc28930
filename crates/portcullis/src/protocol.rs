//! Challenge protocol at the HTTP boundary.
//!
//! Request side: find the caller's verification token, either in the
//! `X-Recaptcha-Answer` header (base64) or as an `acr_values` entry
//! `recaptcha:<token>`. The header wins when both are present.
//!
//! Response side: the challenge demand is a 401 carrying
//! `WWW-Authenticate: recaptcha url="<challenge path>"`.

use axum::{
    Json,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, WWW_AUTHENTICATE},
    },
    response::{IntoResponse, Response},
};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
};
use portcullis_common::{
    PortcullisError,
    constants::{
        CHALLENGE_SCHEME,
        form_fields::{ACR_VALUES, GRANT_TYPE},
        headers::X_RECAPTCHA_ANSWER,
    },
};
use serde::Serialize;
use url::form_urlencoded;

/// Where a verification token was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCarrier {
    Header,
    AcrValue,
}

/// Caller-supplied verification token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationToken {
    pub value: String,
    pub carrier: TokenCarrier,
}

/// The fields of an OAuth2 token request the guard cares about.
/// Everything else is forwarded untouched.
///
/// Repeated fields are all kept: the guard cannot know which occurrence the
/// token endpoint will honour.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokenRequestForm {
    pub grant_types: Vec<String>,
    pub acr_values: Vec<String>,
}

impl TokenRequestForm {
    /// Parse an `application/x-www-form-urlencoded` body. Never fails:
    /// invalid percent-escapes and UTF-8 are decoded lossily.
    pub fn parse(body: &[u8]) -> Self {
        let mut form = Self::default();
        for (name, value) in form_urlencoded::parse(body) {
            match name.as_ref() {
                GRANT_TYPE => form.grant_types.push(value.into_owned()),
                ACR_VALUES => form.acr_values.push(value.into_owned()),
                _ => {}
            }
        }
        form
    }
}

#[derive(Serialize)]
struct ChallengeBody<'a> {
    error: &'static str,
    error_description: &'static str,
    challenge_url: &'a str,
}

/// Encodes and decodes the challenge exchange
#[derive(Debug, Clone)]
pub struct ChallengeProtocol {
    challenge_url: String,
    www_authenticate: HeaderValue,
}

impl ChallengeProtocol {
    /// # Errors
    /// Rejects URLs that cannot be carried in a quoted header parameter.
    pub fn new(challenge_url: &str) -> Result<Self, PortcullisError> {
        if challenge_url.is_empty() || challenge_url.contains(['"', '\\']) {
            return Err(PortcullisError::Config(format!(
                "challenge url cannot be quoted: {:?}",
                challenge_url
            )));
        }

        let www_authenticate =
            HeaderValue::from_str(&format!("{} url=\"{}\"", CHALLENGE_SCHEME, challenge_url))
                .map_err(|e| PortcullisError::Config(format!("challenge url: {}", e)))?;

        Ok(Self {
            challenge_url: challenge_url.to_string(),
            www_authenticate,
        })
    }

    /// Pick the verification token for this request, header first
    pub fn extract_token(
        &self,
        headers: &HeaderMap,
        form: &TokenRequestForm,
    ) -> Option<VerificationToken> {
        if let Some(value) = header_token(headers) {
            return Some(VerificationToken {
                value,
                carrier: TokenCarrier::Header,
            });
        }

        acr_token(&form.acr_values).map(|value| VerificationToken {
            value,
            carrier: TokenCarrier::AcrValue,
        })
    }

    /// Build the 401 challenge demand
    pub fn challenge(&self) -> Response {
        let body = ChallengeBody {
            error: "recaptcha_required",
            error_description: "complete the human verification challenge and retry",
            challenge_url: &self.challenge_url,
        };

        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(WWW_AUTHENTICATE, self.www_authenticate.clone());
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

/// Decode the base64 answer header. Anything undecodable counts as absent.
fn header_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(X_RECAPTCHA_ANSWER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    let bytes = match STANDARD.decode(raw).or_else(|_| STANDARD_NO_PAD.decode(raw)) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring undecodable answer header");
            return None;
        }
    };

    String::from_utf8(bytes).ok().filter(|t| !t.is_empty())
}

/// Find the first `recaptcha:<token>` among space-separated acr values
fn acr_token(acr_values: &[String]) -> Option<String> {
    acr_values
        .iter()
        .flat_map(|values| values.split_whitespace())
        .filter_map(|value| value.split_once(':'))
        .find(|(scheme, token)| *scheme == CHALLENGE_SCHEME && !token.is_empty())
        .map(|(_, token)| token.to_string())
}
