//! Identity credentials and the user record derived from them.
//!
//! The identity provider hands back a signed JWT. Decoding here only reads
//! the payload; the signature is the provider's concern, and the token is
//! confirmed by the authorization handshake that follows.

use std::collections::BTreeMap;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DecodeError;
use crate::provider::CredentialDecoder;

/// Decoded identity claims.
///
/// The whitelisted fields are typed; everything else the provider sent is
/// kept in `extra` and travels with lifecycle events as the raw payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The signed-in user, as exposed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture_url: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    /// Extract the whitelisted subset of claims.
    pub fn from_claims(claims: &Claims) -> Result<Self, DecodeError> {
        let email = claims
            .email
            .clone()
            .ok_or(DecodeError::MissingClaim("email"))?;
        Ok(Self {
            email,
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
            picture_url: claims.picture.clone(),
            display_name: claims.name.clone(),
        })
    }
}

/// Decodes the payload segment of a JWT without verifying its signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtDecoder;

impl CredentialDecoder for JwtDecoder {
    fn decode(&self, token: &str) -> Result<Claims, DecodeError> {
        let segments: Vec<&str> = token.trim().split('.').collect();
        if segments.len() != 3 {
            return Err(DecodeError::Segments(segments.len()));
        }

        let payload = segments[1];
        // Providers normally strip padding, but tolerate it when present
        let bytes = if payload.ends_with('=') {
            URL_SAFE.decode(payload)
        } else {
            URL_SAFE_NO_PAD.decode(payload)
        }
        .map_err(|e| {
            debug!(payload = %DecodeError::excerpt(payload), "Credential payload rejected");
            DecodeError::Base64(e.to_string())
        })?;

        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))
    }
}
