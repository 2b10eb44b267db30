use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use polaris_types::Did;

use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;

/// Header carrying the calling device's id as 32 hex characters.
pub const DEVICE_HEADER: &str = "x-polaris-device";

/// Works out which device sent a request.
#[async_trait]
pub trait DeviceAuthenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> ServerResult<Did>;
}

/// Trusts the device id in [`DEVICE_HEADER`]. Suitable behind a proxy that
/// has already authenticated the device.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderDeviceAuth;

#[async_trait]
impl DeviceAuthenticator for HeaderDeviceAuth {
    async fn authenticate(&self, headers: &HeaderMap) -> ServerResult<Did> {
        let value = headers
            .get(DEVICE_HEADER)
            .ok_or_else(|| ServerError::Unauthenticated(format!("missing {DEVICE_HEADER}")))?;
        let text = value
            .to_str()
            .map_err(|_| ServerError::Unauthenticated(format!("{DEVICE_HEADER} is not ASCII")))?;
        Did::from_hex(text.trim())
            .map_err(|e| ServerError::Unauthenticated(format!("bad device id: {e}")))
    }
}

/// Extractor for the authenticated device of a request.
#[derive(Clone, Copy, Debug)]
pub struct Device(pub Did);

#[async_trait]
impl FromRequestParts<AppState> for Device {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let did = state.auth.authenticate(&parts.headers).await?;
        Ok(Device(did))
    }
}
