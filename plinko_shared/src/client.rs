use plinko_core::{PlinkoError, PlinkoResult};
use tracing::debug;

use crate::{ErrorBody, RotateResponse};

/// HTTP client for the server's admin routes. Seed rotation has to go through
/// the running server: it owns the live session.
#[derive(Debug, Clone)]
pub struct AdminClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn rotate_seed(&self) -> PlinkoResult<RotateResponse> {
        let url = format!("{}/admin/rotate-seed", self.base_url);
        debug!(%url, "requesting seed rotation");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| PlinkoError::Persistence(format!("contacting server: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = match resp.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            return Err(if status == reqwest::StatusCode::UNAUTHORIZED {
                PlinkoError::Configuration(format!("server rejected the api key: {detail}"))
            } else {
                PlinkoError::Persistence(format!("rotation failed ({status}): {detail}"))
            });
        }
        resp.json::<RotateResponse>()
            .await
            .map_err(|e| PlinkoError::Persistence(format!("decoding rotation: {e}")))
    }
}
