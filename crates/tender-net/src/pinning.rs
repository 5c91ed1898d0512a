//! Content pinning against a Pinata-compatible `pinFileToIPFS` endpoint.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use tender_shared::PinnedContent;

use crate::error::{NetError, Result};
use crate::traits::ContentPinner;

/// Project tag attached to every pin.
const PIN_PROJECT: &str = "BlockTender";

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Debug, Clone)]
pub struct PinataPinner {
    http: reqwest::Client,
    url: String,
    jwt: String,
}

impl PinataPinner {
    pub fn new(http: reqwest::Client, url: impl Into<String>, jwt: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            jwt: jwt.into(),
        }
    }
}

/// Hex BLAKE3 digest recorded on-chain next to the content id.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

#[async_trait]
impl ContentPinner for PinataPinner {
    async fn pin(&self, name: &str, bytes: &[u8]) -> Result<PinnedContent> {
        if bytes.is_empty() {
            return Err(NetError::Upload("empty payload".to_string()));
        }

        let hash = content_hash(bytes);

        let metadata = json!({
            "name": name,
            "keyvalues": { "project": PIN_PROJECT },
        });
        let options = json!({ "cidVersion": 1 });

        let form = Form::new()
            .part(
                "file",
                Part::bytes(bytes.to_vec()).file_name(name.to_string()),
            )
            .text("pinataMetadata", metadata.to_string())
            .text("pinataOptions", options.to_string());

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| NetError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetError::Upload(format!("pinning service returned {status}")));
        }

        let body: PinResponse = response
            .json()
            .await
            .map_err(|e| NetError::Upload(format!("unreadable pinning response: {e}")))?;

        info!(name, cid = %body.ipfs_hash, size = bytes.len(), "Content pinned");

        Ok(PinnedContent {
            content_id: body.ipfs_hash,
            content_hash: hash,
        })
    }
}
