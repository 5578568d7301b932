use serde::{Deserialize, Serialize};

/// Body of `POST /api/generate-alt-text`. Absent fields deserialize to empty
/// strings so a missing field and an empty one are rejected the same way.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAltTextRequest {
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAltTextResponse {
    pub alt_text: String,
}
