use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateVideosRequest {
    pub instances: Vec<PromptInstance>,
    pub parameters: GenerateVideosParameters,
}

impl GenerateVideosRequest {
    /// A request for exactly one video.
    pub fn single(prompt: &str) -> Self {
        Self {
            instances: vec![PromptInstance { prompt: prompt.to_string() }],
            parameters: GenerateVideosParameters { sample_count: 1 },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptInstance {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideosParameters {
    pub sample_count: u32,
}

/// Long-running operation handle, refreshed by polling until `done`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    pub response: Option<OperationResponse>,
    pub error: Option<OperationError>,
}

impl Operation {
    /// URI of the first generated sample, if the payload carries one.
    pub fn download_locator(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    #[serde(default)]
    pub generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneratedSample {
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoRef {
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Raw outcome of a media transfer; status checking is left to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl DownloadResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
