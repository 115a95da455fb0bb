use serde::{Deserialize, Serialize};

use crate::serde_utils;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkUploadResponse {
    #[serde(default, deserialize_with = "serde_utils::deserialize_non_empty_string")]
    pub temp_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteUploadRequest<'a> {
    pub filename: &'a str,
    pub temp_id: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteUploadResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "serde_utils::deserialize_non_empty_string")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewResponse {
    #[serde(default)]
    pub reviews: Option<Reviews>,
    #[serde(default, deserialize_with = "serde_utils::deserialize_non_empty_string")]
    pub error: Option<String>,
}

/// `/review` answers either with a list of suggestions or a single block of text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Reviews {
    List(Vec<String>),
    Text(String),
}

/// Body of a non-2xx response. Anything that doesn't parse is treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default, deserialize_with = "serde_utils::deserialize_non_empty_string")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reviews_accepts_list_or_text() {
        let list: ReviewResponse =
            serde_json::from_str(r#"{"reviews": ["do X", "do Y"]}"#).unwrap();
        assert_eq!(
            list.reviews,
            Some(Reviews::List(vec!["do X".into(), "do Y".into()]))
        );

        let text: ReviewResponse =
            serde_json::from_str(r#"{"reviews": "nothing studied yet"}"#).unwrap();
        assert_eq!(text.reviews, Some(Reviews::Text("nothing studied yet".into())));
    }

    #[test]
    fn complete_request_serializes_missing_token_as_null() {
        let body = CompleteUploadRequest {
            filename: "notes.pdf",
            temp_id: None,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"filename":"notes.pdf","temp_id":null}"#
        );
    }
}
