use std::fs::File;

use futures::stream::BoxStream;
use reqwest::{Client, RequestBuilder, Response, StatusCode, multipart};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::rest_types::{
    ChatRequest, ChatResponse, ChunkUploadResponse, CompleteUploadRequest,
    CompleteUploadResponse, ErrorBody, ReviewResponse, Reviews, SummaryResponse,
};
use crate::upload::{UploadPolicy, UploadSession, UploadSource};

const UPLOAD_ROUTE: &str = "upload";
const UPLOAD_COMPLETE_ROUTE: &str = "upload/complete";
const CHAT_ROUTE: &str = "chat";
const SUMMARY_ROUTE: &str = "summary";
const REVIEW_ROUTE: &str = "review";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkedUploadProgress {
    pub uploaded_chunks: u64,
    pub total_chunks: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum UploadEvent {
    Progress(ChunkedUploadProgress),
    /// Every chunk was accepted; the completion request is about to go out.
    Finalizing,
    Complete { message: Option<String> },
}

pub struct DocChatClient {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl DocChatClient {
    pub fn new(mut base_url: Url, api_token: Option<String>) -> Self {
        // Url::join replaces the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            client: Client::new(),
            base_url,
            api_token,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn post(&self, route: &str) -> ClientResult<RequestBuilder> {
        let url = self.base_url.join(route)?;
        let request = self.client.post(url);
        Ok(match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    pub async fn upload_chunk(
        &self,
        filename: &str,
        index: u64,
        total: u64,
        data: Vec<u8>,
    ) -> ClientResult<ChunkUploadResponse> {
        let part = multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("chunk", index.to_string())
            .text("chunks", total.to_string());

        let response = self.post(UPLOAD_ROUTE)?.multipart(form).send().await?;
        let response = error_for_status(response, |status| {
            format!("Upload failed ({})", status.as_u16())
        })
        .await?;
        decode_json(response).await
    }

    pub async fn complete_upload(
        &self,
        filename: &str,
        temp_id: Option<&str>,
    ) -> ClientResult<CompleteUploadResponse> {
        let request = CompleteUploadRequest { filename, temp_id };
        let response = self
            .post(UPLOAD_COMPLETE_ROUTE)?
            .json(&request)
            .send()
            .await?;
        let response = error_for_status(response, |status| {
            format!("File processing failed ({})", status.as_u16())
        })
        .await?;
        decode_json(response).await
    }

    pub async fn chat(&self, message: &str) -> ClientResult<String> {
        let response = self
            .post(CHAT_ROUTE)?
            .json(&ChatRequest { message })
            .send()
            .await?;
        let response = check_status(response)?;
        let body: ChatResponse = response.json().await?;
        Ok(body.response)
    }

    pub async fn summary(&self) -> ClientResult<String> {
        let response = self.post(SUMMARY_ROUTE)?.send().await?;
        let body: SummaryResponse = check_status(response)?.json().await?;
        if let Some(error) = body.error {
            return Err(ClientError::Server(error));
        }
        body.summary
            .ok_or_else(|| ClientError::Server("No summary returned".to_string()))
    }

    pub async fn review(&self) -> ClientResult<Reviews> {
        let response = self.post(REVIEW_ROUTE)?.send().await?;
        let body: ReviewResponse = check_status(response)?.json().await?;
        if let Some(error) = body.error {
            return Err(ClientError::Server(error));
        }
        body.reviews
            .ok_or_else(|| ClientError::Server("No review suggestions returned".to_string()))
    }

    /// Uploads `source` chunk by chunk and finalizes it.
    ///
    /// Validation happens before the stream is built, so a rejected file never
    /// produces a request. Each chunk waits for the previous response; the first
    /// failure ends the stream with that error.
    pub fn chunked_upload<'a>(
        &'a self,
        source: UploadSource,
        policy: &UploadPolicy,
    ) -> ClientResult<BoxStream<'a, ClientResult<UploadEvent>>> {
        policy.validate(&source)?;
        let mut session = UploadSession::new(source, policy.chunk_size);

        let stream = async_stream::try_stream! {
            let mut file = File::open(&session.source().path)?;
            let total_chunks = session.total_chunks();
            info!(
                file = %session.source().name,
                size = session.source().size,
                total_chunks,
                "starting chunked upload"
            );

            while let Some(index) = session.next_chunk() {
                let data = session.read_chunk(&mut file, index)?;
                let filename = session.source().name.clone();

                let response = match self.upload_chunk(&filename, index, total_chunks, data).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(chunk = index, total_chunks, error = %e, "chunk upload failed");
                        Err(e)?
                    }
                };

                session.record_chunk(response.temp_id);
                debug!(
                    chunk = index,
                    temp_id = ?session.temp_id(),
                    message = ?response.message,
                    "chunk accepted"
                );

                yield UploadEvent::Progress(ChunkedUploadProgress {
                    uploaded_chunks: session.uploaded_chunks(),
                    total_chunks,
                });
            }

            yield UploadEvent::Finalizing;
            let response = self
                .complete_upload(&session.source().name, session.temp_id())
                .await?;
            info!(file = %session.source().name, "upload finalized");

            yield UploadEvent::Complete { message: response.message };
        };

        Ok(Box::pin(stream))
    }
}

/// Maps a non-2xx response to an error carrying the body's `error` field, or
/// `fallback(status)` when the body has none.
async fn error_for_status(
    response: Response,
    fallback: impl FnOnce(StatusCode) -> String,
) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: ErrorBody = response.json().await.unwrap_or_default();
    Err(ClientError::Http {
        status,
        message: body.error.unwrap_or_else(|| fallback(status)),
    })
}

/// Non-2xx handling for endpoints that only report the status code.
fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Http {
            status,
            message: format!("HTTP error! status: {}", status.as_u16()),
        })
    }
}

/// Decodes a 2xx body. A body that is not the expected JSON is a server
/// error, never an empty success.
async fn decode_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    response.json().await.map_err(|e| {
        if e.is_decode() {
            warn!(status = status.as_u16(), error = %e, "unreadable response body");
            ClientError::Server(format!(
                "Unexpected response from server ({})",
                status.as_u16()
            ))
        } else {
            ClientError::Transport(e)
        }
    })
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
