//! Chunked uploads
//!
//! Fragments go out one at a time, in order. Each carries the session id and
//! its position so the server can reassemble them; a final
//! `{endpoint}/complete` call closes the session.

use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use std::time::Duration;

use super::scheduler::{backoff_delay, SchedulerConfig};
use super::{DataService, UploadOptions};
use crate::client::ApiResponse;
use crate::error::{Result, ServiceError};
use crate::payload::{Payload, UploadPayload};

// == Upload Session ==
/// State of one multi-fragment upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSession {
    pub upload_id: String,
    pub total_chunks: usize,
    /// Fragments acknowledged so far
    pub uploaded_count: usize,
}

impl UploadSession {
    pub fn new(total_chunks: usize) -> Self {
        Self {
            upload_id: Uuid::new_v4().to_string(),
            total_chunks,
            uploaded_count: 0,
        }
    }

    /// `{ data, metadata: { uploadId, chunkIndex, totalChunks, isLastChunk } }`
    pub fn envelope<T: Payload>(&self, chunk_index: usize, fragment: T) -> T {
        let metadata = json!({
            "uploadId": self.upload_id,
            "chunkIndex": chunk_index,
            "totalChunks": self.total_chunks,
            "isLastChunk": chunk_index + 1 == self.total_chunks,
        });
        T::object(
            [
                ("data".to_string(), fragment),
                ("metadata".to_string(), T::from_json(metadata)),
            ]
            .into_iter()
            .collect(),
        )
    }

    /// `{ uploadId, totalChunks }`
    pub fn completion_body<T: Payload>(&self) -> T {
        T::from_json(json!({
            "uploadId": self.upload_id,
            "totalChunks": self.total_chunks,
        }))
    }

    /// Records one more acknowledged fragment and returns the new percentage.
    pub fn record_uploaded(&mut self) -> f64 {
        self.uploaded_count += 1;
        self.uploaded_count as f64 / self.total_chunks as f64 * 100.0
    }
}

impl<T: Payload> DataService<T> {
    // == Upload Data ==
    /// Uploads `payload` to `endpoint`, split into fragments of at most
    /// `chunk_size` elements or keys.
    ///
    /// A payload that fits one fragment is posted as is and the response data
    /// returned. Otherwise fragments are posted sequentially, then the
    /// completion call's response data is returned. A fragment that runs out
    /// of retries aborts the upload without a completion call.
    pub async fn upload_data(
        &self,
        endpoint: &str,
        payload: UploadPayload<T>,
        options: UploadOptions,
    ) -> Result<T> {
        let chunk_size = options
            .chunk_size
            .unwrap_or(self.config.upload_chunk_size)
            .max(1);
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);

        let mut fragments = payload.split(chunk_size);

        if fragments.len() == 1 {
            let fragment = fragments
                .pop()
                .ok_or_else(|| ServiceError::Internal("no fragment to upload".to_string()))?;
            debug!(endpoint, "single fragment, uploading directly");
            let response = self
                .post_within(endpoint, fragment, self.config.timeout)
                .await?;
            if let Some(progress) = &options.on_progress {
                progress(100.0);
            }
            return Ok(response.data);
        }

        let mut session = UploadSession::new(fragments.len());
        info!(
            endpoint,
            upload_id = %session.upload_id,
            total_chunks = session.total_chunks,
            "starting chunked upload"
        );

        for (index, fragment) in fragments.into_iter().enumerate() {
            let body = session.envelope(index, fragment);
            self.upload_fragment(endpoint, index, body, max_retries).await?;

            let percent = session.record_uploaded();
            debug!(upload_id = %session.upload_id, index, percent, "fragment uploaded");
            if let Some(progress) = &options.on_progress {
                progress(percent);
            }
        }

        let complete_url = format!("{endpoint}/complete");
        let response = self
            .post_within(&complete_url, session.completion_body(), self.config.timeout)
            .await?;
        info!(upload_id = %session.upload_id, "upload complete");
        Ok(response.data)
    }

    async fn upload_fragment(
        &self,
        endpoint: &str,
        index: usize,
        body: T,
        max_retries: u32,
    ) -> Result<()> {
        let deadlines = SchedulerConfig {
            max_retries,
            timeout: self.config.timeout,
            backoff_base: self.config.backoff_base,
        };
        let mut retry_count = 0;
        loop {
            let deadline = deadlines.attempt_timeout(retry_count);
            match self.post_within(endpoint, body.clone(), deadline).await {
                Ok(_) => return Ok(()),
                Err(err) if retry_count < max_retries => {
                    let delay = backoff_delay(deadlines.backoff_base, retry_count);
                    warn!(
                        index,
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "fragment upload failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(err) => {
                    error!(index, error = %err, "fragment upload failed permanently");
                    return Err(ServiceError::FragmentFailed {
                        index,
                        attempts: retry_count + 1,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    /// Posts `body`, failing with `Timeout` once `deadline` passes.
    async fn post_within(&self, url: &str, body: T, deadline: Duration) -> Result<ApiResponse<T>> {
        match tokio::time::timeout(deadline, self.api.post(url, body)).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(ServiceError::Timeout(deadline.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_envelope_shape() {
        let session = UploadSession::new(3);
        let body: Value = session.envelope(2, json!([1, 2]));

        assert_eq!(body["data"], json!([1, 2]));
        assert_eq!(body["metadata"]["uploadId"], json!(session.upload_id));
        assert_eq!(body["metadata"]["chunkIndex"], json!(2));
        assert_eq!(body["metadata"]["totalChunks"], json!(3));
        assert_eq!(body["metadata"]["isLastChunk"], json!(true));

        let first: Value = session.envelope(0, json!([]));
        assert_eq!(first["metadata"]["isLastChunk"], json!(false));
    }

    #[test]
    fn test_completion_body() {
        let session = UploadSession::new(4);
        let body: Value = session.completion_body();
        assert_eq!(body, json!({"uploadId": session.upload_id, "totalChunks": 4}));
    }

    #[test]
    fn test_upload_ids_are_unique() {
        assert_ne!(UploadSession::new(2).upload_id, UploadSession::new(2).upload_id);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut session = UploadSession::new(4);
        let steps: Vec<f64> = (0..4).map(|_| session.record_uploaded()).collect();
        assert_eq!(steps, vec![25.0, 50.0, 75.0, 100.0]);
    }
}
