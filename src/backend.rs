//! Seams between the pipeline and the remote generation service.

use std::future::Future;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{GenerationParams, RetryPolicy};
use crate::error::RemoteError;
use crate::model::ReferenceImage;

/// Encoded image returned by an [`ImageBackend`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodedImage {
    /// MIME type reported by the backend, if any
    pub mime_type: Option<String>,
    /// PNG/JPEG bytes
    pub bytes: Vec<u8>,
}

/// Something that turns a prompt into free text.
pub trait TextBackend: Send + Sync {
    /// Runs one text generation request.
    fn generate_text(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;
}

/// Something that turns a prompt into an encoded image.
pub trait ImageBackend: Send + Sync {
    /// Runs one image generation request.
    ///
    /// Errors are already [`crate::error::SynthesisError`] so decoder
    /// failures stay distinguishable from transport failures.
    fn generate_image(
        &self,
        prompt: &str,
        reference: Option<&ReferenceImage>,
    ) -> impl Future<Output = Result<EncodedImage, crate::error::SynthesisError>> + Send;
}

/// Runs `call` under the retry policy.
///
/// A timed-out attempt counts like any other failure. When the budget runs
/// out the last error is returned, or a timeout if no attempt got to run.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut call: F) -> Result<T, E>
where
    E: From<RemoteError> + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let mut last_error: Option<E> = None;

    for attempt in 1..=policy.max_attempts.max(1) {
        let backoff = policy.backoff_before(attempt);
        if !backoff.is_zero() {
            if started.elapsed() + backoff >= policy.total_budget {
                debug!("{label}: no budget left for attempt {attempt}");
                break;
            }
            tokio::time::sleep(backoff).await;
        }

        let remaining = policy.total_budget.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }
        let timeout = policy.timeout_within(remaining);

        match tokio::time::timeout(timeout, call()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!("{label}: succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Ok(Err(err)) => {
                warn!("{label}: attempt {attempt} failed: {err}");
                last_error = Some(err);
            }
            Err(_) => {
                warn!("{label}: attempt {attempt} timed out after {timeout:?}");
                last_error = Some(E::from(RemoteError::Timeout(timeout)));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| E::from(RemoteError::Timeout(policy.total_budget))))
}
