//! Image validation, resizing, re-encoding and upload.
//!
//! [`ImagePipeline::upload_image`] handles a single file end to end. Batch
//! uploads go through an internal queue that a spawned worker drains in
//! windows of at most `max_concurrent` files; every caller receives its own
//! result through a oneshot channel.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder};
use metrics::counter;
use pressroom_api_types::UploadResponse;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::client::{RetryPolicy, ServiceError, with_retry};
use crate::config::UploadSettings;
use crate::domain::images::{
    ImageFormat, ImageValidationError, MAX_UPLOAD_BYTES, fit_within, validate_image,
};
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::images";
const DEFAULT_MAX_CONCURRENT: usize = 3;

#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error(transparent)]
    Validation(#[from] ImageValidationError),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
    #[error("upload failed")]
    Upload(#[from] ServiceError),
    #[error("upload queue closed before the file was processed")]
    QueueClosed,
}

impl ImageError {
    fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }

    fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode(err.to_string())
    }
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its content type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, std::io::Error> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(filename, content_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUploadOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// 1..=100, used by lossy encoders.
    pub quality: u8,
    pub format: ImageFormat,
    pub folder: String,
    pub max_bytes: u64,
}

impl Default for ImageUploadOptions {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            quality: 80,
            format: ImageFormat::Jpeg,
            folder: "blog".to_string(),
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl From<&UploadSettings> for ImageUploadOptions {
    fn from(settings: &UploadSettings) -> Self {
        Self {
            max_width: settings.max_width.get(),
            max_height: settings.max_height.get(),
            quality: settings.quality,
            format: settings.format,
            folder: settings.folder.clone(),
            max_bytes: settings.max_bytes.get(),
        }
    }
}

/// Encoded image ready to send.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub filename: String,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedImage {
    pub url: String,
    pub path: Option<String>,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    pub format: ImageFormat,
}

/// Remote file storage accepting processed images.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(
        &self,
        image: &ProcessedImage,
        folder: &str,
    ) -> Result<UploadResponse, ServiceError>;
}

/// Decode, shrink to fit the target box and re-encode. CPU bound; callers on
/// the runtime should wrap it in `spawn_blocking`.
pub fn process_image(
    file: &UploadFile,
    options: &ImageUploadOptions,
) -> Result<ProcessedImage, ImageError> {
    let mut decoded = image::load_from_memory(&file.bytes).map_err(ImageError::decode)?;
    let (source_width, source_height) = (decoded.width(), decoded.height());
    let (width, height) = fit_within(
        source_width,
        source_height,
        options.max_width,
        options.max_height,
    );
    if (width, height) != (source_width, source_height) {
        decoded = decoded.resize_exact(width, height, FilterType::Lanczos3);
    }

    let encoded = encode(&decoded, options.format, options.quality)?;
    debug!(
        target = SOURCE,
        filename = file.filename.as_str(),
        source_width,
        source_height,
        width,
        height,
        source_bytes = file.size(),
        encoded_bytes = encoded.len(),
        "image processed"
    );

    Ok(ProcessedImage {
        filename: output_filename(&file.filename, options.format),
        format: options.format,
        width: decoded.width(),
        height: decoded.height(),
        bytes: Bytes::from(encoded),
    })
}

fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(ImageError::encode)?;
        }
        ImageFormat::Png => {
            let rgba = image.to_rgba8();
            PngEncoder::new(&mut out)
                .write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    image::ExtendedColorType::Rgba8,
                )
                .map_err(ImageError::encode)?;
        }
        ImageFormat::Webp => {
            let rgba = image.to_rgba8();
            WebPEncoder::new_lossless(&mut out)
                .write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    image::ExtendedColorType::Rgba8,
                )
                .map_err(ImageError::encode)?;
        }
    }
    Ok(out)
}

fn output_filename(original: &str, format: ImageFormat) -> String {
    let stem = Path::new(original)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "image".to_string());
    format!("{stem}.{}", format.extension())
}

type UploadResult = Result<UploadedImage, ImageError>;

struct UploadTask {
    file: UploadFile,
    options: ImageUploadOptions,
    responder: oneshot::Sender<UploadResult>,
}

pub struct ImagePipeline {
    uploader: Arc<dyn ImageUploader>,
    retry: RetryPolicy,
    max_concurrent: usize,
    queue: Mutex<VecDeque<UploadTask>>,
    draining: AtomicBool,
}

impl ImagePipeline {
    pub fn new(
        uploader: Arc<dyn ImageUploader>,
        retry: RetryPolicy,
        max_concurrent: NonZeroUsize,
    ) -> Self {
        Self {
            uploader,
            retry,
            max_concurrent: max_concurrent.get(),
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub fn from_settings(uploader: Arc<dyn ImageUploader>, settings: &UploadSettings) -> Self {
        Self::new(
            uploader,
            RetryPolicy::new(settings.max_attempts.get(), settings.retry_base_delay),
            settings.max_concurrent,
        )
    }

    pub fn with_defaults(uploader: Arc<dyn ImageUploader>) -> Self {
        Self::new(
            uploader,
            RetryPolicy::default(),
            NonZeroUsize::new(DEFAULT_MAX_CONCURRENT).unwrap_or(NonZeroUsize::MIN),
        )
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Files waiting for a worker slot.
    pub fn queued(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "pipeline.queued").len()
    }

    /// Validate, process and upload one file.
    ///
    /// Type and size are checked before any decoding. The upload itself is
    /// retried on transient failures with linear backoff.
    pub async fn upload_image(
        &self,
        file: UploadFile,
        options: &ImageUploadOptions,
    ) -> UploadResult {
        let filename = file.filename.clone();
        let result = self.process_and_upload(file, options).await;
        match &result {
            Ok(uploaded) => {
                counter!("pressroom_upload_total", "result" => "success").increment(1);
                info!(
                    target = SOURCE,
                    filename = filename.as_str(),
                    url = uploaded.url.as_str(),
                    size_bytes = uploaded.size_bytes,
                    "image uploaded"
                );
            }
            Err(err) => {
                counter!("pressroom_upload_total", "result" => "failure").increment(1);
                warn!(
                    target = SOURCE,
                    filename = filename.as_str(),
                    error = %err,
                    "image upload failed"
                );
            }
        }
        result
    }

    async fn process_and_upload(
        &self,
        file: UploadFile,
        options: &ImageUploadOptions,
    ) -> UploadResult {
        validate_image(&file.content_type, file.size(), options.max_bytes)?;

        let process_options = options.clone();
        let processed =
            tokio::task::spawn_blocking(move || process_image(&file, &process_options))
                .await
                .map_err(|err| ImageError::encode(format!("processing task failed: {err}")))??;

        let response = with_retry(&self.retry, || {
            self.uploader.upload(&processed, &options.folder)
        })
        .await?;

        Ok(UploadedImage {
            url: response.url,
            path: response.path,
            width: response.width.unwrap_or(processed.width),
            height: response.height.unwrap_or(processed.height),
            size_bytes: response.size.unwrap_or(processed.bytes.len() as u64),
            format: processed.format,
        })
    }

    /// Queue a file and return the channel its result arrives on.
    pub fn enqueue(
        self: &Arc<Self>,
        file: UploadFile,
        options: ImageUploadOptions,
    ) -> oneshot::Receiver<UploadResult> {
        let (responder, receiver) = oneshot::channel();
        mutex_lock(&self.queue, SOURCE, "pipeline.enqueue").push_back(UploadTask {
            file,
            options,
            responder,
        });
        self.ensure_worker();
        receiver
    }

    /// Queue a file and wait for its result.
    pub async fn queue_upload(
        self: &Arc<Self>,
        file: UploadFile,
        options: ImageUploadOptions,
    ) -> UploadResult {
        self.enqueue(file, options)
            .await
            .map_err(|_| ImageError::QueueClosed)?
    }

    /// Queue every file and collect the results in input order.
    pub async fn upload_many(
        self: &Arc<Self>,
        files: Vec<UploadFile>,
        options: &ImageUploadOptions,
    ) -> Vec<UploadResult> {
        let receivers: Vec<_> = files
            .into_iter()
            .map(|file| self.enqueue(file, options.clone()))
            .collect();
        join_all(receivers.into_iter().map(|receiver| async move {
            receiver.await.map_err(|_| ImageError::QueueClosed)?
        }))
        .await
    }

    fn ensure_worker(self: &Arc<Self>) {
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.drain().await });
    }

    async fn drain(&self) {
        loop {
            let window: Vec<UploadTask> = {
                let mut queue = mutex_lock(&self.queue, SOURCE, "pipeline.drain");
                let take = self.max_concurrent.min(queue.len());
                queue.drain(..take).collect()
            };

            if window.is_empty() {
                self.draining.store(false, Ordering::Release);
                // A task may have been queued after the window came back empty
                // but before the flag was cleared.
                let pending = !mutex_lock(&self.queue, SOURCE, "pipeline.recheck").is_empty();
                if !pending || self.draining.swap(true, Ordering::AcqRel) {
                    return;
                }
                continue;
            }

            debug!(target = SOURCE, window = window.len(), "draining upload window");
            join_all(window.into_iter().map(|task| async move {
                let result = self.upload_image(task.file, &task.options).await;
                if task.responder.send(result).is_err() {
                    debug!(target = SOURCE, "upload caller went away before the result");
                }
            }))
            .await;
        }
    }
}
