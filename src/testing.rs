//! In-process stand-ins for the external services, shared by unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::agents::{
    AgentError, ImageRequest, ImageResult, ImageSettings, ImageSynthesizer, ModerationProfile,
    Pipeline, PromptRewriter,
};
use crate::db::{MemoryStore, RecordStore, StoreError};
use crate::storage::{ImageUploader, UploadError};

enum RewriteBehavior {
    Echo,
    Fixed(String),
    Fail,
}

/// Echoes the newest history entry as `A flat 2D illustration of <entry>`
/// and records every history it receives.
pub struct FakeRewriter {
    behavior: Mutex<RewriteBehavior>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRewriter {
    pub fn new() -> Self {
        Self::with(RewriteBehavior::Echo)
    }

    pub fn failing() -> Self {
        Self::with(RewriteBehavior::Fail)
    }

    pub fn returning(text: &str) -> Self {
        Self::with(RewriteBehavior::Fixed(text.to_string()))
    }

    fn with(behavior: RewriteBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        *self.behavior.lock().unwrap() = if fail {
            RewriteBehavior::Fail
        } else {
            RewriteBehavior::Echo
        };
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptRewriter for FakeRewriter {
    async fn rewrite(
        &self,
        history: &[String],
        _profile: &ModerationProfile,
    ) -> Result<String, AgentError> {
        self.calls.lock().unwrap().push(history.to_vec());
        match &*self.behavior.lock().unwrap() {
            RewriteBehavior::Echo => Ok(format!(
                "A flat 2D illustration of {}",
                history.last().cloned().unwrap_or_default()
            )),
            RewriteBehavior::Fixed(text) => Ok(text.clone()),
            RewriteBehavior::Fail => Err(AgentError::Api {
                status: 500,
                message: "rewrite service unavailable".to_string(),
            }),
        }
    }
}

pub struct FakeSynthesizer {
    hosted_url: Option<String>,
    requests: Mutex<Vec<ImageRequest>>,
}

impl FakeSynthesizer {
    pub fn bytes() -> Self {
        Self {
            hosted_url: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn hosted(url: &str) -> Self {
        Self {
            hosted_url: Some(url.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, request: &ImageRequest) -> Result<ImageResult, AgentError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(match &self.hosted_url {
            Some(url) => ImageResult::Url(url.clone()),
            None => ImageResult::Bytes(request.prompt.as_bytes().to_vec()),
        })
    }
}

/// Hands out sequential URLs: `https://storage.test/images/<n>.png`.
pub struct FakeUploader {
    fail: bool,
    count: AtomicUsize,
}

impl FakeUploader {
    pub fn new() -> Self {
        Self {
            fail: false,
            count: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            count: AtomicUsize::new(0),
        }
    }

    pub fn uploads(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageUploader for FakeUploader {
    async fn upload(&self, _bytes: Vec<u8>, _filename: Option<String>) -> Result<String, UploadError> {
        if self.fail {
            return Err(UploadError::Rejected {
                status: 503,
                message: "bucket unavailable".to_string(),
            });
        }
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://storage.test/images/{n}.png"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    Normal,
    Hidden,
    Failing,
}

/// A [`MemoryStore`] that counts reads and can be told to hide every row or
/// to fail reads outright. Writes always go through.
pub struct CountingStore {
    inner: MemoryStore,
    mode: Mutex<ReadMode>,
    reads: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            mode: Mutex::new(ReadMode::Normal),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn hide_rows(&self) {
        *self.mode.lock().unwrap() = ReadMode::Hidden;
    }

    pub fn fail_reads(&self) {
        *self.mode.lock().unwrap() = ReadMode::Failing;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn get_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            ReadMode::Normal => self.inner.get_all_rows().await,
            ReadMode::Hidden => Ok(Vec::new()),
            ReadMode::Failing => Err(StoreError::Rejected {
                status: 503,
                message: "sheet unavailable".to_string(),
            }),
        }
    }

    async fn append_row(&self, row: Vec<String>) -> Result<(), StoreError> {
        self.inner.append_row(row).await
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        self.inner.update_cell(row, col, value).await
    }
}

pub fn pipeline_with(
    rewriter: Arc<FakeRewriter>,
    synthesizer: Arc<FakeSynthesizer>,
    uploader: Arc<FakeUploader>,
) -> Pipeline {
    Pipeline::new(
        rewriter,
        synthesizer,
        uploader,
        ImageSettings {
            model: "gpt-image-1".to_string(),
            size: "1024x1024".to_string(),
            quality: None,
        },
        ImageSettings {
            model: "gpt-image-1".to_string(),
            size: "1024x1024".to_string(),
            quality: Some("high".to_string()),
        },
    )
}
