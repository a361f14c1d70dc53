//! Shared fakes for the controller integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use imagestory_lib::api::{GenerationRequest, ImageGenerationProvider};
use imagestory_lib::error::GenerationError;
use imagestory_lib::models::{GenerationOptions, ImageData, Session, SessionUser};
use imagestory_lib::session::SessionProvider;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Image service fake: records every request, optionally takes a while, and
/// answers from a queue of scripted outcomes (success by default).
pub struct ScriptedProvider {
    delay: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
    outcomes: Mutex<VecDeque<Result<ImageData, GenerationError>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            requests: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn push_outcome(&self, outcome: Result<ImageData, GenerationError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn options(&self) -> Vec<GenerationOptions> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.options.clone())
            .collect()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerationProvider for ScriptedProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<ImageData, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        let scripted = self.outcomes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ImageData::Url(format!(
                "https://img.example/{}.png",
                request.prompt.replace(' ', "-")
            )))
        })
    }
}

/// Account store fake whose answer can be flipped between calls.
pub struct SwitchableSession {
    signed_in: AtomicBool,
}

impl SwitchableSession {
    pub fn new(signed_in: bool) -> Self {
        Self {
            signed_in: AtomicBool::new(signed_in),
        }
    }

    pub fn set_signed_in(&self, signed_in: bool) {
        self.signed_in.store(signed_in, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionProvider for SwitchableSession {
    async fn current_session(&self) -> anyhow::Result<Option<Session>> {
        if !self.signed_in.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(Session {
            user: SessionUser {
                id: Uuid::nil(),
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
            },
            expires_at: Utc::now() + ChronoDuration::days(7),
        }))
    }
}
