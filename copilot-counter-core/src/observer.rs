//! Outbound request observation.
//!
//! [`RequestObserver`] decorates the host's request dispatchers. The wrapped
//! dispatcher always runs and its result is returned untouched; classification
//! happens on the side and any failure there is logged and swallowed.
//!
//! Two dispatcher shapes are supported, matching the two request primitives a
//! host usually has: callback-style ([`RequestObserver::wrap_callback`]) and
//! future-returning ([`RequestObserver::wrap_async`]). [`RequestObserver::wrap`]
//! covers plain blocking calls.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::classifier::BackendClassifier;
use crate::config::AttributionConfig;
use crate::error::Result;
use crate::types::Classification;

/// Request body as handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Text(String),
    Json(Value),
    Bytes(Vec<u8>),
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// Body text for classification. `None` when the body is unreadable
    /// (non-UTF-8 bytes, form data).
    pub fn readable_text(&self) -> Result<Option<Cow<'_, str>>> {
        Ok(match self {
            RequestBody::Empty => Some(Cow::Borrowed("")),
            RequestBody::Text(text) => Some(Cow::Borrowed(text.as_str())),
            RequestBody::Json(value) => Some(Cow::Owned(serde_json::to_string(value)?)),
            RequestBody::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            RequestBody::Form(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub body: RequestBody,
}

impl OutboundRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            body,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url, RequestBody::Empty)
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self::new("POST", url, RequestBody::Json(body))
    }

    pub fn post_text(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new("POST", url, RequestBody::Text(body.into()))
    }
}

/// One classified generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub url: String,
    pub classification: Classification,
    pub observed_at: DateTime<Utc>,
}

/// Receives classifications; pushes tokens for target matches.
pub trait ObservationSink: Send + Sync {
    fn record(&self, observation: Observation) -> Result<()>;
}

#[derive(Clone)]
pub struct RequestObserver {
    classifier: Arc<BackendClassifier>,
    generation_keywords: Arc<Vec<String>>,
    sink: Arc<dyn ObservationSink>,
}

impl std::fmt::Debug for RequestObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestObserver")
            .field("classifier", &self.classifier)
            .field("generation_keywords", &self.generation_keywords)
            .finish_non_exhaustive()
    }
}

impl RequestObserver {
    pub fn new(config: &AttributionConfig, sink: Arc<dyn ObservationSink>) -> Self {
        Self {
            classifier: Arc::new(BackendClassifier::from_config(config)),
            generation_keywords: Arc::new(
                config
                    .generation_keywords
                    .iter()
                    .map(|k| k.to_ascii_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            ),
            sink,
        }
    }

    /// Cheap pre-filter so asset loads and telemetry never reach the classifier.
    pub fn looks_like_generation(&self, url: &str, body: &str) -> bool {
        let url = url.to_ascii_lowercase();
        let body = body.to_ascii_lowercase();
        self.generation_keywords
            .iter()
            .any(|keyword| url.contains(keyword.as_str()) || body.contains(keyword.as_str()))
    }

    /// Classify a request as a side effect. Never fails.
    pub fn observe(&self, request: &OutboundRequest) -> Option<Classification> {
        self.observe_at(request, Utc::now())
    }

    pub fn observe_at(
        &self,
        request: &OutboundRequest,
        now: DateTime<Utc>,
    ) -> Option<Classification> {
        match self.try_observe(request, now) {
            Ok(classification) => classification,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Request observation failed");
                None
            }
        }
    }

    fn try_observe(
        &self,
        request: &OutboundRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Classification>> {
        let body = match request.body.readable_text()? {
            Some(body) => body,
            None => {
                tracing::trace!(url = %request.url, "Skipping unreadable request body");
                return Ok(None);
            }
        };

        if !self.looks_like_generation(&request.url, &body) {
            return Ok(None);
        }

        let classification = self.classifier.classify(&request.url, &body);
        self.sink.record(Observation {
            url: request.url.clone(),
            classification,
            observed_at: now,
        })?;
        Ok(Some(classification))
    }

    /// Decorate a blocking dispatcher.
    pub fn wrap<F, R>(&self, dispatch: F) -> impl Fn(OutboundRequest) -> R
    where
        F: Fn(OutboundRequest) -> R,
    {
        let observer = self.clone();
        move |request| {
            observer.observe(&request);
            dispatch(request)
        }
    }

    /// Decorate a callback-style dispatcher; the callback is passed through.
    pub fn wrap_callback<F, C>(&self, dispatch: F) -> impl Fn(OutboundRequest, C)
    where
        F: Fn(OutboundRequest, C),
    {
        let observer = self.clone();
        move |request, callback| {
            observer.observe(&request);
            dispatch(request, callback)
        }
    }

    /// Decorate a future-returning dispatcher. Observation happens when the
    /// request is dispatched, not when the future resolves.
    pub fn wrap_async<F, Fut>(&self, dispatch: F) -> impl Fn(OutboundRequest) -> Fut
    where
        F: Fn(OutboundRequest) -> Fut,
        Fut: Future,
    {
        let observer = self.clone();
        move |request| {
            observer.observe(&request);
            dispatch(request)
        }
    }
}
