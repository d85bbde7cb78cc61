//! Simulated tenant-portal session.
//!
//! Walks a list of pages the way a user would, reporting each transition,
//! loading the page through a staged loader and warming likely next pages.
//! The backend is simulated with random latency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use stageload_core::{
    fetcher, FetchRegistry, Fetcher, LoadContext, LoadSnapshot, Prediction, PrefetchOutcome,
};
use tracing::{debug, info};

use crate::config::{millis, Config};

/// Pages the simulated portal knows how to load
pub const PAGES: &[&str] = &["dashboard", "leases", "payments", "maintenance", "inbox"];

/// Walk used when none is given on the command line
pub const DEFAULT_WALK: &[&str] = &[
    "dashboard",
    "leases",
    "payments",
    "dashboard",
    "leases",
    "maintenance",
    "dashboard",
    "leases",
    "payments",
    "dashboard",
    "inbox",
    "dashboard",
    "leases",
];

/// Simulated backend; counts every request it serves.
#[derive(Clone)]
pub struct Backend {
    latency: (Duration, Duration),
    calls: Arc<AtomicUsize>,
}

impl Backend {
    pub fn new(latency: (Duration, Duration)) -> Self {
        Self {
            latency,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetcher(&self, page: &str) -> Fetcher<Value> {
        let page = page.to_string();
        let (lo, hi) = self.latency;
        let calls = Arc::clone(&self.calls);
        fetcher(move || {
            let request = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let delay_ms = rand::thread_rng().gen_range(millis(lo)..=millis(hi));
            let page = page.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                debug!(page = %page, request, delay_ms, "Backend responded");
                anyhow::Ok(json!({
                    "page": page,
                    "request": request,
                    "generatedAt": Utc::now(),
                }))
            }
        })
    }

    pub fn registry(&self, pages: &[&str]) -> FetchRegistry {
        let mut registry = FetchRegistry::new();
        for page in pages {
            registry.register(*page, self.fetcher(page));
        }
        registry
    }
}

/// What happened on one step of the walk.
#[derive(Debug, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub from: Option<String>,
    pub page: String,
    pub cache_hit: bool,
    pub served_from_prefetch: bool,
    pub backend_calls: usize,
    pub snapshot: LoadSnapshot<Value>,
    pub predictions: Vec<Prediction>,
    pub prefetched: Vec<String>,
    pub cache_age: Option<String>,
}

/// Split a comma-separated page list, dropping empty entries.
pub fn parse_walk(arg: &str) -> Vec<String> {
    arg.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn run_walk(config: &Config, walk: &[String]) -> Result<Vec<StepReport>> {
    let ctx = LoadContext::with_prediction_model(config.prediction_model());
    let backend = Backend::new(config.latency_range());
    let registry = backend.registry(PAGES);
    let options = config.loader_options();

    info!(steps = walk.len(), "Starting simulated walk");

    let mut reports = Vec::with_capacity(walk.len());
    let mut previous: Option<String> = None;

    for (step, page) in walk.iter().enumerate() {
        if let Some(from) = &previous {
            ctx.report_navigation(from, page);
        }

        let cache_hit = ctx
            .cache()
            .get_fresh::<Value>(page, options.cache_max_age)
            .is_some();
        let before = backend.calls();

        let fetch = ctx.prefetch_aware(page.clone(), backend.fetcher(page));
        let loader = ctx.mount(page.clone(), fetch, options.clone());
        let snapshot = loader.ready().await;
        let backend_calls = backend.calls() - before;
        loader.unmount();

        let predictions = ctx.predict_next_page(page);
        let prefetched = ctx
            .auto_prefetch(page, &registry)
            .await
            .into_iter()
            .filter(|(_, outcome)| *outcome == PrefetchOutcome::Stored)
            .map(|(page, _)| page)
            .collect();

        reports.push(StepReport {
            step,
            from: previous.clone(),
            page: page.clone(),
            cache_hit,
            served_from_prefetch: !cache_hit && backend_calls == 0 && snapshot.error.is_none(),
            backend_calls,
            snapshot,
            predictions,
            prefetched,
            cache_age: ctx.cache().age_display(page),
        });
        previous = Some(page.clone());
    }

    info!(total_backend_calls = backend.calls(), "Walk complete");
    Ok(reports)
}
