//! Availability probe: how often does a document vanish from search while
//! it is being reindexed?
//!
//! A probe seeds a document, then runs a search loop concurrently with a
//! stalled reindex and counts the samples where the document was missing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reindex_types::ScoredChunk;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::info;

use crate::context::StrategyContext;
use crate::error::StrategyError;
use crate::registry::{build_strategy, StrategyKind};
use crate::strategy::{ReindexOptions, ReindexStrategy, SearchOptions};
use crate::variants::BaselineStrategy;

/// Pause after seeding, and before the reindex starts.
const SETTLE: Duration = Duration::from_millis(100);

/// Whether any hit belongs to `document_id` (by id or business key).
pub fn has_document(hits: &[ScoredChunk], document_id: &str) -> bool {
    hits.iter().any(|hit| {
        hit.payload.document_id == document_id || hit.payload.document_number == document_id
    })
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub document_id: String,
    pub query_interval: Duration,
    pub reindex_delay: Duration,
}

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub strategy: String,
    pub total_queries: usize,
    pub empty_results: usize,
    /// Percentage of samples that found the document, two decimals
    pub availability: f64,
    pub avg_latency_ms: f64,
}

#[derive(Default)]
struct Samples {
    total: usize,
    empty: usize,
    latency_ms: f64,
}

/// Seed, then reindex with a stall while searching every `query_interval`.
pub async fn run_availability_probe(
    strategy: &dyn ReindexStrategy,
    config: &ProbeConfig,
) -> Result<ProbeResult, StrategyError> {
    let document_id = config.document_id.as_str();
    let initial = format!("Initial content for {document_id}. This is the original document.");
    let updated =
        format!("Updated content for {document_id}. This is the new version with more details.");
    let query = format!("content {document_id}");

    strategy
        .reindex(document_id, &initial, &ReindexOptions::default())
        .await?;
    sleep(SETTLE).await;

    let running = AtomicBool::new(true);

    let query_loop = async {
        let mut samples = Samples::default();
        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            let hits = strategy.search(&query, &SearchOptions::default()).await?;
            samples.latency_ms += elapsed_ms(started);
            samples.total += 1;
            if !has_document(&hits, document_id) {
                samples.empty += 1;
            }
            sleep(config.query_interval).await;
        }
        Ok::<_, StrategyError>(samples)
    };

    let writer = async {
        sleep(SETTLE).await;
        let outcome = strategy
            .reindex(
                document_id,
                &updated,
                &ReindexOptions::with_delay(config.reindex_delay),
            )
            .await;
        // Keep sampling briefly after the swap.
        sleep(SETTLE * 2).await;
        running.store(false, Ordering::SeqCst);
        outcome
    };

    let (samples, reindexed) = tokio::join!(query_loop, writer);
    reindexed?;
    let samples = samples?;

    let (availability, avg_latency_ms) = if samples.total == 0 {
        (0.0, 0.0)
    } else {
        let total = samples.total as f64;
        (
            (total - samples.empty as f64) / total * 100.0,
            samples.latency_ms / total,
        )
    };

    let result = ProbeResult {
        strategy: strategy.name().to_string(),
        total_queries: samples.total,
        empty_results: samples.empty,
        availability: round2(availability),
        avg_latency_ms: round2(avg_latency_ms),
    };
    info!(
        strategy = %result.strategy,
        document_id = %document_id,
        total = result.total_queries,
        empty = result.empty_results,
        availability = result.availability,
        "Availability probe finished"
    );
    Ok(result)
}

#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub iterations: usize,
    pub query_interval: Duration,
    pub reindex_delay: Duration,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            iterations: 3,
            query_interval: Duration::from_millis(30),
            reindex_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySummary {
    pub avg_availability: f64,
    pub avg_latency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub summary: BTreeMap<String, StrategySummary>,
    pub details: Vec<ProbeResult>,
}

/// Probe each strategy `iterations` times on fresh documents.
pub async fn compare_strategies(
    ctx: &StrategyContext,
    kinds: &[StrategyKind],
    options: &CompareOptions,
) -> Result<Comparison, StrategyError> {
    let mut details = Vec::new();
    let mut summary = BTreeMap::new();

    for kind in kinds {
        let strategy = build_strategy(*kind, ctx.clone());
        let mut runs = Vec::with_capacity(options.iterations);

        for i in 0..options.iterations {
            let config = ProbeConfig {
                document_id: format!("bench-{kind}-{i}-{}", ctx.now_ms()),
                query_interval: options.query_interval,
                reindex_delay: options.reindex_delay,
            };
            let result = run_availability_probe(strategy.as_ref(), &config).await?;
            info!(
                strategy = %kind,
                iteration = i + 1,
                of = options.iterations,
                availability = result.availability,
                "Benchmark iteration"
            );
            runs.push(result);
            sleep(SETTLE).await;
        }

        if !runs.is_empty() {
            let n = runs.len() as f64;
            summary.insert(
                kind.to_string(),
                StrategySummary {
                    avg_availability: round2(runs.iter().map(|r| r.availability).sum::<f64>() / n),
                    avg_latency: round2(runs.iter().map(|r| r.avg_latency_ms).sum::<f64>() / n),
                },
            );
        }
        details.extend(runs);
    }

    Ok(Comparison { summary, details })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    ReindexStart,
    Query,
    ReindexComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub time_ms: u64,
    pub event: TimelineEventKind,
    pub has_results: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapTimeline {
    pub timeline: Vec<TimelineEvent>,
    /// Query samples that came back without the document
    pub empty_periods: usize,
}

/// Record a query timeline across one stalled delete-then-insert reindex.
pub async fn demonstrate_gap(
    ctx: &StrategyContext,
    document_id: &str,
    reindex_delay: Duration,
) -> Result<GapTimeline, StrategyError> {
    let strategy = BaselineStrategy::new(ctx.clone());
    strategy
        .reindex(
            document_id,
            "Initial content for race condition test",
            &ReindexOptions::default(),
        )
        .await?;
    sleep(SETTLE).await;

    let start = Instant::now();
    let at = || start.elapsed().as_millis() as u64;
    let done = AtomicBool::new(false);
    let query = format!("content {document_id}");

    let writer = async {
        let mut events = vec![TimelineEvent {
            time_ms: at(),
            event: TimelineEventKind::ReindexStart,
            has_results: true,
        }];
        let outcome = strategy
            .reindex(
                document_id,
                "Updated content after reindex",
                &ReindexOptions::with_delay(reindex_delay),
            )
            .await;
        events.push(TimelineEvent {
            time_ms: at(),
            event: TimelineEventKind::ReindexComplete,
            has_results: true,
        });
        done.store(true, Ordering::SeqCst);
        outcome.map(|_| events)
    };

    let sampler = async {
        let mut events = Vec::new();
        sleep(Duration::from_millis(50)).await;
        while !done.load(Ordering::SeqCst) {
            let hits = strategy.search(&query, &SearchOptions::default()).await?;
            events.push(TimelineEvent {
                time_ms: at(),
                event: TimelineEventKind::Query,
                has_results: hits.iter().any(|h| h.payload.document_id == document_id),
            });
            sleep(SETTLE).await;
        }
        Ok::<_, StrategyError>(events)
    };

    let (written, sampled) = tokio::join!(writer, sampler);
    let mut timeline = written?;
    timeline.extend(sampled?);
    timeline.sort_by_key(|e| e.time_ms);

    let empty_periods = timeline
        .iter()
        .filter(|e| e.event == TimelineEventKind::Query && !e.has_results)
        .count();
    Ok(GapTimeline {
        timeline,
        empty_periods,
    })
}
