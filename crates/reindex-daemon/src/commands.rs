//! Command implementations for the reindex daemon.
//!
//! Every command returns a JSON value that `main` prints. `serve` returns
//! the startup recovery report and worker totals once it is signalled.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reindex_embeddings::{HashEmbedder, TextSplitter};
use reindex_queue::{DirectoryContentSource, PriorityQueue, QueueWorker, WorkerConfig};
use reindex_recovery::{CleanupAction, RecoveryService};
use reindex_storage::{MemoryCoordinationStore, RocksCoordinationStore, SharedCoordinationStore};
use reindex_strategy::{
    build_strategy, compare_strategies, demonstrate_gap, CompareOptions, ReindexOptions,
    ReindexStrategy, SearchOptions, StrategyContext, StrategyKind,
};
use reindex_types::{ReindexJob, Settings, SharedClock, SystemClock, VectorBackend};
use reindex_vector::{InMemoryVectorStore, QdrantConfig, QdrantVectorStore, SharedVectorStore};

use crate::cli::{Commands, ContentArgs, QueueCommands, RecoveryCommands};

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global subscriber. Logs go to stderr so stdout stays JSON.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Opened stores and the handles built on them.
pub struct Runtime {
    settings: Settings,
    clock: SharedClock,
    coordination: SharedCoordinationStore,
    context: StrategyContext,
    queue: PriorityQueue,
}

impl Runtime {
    /// Open the RocksDB coordination store and the configured vector store.
    pub async fn open(settings: Settings) -> Result<Self> {
        let clock = SystemClock::shared();

        let db_path = settings.expanded_db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let coordination: SharedCoordinationStore = Arc::new(
            RocksCoordinationStore::open_with_clock(&db_path, clock.clone())
                .context("Failed to open coordination store")?,
        );

        let vectors: SharedVectorStore = match settings.vector_store.backend {
            VectorBackend::Qdrant => Arc::new(
                QdrantVectorStore::new(QdrantConfig::from(&settings.vector_store))
                    .context("Failed to create Qdrant client")?,
            ),
            VectorBackend::Memory => {
                warn!("Using the in-memory vector store; chunks are lost on exit");
                Arc::new(InMemoryVectorStore::new(settings.vector_store.vector_size))
            }
        };
        vectors
            .ensure_collection()
            .await
            .context("Failed to prepare vector collection")?;

        info!(
            db_path = ?db_path,
            backend = ?settings.vector_store.backend,
            collection = %settings.vector_store.collection,
            "Runtime ready"
        );
        Ok(Self::with_stores(settings, coordination, vectors, clock))
    }

    /// Process-local stores; nothing is persisted.
    pub fn in_memory(settings: Settings) -> Self {
        let clock = SystemClock::shared();
        let coordination = Arc::new(MemoryCoordinationStore::with_clock(clock.clone()));
        let vectors = Arc::new(InMemoryVectorStore::new(settings.vector_store.vector_size));
        Self::with_stores(settings, coordination, vectors, clock)
    }

    pub fn with_stores(
        settings: Settings,
        coordination: SharedCoordinationStore,
        vectors: SharedVectorStore,
        clock: SharedClock,
    ) -> Self {
        let context = StrategyContext::new(vectors, coordination.clone(), clock.clone())
            .with_embedder(Arc::new(HashEmbedder::new(settings.vector_store.vector_size)))
            .with_splitter(TextSplitter::new(settings.splitter.chunk_size))
            .with_lock_config(settings.lock.clone());
        let queue = PriorityQueue::with_config(coordination.clone(), clock.clone(), &settings.queue);
        Self {
            settings,
            clock,
            coordination,
            context,
            queue,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The named strategy, or the configured default.
    pub fn strategy(&self, kind: Option<StrategyKind>) -> Result<Arc<dyn ReindexStrategy>> {
        let kind = match kind {
            Some(kind) => kind,
            None => self
                .settings
                .default_strategy
                .parse()
                .context("Invalid default_strategy in configuration")?,
        };
        Ok(build_strategy(kind, self.context.clone()))
    }

    pub fn recovery(&self) -> RecoveryService {
        RecoveryService::new(
            self.coordination.clone(),
            self.context.repository.clone(),
            self.queue.clone(),
            self.clock.clone(),
            self.settings.recovery.clone(),
        )
    }

    fn worker(&self, kind: Option<StrategyKind>) -> Result<QueueWorker> {
        let source = DirectoryContentSource::new(self.settings.expanded_content_dir());
        Ok(QueueWorker::new(
            self.queue.clone(),
            self.strategy(kind)?,
            Arc::new(source),
            WorkerConfig::from(&self.settings.queue),
        ))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize output")
}

async fn read_content(args: ContentArgs) -> Result<String> {
    match (args.content, args.file) {
        (Some(content), _) => Ok(content),
        (None, Some(path)) => read_file(&path).await,
        (None, None) => bail!("Either --content or --file is required"),
    }
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Recover, then run the worker until `cancel` fires.
pub async fn serve(
    runtime: &Runtime,
    kind: Option<StrategyKind>,
    cancel: CancellationToken,
) -> Result<Value> {
    let worker = runtime.worker(kind)?;

    info!("Running startup recovery");
    let report = runtime.recovery().recover_on_startup().await;

    info!(
        content_dir = ?runtime.settings.expanded_content_dir(),
        "Queue worker starting"
    );
    let stats = worker.run(cancel).await;
    info!(processed = stats.processed, "Queue worker stopped");

    Ok(json!({ "recovery": report, "worker": stats }))
}

/// Execute one command against `runtime`.
pub async fn run_command(runtime: &Runtime, command: Commands) -> Result<Value> {
    match command {
        Commands::Serve { strategy } => {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                trigger.cancel();
            });
            serve(runtime, strategy, cancel).await
        }
        Commands::Reindex {
            document_id,
            content,
            strategy,
            simulate_delay_ms,
            document_number,
        } => {
            let content = read_content(content).await?;
            let strategy = runtime.strategy(strategy)?;
            let mut options = match simulate_delay_ms {
                Some(ms) => ReindexOptions::with_delay(Duration::from_millis(ms)),
                None => ReindexOptions::default(),
            };
            if let Some(number) = document_number {
                options = options.document_number(number);
            }
            strategy
                .reindex(&document_id, &content, &options)
                .await
                .with_context(|| format!("Reindex of {document_id} failed"))?;
            Ok(json!({
                "documentId": document_id,
                "strategy": strategy.name(),
                "status": "reindexed",
            }))
        }
        Commands::Ingest {
            document_id,
            document_number,
            content,
            strategy,
        } => {
            let content = read_content(content).await?;
            let strategy = runtime.strategy(strategy)?;
            strategy
                .ingest(&document_id, &document_number, &content)
                .await
                .with_context(|| format!("Ingest of {document_id} failed"))?;
            Ok(json!({
                "documentId": document_id,
                "documentNumber": document_number,
                "strategy": strategy.name(),
                "status": "ingested",
            }))
        }
        Commands::Delete {
            document_id,
            strategy,
        } => {
            let strategy = runtime.strategy(strategy)?;
            strategy.delete_by_document_id(&document_id).await?;
            Ok(json!({
                "documentId": document_id,
                "strategy": strategy.name(),
                "status": "deleted",
            }))
        }
        Commands::Search {
            query,
            limit,
            document_numbers,
            strategy,
        } => {
            let strategy = runtime.strategy(strategy)?;
            let results = if document_numbers.is_empty() {
                strategy.search(&query, &SearchOptions { limit }).await?
            } else {
                let Some(scoped) = strategy.document_number_search() else {
                    bail!(
                        "Strategy {} does not support document number search",
                        strategy.name()
                    );
                };
                scoped
                    .search_by_document_numbers(&query, &document_numbers)
                    .await?
            };
            Ok(json!({
                "strategy": strategy.name(),
                "count": results.len(),
                "results": to_json(&results)?,
            }))
        }
        Commands::Documents => {
            let repository = &runtime.context.repository;
            let documents = repository.all_documents().await?;
            let status_counts = repository.status_counts().await?;
            Ok(json!({
                "count": documents.len(),
                "statusCounts": status_counts,
                "documents": to_json(&documents)?,
            }))
        }
        Commands::Chunks { document_id } => {
            let chunks = runtime
                .context
                .repository
                .chunks_for_document(&document_id)
                .await?;
            Ok(json!({
                "documentId": document_id,
                "count": chunks.len(),
                "chunks": to_json(&chunks)?,
            }))
        }
        Commands::Summary { document_id } => to_json(
            &runtime
                .context
                .repository
                .document_summary(&document_id)
                .await?,
        ),
        Commands::Reset => {
            runtime
                .context
                .repository
                .store()
                .reset()
                .await
                .context("Failed to reset vector collection")?;
            Ok(json!({ "status": "collection_reset" }))
        }
        Commands::Queue { command } => run_queue_command(runtime, command).await,
        Commands::Recovery { command } => run_recovery_command(runtime, command).await,
        Commands::Bench {
            strategies,
            iterations,
            query_interval_ms,
            delay_ms,
        } => {
            let kinds = if strategies.is_empty() {
                StrategyKind::all().to_vec()
            } else {
                strategies
            };
            let options = CompareOptions {
                iterations,
                query_interval: Duration::from_millis(query_interval_ms),
                reindex_delay: Duration::from_millis(delay_ms),
            };
            to_json(&compare_strategies(&runtime.context, &kinds, &options).await?)
        }
        Commands::Gap {
            document_id,
            delay_ms,
        } => to_json(
            &demonstrate_gap(
                &runtime.context,
                &document_id,
                Duration::from_millis(delay_ms),
            )
            .await?,
        ),
    }
}

async fn run_queue_command(runtime: &Runtime, command: QueueCommands) -> Result<Value> {
    let queue = &runtime.queue;
    match command {
        QueueCommands::Enqueue {
            document_id,
            document_number,
            priority,
            reason,
        } => {
            let number = document_number.unwrap_or_else(|| document_id.clone());
            let job = ReindexJob::new(
                document_id,
                number,
                priority,
                reason,
                runtime.clock.now_ms(),
            );
            to_json(&queue.enqueue(job).await?)
        }
        QueueCommands::Status => to_json(&queue.queue_status().await?),
        QueueCommands::Position { document_id } => {
            let position = queue.position(&document_id).await?;
            Ok(json!({ "documentId": document_id, "position": position }))
        }
        QueueCommands::Bump {
            document_id,
            priority,
        } => to_json(&queue.bump_priority(&document_id, priority).await?),
        QueueCommands::Complete {
            document_id,
            failed,
            error,
        } => match queue
            .complete_job(&document_id, !failed, error.as_deref())
            .await?
        {
            Some(outcome) => to_json(&outcome),
            None => match queue.job(&document_id).await? {
                Some(job) => Ok(json!({
                    "documentId": document_id,
                    "found": true,
                    "error": "Job is not processing",
                    "status": job.status,
                })),
                None => Ok(json!({ "documentId": document_id, "found": false })),
            },
        },
        QueueCommands::Cleanup { older_than_minutes } => {
            let minutes =
                older_than_minutes.unwrap_or(runtime.settings.queue.cleanup_after_minutes);
            let cleaned = queue.cleanup_old_jobs(minutes).await?;
            Ok(json!({ "cleaned": cleaned, "olderThanMinutes": minutes }))
        }
        QueueCommands::ProcessNext { strategy } => {
            match runtime.worker(strategy)?.process_next().await? {
                Some(outcome) => to_json(&outcome),
                None => Ok(json!({ "message": "Queue empty" })),
            }
        }
    }
}

async fn run_recovery_command(runtime: &Runtime, command: RecoveryCommands) -> Result<Value> {
    let recovery = runtime.recovery();
    match command {
        RecoveryCommands::Scan {
            document_minutes,
            lock_minutes,
        } => {
            let config = recovery.config();
            let document_minutes = document_minutes.unwrap_or(config.stuck_document_minutes);
            let lock_minutes = lock_minutes.unwrap_or(config.stuck_lock_minutes);

            let documents = recovery.find_stuck_documents(document_minutes).await?;
            let locks = recovery.find_stuck_locks(lock_minutes).await?;
            let versions = recovery.find_incomplete_versions().await?;
            Ok(json!({
                "stuckDocuments": { "count": documents.len(), "documents": to_json(&documents)? },
                "stuckLocks": { "count": locks.len(), "locks": to_json(&locks)? },
                "incompleteVersions": { "count": versions.len(), "documents": to_json(&versions)? },
            }))
        }
        RecoveryCommands::Recover => to_json(&recovery.recover_on_startup().await),
        RecoveryCommands::ClearStatus { document_id } => to_json(
            &recovery
                .cleanup_stuck_document(&document_id, CleanupAction::ClearStatus)
                .await?,
        ),
        RecoveryCommands::ForceDelete { document_id } => to_json(
            &recovery
                .cleanup_stuck_document(&document_id, CleanupAction::ForceDelete)
                .await?,
        ),
        RecoveryCommands::CleanupVersions { document_id, keep } => to_json(
            &recovery
                .cleanup_incomplete_versions(&document_id, keep)
                .await?,
        ),
        RecoveryCommands::ReleaseLock { document_id } => {
            to_json(&recovery.force_release_lock(&document_id).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindex_types::{InProgressMarker, Priority};

    fn runtime() -> Runtime {
        Runtime::in_memory(Settings::default())
    }

    fn content(text: &str) -> ContentArgs {
        ContentArgs {
            content: Some(text.to_string()),
            file: None,
        }
    }

    #[tokio::test]
    async fn test_reindex_then_search() {
        let rt = runtime();
        let out = run_command(
            &rt,
            Commands::Reindex {
                document_id: "doc-1".to_string(),
                content: content("annual revenue grew in every region"),
                strategy: None,
                simulate_delay_ms: None,
                document_number: Some("DOC-001".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(out["strategy"], "blue-green");
        assert_eq!(out["status"], "reindexed");

        let out = run_command(
            &rt,
            Commands::Search {
                query: "annual revenue grew in every region".to_string(),
                limit: 10,
                document_numbers: vec!["DOC-001".to_string()],
                strategy: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["results"][0]["payload"]["documentId"], "doc-1");
    }

    #[tokio::test]
    async fn test_reindex_reads_file() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "text from disk").unwrap();

        run_command(
            &rt,
            Commands::Reindex {
                document_id: "doc-f".to_string(),
                content: ContentArgs {
                    content: None,
                    file: Some(path),
                },
                strategy: Some(StrategyKind::Baseline),
                simulate_delay_ms: None,
                document_number: None,
            },
        )
        .await
        .unwrap();

        let out = run_command(
            &rt,
            Commands::Chunks {
                document_id: "doc-f".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["chunks"][0]["content"], "text from disk");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let rt = runtime();
        let result = run_command(
            &rt,
            Commands::Reindex {
                document_id: "doc-x".to_string(),
                content: ContentArgs {
                    content: None,
                    file: Some("/nonexistent/reindex/doc.txt".into()),
                },
                strategy: None,
                simulate_delay_ms: None,
                document_number: None,
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_default_strategy() {
        let settings = Settings {
            default_strategy: "red-black".to_string(),
            ..Default::default()
        };
        let rt = Runtime::in_memory(settings);
        assert!(rt.strategy(None).is_err());
        assert!(rt.strategy(Some(StrategyKind::Locking)).is_ok());
    }

    #[tokio::test]
    async fn test_soft_delete_delete_retires_chunks() {
        let rt = runtime();
        run_command(
            &rt,
            Commands::Ingest {
                document_id: "doc-2".to_string(),
                document_number: "DOC-002".to_string(),
                content: content("some text"),
                strategy: Some(StrategyKind::SoftDelete),
            },
        )
        .await
        .unwrap();
        run_command(
            &rt,
            Commands::Delete {
                document_id: "doc-2".to_string(),
                strategy: Some(StrategyKind::SoftDelete),
            },
        )
        .await
        .unwrap();

        let out = run_command(&rt, Commands::Documents).await.unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["statusCounts"]["inactive"], 1);
        assert_eq!(out["statusCounts"]["active"], 0);
    }

    #[tokio::test]
    async fn test_queue_commands() {
        let rt = runtime();
        let out = run_queue_command(
            &rt,
            QueueCommands::Enqueue {
                document_id: "doc-1".to_string(),
                document_number: None,
                priority: Priority::Low,
                reason: "test".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out["queued"], true);
        assert_eq!(out["position"], 1);

        run_queue_command(
            &rt,
            QueueCommands::Enqueue {
                document_id: "doc-2".to_string(),
                document_number: None,
                priority: Priority::Critical,
                reason: "test".to_string(),
            },
        )
        .await
        .unwrap();

        let out = run_queue_command(
            &rt,
            QueueCommands::Position {
                document_id: "doc-1".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out["position"], 2);

        let out = run_queue_command(&rt, QueueCommands::Status).await.unwrap();
        assert_eq!(out["totalJobs"], 2);
        assert_eq!(out["jobs"][0]["documentId"], "doc-2");

        let out = run_queue_command(
            &rt,
            QueueCommands::Bump {
                document_id: "missing".to_string(),
                priority: Priority::High,
            },
        )
        .await
        .unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "Job not found");

        let out = run_queue_command(
            &rt,
            QueueCommands::Complete {
                document_id: "missing".to_string(),
                failed: false,
                error: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(out["found"], false);

        let out = run_queue_command(
            &rt,
            QueueCommands::Complete {
                document_id: "doc-1".to_string(),
                failed: false,
                error: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(out["found"], true);
        assert_eq!(out["error"], "Job is not processing");
        assert_eq!(out["status"], "queued");
    }

    #[tokio::test]
    async fn test_process_next_without_content_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            content_dir: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let rt = Runtime::in_memory(settings);

        let out = run_queue_command(&rt, QueueCommands::ProcessNext { strategy: None })
            .await
            .unwrap();
        assert_eq!(out["message"], "Queue empty");

        std::fs::write(dir.path().join("doc-a.txt"), "fresh content").unwrap();
        for id in ["doc-a", "doc-b"] {
            run_queue_command(
                &rt,
                QueueCommands::Enqueue {
                    document_id: id.to_string(),
                    document_number: None,
                    priority: Priority::Normal,
                    reason: "test".to_string(),
                },
            )
            .await
            .unwrap();
        }

        let out = run_queue_command(&rt, QueueCommands::ProcessNext { strategy: None })
            .await
            .unwrap();
        assert_eq!(out["documentId"], "doc-a");
        assert_eq!(out["status"], "completed");

        let out = run_queue_command(&rt, QueueCommands::ProcessNext { strategy: None })
            .await
            .unwrap();
        assert_eq!(out["documentId"], "doc-b");
        assert_eq!(out["status"], "failed");
        assert_eq!(out["retryScheduled"], 1);
    }

    #[tokio::test]
    async fn test_recovery_commands() {
        let rt = runtime();
        let out = run_recovery_command(
            &rt,
            RecoveryCommands::Scan {
                document_minutes: None,
                lock_minutes: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(out["stuckDocuments"]["count"], 0);
        assert_eq!(out["stuckLocks"]["count"], 0);
        assert_eq!(out["incompleteVersions"]["count"], 0);

        rt.context
            .markers()
            .begin("doc-1", &InProgressMarker::new("DOC-1", rt.clock.now_ms()))
            .await
            .unwrap();
        let out = run_recovery_command(
            &rt,
            RecoveryCommands::ClearStatus {
                document_id: "doc-1".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out["action"], "clear-status");
        assert_eq!(out["success"], true);
        assert!(rt.context.markers().get("doc-1").await.unwrap().is_none());

        let out = run_recovery_command(
            &rt,
            RecoveryCommands::ReleaseLock {
                document_id: "doc-1".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out["released"], false);

        let out = run_recovery_command(&rt, RecoveryCommands::Recover)
            .await
            .unwrap();
        assert_eq!(out["orphanDocuments"], 0);
        assert_eq!(out["errors"], 0);
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let rt = runtime();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = serve(&rt, Some(StrategyKind::Baseline), cancel).await.unwrap();
        assert_eq!(out["worker"]["processed"], 0);
        assert_eq!(out["recovery"]["errors"], 0);
    }
}
