//! Run orchestration: scan, partition, fan out over workers, aggregate,
//! flush the index exactly once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use report_analyzer::{create_provider, AnalysisProvider, Provider};
use report_project_index::{EmbeddingClient, ProjectIndex};
use report_protocol::{Document, ProcessingRecord, ProcessingStatus};

use crate::change::{self, PendingDocument, RunOptions};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::loader;
use crate::mapper::ProjectMapper;
use crate::persist::{NamingPlan, RecordStore};
use crate::run_index;
use crate::scanner::DocumentScanner;
use crate::stats::{DocumentEmbedding, RunReport, RunSummary};

/// One worker's result for one document.
struct DocumentOutcome {
    record: ProcessingRecord,
    relative: String,
    hash: String,
    doc_embedding: Option<Vec<f32>>,
}

/// The incremental document pipeline.
///
/// `run` is a complete cycle: discover documents, decide what changed,
/// analyze and map the changed ones in parallel, persist their records and
/// publish the updated run index. Document-level failures are recorded and
/// never abort the run; only setup and the final index flush are fatal.
pub struct DocumentPipeline {
    config: PipelineConfig,
    provider: Arc<dyn AnalysisProvider>,
}

impl DocumentPipeline {
    /// Builds the pipeline with the provider named in the configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let provider_kind = Provider::parse(&config.provider).ok_or_else(|| {
            PipelineError::Config(format!("unknown provider '{}'", config.provider))
        })?;
        let provider = create_provider(provider_kind, &config.provider_settings())?;
        Ok(Self { config, provider })
    }

    /// Same pipeline with an injected analysis backend.
    pub fn with_provider(
        config: PipelineConfig,
        provider: Arc<dyn AnalysisProvider>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, provider })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        let started = Instant::now();

        let embedder = Arc::new(EmbeddingClient::from_env(
            &self.config.ollama.base_url,
            &self.config.ollama.embed_model,
            self.config.timeout_secs,
        )?);
        let master = Arc::new(
            ProjectIndex::load_or_build(
                &self.config.master_path(),
                &self.config.vectors_path(),
                &embedder,
            )
            .await?,
        );
        log::info!("Project master: {} projects", master.len());

        let index_path = self.config.run_index_path();
        let mut index = run_index::load(&index_path)?;

        let files = DocumentScanner::new(self.config.docs_dir.clone()).scan();
        let change_set = change::partition(&self.config.docs_dir, &files, &index, options)?;

        let store = Arc::new(RecordStore::new(&self.config.data_dir));
        store.ensure_layout()?;
        let all_keys: Vec<String> = change_set
            .to_process
            .iter()
            .chain(change_set.to_skip.iter())
            .map(|pending| pending.relative.clone())
            .collect();
        let plan = Arc::new(NamingPlan::new(&all_keys));

        let mut records: Vec<ProcessingRecord> = change_set
            .to_skip
            .iter()
            .map(skipped_record)
            .collect();

        let mapper = Arc::new(ProjectMapper::new(
            master,
            embedder,
            self.config.vector.threshold,
            self.config.vector.top_k,
            self.config.vector.embed_excerpt_chars,
        ));

        let outcomes = self
            .run_workers(change_set.to_process, mapper, store, plan)
            .await;

        let mut embeddings = Vec::new();
        for outcome in outcomes {
            index.apply(
                &outcome.relative,
                outcome.record.status,
                &outcome.hash,
                outcome.record.processed_at,
            );
            if let Some(vector) = outcome.doc_embedding {
                embeddings.push(DocumentEmbedding {
                    path: outcome.relative,
                    vector,
                });
            }
            records.push(outcome.record);
        }
        index.last_updated = Utc::now();
        run_index::flush(&index, &index_path).await?;

        records.sort_by(|a, b| a.document.path.cmp(&b.document.path));
        embeddings.sort_by(|a, b| a.path.cmp(&b.path));

        let elapsed_ms = (started.elapsed().as_millis() as u64).max(1);
        let summary = RunSummary::from_records(&records, elapsed_ms);
        log::info!(
            "Run finished: {} success, {} skipped, {} failed, {} need review in {} ms",
            summary.success,
            summary.skipped,
            summary.failed,
            summary.needs_review,
            summary.elapsed_ms
        );
        Ok(RunReport {
            summary,
            records,
            embeddings,
        })
    }

    async fn run_workers(
        &self,
        pending: Vec<PendingDocument>,
        mapper: Arc<ProjectMapper>,
        store: Arc<RecordStore>,
        plan: Arc<NamingPlan>,
    ) -> Vec<DocumentOutcome> {
        if pending.is_empty() {
            return Vec::new();
        }
        let worker_count = self.worker_count(pending.len());
        let chunk_size = pending.len().div_ceil(worker_count);
        log::debug!(
            "Processing {} documents on {} workers",
            pending.len(),
            worker_count
        );

        let mut tasks = Vec::with_capacity(worker_count);
        for chunk in pending.chunks(chunk_size) {
            let chunk = chunk.to_vec();
            let fallback = chunk.clone();
            let provider = Arc::clone(&self.provider);
            let mapper = Arc::clone(&mapper);
            let store = Arc::clone(&store);
            let plan = Arc::clone(&plan);
            let task = tokio::spawn(async move {
                let mut outcomes = Vec::with_capacity(chunk.len());
                for pending in chunk {
                    outcomes.push(process_document(pending, &*provider, &mapper, &store, &plan).await);
                }
                outcomes
            });
            tasks.push((task, fallback));
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for (task, fallback) in tasks {
            match task.await {
                Ok(mut chunk_outcomes) => outcomes.append(&mut chunk_outcomes),
                Err(err) => {
                    log::error!("Worker panicked: {err}");
                    for pending in fallback {
                        outcomes.push(failed_outcome(
                            &pending,
                            None,
                            "worker panicked".to_string(),
                        ));
                    }
                }
            }
        }
        outcomes
    }

    /// Explicit worker override, or a small adaptive cap: analysis is
    /// network-bound but loading and hashing still burn CPU.
    fn worker_count(&self, pending: usize) -> usize {
        let configured = if self.config.workers > 0 {
            self.config.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .clamp(2, 8)
        };
        configured.min(pending).max(1)
    }
}

async fn process_document(
    pending: PendingDocument,
    provider: &dyn AnalysisProvider,
    mapper: &ProjectMapper,
    store: &RecordStore,
    plan: &NamingPlan,
) -> DocumentOutcome {
    let loaded = match loader::load(&pending.path) {
        Ok(loaded) => loaded,
        Err(err) => {
            log::warn!("Load failed for {}: {err}", pending.relative);
            let outcome = failed_outcome(&pending, None, format!("load failed: {err}"));
            persist_best_effort(store, plan, &outcome.record, &pending.relative);
            return outcome;
        }
    };
    log::debug!(
        "Loaded {} ({} bytes, modified {})",
        pending.relative,
        loaded.size_bytes,
        loaded.modified_at
    );

    let document = Document {
        path: PathBuf::from(&pending.relative),
        content_hash: pending.hash.clone(),
        text: Arc::from(loaded.text.as_str()),
        discovered_at: Utc::now(),
    };
    let filename = pending
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(&pending.relative);

    let analysis = match provider.classify(&document.text, filename).await {
        Ok(analysis) => analysis,
        Err(err) => {
            log::warn!("Analysis failed for {}: {err}", pending.relative);
            let outcome =
                failed_outcome(&pending, Some(document), format!("analysis failed: {err}"));
            persist_best_effort(store, plan, &outcome.record, &pending.relative);
            return outcome;
        }
    };

    let (mapping, doc_embedding) = mapper.map(&document.text, &analysis).await;
    let record = ProcessingRecord {
        document,
        analysis: Some(analysis),
        mapping: Some(mapping),
        status: ProcessingStatus::Success,
        error_detail: None,
        processed_at: Utc::now(),
    };

    let stem = plan.stem_for(&pending.relative);
    if let Err(err) = store.persist(&stem, &record) {
        log::error!("Persist failed for {}: {err}", pending.relative);
        let mut failed = record;
        failed.status = ProcessingStatus::Failed;
        failed.error_detail = Some(format!("persist failed: {err}"));
        return DocumentOutcome {
            record: failed,
            relative: pending.relative,
            hash: pending.hash,
            doc_embedding: None,
        };
    }

    DocumentOutcome {
        record,
        relative: pending.relative,
        hash: pending.hash,
        doc_embedding,
    }
}

fn persist_best_effort(
    store: &RecordStore,
    plan: &NamingPlan,
    record: &ProcessingRecord,
    relative: &str,
) {
    let stem = plan.stem_for(relative);
    if let Err(err) = store.persist(&stem, record) {
        log::error!("Could not persist failed record for {relative}: {err}");
    }
}

fn failed_outcome(
    pending: &PendingDocument,
    document: Option<Document>,
    detail: String,
) -> DocumentOutcome {
    let document = document.unwrap_or_else(|| placeholder_document(pending));
    DocumentOutcome {
        record: ProcessingRecord {
            document,
            analysis: None,
            mapping: None,
            status: ProcessingStatus::Failed,
            error_detail: Some(detail),
            processed_at: Utc::now(),
        },
        relative: pending.relative.clone(),
        hash: pending.hash.clone(),
        doc_embedding: None,
    }
}

fn skipped_record(pending: &PendingDocument) -> ProcessingRecord {
    ProcessingRecord {
        document: placeholder_document(pending),
        analysis: None,
        mapping: None,
        status: ProcessingStatus::Skipped,
        error_detail: None,
        processed_at: Utc::now(),
    }
}

/// Identity-only document for records that never load content.
fn placeholder_document(pending: &PendingDocument) -> Document {
    Document {
        path: PathBuf::from(&pending.relative),
        content_hash: pending.hash.clone(),
        text: Arc::from(""),
        discovered_at: Utc::now(),
    }
}
