mod config;
mod partition;
mod publish;
mod reconcile;
mod services;

pub use config::{PipelineConfig, PipelineTuning, RunMode};
pub use partition::{contiguous_range, interleaved};
pub use publish::UploadTally;
pub use reconcile::{OrphanedRecord, ReconcileReport};
#[allow(clippy::module_name_repetitions)]
pub use services::{extraction_confidence, DefaultDocumentServices, DocumentServices};

use std::sync::Arc;

use common::error::AppError;
use common::storage::metadata_store::MetadataStore;
use common::storage::search::SearchPublisher;
use common::storage::types::document::{derive_document_id, Document, DocumentStatus, Stage};
use common::storage::types::work_item::WorkItem;
use futures::stream::{self, StreamExt};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, instrument, warn};

use self::publish::{publish_records, to_search_record};
use crate::chunker::{chunk_document, ChunkStatus};
use crate::error::{ServiceError, StageError};
use crate::gates;

/// Aggregate counters returned by every run. A run always completes; no
/// single document's failure propagates past the batch boundary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub chunks_published: usize,
    pub chunks_failed: usize,
}

/// Coarse verdict from the batch existence precheck. `Revisit` only proves a
/// metadata record exists; the stored record decides between skip, index
/// repair, and full reprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipDecision {
    Process,
    Revisit,
    AlreadyDone,
}

enum ItemOutcome {
    Skipped,
    Completed {
        chunks_published: usize,
        chunks_failed: usize,
    },
    Failed,
}

struct StageLimits {
    fetch: Semaphore,
    extract: Semaphore,
    inference: Semaphore,
    embedding: Semaphore,
}

pub struct Pipeline {
    store: Arc<dyn MetadataStore>,
    publisher: Arc<dyn SearchPublisher>,
    services: Arc<dyn DocumentServices>,
    config: PipelineConfig,
    limits: StageLimits,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        publisher: Arc<dyn SearchPublisher>,
        services: Arc<dyn DocumentServices>,
        config: PipelineConfig,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let tuning = &config.tuning;
        let limits = StageLimits {
            fetch: Semaphore::new(tuning.fetch_concurrency),
            extract: Semaphore::new(tuning.extract_concurrency),
            inference: Semaphore::new(tuning.inference_concurrency),
            embedding: Semaphore::new(tuning.embedding_concurrency),
        };
        Ok(Self {
            store,
            publisher,
            services,
            config,
            limits,
        })
    }

    /// Drives one run to completion. Only index bootstrap and store
    /// connectivity failures abort; everything else is per-document.
    pub async fn run(&self, work: &[WorkItem]) -> Result<RunSummary, AppError> {
        self.publisher.ensure_index().await?;
        match self.config.run_mode {
            RunMode::IndexOnly => self.reconcile().await,
            RunMode::Full | RunMode::MetadataOnly => self.run_forward(work).await,
        }
    }

    pub async fn audit(&self) -> Result<ReconcileReport, AppError> {
        reconcile::audit(
            self.store.as_ref(),
            self.publisher.as_ref(),
            self.config.tuning.scan_page_size,
        )
        .await
    }

    #[instrument(
        skip_all,
        fields(
            shard = self.config.shard_index,
            shard_count = self.config.shard_count,
            work_items = work.len()
        )
    )]
    async fn run_forward(&self, work: &[WorkItem]) -> Result<RunSummary, AppError> {
        let range = partition::contiguous_range(
            work.len(),
            self.config.shard_count,
            self.config.shard_index,
        );
        let assigned = &work[range];
        info!(assigned = assigned.len(), "forward pass started");

        let mut summary = RunSummary {
            total: assigned.len(),
            ..RunSummary::default()
        };
        for batch in assigned.chunks(self.config.tuning.work_batch_size) {
            let decisions = self.precheck(batch).await?;
            let outcomes: Vec<ItemOutcome> = stream::iter(batch.iter().zip(decisions))
                .map(|(item, decision)| self.process_item(item, decision))
                .buffer_unordered(self.config.tuning.document_concurrency)
                .collect()
                .await;
            summary.absorb(outcomes);
        }

        info!(
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            chunks_published = summary.chunks_published,
            "forward pass finished"
        );
        Ok(summary)
    }

    /// Two queries for the whole batch instead of two per item. Must reach
    /// the same decisions as checking items one at a time.
    async fn precheck(&self, batch: &[WorkItem]) -> Result<Vec<SkipDecision>, AppError> {
        let locators: Vec<String> = batch.iter().map(|item| item.locator.clone()).collect();
        let stored = self.store.existing_locators(&locators).await?;

        let ids: Vec<String> = batch
            .iter()
            .map(|item| derive_document_id(&item.locator))
            .collect();
        let indexed = self.publisher.is_indexed_batch(&ids).await?;

        Ok(batch
            .iter()
            .zip(ids)
            .map(|(item, id)| {
                match (stored.contains(&item.locator), indexed.contains(&id)) {
                    (true, true) => SkipDecision::AlreadyDone,
                    (true, false) => SkipDecision::Revisit,
                    // Orphaned index entries get their metadata restored by a
                    // full pass; the upload overwrites by deterministic id.
                    (false, _) => SkipDecision::Process,
                }
            })
            .collect())
    }

    #[instrument(skip_all, fields(locator = %item.locator))]
    async fn process_item(&self, item: &WorkItem, decision: SkipDecision) -> ItemOutcome {
        match decision {
            SkipDecision::AlreadyDone => {
                debug!("stored and indexed; skipping");
                ItemOutcome::Skipped
            }
            SkipDecision::Revisit => self.revisit_item(item).await,
            SkipDecision::Process => self.drive_document(item, None).await,
        }
    }

    async fn revisit_item(&self, item: &WorkItem) -> ItemOutcome {
        let id = derive_document_id(&item.locator);
        let stored = match self.store.get(&id).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(document_id = %id, error = %err, "failed to load stored document");
                return ItemOutcome::Failed;
            }
        };
        let Some(document) = stored else {
            // Deleted between precheck and now; treat as new.
            return self.drive_document(item, None).await;
        };

        if self.config.run_mode.metadata_only() {
            if document.is_complete(true) {
                debug!(document_id = %id, status = ?document.status, "metadata already stored; skipping");
                return ItemOutcome::Skipped;
            }
            return self.drive_document(item, Some(document)).await;
        }

        // The index check already reported this document absent, so a stored
        // `Indexed` status is stale and cannot justify a skip.
        let repairable = document.metadata.is_some() && !document.text.trim().is_empty();
        if repairable {
            debug!(document_id = %id, status = ?document.status, "stored but not indexed; redriving chunk/embed/publish");
            self.finish_document(document).await
        } else {
            self.drive_document(item, Some(document)).await
        }
    }

    async fn drive_document(&self, item: &WorkItem, existing: Option<Document>) -> ItemOutcome {
        let mut document = existing.unwrap_or_else(|| Document::new(&item.locator));
        match self.run_stages(&mut document).await {
            Ok((chunks_published, chunks_failed)) => ItemOutcome::Completed {
                chunks_published,
                chunks_failed,
            },
            Err(err) => {
                self.record_stage_failure(&mut document, &err).await;
                ItemOutcome::Failed
            }
        }
    }

    /// Chunk -> Embed -> Publish for a document whose text and metadata are
    /// already stored (repair path and reconciliation).
    async fn finish_document(&self, mut document: Document) -> ItemOutcome {
        match self.index_document(&mut document).await {
            Ok((chunks_published, chunks_failed)) => ItemOutcome::Completed {
                chunks_published,
                chunks_failed,
            },
            Err(err) => {
                self.record_stage_failure(&mut document, &err).await;
                ItemOutcome::Failed
            }
        }
    }

    async fn record_stage_failure(&self, document: &mut Document, err: &StageError) {
        warn!(document_id = %document.id, error = %err, "document failed this run");
        let status = err.failed_status().unwrap_or(document.status);
        document.record_failure(status, err.to_string());
        if let Err(store_err) = self.store.upsert(document).await {
            warn!(
                document_id = %document.id,
                error = %store_err,
                "failed to persist failure status"
            );
        }
    }

    async fn run_stages(&self, document: &mut Document) -> Result<(usize, usize), StageError> {
        let tuning = &self.config.tuning;

        document.stage_timestamps.start(Stage::Fetch);
        let bytes = {
            let _permit = self.permit(&self.limits.fetch).await?;
            self.services
                .fetch(&document.locator)
                .await
                .map_err(StageError::Fetch)?
        };
        document.size_bytes = bytes.len() as u64;
        document.stage_timestamps.finish(Stage::Fetch);
        document.advance(DocumentStatus::Fetched);
        self.store.upsert(document).await?;

        document.stage_timestamps.start(Stage::Extract);
        let (text, confidence) = {
            let _permit = self.permit(&self.limits.extract).await?;
            self.services
                .extract(bytes)
                .await
                .map_err(StageError::Extract)?
        };
        if !gates::is_extraction_acceptable(
            &text,
            confidence,
            tuning.min_text_length,
            tuning.min_confidence,
        ) {
            return Err(StageError::QualityRejected(format!(
                "text length {} at confidence {confidence:.2} is below thresholds",
                text.trim().chars().count()
            )));
        }
        document.text = text;
        document.confidence = confidence;
        document.stage_timestamps.finish(Stage::Extract);
        document.advance(DocumentStatus::Extracted);
        self.store.upsert(document).await?;

        document.stage_timestamps.start(Stage::Metadata);
        let metadata = {
            let _permit = self.permit(&self.limits.inference).await?;
            self.services
                .infer_metadata(&document.text)
                .await
                .map_err(StageError::Infer)?
        };
        if !gates::is_metadata_acceptable(&metadata) {
            return Err(StageError::MetadataRejected(
                "missing case reference, court, or parseable judgment date".into(),
            ));
        }
        document.metadata = Some(metadata);
        document.stage_timestamps.finish(Stage::Metadata);
        document.advance(DocumentStatus::MetadataOk);
        self.store.upsert(document).await?;

        if self.config.run_mode.metadata_only() {
            return Ok((0, 0));
        }
        self.index_document(document).await
    }

    async fn index_document(&self, document: &mut Document) -> Result<(usize, usize), StageError> {
        let tuning = &self.config.tuning;

        document.stage_timestamps.start(Stage::Chunking);
        let mut chunks = chunk_document(
            &document.id,
            &document.text,
            tuning.chunk_size,
            tuning.chunk_overlap,
            tuning.min_chunk_length,
        );
        if chunks.is_empty() {
            return Err(StageError::ChunkingProducedNone);
        }
        document.stage_timestamps.finish(Stage::Chunking);
        document.advance(DocumentStatus::Chunked);
        self.store.upsert(document).await?;

        document.stage_timestamps.start(Stage::Embedding);
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embed_with_fallback(&texts).await;
        let mut dropped = 0usize;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            match vector {
                Some(vector) => {
                    chunk.vector = Some(vector);
                    chunk.status = ChunkStatus::Embedded;
                }
                None => {
                    chunk.status = ChunkStatus::EmbedFailed;
                    dropped += 1;
                }
            }
        }
        if dropped == chunks.len() {
            return Err(StageError::Embed(ServiceError::Permanent(
                "no chunk could be embedded".into(),
            )));
        }
        document.stage_timestamps.finish(Stage::Embedding);
        document.advance(DocumentStatus::Embedded);
        self.store.upsert(document).await?;

        document.stage_timestamps.start(Stage::Indexing);
        let records: Vec<_> = chunks
            .iter()
            .filter(|chunk| chunk.status == ChunkStatus::Embedded)
            .filter_map(|chunk| to_search_record(chunk, document))
            .collect();
        let tally = publish_records(
            self.publisher.as_ref(),
            records,
            tuning.upload_batch_size,
            tuning.upload_concurrency,
        )
        .await;
        document.stage_timestamps.finish(Stage::Indexing);

        if tally.succeeded == 0 {
            return Err(StageError::IndexRejected);
        }
        document.advance(DocumentStatus::Indexed);
        self.store.upsert(document).await?;

        let chunks_failed = tally.failed + dropped;
        info!(
            document_id = %document.id,
            chunks_published = tally.succeeded,
            chunks_failed,
            "document indexed"
        );
        Ok((tally.succeeded, chunks_failed))
    }

    /// Batched embedding with per-item fallback: one poisoned text must not
    /// discard vectors computable for its batch-mates. The fallback runs
    /// sequentially; the collaborator is already degraded.
    async fn embed_with_fallback(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let batch_size = self.config.tuning.embedding_batch_size.max(1);
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size) {
            let _permit = match self.limits.embedding.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    vectors.extend(batch.iter().map(|_| None));
                    continue;
                }
            };
            match self.services.embed_batch(batch).await {
                Ok(batch_vectors) if batch_vectors.len() == batch.len() => {
                    vectors.extend(batch_vectors.into_iter().map(Some));
                }
                Ok(batch_vectors) => {
                    warn!(
                        expected = batch.len(),
                        received = batch_vectors.len(),
                        "embedding batch length mismatch; retrying items singly"
                    );
                    self.embed_singly(batch, &mut vectors).await;
                }
                Err(err) => {
                    warn!(error = %err, "embedding batch failed; retrying items singly");
                    self.embed_singly(batch, &mut vectors).await;
                }
            }
        }
        vectors
    }

    async fn embed_singly(&self, batch: &[String], vectors: &mut Vec<Option<Vec<f32>>>) {
        for text in batch {
            match self.services.embed_batch(std::slice::from_ref(text)).await {
                Ok(mut single) if single.len() == 1 => vectors.push(single.pop()),
                Ok(_) => {
                    warn!("single-item embedding returned wrong shape; dropping chunk");
                    vectors.push(None);
                }
                Err(err) => {
                    warn!(error = %err, "single-item embedding failed; dropping chunk");
                    vectors.push(None);
                }
            }
        }
    }

    #[instrument(skip_all, fields(shard = self.config.shard_index))]
    async fn reconcile(&self) -> Result<RunSummary, AppError> {
        let report = self.audit().await?;
        for orphan in &report.orphaned {
            warn!(
                document_id = %orphan.document_id,
                locator = orphan.locator.as_deref().unwrap_or("undecodable"),
                "indexed document has no metadata record; not auto-deleted"
            );
        }

        let mine = partition::interleaved(
            &report.needs_indexing,
            self.config.shard_count,
            self.config.shard_index,
        );
        let mut summary = RunSummary {
            total: mine.len(),
            skipped: report.synced.len(),
            ..RunSummary::default()
        };

        let outcomes: Vec<ItemOutcome> = stream::iter(mine)
            .map(|id| self.repair_by_id(id))
            .buffer_unordered(self.config.tuning.document_concurrency)
            .collect()
            .await;
        summary.absorb(outcomes);

        info!(
            repaired = summary.successful,
            failed = summary.failed,
            already_synced = summary.skipped,
            orphaned = report.orphaned.len(),
            "reconciliation finished"
        );
        Ok(summary)
    }

    #[instrument(skip_all, fields(document_id = %id))]
    async fn repair_by_id(&self, id: String) -> ItemOutcome {
        let stored = match self.store.get(&id).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "failed to load document for repair");
                return ItemOutcome::Failed;
            }
        };
        let Some(document) = stored else {
            warn!("document vanished between audit and repair");
            return ItemOutcome::Skipped;
        };
        if document.metadata.is_none() || document.text.trim().is_empty() {
            warn!("stored record lacks text or metadata; needs a full forward run");
            return ItemOutcome::Failed;
        }
        self.finish_document(document).await
    }

    async fn permit<'a>(
        &self,
        semaphore: &'a Semaphore,
    ) -> Result<SemaphorePermit<'a>, StageError> {
        semaphore
            .acquire()
            .await
            .map_err(|_| AppError::Internal("stage limiter closed".into()).into())
    }
}

impl RunSummary {
    fn absorb(&mut self, outcomes: Vec<ItemOutcome>) {
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Skipped => self.skipped += 1,
                ItemOutcome::Completed {
                    chunks_published,
                    chunks_failed,
                } => {
                    self.successful += 1;
                    self.chunks_published += chunks_published;
                    self.chunks_failed += chunks_failed;
                }
                ItemOutcome::Failed => self.failed += 1,
            }
        }
    }
}
