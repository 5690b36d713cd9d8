use chrono::Utc;
use common::storage::search::{SearchPublisher, SearchRecord};
use common::storage::types::document::Document;
use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::chunker::Chunk;

/// Aggregate result of pushing one document's chunks to the index. Mixed
/// batches are normal; the caller decides what the counts mean for the
/// document's status.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadTally {
    pub succeeded: usize,
    pub failed: usize,
    pub failed_ids: Vec<String>,
}

/// Flattens a chunk and its document's metadata snapshot into one index
/// record. Chunks without a vector cannot be indexed.
pub fn to_search_record(chunk: &Chunk, document: &Document) -> Option<SearchRecord> {
    let content_vector = chunk.vector.clone()?;
    let metadata = document.metadata.clone().unwrap_or_default();

    Some(SearchRecord {
        id: chunk.id.clone(),
        document_id: chunk.document_id.clone(),
        content: chunk.text.clone(),
        content_vector,
        chunk_index: chunk.ordinal,
        chunk_total: chunk.total_for_document,
        case_name: metadata.case_name.unwrap_or_default(),
        case_number: metadata.case_number.unwrap_or_default(),
        citation: metadata.citation.unwrap_or_default(),
        court: metadata.court.unwrap_or_default(),
        bench: metadata.bench.unwrap_or_default(),
        summary: metadata.summary.unwrap_or_default(),
        keywords: metadata.keywords,
        petitioner_advocates: metadata.petitioner_advocates,
        respondent_advocates: metadata.respondent_advocates,
        date_of_judgment: metadata.date_of_judgment,
        created_at: Utc::now(),
    })
}

/// Uploads in bounded-concurrency batches and tallies per-record outcomes.
/// A batch that fails outright counts all of its records as failed; no
/// failure here aborts the document, let alone the run.
pub async fn publish_records(
    publisher: &dyn SearchPublisher,
    records: Vec<SearchRecord>,
    batch_size: usize,
    concurrency: usize,
) -> UploadTally {
    let batches: Vec<Vec<SearchRecord>> = records
        .chunks(batch_size.max(1))
        .map(<[SearchRecord]>::to_vec)
        .collect();

    let results: Vec<_> = stream::iter(batches)
        .map(|batch| async move {
            let ids: Vec<String> = batch.iter().map(|record| record.id.clone()).collect();
            let outcome = publisher.upload_batch(batch).await;
            (ids, outcome)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut tally = UploadTally::default();
    for (ids, result) in results {
        match result {
            Ok(outcomes) => {
                for outcome in outcomes {
                    if outcome.success {
                        tally.succeeded += 1;
                    } else {
                        warn!(
                            record_id = %outcome.id,
                            error = outcome.error.as_deref().unwrap_or("unspecified"),
                            "index rejected record"
                        );
                        tally.failed += 1;
                        tally.failed_ids.push(outcome.id);
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, records = ids.len(), "upload batch failed outright");
                tally.failed += ids.len();
                tally.failed_ids.extend(ids);
            }
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkStatus;
    use common::storage::search::InMemorySearchPublisher;

    fn embedded_chunk(document_id: &str, ordinal: u32, total: u32) -> Chunk {
        Chunk {
            id: crate::chunker::derive_chunk_id(document_id, ordinal),
            document_id: document_id.to_string(),
            text: "chunk body ".repeat(20),
            ordinal,
            total_for_document: total,
            vector: Some(vec![0.1, 0.2, 0.3]),
            status: ChunkStatus::Embedded,
        }
    }

    #[test]
    fn chunks_without_vectors_produce_no_record() {
        let document = Document::new("blob://court/a.pdf");
        let mut chunk = embedded_chunk(&document.id, 0, 1);
        chunk.vector = None;
        assert!(to_search_record(&chunk, &document).is_none());
    }

    #[test]
    fn record_carries_the_metadata_snapshot() {
        let mut document = Document::new("blob://court/a.pdf");
        document.metadata = Some(common::storage::types::metadata::JudgmentMetadata {
            case_number: Some("CRL.A. 123/2020".into()),
            court: Some("High Court".into()),
            keywords: vec!["appeal".into()],
            ..Default::default()
        });

        let chunk = embedded_chunk(&document.id, 2, 5);
        let record = to_search_record(&chunk, &document).expect("record");
        assert_eq!(record.case_number, "CRL.A. 123/2020");
        assert_eq!(record.court, "High Court");
        assert_eq!(record.keywords, vec!["appeal".to_string()]);
        assert_eq!(record.chunk_index, 2);
        assert_eq!(record.chunk_total, 5);
        assert!(record.case_name.is_empty(), "absent fields become empty strings");
    }

    #[tokio::test]
    async fn partial_failure_is_tallied_per_record() {
        let publisher = InMemorySearchPublisher::new();
        let document = Document::new("blob://court/b.pdf");
        let records: Vec<SearchRecord> = (0..10)
            .map(|i| {
                to_search_record(&embedded_chunk(&document.id, i, 10), &document)
                    .expect("record")
            })
            .collect();

        let rejected: Vec<String> = records[..3].iter().map(|r| r.id.clone()).collect();
        publisher.reject_ids(rejected.clone()).await;

        let tally = publish_records(&publisher, records, 4, 2).await;
        assert_eq!(tally.succeeded, 7);
        assert_eq!(tally.failed, 3);
        let mut failed = tally.failed_ids.clone();
        failed.sort();
        let mut expected = rejected.clone();
        expected.sort();
        assert_eq!(failed, expected);

        for id in &rejected {
            assert!(!publisher.contains_record(id).await);
        }
        assert_eq!(publisher.record_count().await, 7);
    }
}
