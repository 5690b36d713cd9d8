use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;

use super::db::SurrealDbClient;
use super::types::document::Document;
use super::types::StoredObject;

/// Durable per-document state, shared by every shard. All writes are
/// idempotent upserts keyed by the deterministic document id, so redundant
/// work across shards converges rather than corrupts.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn upsert(&self, document: &Document) -> Result<(), AppError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, AppError>;

    async fn exists(&self, id: &str) -> Result<bool, AppError>;

    async fn get_by_locator(&self, locator: &str) -> Result<Option<Document>, AppError>;

    /// Which of the given locators already have a stored record. Must agree
    /// with calling `get_by_locator` one at a time.
    async fn existing_locators(&self, locators: &[String]) -> Result<HashSet<String>, AppError>;

    async fn scan_page(&self, start: usize, limit: usize) -> Result<Vec<Document>, AppError>;

    /// Exhaustive scan, paged internally.
    async fn scan_all(&self, page_size: usize) -> Result<Vec<Document>, AppError> {
        let page_size = page_size.max(1);
        let mut documents = Vec::new();
        let mut start = 0;
        loop {
            let page = self.scan_page(start, page_size).await?;
            let fetched = page.len();
            documents.extend(page);
            if fetched < page_size {
                break;
            }
            start += fetched;
        }
        Ok(documents)
    }
}

pub struct SurrealMetadataStore {
    db: Arc<SurrealDbClient>,
}

impl SurrealMetadataStore {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for SurrealMetadataStore {
    async fn upsert(&self, document: &Document) -> Result<(), AppError> {
        self.db.upsert_item(document.clone()).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, AppError> {
        Ok(self.db.get_item::<Document>(id).await?)
    }

    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.get(id).await?.is_some())
    }

    async fn get_by_locator(&self, locator: &str) -> Result<Option<Document>, AppError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT * FROM {} WHERE locator = $locator LIMIT 1",
                Document::table_name()
            ))
            .bind(("locator", locator.to_string()))
            .await?;

        let mut documents: Vec<Document> = response.take(0)?;
        Ok(documents.pop())
    }

    async fn existing_locators(&self, locators: &[String]) -> Result<HashSet<String>, AppError> {
        if locators.is_empty() {
            return Ok(HashSet::new());
        }

        let mut response = self
            .db
            .query(format!(
                "SELECT VALUE locator FROM {} WHERE locator IN $locators",
                Document::table_name()
            ))
            .bind(("locators", locators.to_vec()))
            .await?;

        let found: Vec<String> = response.take(0)?;
        Ok(found.into_iter().collect())
    }

    async fn scan_page(&self, start: usize, limit: usize) -> Result<Vec<Document>, AppError> {
        Ok(self.db.select_page(start, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::document::DocumentStatus;
    use uuid::Uuid;

    async fn setup_store() -> SurrealMetadataStore {
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("store_test", &database)
            .await
            .expect("Failed to start in-memory surrealdb");
        SurrealMetadataStore::new(Arc::new(db))
    }

    #[tokio::test]
    async fn lookup_by_locator_and_id() {
        let store = setup_store().await;
        let doc = Document::new("blob://court/2020/a.pdf");
        store.upsert(&doc).await.expect("upsert");

        assert!(store.exists(&doc.id).await.expect("exists"));
        let by_locator = store
            .get_by_locator("blob://court/2020/a.pdf")
            .await
            .expect("get_by_locator")
            .expect("present");
        assert_eq!(by_locator.id, doc.id);

        assert!(store
            .get_by_locator("blob://court/2020/missing.pdf")
            .await
            .expect("lookup")
            .is_none());
    }

    #[tokio::test]
    async fn batch_existence_matches_single_lookups() {
        let store = setup_store().await;
        let stored = Document::new("blob://x/1.pdf");
        store.upsert(&stored).await.expect("upsert");

        let locators = vec![
            "blob://x/1.pdf".to_string(),
            "blob://x/2.pdf".to_string(),
        ];
        let present = store
            .existing_locators(&locators)
            .await
            .expect("batch query");

        for locator in &locators {
            let single = store
                .get_by_locator(locator)
                .await
                .expect("single query")
                .is_some();
            assert_eq!(present.contains(locator), single);
        }
    }

    #[tokio::test]
    async fn scan_all_pages_through_everything() {
        let store = setup_store().await;
        for i in 0..7 {
            let mut doc = Document::new(&format!("blob://y/{i}.pdf"));
            doc.advance(DocumentStatus::MetadataOk);
            store.upsert(&doc).await.expect("upsert");
        }

        let all = store.scan_all(3).await.expect("scan_all");
        assert_eq!(all.len(), 7);
    }

    #[tokio::test]
    async fn double_upsert_converges() {
        let store = setup_store().await;
        let mut doc = Document::new("blob://z/1.pdf");
        store.upsert(&doc).await.expect("first");
        doc.advance(DocumentStatus::Indexed);
        store.upsert(&doc).await.expect("second");

        let all = store.scan_all(10).await.expect("scan");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, DocumentStatus::Indexed);
    }
}
