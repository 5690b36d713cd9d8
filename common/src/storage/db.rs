use std::ops::Deref;

use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

use super::types::StoredObject;

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Last-writer-wins upsert keyed by the object's id. Repeating the same
    /// write converges instead of duplicating, which the whole pipeline's
    /// idempotency story leans on.
    pub async fn upsert_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Clone + Send + Sync + 'static,
    {
        self.client
            .upsert((T::table_name(), item.get_id().to_string()))
            .content(item)
            .await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// One page of a full-table scan. Callers paginate; there is no
    /// fixed-size sampling anywhere in the storage layer.
    pub async fn select_page<T>(&self, start: usize, limit: usize) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        let mut response = self
            .client
            .query(format!(
                "SELECT * FROM {} LIMIT $limit START $start",
                T::table_name()
            ))
            .bind(("limit", limit))
            .bind(("start", start))
            .await?;

        response.take(0)
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}
