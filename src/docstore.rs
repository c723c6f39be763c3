use std::future::Future;

use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::{Client, Collection};
use serde_json::Value;
use tracing::info;

use crate::error::StoreError;
use crate::weather::WeatherDocument;

/// The schema-less store holding raw weather documents.
pub trait DocumentStore {
    fn count(&self) -> impl Future<Output = Result<u64, StoreError>>;

    /// Every document currently stored, as generic JSON trees.
    fn find_all(&self) -> impl Future<Output = Result<Vec<Value>, StoreError>>;

    fn insert_one(&self, document: &WeatherDocument) -> impl Future<Output = Result<(), StoreError>>;

    fn insert_many(&self, documents: &[WeatherDocument]) -> impl Future<Output = Result<(), StoreError>>;
}

pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB {} ({}.{})", uri, database, collection);
        let client = Client::with_uri_str(uri).await?;
        let collection = client.database(database).collection::<Document>(collection);
        Ok(MongoStore { collection })
    }
}

impl DocumentStore for MongoStore {
    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }

    async fn find_all(&self) -> Result<Vec<Value>, StoreError> {
        let cursor = self.collection.find(doc! {}).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents
            .into_iter()
            .map(|d| Bson::Document(d).into_relaxed_extjson())
            .collect())
    }

    async fn insert_one(&self, document: &WeatherDocument) -> Result<(), StoreError> {
        self.collection.insert_one(bson::to_document(document)?).await?;
        Ok(())
    }

    async fn insert_many(&self, documents: &[WeatherDocument]) -> Result<(), StoreError> {
        let documents = documents
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<_>, _>>()?;
        self.collection.insert_many(documents).await?;
        Ok(())
    }
}
