use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::cities;
use crate::docstore::DocumentStore;
use crate::fetch::PageSource;
use crate::weather::{WeatherDocument, WeatherSource};

pub struct IngestConfig {
    pub listing_url: String,
    pub credential: String,
    pub city_limit: usize,
}

/// Summary of a single ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub cities_found: usize,
    pub cities_enriched: usize,
    pub empty_documents: usize,
    pub count_before: u64,
    pub count_after: u64,
}

impl IngestReport {
    pub fn print(&self) {
        println!(
            "Found {} cities, fetched weather for {} ({} empty). Collection: {} -> {} documents.",
            self.cities_found,
            self.cities_enriched,
            self.empty_documents,
            self.count_before,
            self.count_after,
        );
    }
}

/// Crawl → truncate → enrich → store, once.
pub struct IngestRunner<P, W, D> {
    config: IngestConfig,
    pages: P,
    weather: W,
    store: D,
}

impl<P, W, D> IngestRunner<P, W, D>
where
    P: PageSource,
    W: WeatherSource,
    D: DocumentStore,
{
    pub fn new(config: IngestConfig, pages: P, weather: W, store: D) -> Self {
        IngestRunner { config, pages, weather, store }
    }

    /// Nothing is written unless every city was crawled and fetched.
    pub async fn run(&self) -> Result<IngestReport> {
        info!("Ingest weather data from {}", self.config.listing_url);

        let mut cities = cities::crawl(&self.pages, &self.config.listing_url).await?;
        let cities_found = cities.len();
        cities.truncate(self.config.city_limit);
        info!("Keeping {} of {} cities", cities.len(), cities_found);

        let pb = ProgressBar::new(cities.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );

        let mut documents: Vec<WeatherDocument> = Vec::with_capacity(cities.len());
        let mut empty_documents = 0;
        for city in &cities {
            pb.set_message(city.city_name.clone());
            let document = self
                .weather
                .fetch(city.latitude, city.longitude, &self.config.credential)
                .await
                .with_context(|| {
                    format!("Weather fetch failed for #{} {}", city.city_number, city.city_name)
                })?;
            if document.is_empty() {
                empty_documents += 1;
            }
            debug!(
                city_number = %city.city_number,
                city = %city.city_name,
                fields = document.len(),
                "Fetched weather"
            );
            documents.push(document);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let count_before = self.store.count().await.context("Failed to count documents")?;
        info!("Number of documents already in the collection: {}", count_before);

        match documents.as_slice() {
            [] => warn!("No weather documents to store"),
            [one] => self.store.insert_one(one).await.context("Failed to store weather document")?,
            many => self
                .store
                .insert_many(many)
                .await
                .context("Failed to store weather documents")?,
        }

        let count_after = self.store.count().await.context("Failed to count documents")?;
        for doc in self.store.find_all().await.context("Failed to read back documents")? {
            info!("{}", doc);
        }
        info!("Number of documents after load in the collection: {}", count_after);

        Ok(IngestReport {
            cities_found,
            cities_enriched: documents.len(),
            empty_documents,
            count_before,
            count_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use serde_json::{json, Value};

    use super::*;
    use crate::docstore::memory::{Insert, MemoryStore};
    use crate::error::WeatherError;

    const BASE: &str = "https://geokeo.com/database/city/de";

    struct FixturePages(HashMap<&'static str, String>);

    impl FixturePages {
        fn germany() -> Self {
            let read = |n: u32| std::fs::read_to_string(format!("tests/fixtures/cities_page{}.html", n)).unwrap();
            FixturePages(HashMap::from([
                (BASE, read(1)),
                ("https://geokeo.com/database/city/de/2/", read(2)),
                ("https://geokeo.com/database/city/de/3/", read(3)),
            ]))
        }
    }

    impl PageSource for FixturePages {
        async fn fetch_page(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 for {}", url))
        }
    }

    /// Echoes the coordinates back; latitudes listed in `failing` raise a
    /// transport-style error, those in `empty` come back as non-200.
    #[derive(Default)]
    struct FakeWeather {
        calls: RefCell<Vec<(f64, f64, String)>>,
        empty: Vec<f64>,
        failing: Vec<f64>,
    }

    impl WeatherSource for FakeWeather {
        async fn fetch(&self, lat: f64, lon: f64, credential: &str) -> Result<WeatherDocument, WeatherError> {
            self.calls.borrow_mut().push((lat, lon, credential.to_string()));
            if self.failing.contains(&lat) {
                return Err(WeatherError::Document("connection reset".into()));
            }
            if self.empty.contains(&lat) {
                return Ok(WeatherDocument::new());
            }
            match json!({"coord": {"lat": lat, "lon": lon}, "cod": 200}) {
                Value::Object(doc) => Ok(doc),
                _ => unreachable!(),
            }
        }
    }

    fn config(limit: usize) -> IngestConfig {
        IngestConfig {
            listing_url: BASE.to_string(),
            credential: "key".to_string(),
            city_limit: limit,
        }
    }

    #[tokio::test]
    async fn stores_first_ten_cities_in_order() {
        let runner = IngestRunner::new(config(10), FixturePages::germany(), FakeWeather::default(), MemoryStore::default());
        let report = runner.run().await.unwrap();

        assert_eq!(report.cities_found, 12);
        assert_eq!(report.cities_enriched, 10);
        assert_eq!((report.count_before, report.count_after), (0, 10));
        assert_eq!(*runner.store.inserts.borrow(), vec![Insert::Many(10)]);

        let calls = runner.weather.calls.borrow();
        assert_eq!(calls.len(), 10);
        assert_eq!(calls[0], (50.776351, 6.083862, "key".to_string()));

        let docs = runner.store.documents.borrow();
        assert_eq!(docs[0]["coord"]["lat"], 50.776351);
        assert_eq!(docs[9]["coord"]["lat"], 53.07582);
    }

    #[tokio::test]
    async fn stored_documents_are_read_back_after_insert() {
        let store = MemoryStore::with_documents(vec![json!({"name": "Old"})]);
        let runner = IngestRunner::new(config(2), FixturePages::germany(), FakeWeather::default(), store);
        let report = runner.run().await.unwrap();

        assert_eq!(runner.store.reads.get(), 1);
        assert_eq!((report.count_before, report.count_after), (1, 3));
    }

    #[tokio::test]
    async fn limit_of_one_uses_insert_one() {
        let runner = IngestRunner::new(config(1), FixturePages::germany(), FakeWeather::default(), MemoryStore::default());
        let report = runner.run().await.unwrap();
        assert_eq!(report.cities_enriched, 1);
        assert_eq!(*runner.store.inserts.borrow(), vec![Insert::One]);
        assert_eq!(report.count_after, 1);
    }

    #[tokio::test]
    async fn limit_above_city_count_keeps_all() {
        let runner = IngestRunner::new(config(50), FixturePages::germany(), FakeWeather::default(), MemoryStore::default());
        let report = runner.run().await.unwrap();
        assert_eq!(report.cities_enriched, 12);
    }

    #[tokio::test]
    async fn limit_of_zero_stores_nothing() {
        let runner = IngestRunner::new(config(0), FixturePages::germany(), FakeWeather::default(), MemoryStore::default());
        let report = runner.run().await.unwrap();
        assert_eq!(report.count_after, 0);
        assert!(runner.store.inserts.borrow().is_empty());
        assert!(runner.weather.calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn empty_documents_are_stored_too() {
        let weather = FakeWeather {
            empty: vec![48.366804],
            ..Default::default()
        };
        let runner = IngestRunner::new(config(3), FixturePages::germany(), weather, MemoryStore::default());
        let report = runner.run().await.unwrap();
        assert_eq!(report.empty_documents, 1);
        assert_eq!(report.count_after, 3);
        assert_eq!(runner.store.documents.borrow()[1], json!({}));
    }

    #[tokio::test]
    async fn fetch_error_aborts_before_any_insert() {
        let previous = vec![json!({"name": "Earlier run"})];
        let weather = FakeWeather {
            failing: vec![50.99293],
            ..Default::default()
        };
        let runner = IngestRunner::new(config(10), FixturePages::germany(), weather, MemoryStore::with_documents(previous));
        let err = runner.run().await.unwrap_err();

        assert!(format!("{:#}", err).contains("Bergisch Gladbach"));
        assert_eq!(runner.weather.calls.borrow().len(), 3);
        assert!(runner.store.inserts.borrow().is_empty());
        assert_eq!(runner.store.documents.borrow().len(), 1);
    }

    #[tokio::test]
    async fn crawl_error_aborts_run() {
        let pages = FixturePages(HashMap::from([(BASE, "<html><body>down</body></html>".to_string())]));
        let runner = IngestRunner::new(config(10), pages, FakeWeather::default(), MemoryStore::default());
        assert!(runner.run().await.is_err());
        assert!(runner.weather.calls.borrow().is_empty());
    }
}
