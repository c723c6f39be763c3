use std::future::Future;

use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::WeatherError;

/// Raw OpenWeather response. The shape belongs to the API; an empty map
/// means the request did not succeed.
pub type WeatherDocument = Map<String, Value>;

pub trait WeatherSource {
    fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        credential: &str,
    ) -> impl Future<Output = Result<WeatherDocument, WeatherError>>;
}

/// Current-weather client for the OpenWeather API.
pub struct OpenWeather {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenWeather {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        OpenWeather {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn request(
        &self,
        latitude: f64,
        longitude: f64,
        credential: &str,
    ) -> reqwest::Result<reqwest::Request> {
        self.client
            .get(&self.endpoint)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("units", "metric".to_string()),
                ("appid", credential.to_string()),
            ])
            .build()
    }
}

impl WeatherSource for OpenWeather {
    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        credential: &str,
    ) -> Result<WeatherDocument, WeatherError> {
        let request = self.request(latitude, longitude, credential)?;
        debug!("GET weather lat={} lon={}", latitude, longitude);
        let response = self.client.execute(request).await?;
        let status = response.status();
        // Any other status yields an empty document; its body is never read.
        if status != StatusCode::OK {
            warn!("Failed to retrieve weather data, status code: {}", status.as_u16());
            return Ok(WeatherDocument::new());
        }
        let body = response.text().await?;
        parse_document(&body)
    }
}

/// Parse the body of a `200 OK` response.
pub fn parse_document(body: &str) -> Result<WeatherDocument, WeatherError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(doc) => Ok(doc),
        other => Err(WeatherError::Document(truncate(&other.to_string(), 80))),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
