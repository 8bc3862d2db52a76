use async_trait::async_trait;
use reqwest::Client;
use slog::{debug, info, Logger};
use std::time::Duration;

use crate::Location;

pub const DEFAULT_API_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Hourly variables requested from the forecast API.
pub const HOURLY_FIELDS: &str = "temperature_2m,relativehumidity_2m,precipitation";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("error building http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("error sending request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("api request failed: {status} - {body}")]
    Status { status: u16, body: String },
}

/// Source of raw forecast payloads for a location.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Returns the unparsed response body.
    async fn fetch_forecast(&self, location: &Location) -> Result<String, Error>;
}

pub fn build_weather_url(base_url: &str, latitude: f64, longitude: f64) -> String {
    format!(
        "{}?latitude={}&longitude={}&hourly={}",
        base_url.trim_end_matches('/'),
        latitude,
        longitude,
        HOURLY_FIELDS
    )
}

pub struct OpenMeteoClient {
    logger: Logger,
    client: Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(
        logger: Logger,
        base_url: String,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(Error::Client)?;
        Ok(Self {
            logger,
            client,
            base_url,
        })
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoClient {
    async fn fetch_forecast(&self, location: &Location) -> Result<String, Error> {
        let url = build_weather_url(&self.base_url, location.latitude, location.longitude);
        info!(self.logger, "requesting weather data"; "url" => &url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(self.logger, "received forecast"; "bytes" => body.len());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_forecast_url() {
        let url = build_weather_url(DEFAULT_API_URL, -26.2041, 28.0473);
        assert_eq!(
            url,
            "https://api.open-meteo.com/v1/forecast?latitude=-26.2041&longitude=28.0473\
             &hourly=temperature_2m,relativehumidity_2m,precipitation"
        );
    }

    #[test]
    fn trailing_slash_on_base_url_is_ignored() {
        let url = build_weather_url("http://localhost:8080/v1/forecast/", 1.5, -2.0);
        assert!(url.starts_with("http://localhost:8080/v1/forecast?latitude=1.5&longitude=-2"));
    }

    #[test]
    fn status_error_reports_code_and_body() {
        let err = Error::Status {
            status: 400,
            body: String::from("{\"reason\":\"Latitude must be in range\"}"),
        };
        assert_eq!(
            err.to_string(),
            "api request failed: 400 - {\"reason\":\"Latitude must be in range\"}"
        );
    }
}
