use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, de};
use serde_json::Value;
use std::{fmt::Debug, time::Duration};

use crate::{
    config::Config,
    error::{FetchError, truncate_body},
    model::{DayForecast, ErrorPayload, FetchedWeather, WeatherSnapshot},
};

pub const WEATHER_FETCH_FAILED: &str = "Error fetching data from weather API";

#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    /// Fetch the current observation, or an explicit error payload once all
    /// attempts are used up.
    async fn fetch_weather(&self) -> Result<FetchedWeather, ErrorPayload>;
}

/// Client for the weerlive.nl JSON endpoint.
#[derive(Debug, Clone)]
pub struct WeerliveClient {
    api_key: String,
    location: String,
    base_url: String,
    retry_delay: Duration,
    http: Client,
}

impl WeerliveClient {
    pub fn new(
        api_key: String,
        location: String,
        base_url: String,
        timeout: Duration,
        retry_delay: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            location,
            base_url,
            retry_delay,
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            config.weather.api_key.clone(),
            config.weather.location.clone(),
            config.weather.base_url.clone(),
            config.http_timeout(),
            config.retry_delay(),
        )
    }

    async fn fetch_once(&self) -> Result<FetchedWeather, FetchError> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("locatie", self.location.as_str()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        let raw: Value = serde_json::from_str(&body)?;
        let parsed: WlResponse = serde_json::from_value(raw.clone())?;
        let live = parsed.liveweer.into_iter().next().ok_or(FetchError::Empty)?;

        Ok(FetchedWeather {
            snapshot: live.into(),
            raw,
        })
    }
}

#[async_trait]
impl WeatherSource for WeerliveClient {
    async fn fetch_weather(&self) -> Result<FetchedWeather, ErrorPayload> {
        tracing::debug!("fetching weather data");

        match self.fetch_once().await {
            Ok(fetched) => return Ok(fetched),
            Err(e) => {
                tracing::error!("first try: error fetching weather data: {e}");
                tracing::warn!(
                    "weather data could not be fetched, trying again in {:?}",
                    self.retry_delay
                );
            }
        }

        tokio::time::sleep(self.retry_delay).await;

        match self.fetch_once().await {
            Ok(fetched) => {
                tracing::info!("weather data fetched on the second try");
                Ok(fetched)
            }
            Err(e) => {
                tracing::error!("second try: error fetching weather data: {e}");
                Err(ErrorPayload::new(WEATHER_FETCH_FAILED, e.to_string()))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WlResponse {
    liveweer: Vec<WlLive>,
}

#[derive(Debug, Deserialize)]
struct WlLive {
    #[serde(deserialize_with = "text")]
    time: String,
    #[serde(deserialize_with = "text")]
    temp: String,
    #[serde(deserialize_with = "text")]
    gtemp: String,
    #[serde(deserialize_with = "text")]
    samenv: String,
    #[serde(deserialize_with = "text")]
    lv: String,
    #[serde(deserialize_with = "text")]
    windr: String,
    #[serde(deserialize_with = "text")]
    windkmh: String,
    #[serde(deserialize_with = "text")]
    verw: String,
    #[serde(deserialize_with = "text")]
    sup: String,
    #[serde(deserialize_with = "text")]
    sunder: String,
    #[serde(deserialize_with = "text")]
    image: String,
    #[serde(deserialize_with = "text")]
    d0weer: String,
    #[serde(deserialize_with = "text")]
    d0tmax: String,
    #[serde(deserialize_with = "text")]
    d0tmin: String,
    #[serde(deserialize_with = "text")]
    d0neerslag: String,
    #[serde(deserialize_with = "text")]
    d0zon: String,
    #[serde(deserialize_with = "text")]
    d1weer: String,
    #[serde(deserialize_with = "text")]
    d1tmax: String,
    #[serde(deserialize_with = "text")]
    d1tmin: String,
    #[serde(deserialize_with = "text")]
    d1neerslag: String,
    #[serde(deserialize_with = "text")]
    d1zon: String,
    #[serde(deserialize_with = "text")]
    alarmtxt: String,
}

impl From<WlLive> for WeatherSnapshot {
    fn from(live: WlLive) -> Self {
        WeatherSnapshot {
            timestamp: live.time,
            temperature: live.temp,
            feels_like: live.gtemp,
            summary: live.samenv,
            humidity: live.lv,
            wind_direction: live.windr,
            wind_speed_kmh: live.windkmh,
            expectation: live.verw,
            sunrise: live.sup,
            sunset: live.sunder,
            image: live.image,
            today: DayForecast {
                icon: live.d0weer,
                max_temp: live.d0tmax,
                min_temp: live.d0tmin,
                rain_chance: live.d0neerslag,
                sun_chance: live.d0zon,
            },
            tomorrow: DayForecast {
                icon: live.d1weer,
                max_temp: live.d1tmax,
                min_temp: live.d1tmin,
                rain_chance: live.d1neerslag,
                sun_chance: live.d1zon,
            },
            alarm_text: live.alarmtxt,
        }
    }
}

/// Weerlive reports most values as strings but not consistently; accept
/// numbers and booleans too and keep their textual form.
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}
