use super::schedule::{PrayerKey, PrayerTimes};
use anyhow::{anyhow, Context, Result};
use log::{error, info};
use reqwest::{Client, Url};
use serde_derive::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

pub const API_URL: &str = "http://api.aladhan.com/v1/timingsByCity";

const MAX_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Minute offsets applied by the API to each calculated time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tune {
    pub imsak: i32,
    pub fajr: i32,
    pub sunrise: i32,
    pub dhuhr: i32,
    pub asr: i32,
    pub maghrib: i32,
    pub sunset: i32,
    pub isha: i32,
    pub midnight: i32,
}

impl Tune {
    /// The `tune` query parameter: every offset, comma separated.
    pub fn to_param(&self) -> String {
        [
            self.imsak,
            self.fajr,
            self.sunrise,
            self.dhuhr,
            self.asr,
            self.maghrib,
            self.sunset,
            self.isha,
            self.midnight,
        ]
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
    }
}

pub fn api_url(city: &str, country: &str, method: u8, tune: &Tune) -> Result<Url> {
    let method = method.to_string();
    let tune = tune.to_param();
    Url::parse_with_params(
        API_URL,
        &[
            ("city", city),
            ("country", country),
            ("method", method.as_str()),
            ("tune", tune.as_str()),
        ],
    )
    .with_context(|| format!("Invalid prayer times URL for {city}, {country}"))
}

#[derive(Deserialize)]
struct Response {
    data: Data,
}

#[derive(Deserialize)]
struct Data {
    timings: HashMap<String, String>,
    meta: Meta,
}

#[derive(Deserialize)]
struct Meta {
    timezone: String,
}

/// `Asia/Kuala_Lumpur` -> `Kuala Lumpur`
pub fn city_from_timezone(timezone: &str) -> String {
    timezone.rsplit('/').next().unwrap_or(timezone).replace('_', " ")
}

pub fn parse_response(body: &str) -> Result<PrayerTimes> {
    let response: Response = serde_json::from_str(body).context("Malformed prayer times response")?;
    let timings = response.data.timings;

    let times = PrayerKey::ALL
        .iter()
        .map(|&key| {
            let time = timings
                .get(key.title())
                .ok_or_else(|| anyhow!("Prayer times response has no {}", key.title()))?;
            Ok((key, time.clone()))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(PrayerTimes {
        city: city_from_timezone(&response.data.meta.timezone),
        times,
    })
}

pub fn client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

async fn fetch_once(client: &Client, url: &Url) -> Result<PrayerTimes> {
    let body = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_response(&body)
}

/// Fetches today's prayer times, retrying a few times before giving up.
pub async fn fetch(client: &Client, url: &Url) -> Result<PrayerTimes> {
    retry(MAX_ATTEMPTS, RETRY_DELAY, || fetch_once(client, url)).await
}

/// Runs `op` up to `attempts` times, sleeping `delay` between failures.
async fn retry<T, F, Fut>(attempts: usize, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        info!("Fetching prayer times (attempt {attempt}/{attempts})");
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                error!("Prayer times request failed: {err:#}");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err.context(format!("Giving up after {attempts} attempts"))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    const RESPONSE: &str = r#"{
        "code": 200,
        "status": "OK",
        "data": {
            "timings": {
                "Fajr": "04:20",
                "Sunrise": "05:35",
                "Dhuhr": "11:40",
                "Asr": "14:55",
                "Sunset": "17:48",
                "Maghrib": "17:50",
                "Isha": "19:00",
                "Imsak": "04:10",
                "Midnight": "23:45",
                "Firstthird": "21:50",
                "Lastthird": "01:40"
            },
            "date": { "readable": "15 Oct 2026" },
            "meta": {
                "latitude": 3.139,
                "timezone": "Asia/Kuala_Lumpur"
            }
        }
    }"#;

    #[test]
    fn builds_the_request_url() {
        let tune = Tune {
            fajr: 2,
            isha: -1,
            ..Tune::default()
        };
        let url = api_url("Kuala Lumpur", "MY", 3, &tune).unwrap();
        assert_eq!(url.host_str(), Some("api.aladhan.com"));
        assert_eq!(url.path(), "/v1/timingsByCity");

        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["city"], "Kuala Lumpur");
        assert_eq!(query["country"], "MY");
        assert_eq!(query["method"], "3");
        assert_eq!(query["tune"], "0,2,0,0,0,0,0,-1,0");
    }

    #[test]
    fn parses_timings_and_city() {
        let times = parse_response(RESPONSE).unwrap();
        assert_eq!(times.city, "Kuala Lumpur");
        assert_eq!(times.get(PrayerKey::Fajr), Some("04:20"));
        assert_eq!(times.get(PrayerKey::LastThird), Some("01:40"));
        assert_eq!(times.times.len(), PrayerKey::ALL.len());
    }

    #[test]
    fn missing_timings_are_errors() {
        let body = RESPONSE.replace(r#""Isha": "19:00","#, "");
        let err = parse_response(&body).unwrap_err();
        assert!(err.to_string().contains("Isha"));

        assert!(parse_response(r#"{"data": {}}"#).is_err());
        assert!(parse_response("<html>").is_err());
    }

    #[test]
    fn city_is_the_last_timezone_segment() {
        assert_eq!(city_from_timezone("America/Argentina/Buenos_Aires"), "Buenos Aires");
        assert_eq!(city_from_timezone("UTC"), "UTC");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_three_spaced_attempts() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let result: Result<()> = retry(MAX_ATTEMPTS, RETRY_DELAY, || {
            calls.set(calls.get() + 1);
            async { Err(anyhow!("connection refused")) }
        })
        .await;

        assert_eq!(calls.get(), 3);
        assert!(start.elapsed() >= RETRY_DELAY * 2);
        assert!(start.elapsed() < RETRY_DELAY * 3);
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Giving up after 3 attempts");
        assert_eq!(err.root_cause().to_string(), "connection refused");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_at_the_first_success() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let result = retry(MAX_ATTEMPTS, RETRY_DELAY, || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt < 2 {
                    Err(anyhow!("timed out"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.get(), 2);
        assert!(start.elapsed() >= RETRY_DELAY);
        assert!(start.elapsed() < RETRY_DELAY * 2);
    }
}
