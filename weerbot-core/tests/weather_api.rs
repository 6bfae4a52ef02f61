//! Integration tests for WeerliveClient using wiremock.

use std::time::Duration;

use serde_json::json;
use weerbot_core::{WeatherSource, WeerliveClient, weather::WEATHER_FETCH_FAILED};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/api/json-data-10min.php";

fn live_weather() -> serde_json::Value {
    json!({
        "liveweer": [{
            "plaats": "Utrecht",
            "time": "01-06-2024 14:00:00",
            "temp": "14.2",
            "gtemp": "12.9",
            "samenv": "Zwaar bewolkt",
            "lv": "81",
            "windr": "ZW",
            "windkmh": "18",
            "verw": "Eerst bewolkt, later zon",
            "sup": "05:22",
            "sunder": "21:53",
            "image": "bewolkt",
            "d0weer": "bewolkt",
            "d0tmax": "17",
            "d0tmin": "11",
            "d0neerslag": "30",
            "d0zon": "20",
            "d1weer": "zonnig",
            "d1tmax": "21",
            "d1tmin": "10",
            "d1neerslag": "0",
            "d1zon": "80",
            "alarmtxt": ""
        }]
    })
}

fn client(server: &MockServer) -> WeerliveClient {
    WeerliveClient::new(
        "weer-key".into(),
        "52.09,5.12".into(),
        format!("{}{ENDPOINT}", server.uri()),
        Duration::from_secs(5),
        Duration::from_millis(10),
    )
    .unwrap()
}

#[tokio::test]
async fn test_fetch_weather_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .and(query_param("key", "weer-key"))
        .and(query_param("locatie", "52.09,5.12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(live_weather()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetched = client(&mock_server).fetch_weather().await.unwrap();

    assert_eq!(fetched.snapshot.temperature, "14.2");
    assert_eq!(fetched.snapshot.summary, "Zwaar bewolkt");
    assert_eq!(fetched.snapshot.tomorrow.icon, "zonnig");
    // the raw payload keeps fields the snapshot does not model
    assert_eq!(fetched.raw["liveweer"][0]["plaats"], "Utrecht");
}

#[tokio::test]
async fn test_fetch_weather_recovers_on_second_attempt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(live_weather()))
        .mount(&mock_server)
        .await;

    let fetched = client(&mock_server).fetch_weather().await.unwrap();
    assert_eq!(fetched.snapshot.wind_direction, "ZW");

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn test_fetch_weather_gives_up_after_two_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let payload = client(&mock_server).fetch_weather().await.unwrap_err();

    assert_eq!(payload.error, WEATHER_FETCH_FAILED);
    assert!(payload.message.contains("500"));
}

#[tokio::test]
async fn test_fetch_weather_missing_field_is_an_error() {
    let mock_server = MockServer::start().await;

    let mut body = live_weather();
    body["liveweer"][0]
        .as_object_mut()
        .unwrap()
        .remove("temp");

    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    let payload = client(&mock_server).fetch_weather().await.unwrap_err();

    assert_eq!(payload.error, WEATHER_FETCH_FAILED);
    assert!(payload.message.contains("temp"));
}

#[tokio::test]
async fn test_fetch_weather_empty_list_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "liveweer": [] })))
        .mount(&mock_server)
        .await;

    let payload = client(&mock_server).fetch_weather().await.unwrap_err();
    assert_eq!(payload.error, WEATHER_FETCH_FAILED);
}
