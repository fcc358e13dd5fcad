//! Geocoding of city names

use crate::{config::GeocodingConfig, Coordinates, Result};
use anyhow::Context;
use reqwest::Response;
use serde::Deserialize;
use std::{future::Future, time::Duration};

/// Search endpoint of the public Nominatim instance
pub const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

/// User agent sent to remote services, which Nominatim's usage policy requires
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Something that can locate places from a free-text description
pub trait Geocoder {
    /// Locate a place
    ///
    /// Returns `Ok(None)` if the place is unknown, and an error if the lookup
    /// itself failed.
    fn geocode(&self, query: &str) -> impl Future<Output = Result<Option<Coordinates>>> + Send;
}

/// Client of the Nominatim search API
#[derive(Clone, Debug)]
pub struct NominatimGeocoder {
    /// HTTP client
    client: reqwest::Client,

    /// URL of the search endpoint
    endpoint: Box<str>,

    /// Maximal duration of a request
    timeout: Duration,
}
//
impl NominatimGeocoder {
    /// Set up a client for the configured endpoint
    ///
    /// The HTTP client should have been configured with a [`USER_AGENT`].
    pub fn new(client: reqwest::Client, config: &GeocodingConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout: config.timeout,
        }
    }
}
//
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        let context = || format!("looking up {query:?} at {}", self.endpoint);
        let response = self
            .client
            .get(&*self.endpoint)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .timeout(self.timeout)
            .send()
            .await
            .and_then(Response::error_for_status)
            .with_context(context)?;
        let reply = response.bytes().await.with_context(context)?;
        parse_search_reply(&reply).with_context(context)
    }
}

/// Place from a Nominatim search reply
///
/// Nominatim provides coordinates as strings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct Place {
    lat: Box<str>,
    lon: Box<str>,
}

/// Extract the best match from a Nominatim search reply
fn parse_search_reply(reply: &[u8]) -> Result<Option<Coordinates>> {
    let places: Vec<Place> = serde_json::from_slice(reply).context("decoding the search reply")?;
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    let lat = place
        .lat
        .parse()
        .with_context(|| format!("parsing latitude {:?}", place.lat))?;
    let lon = place
        .lon
        .parse()
        .with_context(|| format!("parsing longitude {:?}", place.lon))?;
    Ok(Some(Coordinates { lat, lon }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    /// Answer a single HTTP request with a canned reply
    ///
    /// Returns the search endpoint and a handle to the request line.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (Box<str>, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/search", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _peer) = listener.accept().await.unwrap();
            let mut request = Vec::<u8>::new();
            let mut buffer = [0; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let len = socket.read(&mut buffer).await.unwrap();
                if len == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..len]);
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            let request = String::from_utf8_lossy(&request);
            request.lines().next().unwrap_or_default().to_owned()
        });
        (endpoint.into(), server)
    }

    /// Query used by the tests
    const SANTOS: &str = "Santos, Sao Paulo, Brasil";

    fn geocoder(endpoint: Box<str>) -> NominatimGeocoder {
        let config = GeocodingConfig {
            endpoint,
            query_suffix: "Sao Paulo, Brasil".into(),
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        NominatimGeocoder::new(client, &config)
    }

    #[test]
    fn best_match_is_used() {
        let reply = r#"[
            {"place_id": 1, "lat": "-23.9608", "lon": "-46.3331", "display_name": "Santos, São Paulo, Brasil"},
            {"place_id": 2, "lat": "-3.0", "lon": "-60.0", "display_name": "Santos, Amazonas, Brasil"}
        ]"#;
        assert_eq!(
            parse_search_reply(reply.as_bytes()).unwrap(),
            Some(Coordinates {
                lat: -23.9608,
                lon: -46.3331
            })
        );
    }

    #[test]
    fn empty_reply_means_not_found() {
        assert_eq!(parse_search_reply(b"[]").unwrap(), None);
    }

    #[test]
    fn malformed_replies_are_errors() {
        assert!(parse_search_reply(b"<html>Too Many Requests</html>").is_err());
        assert!(parse_search_reply(br#"[{"lat": "north", "lon": "-46.3"}]"#).is_err());
    }

    #[tokio::test]
    async fn search_requests_a_single_json_result() {
        let (endpoint, server) =
            serve_once("200 OK", r#"[{"lat": "-23.9608", "lon": "-46.3331"}]"#).await;
        let coordinates = geocoder(endpoint).geocode(SANTOS).await.unwrap();
        assert_eq!(
            coordinates,
            Some(Coordinates {
                lat: -23.9608,
                lon: -46.3331
            })
        );
        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /search?"), "{request_line}");
        assert!(request_line.contains("q=Santos%2C+Sao+Paulo%2C+Brasil"));
        assert!(request_line.contains("format=json"));
        assert!(request_line.contains("limit=1"));
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let (endpoint, server) = serve_once("429 Too Many Requests", "[]").await;
        let result = geocoder(endpoint).geocode(SANTOS).await;
        assert!(result.is_err());
        server.await.unwrap();
    }
}
