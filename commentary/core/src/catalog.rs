//! Recorder Catalog Client
//!
//! Thin async client for the recorder's web API: the channel list, the
//! programme guide (used to find what is on air now), and the URLs of the
//! live transcode and recorded files. These are opaque collaborators; the
//! engine only needs to read them.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::CommentaryConfig;
use crate::preferences::StreamQuality;

/// Request timeout for every catalog call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum programmes requested for one day
const PROGRAMME_PAGE_LIMIT: u32 = 1000;

/// Catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The request could not be completed (network, timeout, decoding)
    #[error("Catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status
    #[error("Catalog returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Server-supplied message, or the status text
        message: String,
    },

    /// The configured base URL is unusable
    #[error("Invalid catalog URL: {0}")]
    InvalidUrl(String),
}

/// A tunable channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Tuner channel number (e.g. `"27"`)
    pub number: String,
    /// Broadcaster display name (e.g. `"NHK総合"`)
    pub name: String,
}

/// One programme guide entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Programme {
    /// Title
    pub title: String,
    /// Broadcaster display name
    pub channel: String,
    /// Start, `YYYY-MM-DD HH:MM:SS` local time
    pub start_time: String,
    /// End, same format
    pub end_time: String,
    /// Synopsis
    #[serde(default)]
    pub description: Option<String>,
}

impl Programme {
    /// Parsed start time
    #[must_use]
    pub fn start(&self) -> Option<NaiveDateTime> {
        parse_guide_time(&self.start_time)
    }

    /// Parsed end time
    #[must_use]
    pub fn end(&self) -> Option<NaiveDateTime> {
        parse_guide_time(&self.end_time)
    }

    /// Whether `now` falls in `[start, end)`
    #[must_use]
    pub fn is_on_air(&self, now: NaiveDateTime) -> bool {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => start <= now && now < end,
            _ => false,
        }
    }
}

/// Parse a guide timestamp (`2024-05-01 21:00:00`, `T` separator also accepted)
#[must_use]
pub fn parse_guide_time(value: &str) -> Option<NaiveDateTime> {
    let normalized = value.trim().replacen(' ', "T", 1);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M"))
        .ok()
}

/// The programme on air at `now`, if any
#[must_use]
pub fn on_air(programmes: &[Programme], now: NaiveDateTime) -> Option<&Programme> {
    programmes.iter().find(|p| p.is_on_air(now))
}

#[derive(Deserialize)]
struct ChannelList {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Deserialize)]
struct ProgrammeList {
    #[serde(default)]
    programmes: Vec<Programme>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Client for the recorder web API
#[derive(Clone, Debug)]
pub struct CatalogClient {
    http: reqwest::Client,
    base: Url,
}

impl CatalogClient {
    /// Create a client for the API at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let base = Url::parse(base_url).map_err(|e| CatalogError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CatalogError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base })
    }

    /// Create a client for the configured base URL
    ///
    /// # Errors
    ///
    /// See [`CatalogClient::new`].
    pub fn from_config(config: &CommentaryConfig) -> Result<Self, CatalogError> {
        Self::new(&config.catalog_base_url)
    }

    /// Base URL
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// All channels, in tuner order
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or an error status.
    pub async fn channels(&self) -> Result<Vec<Channel>, CatalogError> {
        let url = self.endpoint(&["api", "channels"])?;
        let list: ChannelList = self.get_json(url).await?;
        Ok(list.channels)
    }

    /// Programmes starting on `date`, optionally for one channel
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or an error status.
    pub async fn programmes(
        &self,
        date: NaiveDate,
        channel: Option<&str>,
    ) -> Result<Vec<Programme>, CatalogError> {
        let mut url = self.endpoint(&["api", "programmes"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("date", &date.format("%Y-%m-%d").to_string());
            if let Some(channel) = channel {
                query.append_pair("channel", channel);
            }
            query.append_pair("limit", &PROGRAMME_PAGE_LIMIT.to_string());
        }
        let list: ProgrammeList = self.get_json(url).await?;
        Ok(list.programmes)
    }

    /// The programme on air on `channel` at `now`
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or an error status.
    pub async fn now_playing(
        &self,
        channel: &str,
        now: NaiveDateTime,
    ) -> Result<Option<Programme>, CatalogError> {
        let programmes = self.programmes(now.date(), Some(channel)).await?;
        Ok(on_air(&programmes, now).cloned())
    }

    /// URL of the live transcode for a channel number
    ///
    /// # Errors
    ///
    /// Returns an error only if the base URL cannot take a path.
    pub fn live_stream_url(&self, number: &str, quality: StreamQuality) -> Result<Url, CatalogError> {
        let mut url = self.endpoint(&["live", "stream"])?;
        url.query_pairs_mut()
            .append_pair("ch", number)
            .append_pair("quality", quality.as_str());
        Ok(url)
    }

    /// URL of a recorded file, relative to the recording directory
    ///
    /// With `download` the server sends it as an attachment; otherwise it
    /// streams with range support for seeking.
    ///
    /// # Errors
    ///
    /// Returns an error only if the base URL cannot take a path.
    pub fn recording_url(&self, relative_path: &str, download: bool) -> Result<Url, CatalogError> {
        let mut segments = vec!["recordings"];
        segments.extend(relative_path.split('/').filter(|s| !s.is_empty()));
        let mut url = self.endpoint(&segments)?;
        if download {
            url.query_pairs_mut().append_pair("download", "1");
        }
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CatalogError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| CatalogError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        tracing::debug!(url = %url, "Catalog request");
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(CatalogError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn programme(title: &str, start: &str, end: &str) -> Programme {
        Programme {
            title: title.into(),
            channel: "NHK総合".into(),
            start_time: start.into(),
            end_time: end.into(),
            description: None,
        }
    }

    /// Serve one canned HTTP response and return the request line
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let n = socket.read(&mut request).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            let request = String::from_utf8_lossy(&request[..n]).to_string();
            request.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_parse_guide_time() {
        let parsed = parse_guide_time("2024-05-01 21:00:00").unwrap();
        assert_eq!(parsed.format("%H:%M").to_string(), "21:00");
        assert!(parse_guide_time("2024-05-01T21:00").is_some());
        assert!(parse_guide_time("tonight").is_none());
    }

    #[test]
    fn test_on_air_is_half_open() {
        let programmes = vec![
            programme("ニュース", "2024-05-01 21:00:00", "2024-05-01 21:30:00"),
            programme("ドラマ", "2024-05-01 21:30:00", "2024-05-01 22:00:00"),
        ];
        let at = |s| parse_guide_time(s).unwrap();

        assert_eq!(on_air(&programmes, at("2024-05-01 21:10:00")).unwrap().title, "ニュース");
        assert_eq!(on_air(&programmes, at("2024-05-01 21:30:00")).unwrap().title, "ドラマ");
        assert!(on_air(&programmes, at("2024-05-01 22:00:00")).is_none());
    }

    #[test]
    fn test_stream_urls() {
        let client = CatalogClient::new("http://recorder.local:8080").unwrap();

        let live = client.live_stream_url("27", StreamQuality::High).unwrap();
        assert_eq!(live.as_str(), "http://recorder.local:8080/live/stream?ch=27&quality=high");

        let file = client.recording_url("2024/ニュース 1.ts", true).unwrap();
        assert!(file.path().starts_with("/recordings/2024/"));
        assert!(!file.path().contains(' '));
        assert_eq!(file.query(), Some("download=1"));
        assert_eq!(client.recording_url("a.ts", false).unwrap().query(), None);
    }

    #[test]
    fn test_base_path_is_kept() {
        let client = CatalogClient::new("http://host/autorec/").unwrap();
        let live = client.live_stream_url("27", StreamQuality::Low).unwrap();
        assert_eq!(live.path(), "/autorec/live/stream");
    }

    #[test]
    fn test_rejects_bad_base() {
        assert!(matches!(
            CatalogClient::new("not a url"),
            Err(CatalogError::InvalidUrl(_))
        ));
        assert!(matches!(
            CatalogClient::new("mailto:someone@example.com"),
            Err(CatalogError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_channels_request() {
        let (base, server) =
            serve_once("200 OK", r#"{"channels":[{"number":"27","name":"NHK総合"}]}"#).await;
        let client = CatalogClient::new(&base).unwrap();

        let channels = client.channels().await.unwrap();
        assert_eq!(
            channels,
            vec![Channel {
                number: "27".into(),
                name: "NHK総合".into()
            }]
        );
        assert_eq!(server.await.unwrap(), "GET /api/channels HTTP/1.1");
    }

    #[tokio::test]
    async fn test_error_status_carries_message() {
        let (base, _server) = serve_once("400 Bad Request", r#"{"error":"bad date"}"#).await;
        let client = CatalogClient::new(&base).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        match client.programmes(date, None).await {
            Err(CatalogError::Status { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad date");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
