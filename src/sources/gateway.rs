use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{
    FileKind, Platform, Quality, RawPlaylistData, RawSearchData, RawToplistData, RawToplists, SongInfo,
};
use crate::error::{ApiError, ApiResult};

pub const DEFAULT_BASE_URL: &str = "https://music-dl.sayqz.com";

/// Llamadas crudas al gateway, sin caché ni normalización
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicGateway: Send + Sync {
    async fn search(&self, source: Platform, keyword: &str, limit: u32) -> ApiResult<RawSearchData>;

    async fn aggregate_search(&self, keyword: &str) -> ApiResult<RawSearchData>;

    async fn song_info(&self, source: Platform, id: &str) -> ApiResult<SongInfo>;

    /// LRC text, returned verbatim.
    async fn lyrics(&self, source: Platform, id: &str) -> ApiResult<String>;

    async fn playlist(&self, source: Platform, id: &str) -> ApiResult<RawPlaylistData>;

    async fn toplists(&self, source: Platform) -> ApiResult<RawToplists>;

    async fn toplist_songs(&self, source: Platform, id: &str) -> ApiResult<RawToplistData>;
}

/// `{ code, data }` wrapper used by every JSON endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    data: Option<T>,
    #[serde(default, alias = "message")]
    msg: Option<String>,
}

/// Builds `/api/?k=v&...`, skipping empty values and percent-encoding the rest.
pub fn build_path(params: &[(&str, Option<&str>)]) -> String {
    let query = params
        .iter()
        .filter_map(|(key, value)| match value {
            Some(value) if !value.is_empty() => Some(format!("{}={}", key, urlencoding::encode(value))),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("/api/?{}", query)
}

/// Direct URL for a song stream, cover or LRC file.
///
/// `br` is only added for stream URLs with an explicit quality.
pub fn build_file_url(base_url: &str, source: Platform, id: &str, kind: FileKind, quality: Option<Quality>) -> String {
    let br = match (kind, quality) {
        (FileKind::Url, Some(quality)) => Some(quality.as_str()),
        _ => None,
    };
    let path = build_path(&[
        ("source", Some(source.as_str())),
        ("id", Some(id)),
        ("type", Some(kind.as_str())),
        ("br", br),
    ]);
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Cliente HTTP del gateway de música
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let parsed = Url::parse(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("inspire-music/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!("🌐 Gateway configurado: {}", parsed);
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn file_url(&self, source: Platform, id: &str, kind: FileKind, quality: Option<Quality>) -> String {
        build_file_url(&self.base_url, source, id, kind, quality)
    }

    async fn fetch_text(&self, params: &[(&str, Option<&str>)]) -> ApiResult<String> {
        let url = format!("{}{}", self.base_url, build_path(params));
        debug!("🔗 GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = if body.trim().is_empty() {
                format!("Request failed with {}", status.as_u16())
            } else {
                body
            };
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, params: &[(&str, Option<&str>)]) -> ApiResult<T> {
        let body = self.fetch_text(params).await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)?;
        envelope.data.ok_or_else(|| ApiError::Upstream {
            code: envelope.code,
            message: envelope.msg.unwrap_or_else(|| "response carried no data".to_string()),
        })
    }
}

#[async_trait]
impl MusicGateway for GatewayClient {
    async fn search(&self, source: Platform, keyword: &str, limit: u32) -> ApiResult<RawSearchData> {
        let limit = limit.to_string();
        self.fetch_json(&[
            ("source", Some(source.as_str())),
            ("type", Some("search")),
            ("keyword", Some(keyword)),
            ("limit", Some(limit.as_str())),
        ])
        .await
    }

    async fn aggregate_search(&self, keyword: &str) -> ApiResult<RawSearchData> {
        self.fetch_json(&[("type", Some("aggregateSearch")), ("keyword", Some(keyword))])
            .await
    }

    async fn song_info(&self, source: Platform, id: &str) -> ApiResult<SongInfo> {
        self.fetch_json(&[("source", Some(source.as_str())), ("id", Some(id)), ("type", Some("info"))])
            .await
    }

    async fn lyrics(&self, source: Platform, id: &str) -> ApiResult<String> {
        self.fetch_text(&[("source", Some(source.as_str())), ("id", Some(id)), ("type", Some("lrc"))])
            .await
    }

    async fn playlist(&self, source: Platform, id: &str) -> ApiResult<RawPlaylistData> {
        self.fetch_json(&[("source", Some(source.as_str())), ("id", Some(id)), ("type", Some("playlist"))])
            .await
    }

    async fn toplists(&self, source: Platform) -> ApiResult<RawToplists> {
        self.fetch_json(&[("source", Some(source.as_str())), ("type", Some("toplists"))])
            .await
    }

    async fn toplist_songs(&self, source: Platform, id: &str) -> ApiResult<RawToplistData> {
        self.fetch_json(&[("source", Some(source.as_str())), ("id", Some(id)), ("type", Some("toplist"))])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GatewayClient {
        GatewayClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn path_skips_empty_params_and_encodes_values() {
        assert_eq!(
            build_path(&[("type", Some("search")), ("keyword", Some("周 杰伦")), ("br", None), ("x", Some(""))]),
            "/api/?type=search&keyword=%E5%91%A8%20%E6%9D%B0%E4%BC%A6"
        );
    }

    #[test]
    fn file_urls_only_carry_bitrate_for_streams() {
        assert_eq!(
            build_file_url("https://gw.test/", Platform::Netease, "42", FileKind::Url, Some(Quality::Lossless)),
            "https://gw.test/api/?source=netease&id=42&type=url&br=flac"
        );
        assert_eq!(
            build_file_url("https://gw.test", Platform::Qq, "42", FileKind::Pic, Some(Quality::Lossless)),
            "https://gw.test/api/?source=qq&id=42&type=pic"
        );
    }

    #[test]
    fn rejects_malformed_base_url() {
        let err = GatewayClient::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn search_unwraps_the_data_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/"))
            .and(query_param("source", "kuwo"))
            .and(query_param("type", "search"))
            .and(query_param("keyword", "稻香"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {
                    "keyword": "稻香",
                    "total": 1,
                    "results": [{"id": 99, "name": "稻香", "artist": "周杰伦"}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data = client(&server).search(Platform::Kuwo, "稻香", 20).await.unwrap();

        assert_eq!(data.keyword, "稻香");
        assert_eq!(data.total, Some(1));
        let results = data.results.unwrap();
        assert_eq!(results[0].id, "99");
        assert_eq!(results[0].platform, None);
    }

    #[tokio::test]
    async fn lyrics_are_returned_as_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/"))
            .and(query_param("type", "lrc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[00:01.00]hello"))
            .mount(&server)
            .await;

        let lrc = client(&server).lyrics(Platform::Netease, "1").await.unwrap();
        assert_eq!(lrc, "[00:01.00]hello");
    }

    #[tokio::test]
    async fn error_status_carries_body_or_fallback_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("type", "toplists"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("type", "info"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let gateway = client(&server);
        match gateway.toplists(Platform::Qq).await.unwrap_err() {
            ApiError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match gateway.song_info(Platform::Qq, "1").await.unwrap_err() {
            ApiError::Status { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "Request failed with 503");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_data_and_bad_json_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("type", "playlist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 404, "msg": "playlist not found"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("type", "toplist"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let gateway = client(&server);
        assert!(matches!(
            gateway.playlist(Platform::Netease, "1").await.unwrap_err(),
            ApiError::Upstream { code: 404, .. }
        ));
        assert!(matches!(
            gateway.toplist_songs(Platform::Netease, "1").await.unwrap_err(),
            ApiError::Decode(_)
        ));
    }
}
