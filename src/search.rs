use eyre::{Result, bail};
use log::debug;
use serde::Deserialize;

use crate::Video;
use crate::config::Endpoints;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    id: Option<SearchItemId>,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
}

#[derive(Debug, Default, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl Snippet {
    fn into_video(self, id: String) -> Video {
        let thumbnail_url = self
            .thumbnails
            .and_then(|t| t.medium.or(t.default))
            .map(|t| t.url)
            .unwrap_or_default();
        Video {
            id,
            title: html_escape::decode_html_entities(&self.title).to_string(),
            description: html_escape::decode_html_entities(&self.description).to_string(),
            thumbnail_url,
        }
    }
}

/// Client for the YouTube Data API search and video endpoints
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    data_api: String,
    max_results: u32,
}

impl SearchClient {
    pub fn new(client: reqwest::Client, endpoints: &Endpoints, max_results: u32) -> Self {
        Self {
            client,
            data_api: endpoints.data_api.trim_end_matches('/').to_string(),
            max_results,
        }
    }

    /// Search videos matching `query`; at most `max_results` are returned
    pub async fn search(&self, api_key: &str, query: &str) -> Result<Vec<Video>> {
        let url = format!("{}/search", self.data_api);
        let max_results = self.max_results.to_string();
        debug!("Searching videos: q={query:?} maxResults={max_results}");

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("q", query),
                ("key", api_key),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("YouTube search returned {status}: {body}");
        }

        let parsed: SearchResponse = resp.json().await?;
        let videos: Vec<Video> = parsed
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id?.video_id.filter(|id| !id.is_empty())?;
                Some(item.snippet.unwrap_or_default().into_video(id))
            })
            .take(self.max_results as usize)
            .collect();

        debug!("Search returned {} videos", videos.len());
        Ok(videos)
    }

    /// Look up a single video's metadata
    pub async fn video(&self, api_key: &str, video_id: &str) -> Result<Video> {
        let url = format!("{}/videos", self.data_api);
        debug!("Fetching video metadata for {video_id}");

        let resp = self
            .client
            .get(&url)
            .query(&[("part", "snippet"), ("id", video_id), ("key", api_key)])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("YouTube video lookup returned {status}: {body}");
        }

        let parsed: VideoListResponse = resp.json().await?;
        match parsed.items.into_iter().next() {
            Some(item) => Ok(item.snippet.unwrap_or_default().into_video(item.id)),
            None => bail!("video {video_id} not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, max_results: u32) -> SearchClient {
        let endpoints = Endpoints {
            data_api: server.uri(),
            ..Endpoints::default()
        };
        SearchClient::new(reqwest::Client::new(), &endpoints, max_results)
    }

    #[tokio::test]
    async fn test_search_maps_items_and_skips_channels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust async"))
            .and(query_param("maxResults", "5"))
            .and(query_param("key", "yt123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "id": {"kind": "youtube#video", "videoId": "abc"},
                        "snippet": {
                            "title": "Tom &amp; Jerry",
                            "description": "desc",
                            "thumbnails": {"default": {"url": "http://img/d.jpg"}, "medium": {"url": "http://img/m.jpg"}}
                        }
                    },
                    {"id": {"kind": "youtube#channel", "channelId": "chan"}, "snippet": {"title": "A channel"}},
                    {"snippet": {"title": "no id"}}
                ]
            })))
            .mount(&server)
            .await;

        let videos = client(&server, 5).search("yt123", "rust async").await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "abc");
        assert_eq!(videos[0].title, "Tom & Jerry");
        assert_eq!(videos[0].thumbnail_url, "http://img/m.jpg");
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .mount(&server)
            .await;

        let err = client(&server, 5).search("yt123", "anything").await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_video_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .and(query_param("id", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"id": "abc", "snippet": {"title": "Title", "description": "Body"}}]
            })))
            .mount(&server)
            .await;

        let video = client(&server, 5).video("yt123", "abc").await.unwrap();
        assert_eq!(video.title, "Title");
        assert_eq!(video.description, "Body");
        assert_eq!(video.thumbnail_url, "");
    }

    #[tokio::test]
    async fn test_video_lookup_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&server)
            .await;

        assert!(client(&server, 5).video("yt123", "nope").await.is_err());
    }
}
