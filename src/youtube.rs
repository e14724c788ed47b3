use std::sync::LazyLock;

use eyre::{Result, bail};
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;

use crate::Segment;
use crate::config::Endpoints;

/// Root element of the timed-text XML format; its presence decides which parser a payload goes to
const TRANSCRIPT_MARKER: &str = "<transcript";

static BRACKET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\[(\d+):(\d{2})\]|\((\d+):(\d{2})\))(.*)$").expect("bracket timestamp pattern")
});

#[derive(Debug, Deserialize)]
struct CaptionListResponse {
    #[serde(default)]
    items: Vec<CaptionItem>,
}

#[derive(Debug, Deserialize)]
struct CaptionItem {
    id: String,
}

/// Retrieval strategies, in the order they are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    CaptionListing,
    TimedText,
    PlayerEmbed,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::CaptionListing, Method::TimedText, Method::PlayerEmbed];
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::CaptionListing => write!(f, "caption-listing"),
            Method::TimedText => write!(f, "timed-text"),
            Method::PlayerEmbed => write!(f, "player-embed"),
        }
    }
}

/// Fetches a transcript by trying each retrieval method in turn
#[derive(Debug, Clone)]
pub struct TranscriptPipeline {
    client: reqwest::Client,
    data_api: String,
    timedtext: String,
    lang: String,
}

impl TranscriptPipeline {
    pub fn new(client: reqwest::Client, endpoints: &Endpoints, lang: &str) -> Self {
        Self {
            client,
            data_api: endpoints.data_api.trim_end_matches('/').to_string(),
            timedtext: endpoints.timedtext.clone(),
            lang: lang.to_string(),
        }
    }

    /// Acquire the transcript for `video_id`.
    ///
    /// Methods run one at a time and the first non-empty result wins. A video with no
    /// captions anywhere gives `Ok(vec![])`; the only error is an empty video id.
    pub async fn acquire_transcript(&self, video_id: &str, api_key: Option<&str>) -> Result<Vec<Segment>> {
        let video_id = video_id.trim();
        if video_id.is_empty() {
            bail!("cannot acquire a transcript without a video id");
        }
        let api_key = api_key.map(str::trim).filter(|k| !k.is_empty());

        for method in Method::ALL {
            let attempt = match method {
                Method::CaptionListing => match api_key {
                    Some(key) => self.fetch_listed_caption(video_id, key).await,
                    None => {
                        debug!("Skipping {method}: no API key");
                        continue;
                    }
                },
                Method::TimedText => self.fetch_timed_text(video_id).await,
                Method::PlayerEmbed => extract_from_player_embed(video_id),
            };

            match attempt {
                Ok(segments) if !segments.is_empty() => {
                    info!("Transcript for {video_id} via {method}: {} segments", segments.len());
                    return Ok(segments);
                }
                Ok(_) => debug!("{method} returned no segments for {video_id}"),
                Err(e) => warn!("{method} failed for {video_id}: {e:#}"),
            }
        }

        info!("No transcript available for {video_id}");
        Ok(Vec::new())
    }

    async fn fetch_listed_caption(&self, video_id: &str, api_key: &str) -> Result<Vec<Segment>> {
        let list_url = format!("{}/captions", self.data_api);
        debug!("Listing caption tracks: {list_url} videoId={video_id}");

        let listing: CaptionListResponse = self
            .client
            .get(&list_url)
            .query(&[("part", "snippet"), ("videoId", video_id), ("key", api_key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(track) = listing.items.first() else {
            debug!("No caption tracks listed for {video_id}");
            return Ok(Vec::new());
        };

        let track_url = format!("{}/captions/{}", self.data_api, track.id);
        debug!("Fetching caption track {}", track.id);

        let payload = self
            .client
            .get(&track_url)
            .query(&[("key", api_key)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_caption_payload(&payload)
    }

    async fn fetch_timed_text(&self, video_id: &str) -> Result<Vec<Segment>> {
        debug!("Fetching timed text: {} v={video_id} lang={}", self.timedtext, self.lang);

        let xml = self
            .client
            .get(&self.timedtext)
            .query(&[("lang", self.lang.as_str()), ("v", video_id)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        if xml.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_caption_xml(&xml)
    }
}

/// Reading captions out of an embedded player is blocked by cross-origin rules, so this
/// never finds anything.
fn extract_from_player_embed(video_id: &str) -> Result<Vec<Segment>> {
    debug!("Player embed extraction unavailable for {video_id}");
    Ok(Vec::new())
}

/// Route a caption-track payload to the XML or bracket-timestamp parser
pub fn parse_caption_payload(payload: &str) -> Result<Vec<Segment>> {
    if payload.contains(TRANSCRIPT_MARKER) {
        parse_caption_xml(payload)
    } else {
        Ok(parse_bracket_text(payload))
    }
}

pub fn parse_caption_xml(xml: &str) -> Result<Vec<Segment>> {
    use quick_xml::Reader;
    use quick_xml::events::{BytesStart, Event};

    fn numeric_attr(e: &BytesStart<'_>, name: &[u8]) -> f64 {
        e.attributes()
            .flatten()
            .find(|attr| attr.key.as_ref() == name)
            .and_then(|attr| String::from_utf8_lossy(&attr.value).trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(0.0)
    }

    let mut reader = Reader::from_str(xml);
    let mut segments = Vec::new();
    // (start, duration, raw text) of the <text> element being read
    let mut current: Option<(f64, f64, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"text" => {
                current = Some((numeric_attr(e, b"start"), numeric_attr(e, b"dur"), String::new()));
            }
            Ok(Event::Text(ref e)) => {
                if let Some((_, _, raw)) = current.as_mut() {
                    raw.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some((_, _, raw)) = current.as_mut() {
                    raw.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"text" => {
                if let Some((start, duration, raw)) = current.take() {
                    let text = html_escape::decode_html_entities(&raw).trim().to_string();
                    if !text.is_empty() {
                        segments.push(Segment { text, start, duration });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("error parsing caption XML: {e}"),
            _ => {}
        }
    }

    Ok(segments)
}

/// Parse lines of the form `[MM:SS] text` or `(MM:SS) text`
pub fn parse_bracket_text(text: &str) -> Vec<Segment> {
    text.lines()
        .filter_map(|line| {
            let caps = BRACKET_LINE.captures(line)?;
            let minutes = caps.get(1).or_else(|| caps.get(3))?.as_str().parse::<u64>().ok()?;
            let seconds = caps.get(2).or_else(|| caps.get(4))?.as_str().parse::<u64>().ok()?;
            let body = caps.get(5).map_or("", |m| m.as_str()).trim();
            if body.is_empty() {
                return None;
            }
            let start = minutes.checked_mul(60)?.checked_add(seconds)?;
            Some(Segment {
                text: body.to_string(),
                start: start as f64,
                duration: 0.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<transcript>
    <text start="0.21" dur="2.34">Hello world</text>
    <text start="2.55" dur="1.50">This is a test</text>
</transcript>"#;

    fn pipeline(server: &MockServer) -> TranscriptPipeline {
        let endpoints = Endpoints {
            data_api: format!("{}/youtube/v3", server.uri()),
            timedtext: format!("{}/api/timedtext", server.uri()),
            gemini: server.uri(),
        };
        TranscriptPipeline::new(reqwest::Client::new(), &endpoints, "en")
    }

    #[test]
    fn test_parse_caption_xml_basic() {
        let segments = parse_caption_xml(SAMPLE_XML).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello world");
        assert!((segments[0].start - 0.21).abs() < f64::EPSILON);
        assert!((segments[0].duration - 2.34).abs() < f64::EPSILON);
        assert_eq!(segments[1].text, "This is a test");
    }

    #[test]
    fn test_parse_caption_xml_html_entities() {
        let xml = r#"<transcript><text start="0.0" dur="1.0">it&amp;#39;s a &amp;quot;test&amp;quot;</text></transcript>"#;
        let segments = parse_caption_xml(xml).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "it's a \"test\"");
    }

    #[test]
    fn test_parse_caption_xml_bad_attributes_default_to_zero() {
        let xml = r#"<transcript>
            <text start="abc" dur="">first</text>
            <text>second</text>
            <text start="4.5" dur="NaN">third</text>
        </transcript>"#;
        let segments = parse_caption_xml(xml).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!((segments[0].start, segments[0].duration), (0.0, 0.0));
        assert_eq!((segments[1].start, segments[1].duration), (0.0, 0.0));
        assert_eq!((segments[2].start, segments[2].duration), (4.5, 0.0));
    }

    #[test]
    fn test_parse_caption_xml_drops_empty_text() {
        let xml = r#"<transcript>
            <text start="1" dur="1"/>
            <text start="2" dur="1">   </text>
            <text start="3" dur="1">kept</text>
        </transcript>"#;
        let segments = parse_caption_xml(xml).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "kept");
    }

    #[test]
    fn test_parse_caption_xml_malformed() {
        assert!(parse_caption_xml("<transcript><text start=\"1\">oops</wrong></transcript>").is_err());
    }

    #[test]
    fn test_parse_bracket_text() {
        let segments = parse_bracket_text("[1:05] hello there\n(02:30)  second line ");
        assert_eq!(
            segments,
            vec![
                Segment {
                    text: "hello there".to_string(),
                    start: 65.0,
                    duration: 0.0,
                },
                Segment {
                    text: "second line".to_string(),
                    start: 150.0,
                    duration: 0.0,
                },
            ]
        );
    }

    #[test]
    fn test_parse_bracket_text_drops_unmatched_lines() {
        let text = "no timestamp here\n[1:05]   \ncontinuation of nothing\n[1:05) mismatched\n[00:07] ok";
        let segments = parse_bracket_text(text);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "ok");
        assert_eq!(segments[0].start, 7.0);
    }

    #[test]
    fn test_parse_bracket_text_drops_overflowing_timestamp() {
        let segments = parse_caption_payload("[1000000000000000000:00] huge\n[99999999999999999999:00] wider\n[0:01] ok").unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "ok");
        assert_eq!(segments[0].start, 1.0);
    }

    #[tokio::test]
    async fn test_overflowing_track_falls_through_without_panic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/captions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": [{"id": "t"}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/captions/t"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[1000000000000000000:00] huge"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_XML))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = pipeline(&server);
        let joined = tokio::spawn(async move { pipeline.acquire_transcript("vid00000001", Some("yt123")).await }).await;
        let segments = joined.expect("acquisition task completes").unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_parse_caption_payload_routes_by_marker() {
        assert_eq!(parse_caption_payload(SAMPLE_XML).unwrap().len(), 2);
        let plain = parse_caption_payload("[0:01] plain form").unwrap();
        assert_eq!(plain[0].text, "plain form");
    }

    #[tokio::test]
    async fn test_empty_video_id_is_an_error() {
        let server = MockServer::start().await;
        assert!(pipeline(&server).acquire_transcript("  ", Some("key")).await.is_err());
    }

    #[tokio::test]
    async fn test_caption_listing_wins_when_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/captions"))
            .and(query_param("videoId", "vid00000001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"id": "track-1", "snippet": {"language": "en"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/captions/track-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[0:03] from the track"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_XML))
            .expect(0)
            .mount(&server)
            .await;

        let segments = pipeline(&server)
            .acquire_transcript("vid00000001", Some("yt123"))
            .await
            .unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "from the track");
    }

    #[tokio::test]
    async fn test_zero_tracks_falls_through_to_timed_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/captions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .and(query_param("lang", "en"))
            .and(query_param("v", "vid00000001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_XML))
            .expect(1)
            .mount(&server)
            .await;

        let segments = pipeline(&server)
            .acquire_transcript("vid00000001", Some("yt123"))
            .await
            .unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[tokio::test]
    async fn test_all_methods_failing_yields_empty_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/captions"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let segments = pipeline(&server)
            .acquire_transcript("vid00000001", Some("yt123"))
            .await
            .unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_listing_skipped_without_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/captions"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        let segments = pipeline(&server).acquire_transcript("vid00000001", None).await.unwrap();
        assert!(segments.is_empty());
    }
}
