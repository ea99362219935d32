use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};

use super::source::{ArticleDetail, DetailSource, ListingEntry, ListingSource};

const USER_AGENT_STRING: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Client for the content platform: the JSON listing API and the HTML
/// article pages.
pub struct PlatformClient {
    client: Client,
    base_url: String,
    og_title: Regex,
    og_image: Regex,
    published_time: Regex,
}

// The platform renders meta tags with attributes in either order, so each
// extraction gets a property-first and a content-first pattern.
fn meta_regex(property: &str) -> Regex {
    Regex::new(&format!(
        r#"<meta[^>]*(?:property|name)=["']{property}["'][^>]*content=["']([^"']*)["']|<meta[^>]*content=["']([^"']*)["'][^>]*(?:property|name)=["']{property}["']"#
    ))
    .expect("invalid meta pattern")
}

impl PlatformClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT_STRING)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            og_title: meta_regex("og:title"),
            og_image: meta_regex("og:image"),
            published_time: meta_regex("article:published_time"),
        }
    }

    fn extract_meta(&self, pattern: &Regex, html: &str) -> Option<String> {
        pattern.captures(html).and_then(|cap| {
            cap.get(1)
                .or_else(|| cap.get(2))
                .map(|m| m.as_str().to_string())
        })
    }

    /// Readable body text from the article HTML, cleaned of blank lines.
    fn extract_body(&self, html: &str) -> String {
        let text = match html2text::from_read(html.as_bytes(), 80) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("Failed to convert HTML to text: {}", e);
                return String::new();
            }
        };

        text.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ListingSource for PlatformClient {
    async fn list_page(&self, label: &str, page: u32) -> Result<Vec<ListingEntry>> {
        let api_url = format!(
            "{}/api/v3/mkit_layouts/json?context=top_keyword&page={}&args[label_name]={}",
            self.base_url,
            page,
            urlencoding::encode(label)
        );

        let response = self
            .client
            .get(&api_url)
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("listing request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "listing request for {label} page {page} failed: HTTP {}",
                response.status()
            )));
        }

        let payload: ListingPayload = response
            .json()
            .await
            .map_err(|e| AppError::Fetch(format!("listing payload unreadable: {e}")))?;

        let entries: Vec<ListingEntry> = payload
            .data
            .unwrap_or_default()
            .sections
            .into_iter()
            .flat_map(|section| section.notes)
            .filter_map(note_to_entry)
            .collect();

        tracing::debug!("Fetched {} entries from {} page {}", entries.len(), label, page);
        Ok(entries)
    }
}

#[async_trait]
impl DetailSource for PlatformClient {
    async fn fetch_detail(&self, source_key: &str, url_name: &str) -> Result<ArticleDetail> {
        let article_url = format!("{}/{}/n/{}", self.base_url, url_name, source_key);

        let response = self
            .client
            .get(&article_url)
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("detail request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "detail request for {article_url} failed: HTTP {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AppError::Fetch(format!("detail body unreadable: {e}")))?;

        // og:title carries a "｜author" suffix on this platform
        let og_title = self.extract_meta(&self.og_title, &html);
        let (title, author) = match og_title {
            Some(t) => match t.rsplit_once('｜') {
                Some((title, author)) => {
                    (Some(title.to_string()), Some(author.trim().to_string()))
                }
                None => (Some(t), None),
            },
            None => (None, None),
        };

        let published_at = self
            .extract_meta(&self.published_time, &html)
            .and_then(|s| parse_publish_date(&s));

        Ok(ArticleDetail {
            title,
            author,
            thumbnail: self.extract_meta(&self.og_image, &html),
            published_at,
            body_text: self.extract_body(&html),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListingPayload {
    data: Option<ListingData>,
}

#[derive(Debug, Default, Deserialize)]
struct ListingData {
    #[serde(default)]
    sections: Vec<ListingSection>,
}

#[derive(Debug, Deserialize)]
struct ListingSection {
    #[serde(default)]
    notes: Vec<ListingNote>,
}

#[derive(Debug, Deserialize)]
struct ListingNote {
    key: Option<String>,
    name: Option<String>,
    user: Option<ListingUser>,
    eyecatch_url: Option<String>,
    publish_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingUser {
    urlname: Option<String>,
    nickname: Option<String>,
}

fn note_to_entry(note: ListingNote) -> Option<ListingEntry> {
    let source_key = note.key.filter(|k| !k.is_empty())?;
    let title = note.name.filter(|t| !t.is_empty())?;
    let user = note.user?;
    let url_name = user.urlname.filter(|u| !u.is_empty())?;

    // Entries without a parseable date are treated as just published, the
    // same fallback the detail page gets.
    let published_at = note
        .publish_at
        .as_deref()
        .and_then(parse_publish_date)
        .unwrap_or_else(Utc::now);

    Some(ListingEntry {
        source_key,
        url_name,
        title,
        author: user.nickname,
        thumbnail: note.eyecatch_url,
        published_at,
    })
}

fn parse_publish_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    // Last resort: naive prefix, assumed UTC
    let prefix = s.get(..19)?;
    chrono::NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offset_and_naive_publish_dates() {
        let with_offset = parse_publish_date("2025-06-01T21:30:00+09:00").unwrap();
        assert_eq!(with_offset.to_rfc3339(), "2025-06-01T12:30:00+00:00");

        let with_millis = parse_publish_date("2025-06-01T21:30:00.500+09:00").unwrap();
        assert_eq!(with_millis.timestamp(), with_offset.timestamp());

        let naive = parse_publish_date("2025-06-01T12:30:00").unwrap();
        assert_eq!(naive, with_offset);

        assert!(parse_publish_date("not a date").is_none());
    }

    #[test]
    fn meta_extraction_handles_both_attribute_orders() {
        let client = PlatformClient::new("https://note.com");

        let property_first =
            r#"<meta property="og:title" content="Idol tour diary｜hana" />"#;
        assert_eq!(
            client.extract_meta(&client.og_title, property_first).as_deref(),
            Some("Idol tour diary｜hana")
        );

        let content_first =
            r#"<meta content="https://img.example/cover.png" property="og:image" />"#;
        assert_eq!(
            client.extract_meta(&client.og_image, content_first).as_deref(),
            Some("https://img.example/cover.png")
        );
    }

    #[test]
    fn listing_payload_tolerates_missing_fields() {
        let json = r#"{
            "data": {
                "sections": [
                    {"notes": [
                        {"key": "n1", "name": "A day backstage",
                         "user": {"urlname": "hana", "nickname": "Hana"},
                         "publish_at": "2025-06-01T21:30:00+09:00"},
                        {"key": "", "name": "dropped"},
                        {"name": "no key at all"}
                    ]}
                ]
            }
        }"#;

        let payload: ListingPayload = serde_json::from_str(json).unwrap();
        let entries: Vec<_> = payload
            .data
            .unwrap()
            .sections
            .into_iter()
            .flat_map(|s| s.notes)
            .filter_map(note_to_entry)
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_key, "n1");
        assert_eq!(entries[0].url_name, "hana");
        assert_eq!(entries[0].author.as_deref(), Some("Hana"));
    }
}
