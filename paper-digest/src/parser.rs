use crate::types::{DigestError, PaperRecord, Result};
use crate::utils::text::normalize_whitespace;
use chrono::Utc;
use feed_rs::parser;
use std::collections::HashSet;
use tracing::{debug, info};

/// Turns arXiv Atom responses into `PaperRecord`s.
pub struct ArxivFeedParser;

impl ArxivFeedParser {
    /// Parse one response page. Entries repeated within the page are dropped.
    pub fn parse_feed(content: &str) -> Result<Vec<PaperRecord>> {
        Self::parse_page(content).map(|(papers, _)| papers)
    }

    /// Like `parse_feed`, also returning how many entries the page held
    /// before duplicates and unreadable entries were dropped.
    pub fn parse_page(content: &str) -> Result<(Vec<PaperRecord>, usize)> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| DigestError::Parse(format!("Failed to parse feed: {}", e)))?;

        let raw_entries = feed.entries.len();
        let mut seen_ids = HashSet::new();
        let mut papers = Vec::new();

        for entry in feed.entries {
            // arXiv reports query errors as a single entry under /api/errors
            if entry.id.contains("/api/errors") {
                let detail = entry
                    .summary
                    .map(|s| normalize_whitespace(&s.content))
                    .unwrap_or_else(|| "unknown error".to_string());
                return Err(DigestError::Parse(format!("arXiv API error: {}", detail)));
            }

            let Some(paper) = Self::parse_entry(entry) else {
                continue;
            };

            if !seen_ids.insert(paper.id.clone()) {
                debug!("Skipping duplicate entry: {}", paper.id);
                continue;
            }
            papers.push(paper);
        }

        info!("Parsed feed with {} entries ({} raw)", papers.len(), raw_entries);
        Ok((papers, raw_entries))
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> Option<PaperRecord> {
        let Some(id) = arxiv_id_from_url(&entry.id) else {
            debug!("Skipping entry with unrecognised id: {}", entry.id);
            return None;
        };

        let title = entry
            .title
            .map(|t| normalize_whitespace(&t.content))
            .unwrap_or_else(|| "Untitled".to_string());

        let Some(published) = entry.published.or(entry.updated) else {
            debug!("Skipping entry without a date: {}", id);
            return None;
        };

        let pdf_url = entry
            .links
            .iter()
            .find(|link| {
                link.title.as_deref() == Some("pdf")
                    || link.media_type.as_deref() == Some("application/pdf")
            })
            .map(|link| force_https(&link.href))
            .unwrap_or_else(|| arxiv_pdf_url(&id));

        Some(PaperRecord {
            url: arxiv_abs_url(&id),
            pdf_url: Some(pdf_url),
            title,
            authors: entry.authors.into_iter().map(|a| normalize_whitespace(&a.name)).collect(),
            abstract_text: entry
                .summary
                .map(|s| normalize_whitespace(&s.content))
                .unwrap_or_default(),
            published: published.with_timezone(&Utc),
            categories: entry.categories.into_iter().map(|c| c.term).collect(),
            id,
        })
    }
}

/// Extract the versionless accession number from an abstract URL.
///
/// `http://arxiv.org/abs/2301.07041v2` gives `2301.07041`,
/// `http://arxiv.org/abs/cs/9901001v1` gives `cs/9901001`.
pub fn arxiv_id_from_url(url: &str) -> Option<String> {
    let start = url.rfind("/abs/")? + "/abs/".len();
    let id = url[start..].trim_matches('/').trim();
    if id.is_empty() {
        return None;
    }
    Some(strip_version(id).to_string())
}

pub fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(pos)
            if pos > 0
                && pos + 1 < id.len()
                && id[pos + 1..].chars().all(|c| c.is_ascii_digit())
                && id[..pos].ends_with(|c: char| c.is_ascii_digit()) =>
        {
            &id[..pos]
        }
        _ => id,
    }
}

pub fn arxiv_abs_url(id: &str) -> String {
    format!("https://arxiv.org/abs/{}", id)
}

pub fn arxiv_pdf_url(id: &str) -> String {
    format!("https://arxiv.org/pdf/{}", id)
}

fn force_https(url: &str) -> String {
    match url.strip_prefix("http:") {
        Some(rest) => format!("https:{}", rest),
        None => url.to_string(),
    }
}
