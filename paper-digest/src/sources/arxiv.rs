use crate::fetcher::Fetcher;
use crate::parser::{strip_version, ArxivFeedParser};
use crate::traits::PaperSource;
use crate::types::{PaperRecord, Result, SearchQuery};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_API_URL: &str = "https://export.arxiv.org/api/query";

/// Paper source backed by the arXiv Atom API.
pub struct ArxivSource {
    fetcher: Fetcher,
    api_url: Url,
    page_size: usize,
}

impl ArxivSource {
    pub fn new(fetcher: Fetcher, api_url: &str, page_size: usize) -> Result<Self> {
        Ok(Self {
            fetcher,
            api_url: Url::parse(api_url)?,
            page_size: page_size.max(1),
        })
    }

    fn page_url(&self, search_query: &str, start: usize) -> Url {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("search_query", search_query)
            .append_pair("start", &start.to_string())
            .append_pair("max_results", &self.page_size.to_string())
            .append_pair("sortBy", "submittedDate")
            .append_pair("sortOrder", "descending");
        url
    }
}

/// Build an arXiv `search_query` expression.
///
/// Categories are OR'ed, terms are OR'ed (multi-word terms quoted), both
/// groups are AND'ed together with a submission-date window ending at `until`.
pub fn build_search_query(query: &SearchQuery, until: NaiveDate) -> String {
    let mut parts = Vec::new();

    let categories: Vec<String> = query
        .categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| format!("cat:{}", c))
        .collect();
    match categories.len() {
        0 => {}
        1 => parts.push(categories[0].clone()),
        _ => parts.push(format!("({})", categories.join(" OR "))),
    }

    let terms: Vec<String> = query
        .terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.contains(' ') {
                format!("\"{}\"", t.replace('"', ""))
            } else {
                t.to_string()
            }
        })
        .collect();
    if !terms.is_empty() {
        parts.push(format!("({})", terms.join(" OR ")));
    }

    parts.push(format!(
        "submittedDate:[{}0000 TO {}2359]",
        query.since.format("%Y%m%d"),
        until.format("%Y%m%d")
    ));

    parts.join(" AND ")
}

#[async_trait]
impl PaperSource for ArxivSource {
    fn source_name(&self) -> String {
        format!("arXiv ({})", self.api_url.host_str().unwrap_or("unknown"))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<PaperRecord>> {
        let search_query = build_search_query(query, Utc::now().date_naive());
        info!("Searching arXiv with query: {}", search_query);

        let since = query.since.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        let mut papers: Vec<PaperRecord> = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut start = 0;

        while papers.len() < query.max_results {
            let url = self.page_url(&search_query, start);
            let body = self.fetcher.fetch_text(&url).await?;
            // Short-page detection uses the raw entry count: the same paper
            // listed under two categories is one record but two entries
            let (page, page_len) = ArxivFeedParser::parse_page(&body)?;

            debug!("Page at offset {} returned {} entries", start, page_len);
            if page_len == 0 {
                break;
            }

            let mut left_window = false;
            for paper in page {
                if since.is_some_and(|since| paper.published < since) {
                    // Results are newest first, so everything after this is older too
                    left_window = true;
                    break;
                }
                if !seen_ids.insert(paper.id.clone()) {
                    debug!("Skipping paper repeated across pages: {}", paper.id);
                    continue;
                }
                papers.push(paper);
                if papers.len() >= query.max_results {
                    break;
                }
            }

            if left_window || page_len < self.page_size {
                break;
            }
            start += self.page_size;
        }

        info!("Search completed. Found {} papers.", papers.len());
        Ok(papers)
    }

    async fn fetch_paper(&self, id: &str) -> Result<Option<PaperRecord>> {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("id_list", id.trim())
            .append_pair("max_results", "1");

        let body = self.fetcher.fetch_text(&url).await?;
        let wanted = strip_version(id.trim());
        let paper = ArxivFeedParser::parse_feed(&body)?
            .into_iter()
            .find(|p| p.id == wanted);

        Ok(paper)
    }
}
