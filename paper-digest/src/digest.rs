use crate::types::{Digest, DigestEntry, RenderedDigest};
use crate::utils::html::{escape, safe_href};
use crate::utils::text::smart_truncate;
use std::fmt::Write;
use tracing::debug;

const TITLE: &str = "arXiv Paper Digest";
const MAX_REASON_LENGTH: usize = 300;

const STYLE: &str = "body { font-family: Arial, sans-serif; line-height: 1.6; }\n\
    .paper { margin-bottom: 30px; border-bottom: 1px solid #eee; padding-bottom: 20px; }\n\
    .title { font-size: 18px; font-weight: bold; margin-bottom: 10px; }\n\
    .meta { color: #666; margin-bottom: 10px; }\n\
    .failed { color: #b00020; }\n\
    .category { background-color: #f1f8ff; padding: 3px 8px; border-radius: 3px; margin-right: 5px; font-size: 12px; }\n";

/// Renders a digest as plain text and HTML.
///
/// Output depends only on the `Digest` value, so the same digest always
/// renders byte-for-byte the same.
pub struct DigestFormatter;

impl DigestFormatter {
    pub fn render(digest: &Digest) -> RenderedDigest {
        debug!("Rendering digest with {} entries", digest.entries.len());

        RenderedDigest {
            plain_text: Self::render_plain(digest),
            rich_text: Self::render_html(digest),
        }
    }

    /// `"<prefix> (<YYYY-MM-DD>): <n> new paper(s)"`
    pub fn subject(digest: &Digest, prefix: &str) -> String {
        let count = digest.new_paper_count();
        format!(
            "{} ({}): {} new {}",
            prefix,
            digest.generated_at.format("%Y-%m-%d"),
            count,
            if count == 1 { "paper" } else { "papers" }
        )
    }

    fn render_plain(digest: &Digest) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} - {}", TITLE, digest.generated_at.format("%Y-%m-%d"));
        out.push('\n');

        if digest.entries.is_empty() {
            out.push_str("No new papers matched your search today.\n");
            return out;
        }

        let _ = writeln!(out, "{}", count_line(digest));
        out.push('\n');

        for (i, entry) in digest.entries.iter().enumerate() {
            Self::plain_entry(&mut out, i + 1, entry);
        }
        out
    }

    fn plain_entry(out: &mut String, number: usize, entry: &DigestEntry) {
        let paper = &entry.paper;
        let _ = writeln!(out, "{}. {}", number, paper.title);
        if !paper.authors.is_empty() {
            let _ = writeln!(out, "Authors: {}", paper.authors.join(", "));
        }
        let _ = writeln!(out, "Published: {}", paper.published.format("%Y-%m-%d"));
        if !paper.categories.is_empty() {
            let categories: Vec<&str> = paper.categories.iter().map(String::as_str).collect();
            let _ = writeln!(out, "Categories: {}", categories.join(", "));
        }

        match entry.summary.failure() {
            Some((kind, reason)) => {
                let _ = writeln!(out, "Summarization failed: {} ({})", kind, smart_truncate(reason, MAX_REASON_LENGTH));
            }
            None => {
                out.push('\n');
                let _ = writeln!(out, "Summary: {}", entry.summary.synopsis);
                plain_list(out, "Methods", &entry.summary.methods);
                plain_list(out, "Contributions", &entry.summary.contributions);
                plain_list(out, "Limitations", &entry.summary.limitations);
            }
        }

        out.push('\n');
        let _ = writeln!(out, "Abstract page: {}", paper.url);
        if let Some(pdf) = &paper.pdf_url {
            let _ = writeln!(out, "PDF: {}", pdf);
        }
        out.push_str("\n----------------------------------------\n\n");
    }

    fn render_html(digest: &Digest) -> String {
        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n");
        out.push_str(STYLE);
        out.push_str("</style>\n</head>\n<body>\n");
        let _ = writeln!(out, "<h1>{} - {}</h1>", TITLE, digest.generated_at.format("%Y-%m-%d"));

        if digest.entries.is_empty() {
            out.push_str("<p>No new papers matched your search today.</p>\n");
        } else {
            let _ = writeln!(out, "<p>{}</p>", escape(&count_line(digest)));
            for entry in &digest.entries {
                Self::html_entry(&mut out, entry);
            }
        }

        out.push_str("</body>\n</html>\n");
        out
    }

    fn html_entry(out: &mut String, entry: &DigestEntry) {
        let paper = &entry.paper;
        out.push_str("<div class=\"paper\">\n");
        let _ = writeln!(out, "<div class=\"title\">{}</div>", escape(&paper.title));

        if !paper.authors.is_empty() {
            let authors: Vec<String> = paper.authors.iter().map(|a| escape(a)).collect();
            let _ = writeln!(out, "<div class=\"meta\"><em>{}</em></div>", authors.join(", "));
        }
        let _ = writeln!(out, "<div class=\"meta\">Published: {}</div>", paper.published.format("%Y-%m-%d"));

        match entry.summary.failure() {
            Some((kind, reason)) => {
                let _ = writeln!(
                    out,
                    "<p class=\"failed\">Summarization failed: {} ({})</p>",
                    kind,
                    escape(&smart_truncate(reason, MAX_REASON_LENGTH))
                );
            }
            None => {
                let _ = writeln!(out, "<p>{}</p>", escape(&entry.summary.synopsis));
                html_list(out, "Methods", &entry.summary.methods);
                html_list(out, "Contributions", &entry.summary.contributions);
                html_list(out, "Limitations", &entry.summary.limitations);
            }
        }

        let _ = write!(
            out,
            "<div><a href=\"{}\" target=\"_blank\">Abstract</a>",
            safe_href(&paper.url)
        );
        if let Some(pdf) = &paper.pdf_url {
            let _ = write!(out, " | <a href=\"{}\" target=\"_blank\">PDF</a>", safe_href(pdf));
        }
        out.push_str("</div>\n");

        if !paper.categories.is_empty() {
            out.push_str("<div>");
            for category in &paper.categories {
                let _ = write!(out, "<span class=\"category\">{}</span>", escape(category));
            }
            out.push_str("</div>\n");
        }

        out.push_str("</div>\n");
    }
}

fn count_line(digest: &Digest) -> String {
    let count = digest.new_paper_count();
    let failed = digest.failed_count();
    let mut line = format!("{} new {}", count, if count == 1 { "paper" } else { "papers" });
    if failed > 0 {
        let _ = write!(line, " ({} could not be summarized)", failed);
    }
    line
}

fn plain_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}:", heading);
    for item in items {
        let _ = writeln!(out, "  - {}", item);
    }
}

fn html_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "<h4>{}</h4>\n<ul>", heading);
    for item in items {
        let _ = writeln!(out, "<li>{}</li>", escape(item));
    }
    out.push_str("</ul>\n");
}
