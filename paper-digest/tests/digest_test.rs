mod common;

use chrono::{TimeZone, Utc};
use common::paper;
use paper_digest::{Digest, DigestEntry, DigestFormatter, FailureKind, SummaryResult};

fn success(id: &str) -> DigestEntry {
    DigestEntry {
        paper: paper(id),
        summary: SummaryResult::succeeded(
            id,
            format!("Synopsis of {}", id),
            vec!["Linear classifiers".to_string()],
            vec!["A benchmark".to_string()],
            vec!["Small models only".to_string()],
        ),
    }
}

fn failure(id: &str) -> DigestEntry {
    DigestEntry {
        paper: paper(id),
        summary: SummaryResult::failed(id, FailureKind::Timeout, "no response within the time limit"),
    }
}

fn digest(entries: Vec<DigestEntry>) -> Digest {
    Digest::new(entries, Utc.with_ymd_and_hms(2024, 1, 9, 8, 0, 0).unwrap())
}

#[test]
fn test_render_is_deterministic() {
    let input = digest(vec![success("2401.00001"), failure("2401.00002")]);

    let first = DigestFormatter::render(&input);
    let second = DigestFormatter::render(&input);
    assert_eq!(first, second);
}

#[test]
fn test_render_keeps_entry_order_and_sections() {
    let rendered = DigestFormatter::render(&digest(vec![success("2401.00002"), success("2401.00001")]));
    let text = &rendered.plain_text;

    let second = text.find("Paper 2401.00002").unwrap();
    let first = text.find("Paper 2401.00001").unwrap();
    assert!(second < first);

    assert!(text.contains("2 new papers"));
    assert!(text.contains("Synopsis of 2401.00001"));
    assert!(text.contains("Methods:\n  - Linear classifiers"));
    assert!(text.contains("Limitations:"));
    assert!(text.contains("https://arxiv.org/abs/2401.00001"));
    assert!(rendered.rich_text.contains("<li>A benchmark</li>"));
}

#[test]
fn test_empty_digest_says_no_new_papers() {
    let rendered = DigestFormatter::render(&digest(vec![]));

    assert!(rendered.plain_text.contains("No new papers"));
    assert!(rendered.rich_text.contains("No new papers"));
}

#[test]
fn test_failed_entry_is_visible() {
    let rendered = DigestFormatter::render(&digest(vec![success("2401.00001"), failure("2401.00003")]));

    assert!(rendered.plain_text.contains("Paper 2401.00003"));
    assert!(rendered
        .plain_text
        .contains("Summarization failed: timeout (no response within the time limit)"));
    assert!(rendered.plain_text.contains("1 could not be summarized"));
    assert!(rendered.rich_text.contains("Summarization failed: timeout"));
}

#[test]
fn test_html_is_escaped_and_links_restricted() {
    let mut entry = success("2401.00001");
    entry.paper.title = "<script>alert(\"x\")</script> & more".to_string();
    entry.paper.url = "javascript:alert(1)".to_string();
    entry.paper.pdf_url = Some("https://evil.example.com/paper.pdf".to_string());

    let rendered = DigestFormatter::render(&digest(vec![entry]));
    let html = &rendered.rich_text;

    assert!(!html.contains("<script>"));
    assert!(html.contains("&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; more"));
    assert!(!html.contains("javascript:"));
    assert!(!html.contains("evil.example.com"));
    assert!(html.contains("href=\"#\""));
}

#[test]
fn test_subject_line() {
    assert_eq!(
        DigestFormatter::subject(&digest(vec![success("2401.00001")]), "arXiv Papers"),
        "arXiv Papers (2024-01-09): 1 new paper"
    );
    assert_eq!(
        DigestFormatter::subject(&digest(vec![success("2401.00001"), failure("2401.00002")]), "Digest"),
        "Digest (2024-01-09): 2 new papers"
    );
}
