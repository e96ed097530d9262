mod common;

use chrono::{TimeZone, Utc};
use common::{atom_entry, atom_feed, init_tracing};
use paper_digest::parser::{arxiv_id_from_url, strip_version};
use paper_digest::{ArxivFeedParser, DigestError, Result};

#[test]
fn test_parse_arxiv_entry() -> Result<()> {
    init_tracing();

    let feed = atom_feed(&[atom_entry(
        "2401.01234v2",
        "Mapping   Sparse\n      Features",
        "2024-01-08T18:00:00Z",
    )]);
    let papers = ArxivFeedParser::parse_feed(&feed)?;

    assert_eq!(papers.len(), 1);
    let paper = &papers[0];
    assert_eq!(paper.id, "2401.01234");
    assert_eq!(paper.title, "Mapping Sparse Features");
    assert_eq!(paper.authors, vec!["Ada Lovelace", "Alan Turing"]);
    assert!(paper.abstract_text.starts_with("An abstract for"));
    assert!(!paper.abstract_text.contains('\n'));
    assert_eq!(paper.url, "https://arxiv.org/abs/2401.01234");
    assert_eq!(paper.pdf_url.as_deref(), Some("https://arxiv.org/pdf/2401.01234v2"));
    assert_eq!(paper.published, Utc.with_ymd_and_hms(2024, 1, 8, 18, 0, 0).unwrap());
    assert!(paper.categories.contains("cs.LG"));
    assert!(paper.categories.contains("cs.AI"));

    Ok(())
}

#[test]
fn test_duplicates_within_page_are_dropped() -> Result<()> {
    let feed = atom_feed(&[
        atom_entry("2401.00001v1", "First", "2024-01-08T10:00:00Z"),
        atom_entry("2401.00002v1", "Second", "2024-01-08T09:00:00Z"),
        atom_entry("2401.00001v2", "First again", "2024-01-08T08:00:00Z"),
    ]);
    let papers = ArxivFeedParser::parse_feed(&feed)?;

    let ids: Vec<&str> = papers.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["2401.00001", "2401.00002"]);
    assert_eq!(papers[0].title, "First");

    Ok(())
}

#[test]
fn test_empty_feed_has_no_papers() -> Result<()> {
    let papers = ArxivFeedParser::parse_feed(&atom_feed(&[]))?;
    assert!(papers.is_empty());
    Ok(())
}

#[test]
fn test_api_error_entry_is_reported() {
    let error_entry = r#"  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
    <title>Error</title>
    <summary>incorrect id format for 1234</summary>
    <updated>2024-01-10T00:00:00-05:00</updated>
  </entry>
"#
    .to_string();

    match ArxivFeedParser::parse_feed(&atom_feed(&[error_entry])) {
        Err(DigestError::Parse(message)) => assert!(message.contains("incorrect id format")),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_garbage_is_a_parse_error() {
    let result = ArxivFeedParser::parse_feed("<html><body>Rate exceeded</body>");
    assert!(matches!(result, Err(DigestError::Parse(_))));
}

#[test]
fn test_identifier_helpers() {
    assert_eq!(arxiv_id_from_url("http://arxiv.org/abs/2301.07041v2").as_deref(), Some("2301.07041"));
    assert_eq!(arxiv_id_from_url("http://arxiv.org/abs/cs/9901001v1").as_deref(), Some("cs/9901001"));
    assert_eq!(arxiv_id_from_url("http://arxiv.org/list/cs.AI"), None);

    assert_eq!(strip_version("2301.07041v12"), "2301.07041");
    assert_eq!(strip_version("2301.07041"), "2301.07041");
    // archive names may contain a 'v' that is not a version marker
    assert_eq!(strip_version("solv-int/9901001"), "solv-int/9901001");
}

#[test]
fn test_parse_page_counts_raw_entries() -> Result<()> {
    let feed = atom_feed(&[
        atom_entry("2401.00001v1", "First", "2024-01-08T10:00:00Z"),
        atom_entry("2401.00001v1", "First", "2024-01-08T10:00:00Z"),
    ]);
    let (papers, raw_entries) = ArxivFeedParser::parse_page(&feed)?;

    assert_eq!(papers.len(), 1);
    assert_eq!(raw_entries, 2);
    Ok(())
}
