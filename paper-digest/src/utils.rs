/// Text processing utilities
pub mod text {
    /// Collapse runs of whitespace (including the hard wraps arXiv puts in
    /// titles and abstracts) into single spaces.
    pub fn normalize_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Truncate text to at most `max_length` bytes, preferring a sentence or
    /// word boundary. Never splits a UTF-8 character.
    pub fn smart_truncate(text: &str, max_length: usize) -> String {
        if text.len() <= max_length {
            return text.to_string();
        }

        let mut cut = max_length;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }

        let truncated = &text[..cut];
        if let Some(last_sentence) = truncated.rfind(". ") {
            truncated[..last_sentence + 1].to_string()
        } else if let Some(last_space) = truncated.rfind(' ') {
            format!("{}...", &truncated[..last_space])
        } else {
            format!("{}...", truncated)
        }
    }

    /// Strip leading list markers such as `-`, `*`, `•`, `1.` or `2)`.
    pub fn strip_list_marker(line: &str) -> &str {
        let line = line.trim();
        let line = line
            .strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .or_else(|| line.strip_prefix("• "))
            .unwrap_or(line);

        let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 {
            let rest = &line[digits..];
            if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
                return rest.trim();
            }
        }
        line.trim()
    }
}

/// HTML utilities
pub mod html {
    pub fn escape(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#x27;"),
                _ => escaped.push(c),
            }
        }
        escaped
    }

    /// Escape a URL for an `href`, refusing anything not hosted on arxiv.org.
    pub fn safe_href(url: &str) -> String {
        let allowed = url::Url::parse(url)
            .ok()
            .filter(|u| u.scheme() == "https" || u.scheme() == "http")
            .and_then(|u| u.host_str().map(|h| h == "arxiv.org" || h.ends_with(".arxiv.org")))
            .unwrap_or(false);

        if allowed {
            escape(url)
        } else {
            "#".to_string()
        }
    }
}

/// Time utilities
pub mod time {
    use chrono::Duration;

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.num_seconds();

        if total_seconds < 60 {
            format!("{}s", total_seconds)
        } else if total_seconds < 3600 {
            format!("{}m", total_seconds / 60)
        } else {
            format!("{}h{}m", total_seconds / 3600, (total_seconds % 3600) / 60)
        }
    }
}
