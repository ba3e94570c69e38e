//! Citation extraction from raw tool responses

use std::sync::LazyLock;

use regex::Regex;

use crate::state::ResearchSource;

/// Relevance tag for links found in tool output
pub const LINK_RELEVANCE: &str = "relevant";
/// Relevance tag for a page recovered from a visit summary
pub const VISIT_RELEVANCE: &str = "visited";
/// Title given to a page recovered from a visit summary
pub const VISITED_PAGE_TITLE: &str = "Visited Page";

/// `[title](http(s)://url)`; the URL may hold one level of balanced parentheses
static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]]*)\]\((https?://(?:[^\s()]|\([^\s()]*\))+)\)").unwrap()
});

/// Header of a visit summary: "The useful information in <url> for user goal ..."
static VISIT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"information in (https?://\S+?) for\b").unwrap());

/// Whether `tool` reads a single page (and reports it by URL rather than by link)
fn is_visit_tool(tool: &str) -> bool {
    let tool = tool.trim().to_ascii_lowercase();
    tool == "visit" || tool.starts_with("visit_")
}

/// Extract citation records from one tool response.
///
/// Markdown links are collected in order of appearance. For visit tools with
/// no links, the page URL is recovered from the summary header instead.
pub fn extract_sources(tool: Option<&str>, raw: &str) -> Vec<ResearchSource> {
    let mut sources: Vec<ResearchSource> = MARKDOWN_LINK
        .captures_iter(raw)
        .map(|caps| {
            let url = caps[2].to_string();
            let title = caps[1].trim();
            ResearchSource {
                title: if title.is_empty() {
                    url.clone()
                } else {
                    title.to_string()
                },
                url,
                snippet: None,
                relevance: Some(LINK_RELEVANCE.to_string()),
            }
        })
        .collect();

    if sources.is_empty() && tool.is_some_and(is_visit_tool) {
        if let Some(caps) = VISIT_URL.captures(raw) {
            let url = caps[1].to_string();
            if !sources.iter().any(|s| s.url == url) {
                sources.push(ResearchSource {
                    title: VISITED_PAGE_TITLE.to_string(),
                    url,
                    snippet: None,
                    relevance: Some(VISIT_RELEVANCE.to_string()),
                });
            }
        }
    }

    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_links_in_order() {
        let sources = extract_sources(
            Some("search"),
            "See [Paper A](https://a.com/p) and [Paper B](https://b.com/q)",
        );
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Paper A");
        assert_eq!(sources[0].url, "https://a.com/p");
        assert_eq!(sources[1].title, "Paper B");
        assert_eq!(sources[1].url, "https://b.com/q");
        assert_eq!(sources[0].relevance.as_deref(), Some(LINK_RELEVANCE));
    }

    #[test]
    fn test_url_with_parentheses() {
        let sources = extract_sources(
            Some("search"),
            "1. [Rust (programming language)](https://en.wikipedia.org/wiki/Rust_(programming_language))\n\
             2. [Ferris](https://rustacean.net)",
        );
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Rust (programming language)");
        assert_eq!(
            sources[0].url,
            "https://en.wikipedia.org/wiki/Rust_(programming_language)"
        );
        assert_eq!(sources[1].url, "https://rustacean.net");
    }

    #[test]
    fn test_search_result_block() {
        let raw = "A Google search for 'rust' found 2 results:\n\n## Web Results\n\
                   1. [Rust Programming Language](https://www.rust-lang.org/)\nDate published: 2024\nA language empowering everyone.\n\n\
                   2. [The Rust Book](https://doc.rust-lang.org/book/)\nLearn Rust.";
        let sources = extract_sources(Some("search"), raw);
        let urls: Vec<&str> = sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.rust-lang.org/", "https://doc.rust-lang.org/book/"]
        );
    }

    #[test]
    fn test_visit_fallback() {
        let raw = "The useful information in https://x.com/page for user goal find facts as follows:\n\nEvidence in page:\n...";
        let sources = extract_sources(Some("visit"), raw);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].title, VISITED_PAGE_TITLE);
        assert_eq!(sources[0].url, "https://x.com/page");
        assert_eq!(sources[0].relevance.as_deref(), Some(VISIT_RELEVANCE));
    }

    #[test]
    fn test_visit_prefers_markdown_links() {
        let raw = "The useful information in https://x.com/page for user goal g:\nsee [Ref](https://y.com/r)";
        let sources = extract_sources(Some("visit"), raw);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].url, "https://y.com/r");
    }

    #[test]
    fn test_visit_phrase_ignored_for_other_tools() {
        let raw = "The useful information in https://x.com/page for user goal g";
        assert!(extract_sources(Some("search"), raw).is_empty());
        assert!(extract_sources(None, raw).is_empty());
    }

    #[test]
    fn test_unknown_tool_uses_markdown_only() {
        let sources = extract_sources(Some("PythonInterpreter"), "[plot](https://p.org/x.png)");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].title, "plot");
    }

    #[test]
    fn test_empty_title_falls_back_to_url() {
        let sources = extract_sources(None, "[ ](https://a.com)");
        assert_eq!(sources[0].title, "https://a.com");
    }

    #[test]
    fn test_non_http_links_ignored() {
        assert!(extract_sources(None, "[local](file:///etc/passwd) [rel](/docs)").is_empty());
        assert!(extract_sources(None, "").is_empty());
    }

    #[test]
    fn test_visit_tool_names() {
        assert!(is_visit_tool("visit"));
        assert!(is_visit_tool("Visit"));
        assert!(is_visit_tool("visit_page"));
        assert!(!is_visit_tool("revisit"));
    }
}
