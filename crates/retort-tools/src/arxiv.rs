use futures::future::BoxFuture;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::info;

use retort_core::traits::Tool;

const ARXIV_API: &str = "https://export.arxiv.org/api/query";

/// One entry from the arXiv Atom feed.
#[derive(Debug, Clone, Default)]
pub struct ArxivPaper {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub published: String,
}

/// Literature search against the public arXiv API.
///
/// Returns documents formatted as tagged blocks so downstream prompts can
/// cite individual papers by title.
pub struct ArxivTool {
    http: reqwest::Client,
    max_results: usize,
}

impl ArxivTool {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            max_results: 3,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    async fn search(&self, query: &str) -> String {
        let url = format!(
            "{ARXIV_API}?search_query=all:{}&start=0&max_results={}",
            urlencoding::encode(query),
            self.max_results,
        );

        let xml = match self.http.get(&url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(text) => text,
                Err(e) => return format!("Error: {e}"),
            },
            Err(e) => return format!("Error: {e}"),
        };

        let papers = match parse_atom_feed(&xml) {
            Ok(papers) => papers,
            Err(e) => return format!("Error: {e}"),
        };
        if papers.is_empty() {
            return format!("No papers found for query: {query}");
        }
        info!(query, count = papers.len(), "arXiv search finished");

        papers
            .iter()
            .map(format_paper)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for ArxivTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for ArxivTool {
    fn name(&self) -> &str {
        "arxiv"
    }

    fn description(&self) -> &str {
        "Search arXiv for research papers. Input is a search query \
         (e.g. 'catalytic hydrogenation'). Returns paper titles, authors, \
         publication dates, and abstracts."
    }

    fn invoke(&self, input: &str) -> BoxFuture<'_, String> {
        let query = input.to_string();
        Box::pin(async move { self.search(&query).await })
    }

    fn timeout_secs(&self) -> u64 {
        60
    }
}

fn format_paper(paper: &ArxivPaper) -> String {
    format!(
        "<arxiv-document title=\"{title}\">\n    <title>{title}</title>\n    <authors>{authors}</authors>\n    <published>{published}</published>\n    <content>{content}</content>\n</arxiv-document>",
        title = paper.title.trim(),
        authors = paper.authors.join(", "),
        published = paper.published,
        content = paper.summary.trim(),
    )
}

/// Parse the Atom XML feed returned by the arXiv query endpoint.
pub fn parse_atom_feed(xml: &str) -> Result<Vec<ArxivPaper>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut current: Option<ArxivPaper> = None;
    let mut in_author = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "entry" => current = Some(ArxivPaper::default()),
                    "author" if current.is_some() => in_author = true,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                text = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "entry" => {
                        if let Some(paper) = current.take() {
                            papers.push(paper);
                        }
                    }
                    "author" => in_author = false,
                    _ => {
                        if let Some(paper) = current.as_mut() {
                            match name.as_str() {
                                "id" => paper.id = text.clone(),
                                "title" => paper.title = text.clone(),
                                "summary" => paper.summary = text.clone(),
                                "published" => paper.published = text.clone(),
                                "name" if in_author => paper.authors.push(text.clone()),
                                _ => {}
                            }
                        }
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parsing error: {e}")),
            _ => {}
        }
    }

    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
    <feed xmlns="http://www.w3.org/2005/Atom">
        <entry>
            <id>http://arxiv.org/abs/2301.00001v1</id>
            <title>Catalysis at Scale</title>
            <summary>We study catalytic hydrogenation.</summary>
            <published>2023-01-01T00:00:00Z</published>
            <author><name>Alice</name></author>
            <author><name>Bob</name></author>
        </entry>
        <entry>
            <id>http://arxiv.org/abs/2301.00002v1</id>
            <title>Second Paper</title>
            <summary>Second summary.</summary>
            <published>2023-01-02T00:00:00Z</published>
            <author><name>Carol</name></author>
        </entry>
    </feed>"#;

    #[test]
    fn parses_entries_with_authors() {
        let papers = parse_atom_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].title, "Catalysis at Scale");
        assert_eq!(papers[0].authors, vec!["Alice", "Bob"]);
        assert_eq!(papers[1].authors, vec!["Carol"]);
    }

    #[test]
    fn empty_feed_parses_to_no_papers() {
        let xml = r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"></feed>"#;
        assert!(parse_atom_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn formats_papers_as_tagged_blocks() {
        let papers = parse_atom_feed(FEED).unwrap();
        let block = format_paper(&papers[0]);
        assert!(block.starts_with("<arxiv-document title=\"Catalysis at Scale\">"));
        assert!(block.contains("<authors>Alice, Bob</authors>"));
        assert!(block.contains("<content>We study catalytic hydrogenation.</content>"));
        assert!(block.ends_with("</arxiv-document>"));
    }

    #[test]
    fn escaped_characters_are_unescaped() {
        let xml = r#"<?xml version="1.0"?>
        <feed>
            <entry>
                <id>x</id>
                <title>Acids &amp; Bases</title>
                <summary>s</summary>
                <published>d</published>
            </entry>
        </feed>"#;
        let papers = parse_atom_feed(xml).unwrap();
        assert_eq!(papers[0].title, "Acids & Bases");
    }
}
