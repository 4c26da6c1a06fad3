use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{info, warn};

use retort_core::traits::Tool;

const CORE_API: &str = "https://api.core.ac.uk/v3/search/works/";

/// Date fields in order of preference; records rarely fill all of them.
const DATE_KEYS: [&str; 5] = [
    "acceptedDate",
    "updatedDate",
    "publishedDate",
    "createdDate",
    "depositedDate",
];

/// Open-access paper search against the CORE v3 API.
///
/// Covers sources arXiv does not index. Requires an API key.
pub struct CoreSearchTool {
    api_key: String,
    http: reqwest::Client,
}

impl CoreSearchTool {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn search(&self, query: &str) -> String {
        let mut body = None;
        for attempt in 0..5 {
            let result = self
                .http
                .get(CORE_API)
                .query(&[("q", query), ("api_key", &self.api_key)])
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<Value>().await {
                        Ok(json) => {
                            body = Some(json);
                            break;
                        }
                        Err(e) => return format!("Error: {e}"),
                    }
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), attempt, "CORE request failed, retrying");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "CORE request failed, retrying");
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        let Some(body) = body else {
            return "Error: Request failed.".to_string();
        };

        let Some(results) = body["results"].as_array().filter(|r| !r.is_empty()) else {
            return "No results found.".to_string();
        };
        info!(query, count = results.len(), "CORE search finished");

        let records: Vec<Value> = results.iter().map(format_record).collect();
        serde_json::to_string(&records).unwrap_or_else(|e| format!("Error: {e}"))
    }
}

fn format_record(record: &Value) -> Value {
    let authors = record["authors"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|a| a["name"].as_str())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();
    json!({
        "ID": record["id"],
        "Title": record["title"],
        "Authors": authors,
        "DOI": record["doi"],
        "Date": extract_date(record),
        "Type": record["documentType"],
        "Abstract": format_abstract(record["abstract"].as_str().unwrap_or("")),
    })
}

fn extract_date(record: &Value) -> String {
    DATE_KEYS
        .iter()
        .find_map(|key| record[*key].as_str().filter(|s| !s.is_empty()))
        .unwrap_or("")
        .to_string()
}

/// Strip the short junk lines that OCR'd abstracts tend to carry.
fn format_abstract(abstract_text: &str) -> String {
    abstract_text
        .lines()
        .filter(|line| line.len() > 5)
        .collect::<Vec<_>>()
        .join("\n")
}

impl Tool for CoreSearchTool {
    fn name(&self) -> &str {
        "core_search"
    }

    fn description(&self) -> &str {
        "Search the CORE API for open access research papers. \
         Use it to find research papers from sources not included in arXiv. \
         Input is a search query."
    }

    fn invoke(&self, input: &str) -> BoxFuture<'_, String> {
        let query = input.to_string();
        Box::pin(async move { self.search(&query).await })
    }

    fn timeout_secs(&self) -> u64 {
        60
    }
}
