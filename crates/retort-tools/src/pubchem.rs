use std::collections::HashSet;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{info, warn};

use retort_core::traits::Tool;

const PUG_BASE: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";
const AUTOCOMPLETE_BASE: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/autocomplete";

/// Maximum number of compounds returned per lookup.
const MAX_COMPOUNDS: usize = 5;

/// Compound lookup against the PubChem PUG REST API.
///
/// Accepts a comma-separated list of compound names, CIDs, or SMILES strings
/// and returns compound records as a JSON array string. Lookup failures come
/// back as error-describing strings, never as errors.
pub struct PubChemTool {
    http: reqwest::Client,
}

impl PubChemTool {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// GET a JSON endpoint, retrying transient failures up to three times.
    async fn get_json(&self, url: &str) -> Result<Value, String> {
        let mut last_err = String::new();
        for attempt in 0..3 {
            match self.http.get(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp.json().await.map_err(|e| e.to_string());
                }
                Ok(resp) => {
                    last_err = format!("HTTP {}", resp.status());
                }
                Err(e) => {
                    last_err = e.to_string();
                }
            }
            if attempt < 2 {
                warn!(url, error = %last_err, "PubChem request failed, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        Err(last_err)
    }

    /// Resolve one identifier to CIDs. Numeric input is taken as a CID
    /// directly; otherwise a name lookup, then a SMILES lookup.
    async fn fetch_cids(&self, identifier: &str) -> Vec<u64> {
        if let Ok(cid) = identifier.parse::<u64>() {
            return vec![cid];
        }
        let encoded = urlencoding::encode(identifier);
        for namespace in ["name", "smiles"] {
            let url = format!("{PUG_BASE}/compound/{namespace}/{encoded}/cids/JSON");
            if let Ok(body) = self.get_json(&url).await {
                let cids: Vec<u64> = body["IdentifierList"]["CID"]
                    .as_array()
                    .map(|arr| arr.iter().filter_map(|v| v.as_u64()).collect())
                    .unwrap_or_default();
                if !cids.is_empty() {
                    return cids.into_iter().take(MAX_COMPOUNDS).collect();
                }
            }
        }
        Vec::new()
    }

    /// Fallback lookup through the autocomplete endpoint, for partial or
    /// misspelled names.
    async fn fetch_cids_by_autocomplete(&self, identifier: &str) -> Vec<u64> {
        let encoded = urlencoding::encode(identifier);
        let url = format!("{AUTOCOMPLETE_BASE}/compound,gene,taxonomy/{encoded}/json");
        let Ok(body) = self.get_json(&url).await else {
            return Vec::new();
        };
        let names: Vec<String> = body["dictionary_terms"]["compound"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let mut cids = Vec::new();
        for name in names {
            cids.extend(self.fetch_cids(&name).await);
            if cids.len() >= MAX_COMPOUNDS {
                break;
            }
        }
        cids.truncate(MAX_COMPOUNDS);
        cids
    }

    /// Build the full compound record for one CID.
    async fn describe_compound(&self, cid: u64) -> Result<Value, String> {
        let props_url = format!(
            "{PUG_BASE}/compound/cid/{cid}/property/IsomericSMILES,MolecularFormula,MolecularWeight/JSON"
        );
        let props = self.get_json(&props_url).await?;
        let props = &props["PropertyTable"]["Properties"][0];

        let synonyms_url = format!("{PUG_BASE}/compound/cid/{cid}/synonyms/JSON");
        let synonyms: Vec<String> = match self.get_json(&synonyms_url).await {
            Ok(body) => body["InformationList"]["Information"][0]["Synonym"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .take(3)
                        .collect()
                })
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        let description_url = format!("{PUG_BASE}/compound/cid/{cid}/description/JSON");
        let (title, description) = match self.get_json(&description_url).await {
            Ok(body) => {
                let info = body["InformationList"]["Information"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();
                let title = info
                    .iter()
                    .filter_map(|i| i["Title"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                let description = info
                    .iter()
                    .filter_map(|i| i["Description"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                (title, description)
            }
            Err(_) => (String::new(), String::new()),
        };

        Ok(json!({
            "Smiles": props["IsomericSMILES"],
            "Compound": title,
            "Source": format!("https://pubchem.ncbi.nlm.nih.gov/compound/{cid}"),
            "CID": cid,
            "Molecular Formula": props["MolecularFormula"],
            "Molecular Weight": props["MolecularWeight"],
            "Synonyms": synonyms,
            "Description": description,
        }))
    }

    async fn lookup(&self, input: &str) -> String {
        let identifiers: Vec<&str> = input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if identifiers.is_empty() {
            return "Error: no compound names given.".to_string();
        }

        let mut cids = Vec::new();
        for identifier in &identifiers {
            cids.extend(self.fetch_cids(identifier).await);
        }
        if cids.is_empty() {
            warn!(input, "No compounds found, trying autocomplete");
            for identifier in &identifiers {
                cids.extend(self.fetch_cids_by_autocomplete(identifier).await);
            }
        }

        // Dedupe by CID, preserving lookup order.
        let mut seen = HashSet::new();
        cids.retain(|cid| seen.insert(*cid));

        if cids.is_empty() {
            return format!("No compounds found for: {input}");
        }
        info!(input, count = cids.len(), "Found compounds");

        let mut records = Vec::new();
        for cid in cids {
            match self.describe_compound(cid).await {
                Ok(record) => records.push(record),
                Err(e) => return format!("Error: {e}"),
            }
        }
        serde_json::to_string(&records).unwrap_or_else(|e| format!("Error: {e}"))
    }
}

impl Default for PubChemTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for PubChemTool {
    fn name(&self) -> &str {
        "pubchem"
    }

    fn description(&self) -> &str {
        "Search the PubChem database for chemical compounds. \
         Input is a comma-separated list of compound names, CIDs, or SMILES strings \
         (e.g. 'benzol' or 'C6H12O6,aspirin'). Returns compound records with SMILES, \
         molecular formula, molecular weight, synonyms, and a description."
    }

    fn invoke(&self, input: &str) -> BoxFuture<'_, String> {
        let input = input.to_string();
        Box::pin(async move { self.lookup(&input).await })
    }

    fn timeout_secs(&self) -> u64 {
        120
    }
}
