//! Expansion of disease queries through the Experimental Factor Ontology.

use std::{sync::OnceLock, time::Duration};

use indexmap::IndexSet;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::err::AdapterError;

use super::OntologySource;

/// Page size for descendant queries.
const PAGE_SIZE: usize = 100;

fn efo_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"EFO_\d+").expect("invalid regex in source code"))
}

mod wire {
    use serde::Deserialize;
    use serde_with::{serde_as, DisplayFromStr, PickFirst};

    #[derive(Deserialize, Debug, Clone)]
    pub struct Notable {
        pub name: String,
    }

    #[serde_as]
    #[derive(Deserialize, Debug, Clone)]
    pub struct ZoomaHit {
        pub notable: Notable,
        #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
        pub score: f64,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct ZoomaResponse {
        #[serde(default)]
        pub result: Vec<ZoomaHit>,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct Term {
        pub short_form: String,
    }

    #[derive(Deserialize, Debug, Clone, Default)]
    pub struct Embedded {
        #[serde(default)]
        pub terms: Vec<Term>,
    }

    #[derive(Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct Page {
        pub total_pages: usize,
        pub number: usize,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct TermsPage {
        #[serde(rename = "_embedded", default)]
        pub embedded: Embedded,
        pub page: Page,
    }
}

/// The EFO id of the highest-scoring hit naming one; the first one on ties.
fn best_zooma_hit(response: &wire::ZoomaResponse) -> Option<String> {
    response
        .result
        .iter()
        .filter_map(|hit| {
            efo_regex()
                .find(&hit.notable.name)
                .map(|m| (hit.score, m.as_str()))
        })
        .fold(None, |best: Option<(f64, &str)>, (score, efo)| match best {
            Some((best_score, _)) if best_score >= score => best,
            _ => Some((score, efo)),
        })
        .map(|(_, efo)| efo.to_string())
}

/// Client for the Zooma and OLS services of the EBI.
pub struct EbiOntologyClient {
    client: reqwest::blocking::Client,
    zooma_server: String,
    ols_server: String,
}

impl EbiOntologyClient {
    pub fn new(
        zooma_server: &str,
        ols_server: &str,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?,
            zooma_server: zooma_server.trim_end_matches('/').to_string(),
            ols_server: ols_server.trim_end_matches('/').to_string(),
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, AdapterError> {
        tracing::trace!("GET {}", url);
        Ok(self
            .client
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?
            .error_for_status()?
            .json()?)
    }

    /// URL of the descendants of `efo`; OLS expects the term IRI URL-encoded twice.
    fn descendants_url(&self, efo: &str) -> String {
        format!(
            "{}/api/ontologies/efo/terms/http%253A%252F%252Fwww.ebi.ac.uk%252Fefo%252F{}/descendants",
            &self.ols_server, efo
        )
    }
}

impl OntologySource for EbiOntologyClient {
    fn suggest_efo(&self, term: &str) -> Result<Option<String>, AdapterError> {
        let response: wire::ZoomaResponse = self.get_json(
            &format!("{}/summaries/search", &self.zooma_server),
            &[("query", term.to_string())],
        )?;
        Ok(best_zooma_hit(&response))
    }

    fn efo_children(&self, efo: &str) -> Result<Vec<String>, AdapterError> {
        let url = self.descendants_url(efo);
        let mut result = Vec::new();
        let mut page_no = 0;
        loop {
            let page: wire::TermsPage = self.get_json(
                &url,
                &[("page", page_no.to_string()), ("size", PAGE_SIZE.to_string())],
            )?;
            result.extend(page.embedded.terms.into_iter().map(|term| term.short_form));
            if page.page.number + 1 >= page.page.total_pages {
                break;
            }
            page_no = page.page.number + 1;
        }
        Ok(result)
    }
}

/// Expand the query to EFO ids.
///
/// Diseases are mapped to their suggested EFO id; every EFO id is followed by
/// its descendants.  The result is free of duplicates and keeps the order of
/// discovery.  Failing lookups are logged and skipped.
pub fn expand_efos(diseases: &[String], efos: &[String], ontology: &dyn OntologySource) -> Vec<String> {
    let mut seeds = IndexSet::new();
    for disease in diseases {
        match ontology.suggest_efo(disease) {
            Ok(Some(efo)) => {
                tracing::debug!("suggested {} for {}", &efo, disease);
                seeds.insert(efo);
            }
            Ok(None) => tracing::debug!("no EFO suggestion for {}", disease),
            Err(e) => tracing::warn!("EFO suggestion for {} failed: {}", disease, e),
        }
    }
    seeds.extend(efos.iter().cloned());

    let mut result = IndexSet::new();
    for efo in seeds {
        let children = match ontology.efo_children(&efo) {
            Ok(children) => children,
            Err(e) => {
                tracing::warn!("could not fetch descendants of {}: {}", &efo, e);
                Vec::new()
            }
        };
        result.insert(efo);
        result.extend(children);
    }
    result.into_iter().collect()
}
