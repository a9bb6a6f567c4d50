use reqwest::Url;

/// Where the search screen wants the user to go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Login,
    JobDetails(String),
}

/// Parameters read from the search screen's own query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitialQuery {
    pub vector_search: bool,
}

impl InitialQuery {
    pub fn resume_match() -> Self {
        Self { vector_search: true }
    }

    /// Accepts `vectorSearch=true`, `?vectorSearch=true&x=y`, or an empty string.
    /// Unknown keys and malformed input fall back to keyword search.
    pub fn parse(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        if query.is_empty() {
            return Self::default();
        }
        let Ok(url) = Url::parse(&format!("jobassist://jobs?{}", query)) else {
            return Self::default();
        };
        let vector_search = url
            .query_pairs()
            .filter(|(key, _)| key == "vectorSearch")
            .last()
            .is_some_and(|(_, value)| value.eq_ignore_ascii_case("true"));
        Self { vector_search }
    }
}
