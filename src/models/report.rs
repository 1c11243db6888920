use serde::Serialize;

/// A rendered report, ready to print or publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub title: String,
    pub content: String,
    pub submolt: String,
    /// Context lookups that failed and were left out of `content`.
    #[serde(skip)]
    pub failed_lookups: usize,
}

/// Body of `POST /posts`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Publication {
    pub submolt: String,
    pub title: String,
    pub content: String,
}

impl Report {
    pub fn to_publication(&self, submolt: Option<&str>) -> Publication {
        Publication {
            submolt: submolt.unwrap_or(&self.submolt).to_string(),
            title: self.title.clone(),
            content: self.content.clone(),
        }
    }
}
