use serde::{Deserialize, Serialize};

/// Title used when a posting does not carry one
pub const DEFAULT_TITLE: &str = "Software Engineer";

/// Employer name used when a posting does not carry one
pub const DEFAULT_EMPLOYER: &str = "Company";

/// One job posting in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    /// Stable posting id, unique across feed pages
    pub id: String,

    pub title: String,

    pub employer_name: String,

    /// Raw description (HTML or plain text); empty when the feed had none
    pub description: String,

    pub remote: bool,

    pub on_site: bool,

    pub hybrid: bool,

    pub locations: Vec<Location>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_range: Option<SalaryRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employer_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_location_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_benefits_link: Option<String>,
}

impl JobSummary {
    /// Create a summary that only knows its id, with placeholder title and employer
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: DEFAULT_TITLE.to_string(),
            employer_name: DEFAULT_EMPLOYER.to_string(),
            description: String::new(),
            remote: false,
            on_site: false,
            hybrid: false,
            locations: Vec::new(),
            salary_range: None,
            employer_id: None,
            job_type: None,
            employment_type: None,
            duration: None,
            work_location_type: None,
            apply_start: None,
            additional_benefits_link: None,
        }
    }

    /// A posting without a description cannot get a tailored resume
    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Salary range in minor currency units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryRange {
    pub min_cents: Option<i64>,
    pub max_cents: Option<i64>,
    pub currency: Option<String>,
    pub pay_schedule_label: Option<String>,
}

impl SalaryRange {
    /// Human-readable range; this is the only place cents become whole units
    pub fn display(&self) -> String {
        let amount = |cents: Option<i64>| match cents {
            Some(cents) => format!("{:.2}", cents as f64 / 100.0),
            None => "?".to_string(),
        };
        let mut out = format!("{} - {}", amount(self.min_cents), amount(self.max_cents));
        if let Some(currency) = &self.currency {
            out.push(' ');
            out.push_str(currency);
        }
        if let Some(label) = &self.pay_schedule_label {
            out.push_str(&format!(" ({label})"));
        }
        out
    }
}

/// A document the employer asks for when applying
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentType {
    pub id: Option<String>,
    pub name: Option<String>,
    pub behavior_identifier: Option<String>,
}

/// A posting joined with its detail payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,

    /// `None` means the detail payload was never seen, not that nothing is required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_document_types: Option<Vec<DocumentType>>,
}
