//! Maps raw GraphQL job nodes onto [`JobSummary`] records.
//!
//! The feed is loose about which fields it sends, so every lookup tolerates a
//! missing or null value. Inputs that already use the canonical field names
//! (`employerName`, `minCents`, ...) are accepted too, which makes normalizing
//! a normalized record a no-op.

use crate::results::{
    DEFAULT_EMPLOYER, DEFAULT_TITLE, DocumentType, JobSummary, Location, SalaryRange,
};
use serde_json::Value;

/// Normalize one job node. Returns `None` only when the node has no usable id.
pub fn normalize_job(node: &Value) -> Option<JobSummary> {
    // Feed edges wrap the posting as `node.job`
    let job = match node.get("job") {
        Some(inner) if inner.is_object() => inner,
        _ => node,
    };

    let Some(id) = text(job, "id") else {
        ::log::warn!("Skipping job node without an id");
        return None;
    };

    let employer = job.get("employer");

    Some(JobSummary {
        id,
        title: text(job, "title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        employer_name: employer
            .and_then(|e| text(e, "name"))
            .or_else(|| text(job, "employerName"))
            .unwrap_or_else(|| DEFAULT_EMPLOYER.to_string()),
        description: job
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        remote: flag(job, "remote"),
        on_site: flag(job, "onSite"),
        hybrid: flag(job, "hybrid"),
        locations: locations(job),
        salary_range: job.get("salaryRange").and_then(salary_range),
        employer_id: employer
            .and_then(|e| text(e, "id"))
            .or_else(|| text(job, "employerId")),
        job_type: name_or_text(job, "jobType"),
        employment_type: name_or_text(job, "employmentType"),
        duration: text(job, "duration"),
        work_location_type: text(job, "workLocationType"),
        apply_start: text(job, "applyStart"),
        additional_benefits_link: text(job, "additionalBenefitsLink"),
    })
}

/// Normalize the node of one feed edge
pub fn normalize_edge(edge: &Value) -> Option<JobSummary> {
    normalize_job(edge.get("node")?)
}

/// Extract the job id and required documents from a job-detail payload (`data.job`).
///
/// The document list is `None` when the payload does not mention it.
pub fn normalize_detail(job: &Value) -> Option<(String, Option<Vec<DocumentType>>)> {
    let id = text(job, "id")?;
    let documents = job
        .get("requiredDocumentTypes")
        .and_then(Value::as_array)
        .map(|docs| {
            docs.iter()
                .map(|doc| DocumentType {
                    id: text(doc, "id"),
                    name: text(doc, "name"),
                    behavior_identifier: text(doc, "behaviorIdentifier"),
                })
                .collect()
        });
    Some((id, documents))
}

/// Non-empty string (or number rendered as a string) at `key`
fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Either `{ "name": ... }` or a plain string
fn name_or_text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        inner @ Value::Object(_) => text(inner, "name"),
        _ => text(value, key),
    }
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn locations(job: &Value) -> Vec<Location> {
    job.get("locations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|loc| Location {
                    city: text(loc, "city"),
                    state: text(loc, "state"),
                    country: text(loc, "country"),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn salary_range(value: &Value) -> Option<SalaryRange> {
    if !value.is_object() {
        return None;
    }
    let label = value
        .get("paySchedule")
        .and_then(|schedule| text(schedule, "friendlyName"))
        .or_else(|| text(value, "payScheduleLabel"));

    Some(SalaryRange {
        min_cents: cents(value, "min").or_else(|| cents(value, "minCents")),
        max_cents: cents(value, "max").or_else(|| cents(value, "maxCents")),
        currency: text(value, "currency"),
        pay_schedule_label: label,
    })
}

fn cents(value: &Value, key: &str) -> Option<i64> {
    let raw = value.get(key)?;
    raw.as_i64().or_else(|| raw.as_f64().map(|f| f.round() as i64))
}
