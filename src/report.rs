//! Human-readable rendering of jobs and their required documents.

use crate::results::{DocumentType, JobSummary};
use std::fmt::Write;

fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("N/A")
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

pub fn format_job(job: &JobSummary) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "====== JOB INFO ======");
    let _ = writeln!(out, "Job ID: {}", job.id);
    let _ = writeln!(out, "Title: {}", job.title);
    let _ = writeln!(out, "Job Type: {}", or_na(job.job_type.as_deref()));
    let _ = writeln!(out, "Employment Type: {}", or_na(job.employment_type.as_deref()));
    let _ = writeln!(out, "Duration: {}", or_na(job.duration.as_deref()));
    let _ = writeln!(out, "Remote: {}", yes_no(job.remote));
    let _ = writeln!(out, "On-site: {}", yes_no(job.on_site));
    let _ = writeln!(out, "Hybrid: {}", yes_no(job.hybrid));
    let _ = writeln!(out, "Work Location Type: {}", or_na(job.work_location_type.as_deref()));
    let _ = writeln!(out, "Apply Start: {}", or_na(job.apply_start.as_deref()));
    let _ = writeln!(out, "Employer: {}", job.employer_name);
    let _ = writeln!(out, "Employer ID: {}", or_na(job.employer_id.as_deref()));

    if !job.locations.is_empty() {
        let _ = writeln!(out, "Locations:");
        for (i, location) in job.locations.iter().enumerate() {
            let _ = writeln!(out, "  [{}] {}", i + 1, location);
        }
    }
    if let Some(salary) = &job.salary_range {
        let _ = writeln!(out, "Salary Range: {}", salary.display());
    }

    let _ = writeln!(
        out,
        "Additional Benefits: {}",
        or_na(job.additional_benefits_link.as_deref())
    );
    out.push_str("=================================");
    out
}

/// `None` means the detail payload was never seen, which is not the same as "none required"
pub fn format_documents(documents: Option<&[DocumentType]>) -> String {
    let Some(documents) = documents else {
        return "Required Documents: unknown".to_string();
    };
    if documents.is_empty() {
        return "Required Documents: None".to_string();
    }

    let mut out = String::from("Required Documents:");
    for doc in documents {
        let _ = write!(
            out,
            "\n  • {} (id: {}, behavior: {})",
            doc.name.as_deref().unwrap_or("Unknown"),
            doc.id.as_deref().unwrap_or("Unknown"),
            doc.behavior_identifier.as_deref().unwrap_or("Unknown")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{Location, SalaryRange};

    #[test]
    fn test_format_job() {
        let mut job = JobSummary::from_id("42");
        job.title = "Data Intern".to_string();
        job.employer_name = "Acme".to_string();
        job.remote = true;
        job.locations = vec![Location {
            city: Some("Austin".to_string()),
            state: Some("TX".to_string()),
            country: None,
        }];
        job.salary_range = Some(SalaryRange {
            min_cents: Some(2_500_00),
            max_cents: Some(3_000_00),
            currency: Some("USD".to_string()),
            pay_schedule_label: Some("Hourly".to_string()),
        });

        let text = format_job(&job);
        assert!(text.contains("Job ID: 42\n"));
        assert!(text.contains("Remote: yes\n"));
        assert!(text.contains("Job Type: N/A\n"));
        assert!(text.contains("  [1] Austin, TX\n"));
        assert!(text.contains("Salary Range: 2500.00 - 3000.00 USD (Hourly)\n"));
        assert!(text.ends_with("================================="));
    }

    #[test]
    fn test_format_documents() {
        assert_eq!(format_documents(None), "Required Documents: unknown");
        assert_eq!(format_documents(Some(&[])), "Required Documents: None");

        let docs = vec![DocumentType {
            id: Some("3".to_string()),
            name: Some("Resume".to_string()),
            behavior_identifier: None,
        }];
        assert_eq!(
            format_documents(Some(&docs)),
            "Required Documents:\n  • Resume (id: 3, behavior: Unknown)"
        );
    }
}
