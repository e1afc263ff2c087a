//! Report rows and their chat rendering for the inbound auto-reply.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One row of the report query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub group: String,
    pub name: String,
    pub complaints: Vec<String>,
    pub class: Option<String>,
}

/// Entries grouped by `group`, in the order each group was first seen.
pub type GroupedReport = Vec<(String, Vec<ReportEntry>)>;

/// Group entries by their group key, preserving first-seen order.
pub fn group_entries(entries: Vec<ReportEntry>) -> GroupedReport {
    let mut grouped: GroupedReport = Vec::new();
    for entry in entries {
        match grouped.iter_mut().find(|(g, _)| *g == entry.group) {
            Some((_, rows)) => rows.push(entry),
            None => grouped.push((entry.group.clone(), vec![entry])),
        }
    }
    grouped
}

/// Labels used when rendering a report.
#[derive(Debug, Clone)]
pub struct ReportLabels {
    pub group: String,
    pub no_class: String,
}

/// Render a grouped report as a WhatsApp message.
///
/// ```text
/// *Asrama: A1*
/// 1. Budi, Demam, Pusing, 7A
/// 2. Sari, Batuk, Tidak Sekolah
///
/// ```
pub fn format_report(report: &GroupedReport, labels: &ReportLabels) -> String {
    let mut out = String::new();
    for (group, rows) in report {
        let _ = writeln!(out, "*{}: {}*", labels.group, group);
        for (i, row) in rows.iter().enumerate() {
            let class = row
                .class
                .as_deref()
                .filter(|c| !c.is_empty())
                .unwrap_or(&labels.no_class);
            let _ = writeln!(
                out,
                "{}. {}, {}, {}",
                i + 1,
                row.name,
                row.complaints.join(", "),
                class
            );
        }
        out.push('\n');
    }
    out
}
