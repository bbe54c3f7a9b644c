//! Render a downloaded document as Markdown

use review_core::normalize;
use review_core::projection::risk_label;
use serde_json::Value;
use shared_types::{Clause, TemplateData};
use std::collections::BTreeMap;
use std::fmt::Write;

const UNCATEGORIZED: &str = "General";

/// `monthly_rent` -> `Monthly Rent`
fn field_label(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "Yes" } else { "No" }.to_string()),
        _ => None,
    }
}

/// Clauses of an export payload, whichever shape they arrived in
pub fn export_clauses(data: &TemplateData) -> Vec<Clause> {
    let clauses = data.clauses.as_ref();
    // Export payloads sometimes wrap the generated map as `{ data: {...} }`
    match clauses.and_then(|c| c.get("data")) {
        Some(generated) => normalize(None, Some(generated)),
        None => normalize(clauses, None),
    }
}

pub fn render_markdown(data: &TemplateData) -> String {
    let mut out = String::new();
    let title = if data.title.trim().is_empty() {
        "Letter of Intent"
    } else {
        data.title.trim()
    };
    let _ = writeln!(out, "# {}\n", title);

    let terms: Vec<(String, String)> = data
        .fields
        .iter()
        .filter(|(k, _)| !k.starts_with('_') && k.as_str() != "template_data")
        .filter_map(|(k, v)| scalar(v).map(|v| (field_label(k), v)))
        .collect();
    if !terms.is_empty() {
        let _ = writeln!(out, "## Terms\n");
        for (label, value) in terms {
            let _ = writeln!(out, "- **{}:** {}", label, value);
        }
        out.push('\n');
    }

    let clauses = export_clauses(data);
    if clauses.is_empty() {
        return out;
    }

    let mut groups: BTreeMap<&str, Vec<&Clause>> = BTreeMap::new();
    for clause in &clauses {
        // Array payloads may carry derived keys without a category
        let category = clause
            .category
            .as_deref()
            .or_else(|| clause.key.split_derived().map(|(category, _)| category))
            .unwrap_or(UNCATEGORIZED);
        groups.entry(category).or_default().push(clause);
    }

    let _ = writeln!(out, "## Clauses\n");
    for (category, clauses) in groups {
        let _ = writeln!(out, "### {}\n", category);
        for clause in clauses {
            let _ = writeln!(out, "#### {}\n", clause.name);
            let _ = writeln!(out, "_Status: {}_", clause.status);
            let risk = risk_label(clause.risk.as_ref());
            if !risk.is_empty() {
                let _ = writeln!(out, "_Risk: {}_", risk);
            }
            out.push('\n');
            let _ = writeln!(out, "{}\n", clause.text.trim());
            for comment in &clause.comments {
                match &comment.author {
                    Some(author) => {
                        let _ = writeln!(out, "> {}: {}", author, comment.text);
                    }
                    None => {
                        let _ = writeln!(out, "> {}", comment.text);
                    }
                }
            }
            if !clause.comments.is_empty() {
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> TemplateData {
        TemplateData {
            document_id: "loi-1".into(),
            title: "Suite 200 LOI".into(),
            fields: [
                ("monthly_rent".to_string(), json!(4500)),
                ("tenant_name".to_string(), json!("Blue Cafe LLC")),
                ("nested".to_string(), json!({"ignored": true})),
            ]
            .into_iter()
            .collect(),
            clauses: Some(json!({
                "data": {
                    "Rent": { "0": "Base rent is $4,500" },
                    "Use": { "0": "Restaurant use" }
                }
            })),
        }
    }

    #[test]
    fn test_field_labels() {
        assert_eq!(field_label("monthly_rent"), "Monthly Rent");
        assert_eq!(field_label("lease-term"), "Lease Term");
    }

    #[test]
    fn test_markdown_has_terms_and_grouped_clauses() {
        let md = render_markdown(&data());
        assert!(md.starts_with("# Suite 200 LOI\n"));
        assert!(md.contains("- **Monthly Rent:** 4500"));
        assert!(md.contains("- **Tenant Name:** Blue Cafe LLC"));
        assert!(!md.contains("ignored"));

        let rent = md.find("### Rent").unwrap();
        let usage = md.find("### Use").unwrap();
        assert!(rent < usage);
        assert!(md.contains("#### Rent #0"));
        assert!(md.contains("_Status: pending_"));
    }

    #[test]
    fn test_uncategorized_clauses_grouped_by_derived_key() {
        let mut d = data();
        d.clauses = Some(json!([
            {"key": "Parking::0", "name": "Parking", "text": "Four reserved spaces"},
            {"key": "signage", "name": "Signage", "text": "Facade sign allowed"}
        ]));
        let md = render_markdown(&d);
        let parking = md.find("### Parking").unwrap();
        let general = md.find("### General").unwrap();
        assert!(general < parking);
        assert!(md[parking..].contains("Four reserved spaces"));
        assert!(md[general..parking].contains("Facade sign allowed"));
    }

    #[test]
    fn test_no_clauses_section_when_empty() {
        let mut d = data();
        d.clauses = None;
        assert!(!render_markdown(&d).contains("## Clauses"));
    }
}
