//! Derived review views: counts, progress and the filtered clause table

use serde::Serialize;
use shared_types::{Clause, ClauseKey, ClauseStatus, RiskAssessment, RiskLevel};

/// Table filter; both conditions must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ReviewFilter {
    /// Case-insensitive substring over clause name and text
    pub search: Option<String>,
    pub status: Option<ClauseStatus>,
}

impl ReviewFilter {
    fn matches(&self, clause: &Clause) -> bool {
        if let Some(status) = self.status {
            if clause.status != status {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                clause.name.to_lowercase().contains(&needle)
                    || clause.text.to_lowercase().contains(&needle)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub approved: usize,
    pub pending: usize,
    pub rejected: usize,
    pub need_review: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn tally<'a>(clauses: impl IntoIterator<Item = &'a Clause>) -> Self {
        let mut counts = Self::default();
        for clause in clauses {
            counts.total += 1;
            match clause.status {
                ClauseStatus::Approved => counts.approved += 1,
                ClauseStatus::Pending => counts.pending += 1,
                ClauseStatus::Rejected => counts.rejected += 1,
                ClauseStatus::NeedReview => counts.need_review += 1,
            }
        }
        counts
    }

    /// Share of decided clauses, 0 for an empty document
    pub fn completion_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.approved + self.rejected) as f64 / self.total as f64 * 100.0
    }
}

/// Badge text for a risk value; blank when unknown
pub fn risk_label(risk: Option<&RiskAssessment>) -> String {
    match risk {
        None => String::new(),
        Some(RiskAssessment {
            level,
            score: Some(score),
            ..
        }) => format!("{} ({}/10)", level, score),
        Some(r) => r.level.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClauseRow {
    pub key: ClauseKey,
    pub name: String,
    pub category: Option<String>,
    pub status: ClauseStatus,
    pub risk_level: Option<RiskLevel>,
    pub risk_label: String,
    pub text: String,
    pub suggestion: Option<String>,
    pub confidence: Option<f64>,
    pub comment_count: usize,
    /// A change to this clause is awaiting the server
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    /// Counts over the whole document, independent of the filter
    pub counts: StatusCounts,
    pub completion_percent: f64,
    pub rows: Vec<ClauseRow>,
}

/// Build the view of an already merged clause list
pub fn project(
    clauses: &[Clause],
    filter: &ReviewFilter,
    is_pending: impl Fn(&ClauseKey) -> bool,
) -> Projection {
    let counts = StatusCounts::tally(clauses);
    let rows = clauses
        .iter()
        .filter(|c| filter.matches(c))
        .map(|c| ClauseRow {
            key: c.key.clone(),
            name: c.name.clone(),
            category: c.category.clone(),
            status: c.status,
            risk_level: c.risk.as_ref().map(|r| r.level),
            risk_label: risk_label(c.risk.as_ref()),
            text: c.text.clone(),
            suggestion: c.suggestion.clone(),
            confidence: c.confidence,
            comment_count: c.comments.len(),
            pending: is_pending(&c.key),
        })
        .collect();

    Projection {
        counts,
        completion_percent: counts.completion_percent(),
        rows,
    }
}

/// Last projection, reused while its inputs are unchanged
#[derive(Debug, Default)]
pub struct ProjectionCache {
    entry: Option<(CacheKey, Projection)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    document_revision: u64,
    overlay_generation: u64,
    filter: ReviewFilter,
}

impl ProjectionCache {
    pub fn get_or_compute(
        &mut self,
        document_revision: u64,
        overlay_generation: u64,
        filter: &ReviewFilter,
        compute: impl FnOnce() -> Projection,
    ) -> Projection {
        let key = CacheKey {
            document_revision,
            overlay_generation,
            filter: filter.clone(),
        };
        match &self.entry {
            Some((cached, projection)) if *cached == key => projection.clone(),
            _ => {
                let projection = compute();
                self.entry = Some((key, projection.clone()));
                projection
            }
        }
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
