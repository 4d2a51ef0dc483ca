//! Analyst report kinds and the per-run report bundle

use crate::slot::Slot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tradeflow_core::Role;

/// The six analyst reports gathered for every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Bullish,
    Bearish,
    Technical,
    Sentiment,
    News,
    Fundamentals,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        Self::Bullish,
        Self::Bearish,
        Self::Technical,
        Self::Sentiment,
        Self::News,
        Self::Fundamentals,
    ];

    /// Analyst role producing this report
    pub fn role(self) -> Role {
        match self {
            Self::Bullish => Role::BullishAnalyst,
            Self::Bearish => Role::BearishAnalyst,
            Self::Technical => Role::TechnicalAnalyst,
            Self::Sentiment => Role::SentimentAnalyst,
            Self::News => Role::NewsAnalyst,
            Self::Fundamentals => Role::FundamentalsAnalyst,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Technical => "technical",
            Self::Sentiment => "sentiment",
            Self::News => "news",
            Self::Fundamentals => "fundamentals",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyed analyst reports for one run
///
/// Always holds exactly one slot per [`ReportKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalystReportBundle {
    reports: BTreeMap<ReportKind, Slot>,
}

impl AnalystReportBundle {
    /// Build a bundle, marking every kind without a slot as failed
    pub fn from_slots(slots: impl IntoIterator<Item = (ReportKind, Slot)>) -> Self {
        let mut reports: BTreeMap<ReportKind, Slot> = slots.into_iter().collect();
        for kind in ReportKind::ALL {
            reports
                .entry(kind)
                .or_insert_with(|| Slot::failed("report was never produced"));
        }
        Self { reports }
    }

    pub fn get(&self, kind: ReportKind) -> &Slot {
        // Every kind is inserted by `from_slots`.
        &self.reports[&kind]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReportKind, &Slot)> {
        self.reports.iter().map(|(kind, slot)| (*kind, slot))
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Number of reports that were actually produced
    pub fn filled_count(&self) -> usize {
        self.reports.values().filter(|slot| slot.is_filled()).count()
    }

    /// Subset of reports, in the order given, ready for prompt rendering
    pub fn select(&self, kinds: &[ReportKind]) -> Vec<(ReportKind, Slot)> {
        kinds
            .iter()
            .map(|kind| (*kind, self.get(*kind).clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_is_exhaustive() {
        let bundle = AnalystReportBundle::from_slots([
            (ReportKind::News, Slot::Filled("headlines".to_string())),
            (ReportKind::Technical, Slot::failed("timeout")),
        ]);

        assert_eq!(bundle.len(), 6);
        assert_eq!(bundle.filled_count(), 1);
        assert_eq!(bundle.get(ReportKind::News).text(), Some("headlines"));
        assert_eq!(bundle.get(ReportKind::Technical).failure(), Some("timeout"));
        assert!(!bundle.get(ReportKind::Fundamentals).is_filled());
    }

    #[test]
    fn test_roles_are_distinct() {
        let mut roles: Vec<Role> = ReportKind::ALL.iter().map(|k| k.role()).collect();
        roles.sort();
        roles.dedup();
        assert_eq!(roles.len(), 6);
    }

    #[test]
    fn test_select_keeps_order() {
        let bundle = AnalystReportBundle::from_slots(
            ReportKind::ALL.map(|k| (k, Slot::Filled(k.to_string()))),
        );
        let picked = bundle.select(&[ReportKind::News, ReportKind::Sentiment]);
        assert_eq!(picked[0].0, ReportKind::News);
        assert_eq!(picked[1].1.text(), Some("sentiment"));
    }
}
