use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::Write;

/// One observed directed association: `from` interacted with `to` in the
/// given context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interaction {
    pub from: String,
    pub to: String,
    pub context: String,
}

impl Interaction {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            context: context.into(),
        }
    }
}

// Report order is (context, from, to).
impl Ord for Interaction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.context
            .cmp(&other.context)
            .then_with(|| self.from.cmp(&other.from))
            .then_with(|| self.to.cmp(&other.to))
    }
}

impl PartialOrd for Interaction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Statistics about one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Lines read from the source
    pub lines: usize,

    /// Edges inserted (into both indices)
    pub inserted: usize,

    /// Lines with fewer than three tokens, skipped
    pub malformed: usize,

    /// Lines rejected because a field exceeded the store's byte limit
    pub oversized: usize,
}

/// Result of a crawl: the confirmed bad entities and every interaction
/// that justifies them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlOutcome {
    /// Bad entities, lexicographically ascending
    pub bad_entities: Vec<String>,

    /// Supporting interactions, ascending by (context, from, to)
    pub interactions: Vec<Interaction>,
}

impl CrawlOutcome {
    /// Number of bad entities discovered.
    pub fn found(&self) -> usize {
        self.bad_entities.len()
    }

    /// Write the outcome as a pretty-printed JSON report.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interactions_sort_by_context_then_from_then_to() {
        let mut set = vec![
            Interaction::new("b", "a", "comp2"),
            Interaction::new("z", "z", "comp1"),
            Interaction::new("a", "z", "comp2"),
            Interaction::new("a", "b", "comp2"),
        ];
        set.sort();
        assert_eq!(
            set,
            vec![
                Interaction::new("z", "z", "comp1"),
                Interaction::new("a", "b", "comp2"),
                Interaction::new("a", "z", "comp2"),
                Interaction::new("b", "a", "comp2"),
            ]
        );
    }

    #[test]
    fn outcome_serializes_to_json() {
        let outcome = CrawlOutcome {
            bad_entities: vec!["a.exe".into()],
            interactions: vec![Interaction::new("a.exe", "b.exe", "comp1")],
        };

        let mut buf = Vec::new();
        outcome.write_json(&mut buf).expect("write json");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("\"bad_entities\""));
        assert!(text.contains("a.exe"));
    }
}
