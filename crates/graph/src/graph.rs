use crate::error::Result;
use crate::types::{CrawlOutcome, IngestStats, Interaction};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracegraph_store::{PersistentMultiMap, StoreError};

const FORWARD_SUFFIX: &str = ".forward";
const REVERSE_SUFFIX: &str = ".reverse";

// Two buckets per expected edge keeps chains short in both indices.
const BUCKETS_PER_ITEM: u64 = 2;

/// Bidirectional association graph over two mirrored persistent multimaps.
///
/// Every edge (from, to, context) is stored twice: keyed by `from` in the
/// forward index and keyed by `to` in the reverse index. All mutating
/// operations keep the two indices in lockstep.
#[derive(Debug)]
pub struct AssociationGraph {
    forward: PersistentMultiMap,
    reverse: PersistentMultiMap,
}

impl AssociationGraph {
    /// Create a fresh pair of indices under `prefix`, sized for roughly
    /// `max_items` edges. If the reverse index cannot be created after the
    /// forward one succeeded, the forward index is closed before the error
    /// is returned.
    pub fn create_new(prefix: &str, max_items: u64) -> Result<Self> {
        let mut forward = PersistentMultiMap::create_new(
            format!("{prefix}{FORWARD_SUFFIX}"),
            max_items * BUCKETS_PER_ITEM,
        )?;
        let reverse = match PersistentMultiMap::create_new(
            format!("{prefix}{REVERSE_SUFFIX}"),
            max_items * BUCKETS_PER_ITEM,
        ) {
            Ok(reverse) => reverse,
            Err(e) => {
                if let Err(close_err) = forward.close() {
                    log::warn!("failed to close forward index during unwind: {close_err}");
                }
                return Err(e.into());
            }
        };
        Ok(Self { forward, reverse })
    }

    /// Open an existing pair of indices under `prefix`, with the same
    /// unwind rule as [`AssociationGraph::create_new`].
    pub fn open_existing(prefix: &str) -> Result<Self> {
        let mut forward =
            PersistentMultiMap::open_existing(format!("{prefix}{FORWARD_SUFFIX}"))?;
        let reverse = match PersistentMultiMap::open_existing(format!("{prefix}{REVERSE_SUFFIX}"))
        {
            Ok(reverse) => reverse,
            Err(e) => {
                if let Err(close_err) = forward.close() {
                    log::warn!("failed to close forward index during unwind: {close_err}");
                }
                return Err(e.into());
            }
        };
        Ok(Self { forward, reverse })
    }

    /// Close both indices. The reverse index is closed even if closing the
    /// forward one fails.
    pub fn close(&mut self) -> Result<()> {
        let forward = self.forward.close();
        let reverse = self.reverse.close();
        forward?;
        reverse?;
        Ok(())
    }

    /// Insert one edge into both indices.
    pub fn insert(&mut self, from: &str, to: &str, context: &str) -> Result<()> {
        self.forward.insert(from, to, context)?;
        self.reverse.insert(to, from, context)?;
        Ok(())
    }

    /// Ingest newline-delimited telemetry, one `<context> <key> <value>`
    /// record per line. Malformed and oversized lines are warned about and
    /// skipped; ingestion always continues with the next line.
    pub fn ingest<R: BufRead>(&mut self, reader: R) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        for line in reader.lines() {
            let line = line?;
            stats.lines += 1;

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 {
                log::warn!("skipping badly formatted line: {line:?}");
                stats.malformed += 1;
                continue;
            }
            if tokens.len() > 3 {
                log::warn!("ignoring extra tokens in line: {line:?}");
            }
            let (context, key, value) = (tokens[0], tokens[1], tokens[2]);

            // Validation happens on the forward insert; the mirror uses the
            // same three fields, so it cannot fail validation afterwards.
            match self.forward.insert(key, value, context) {
                Ok(()) => {}
                Err(StoreError::FieldTooLong { field, len, limit }) => {
                    log::warn!(
                        "skipping line with oversized {field} ({len} > {limit} bytes): {line:?}"
                    );
                    stats.oversized += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            self.reverse.insert(value, key, context)?;
            stats.inserted += 1;
        }

        log::info!(
            "ingested {} edge(s) from {} line(s) ({} malformed, {} oversized)",
            stats.inserted,
            stats.lines,
            stats.malformed,
            stats.oversized
        );
        Ok(stats)
    }

    /// Ingest a telemetry file from disk.
    pub fn ingest_file(&mut self, path: impl AsRef<Path>) -> Result<IngestStats> {
        let file = File::open(path.as_ref())?;
        self.ingest(BufReader::new(file))
    }

    /// Remove every edge that touches `entity` as a key in either index,
    /// along with each edge's mirror record. Returns whether anything was
    /// removed.
    pub fn purge(&mut self, entity: &str) -> Result<bool> {
        let mut removed = false;

        let outgoing = self.forward.search(entity)?;
        for assoc in outgoing {
            removed = true;
            self.forward
                .erase(&assoc.key, &assoc.value, &assoc.context)?;
            self.reverse
                .erase(&assoc.value, &assoc.key, &assoc.context)?;
        }

        let incoming = self.reverse.search(entity)?;
        for assoc in incoming {
            removed = true;
            self.reverse
                .erase(&assoc.key, &assoc.value, &assoc.context)?;
            self.forward
                .erase(&assoc.value, &assoc.key, &assoc.context)?;
        }

        if removed {
            log::info!("purged all edges touching '{entity}'");
        }
        Ok(removed)
    }

    /// Total number of records keyed by `entity` across both indices.
    pub fn prevalence(&mut self, entity: &str) -> Result<usize> {
        Ok(self.forward.search(entity)?.len() + self.reverse.search(entity)?.len())
    }

    /// Breadth-first propagation from the indicator seeds.
    ///
    /// An entity whose prevalence reaches `min_prevalence_to_be_good` is
    /// memoized as benign shared infrastructure and never expanded. Every
    /// other reachable entity is confirmed bad, and every interaction
    /// touched along the way is collected. A seed indicator with zero
    /// associations is never reported.
    pub fn crawl(
        &mut self,
        indicators: &[String],
        min_prevalence_to_be_good: usize,
    ) -> Result<CrawlOutcome> {
        let mut bad: BTreeSet<String> = BTreeSet::new();
        let mut known_good: HashSet<String> = HashSet::new();
        let mut interactions: BTreeSet<Interaction> = BTreeSet::new();
        let mut frontier: VecDeque<String> = indicators.iter().cloned().collect();

        while let Some(entity) = frontier.pop_front() {
            if known_good.contains(&entity) {
                bad.remove(&entity);
                continue;
            }
            if self.prevalence(&entity)? >= min_prevalence_to_be_good {
                bad.remove(&entity);
                known_good.insert(entity);
                continue;
            }

            let mut found_any = false;

            for assoc in self.forward.search(&entity)? {
                found_any = true;
                interactions.insert(Interaction::new(
                    assoc.key,
                    assoc.value.clone(),
                    assoc.context,
                ));
                if !bad.contains(&assoc.value) {
                    bad.insert(assoc.value.clone());
                    frontier.push_back(assoc.value);
                }
            }

            // Same expansion through the reverse index; key and value swap
            // roles so the interaction keeps its true orientation.
            for assoc in self.reverse.search(&entity)? {
                found_any = true;
                interactions.insert(Interaction::new(
                    assoc.value.clone(),
                    assoc.key,
                    assoc.context,
                ));
                if !bad.contains(&assoc.value) {
                    bad.insert(assoc.value.clone());
                    frontier.push_back(assoc.value);
                }
            }

            // Seeds are only confirmed bad once at least one association
            // shows up; entities discovered through expansion are already in
            // the set.
            if found_any {
                bad.insert(entity);
            }
        }

        let outcome = CrawlOutcome {
            bad_entities: bad.into_iter().collect(),
            interactions: interactions.into_iter().collect(),
        };
        log::info!(
            "crawl found {} bad entit(ies) and {} interaction(s)",
            outcome.bad_entities.len(),
            outcome.interactions.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn prefix(temp: &TempDir) -> String {
        temp.path().join("web").to_string_lossy().into_owned()
    }

    #[test]
    fn ingest_counts_and_skips_malformed_lines() {
        let temp = TempDir::new().expect("tempdir");
        let mut graph = AssociationGraph::create_new(&prefix(&temp), 100).expect("create");

        let telemetry = "comp1 a.exe b.exe\n\
                         too-few-tokens\n\
                         comp2 b.exe c.exe extra ignored\n\
                         \n\
                         comp3 a.exe g.exe\n";
        let stats = graph.ingest(Cursor::new(telemetry)).expect("ingest");

        assert_eq!(stats.lines, 5);
        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.oversized, 0);
        assert_eq!(graph.prevalence("a.exe").expect("prevalence"), 2);
        assert_eq!(graph.prevalence("b.exe").expect("prevalence"), 2);
    }

    #[test]
    fn ingest_skips_oversized_fields_without_splitting_the_mirror() {
        let temp = TempDir::new().expect("tempdir");
        let mut graph = AssociationGraph::create_new(&prefix(&temp), 100).expect("create");

        let long = "x".repeat(200);
        let telemetry = format!("comp1 {long} b.exe\ncomp2 b.exe c.exe\n");
        let stats = graph.ingest(Cursor::new(telemetry)).expect("ingest");

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.oversized, 1);
        // Neither index saw any half of the rejected edge.
        assert_eq!(graph.prevalence("b.exe").expect("prevalence"), 1);
        assert_eq!(graph.prevalence(&long).expect("prevalence"), 0);
    }

    #[test]
    fn purge_removes_edges_from_both_indices() {
        let temp = TempDir::new().expect("tempdir");
        let mut graph = AssociationGraph::create_new(&prefix(&temp), 100).expect("create");

        graph.insert("a.exe", "b.exe", "comp1").expect("insert");
        graph.insert("c.exe", "a.exe", "comp2").expect("insert");
        graph.insert("b.exe", "c.exe", "comp3").expect("insert");

        assert!(graph.purge("a.exe").expect("purge"));
        assert_eq!(graph.prevalence("a.exe").expect("prevalence"), 0);
        // The mirrored halves are gone too.
        assert_eq!(graph.prevalence("b.exe").expect("prevalence"), 1);
        assert_eq!(graph.prevalence("c.exe").expect("prevalence"), 2);

        assert!(!graph.purge("a.exe").expect("second purge"));
        assert!(!graph.purge("never-seen").expect("absent purge"));
    }

    #[test]
    fn create_unwinds_the_forward_index_when_the_reverse_fails() {
        let temp = TempDir::new().expect("tempdir");
        let prefix = prefix(&temp);

        // Pre-existing reverse file makes the second create fail after the
        // forward one has succeeded.
        std::fs::write(format!("{prefix}{REVERSE_SUFFIX}"), b"occupied").expect("write");

        assert!(AssociationGraph::create_new(&prefix, 100).is_err());

        // The forward index was closed (header flushed), so it reopens.
        let mut forward =
            PersistentMultiMap::open_existing(format!("{prefix}{FORWARD_SUFFIX}"))
                .expect("reopen forward");
        assert_eq!(forward.num_buckets(), 200);
        forward.close().expect("close");
    }

    #[test]
    fn open_existing_requires_both_indices() {
        let temp = TempDir::new().expect("tempdir");
        let prefix = prefix(&temp);

        let mut graph = AssociationGraph::create_new(&prefix, 10).expect("create");
        graph.close().expect("close");

        std::fs::remove_file(format!("{prefix}{REVERSE_SUFFIX}")).expect("remove");
        assert!(AssociationGraph::open_existing(&prefix).is_err());
    }
}
