use crate::error::SafeError;
use crate::safe::{NodeScores, SafeMode, ShuffleBy};
use topo_graph::graph::AggMode;

/// Parameters of one recorded SAFE computation. `mode` is the tail the
/// record's scores belong to (`Enrich` or `Decline`; a `Both` request
/// produces two records).
#[derive(Debug, Clone, Copy)]
pub struct SafeParams {
    pub shuffle_by: ShuffleBy,
    pub agg_mode: AggMode,
    pub nr_threshold: f64,
    pub n_iter: usize,
    pub mode: SafeMode,
}

/// One computation result worth remembering
#[derive(Debug, Clone)]
pub struct SafeRecord {
    pub params: SafeParams,
    pub scores: NodeScores,
}

/// Append-only log of SAFE computations, owned by the caller rather
/// than hidden inside the graph. The batch entry point hands back
/// records; whoever orchestrates decides to keep them.
#[derive(Debug, Default)]
pub struct SafeHistory {
    records: Vec<SafeRecord>,
}

impl SafeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SafeRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = SafeRecord>) {
        self.records.extend(records);
    }

    pub fn last(&self) -> Option<&SafeRecord> {
        self.records.last()
    }

    /// Trial count of the most recent computation, for callers that
    /// did not pass n_iter explicitly
    pub fn last_n_iter(&self) -> Result<usize, SafeError> {
        self.last()
            .map(|r| r.params.n_iter)
            .ok_or(SafeError::EmptyHistory)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Mat;

    fn record(n_iter: usize) -> SafeRecord {
        SafeRecord {
            params: SafeParams {
                shuffle_by: ShuffleBy::Node,
                agg_mode: AggMode::Sum,
                nr_threshold: 0.5,
                n_iter,
                mode: SafeMode::Enrich,
            },
            scores: NodeScores {
                scores: Mat::zeros((2, 1)),
                features: vec!["f".into()],
            },
        }
    }

    #[test]
    fn last_n_iter_tracks_most_recent() {
        let mut history = SafeHistory::new();
        assert_eq!(history.last_n_iter(), Err(SafeError::EmptyHistory));

        history.push(record(100));
        history.push(record(2000));
        assert_eq!(history.last_n_iter(), Ok(2000));
        assert_eq!(history.len(), 2);
    }
}
