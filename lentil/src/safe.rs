use crate::common::*;
use crate::convert::counts_to_safe_scores;
use crate::error::SafeError;
use crate::history::{SafeParams, SafeRecord};
use crate::input::DataTable;

use clap::ValueEnum;
use ndarray::azip;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use topo_graph::graph::{AggMode, SnDirection, TopoGraph};

/// Axis the permutation shuffles over
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShuffleBy {
    /// rows are nodes; permute node attributes directly
    Node,
    /// rows are samples; permute samples, then re-aggregate to nodes
    Sample,
}

/// Which tail(s) of the permutation distribution to score
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SafeMode {
    Enrich,
    Decline,
    Both,
}

impl SafeMode {
    pub fn tag(&self) -> &'static str {
        match self {
            SafeMode::Enrich => "enrich",
            SafeMode::Decline => "decline",
            SafeMode::Both => "both",
        }
    }
}

/// Parameters of one SAFE batch computation
#[derive(Debug, Clone, Copy)]
pub struct SafeConfig {
    pub n_iter: usize,
    pub nr_threshold: f64,
    pub shuffle_by: ShuffleBy,
    pub agg_mode: AggMode,
    pub mode: SafeMode,
    pub seed: u64,
}

/// SAFE scores with rows in graph node order
#[derive(Debug, Clone)]
pub struct NodeScores {
    pub scores: Mat,
    pub features: Vec<Box<str>>,
}

/// SAFE scores with rows in feature order (columns are nodes)
#[derive(Debug, Clone)]
pub struct FeatureScores {
    pub scores: Mat,
    pub features: Vec<Box<str>>,
}

impl NodeScores {
    pub fn to_feature_major(&self) -> FeatureScores {
        FeatureScores {
            scores: self.scores.t().to_owned(),
            features: self.features.clone(),
        }
    }

    pub fn to_table(&self, graph: &TopoGraph) -> DataTable {
        DataTable {
            values: self.scores.clone(),
            columns: self.features.clone(),
            rows: graph.node_names.clone(),
        }
    }
}

impl FeatureScores {
    pub fn to_node_major(&self) -> NodeScores {
        NodeScores {
            scores: self.scores.t().to_owned(),
            features: self.features.clone(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.scores.nrows()
    }

    pub fn n_nodes(&self) -> usize {
        self.scores.ncols()
    }
}

/// Verify metadata against the declared shuffle axis and bring it into
/// node space. For `ShuffleBy::Sample` the returned matrix is the
/// sample->node transform of the input; the raw sample-space matrix
/// remains the object later permutations shuffle.
pub fn resolve_node_data(
    graph: &TopoGraph,
    data: &Mat,
    shuffle_by: ShuffleBy,
) -> anyhow::Result<Mat> {
    match shuffle_by {
        ShuffleBy::Node => {
            if data.nrows() != graph.n_nodes() {
                return Err(SafeError::ShapeMismatch {
                    context: "shuffle-by-node metadata",
                    expected: graph.n_nodes(),
                    found: data.nrows(),
                }
                .into());
            }
            Ok(data.clone())
        }
        ShuffleBy::Sample => {
            if data.nrows() != graph.n_samples() {
                return Err(SafeError::ShapeMismatch {
                    context: "shuffle-by-sample metadata",
                    expected: graph.n_samples(),
                    found: data.nrows(),
                }
                .into());
            }
            graph.transform_sn(data, SnDirection::SampleToNode)
        }
    }
}

/// Shuffle every column independently, keeping each column's multiset
/// of values intact. This is deliberately not a joint row permutation.
pub fn permute_columns(data: &Mat, rng: &mut StdRng) -> Mat {
    let mut out = data.clone();
    for mut col in out.columns_mut() {
        let mut vals: Vec<f64> = col.iter().copied().collect();
        vals.shuffle(rng);
        for (dst, v) in col.iter_mut().zip(vals.into_iter()) {
            *dst = v;
        }
    }
    out
}

fn permuted_node_scores(
    graph: &TopoGraph,
    raw_data: &Mat,
    neighborhoods: &[Vec<usize>],
    config: &SafeConfig,
    rng: &mut StdRng,
) -> anyhow::Result<Mat> {
    let permuted = permute_columns(raw_data, rng);
    let node_data = match config.shuffle_by {
        ShuffleBy::Node => permuted,
        ShuffleBy::Sample => graph.transform_sn(&permuted, SnDirection::SampleToNode)?,
    };
    graph.neighborhood_score(&node_data, neighborhoods, config.agg_mode)
}

/// Accumulate enrichment and decline counts over `n_iter` permutation
/// trials.
///
/// Trial `t` draws from `StdRng::seed_from_u64(seed + t)`, so trials
/// are independent and the whole run reproduces for a fixed seed no
/// matter how rayon schedules them. Both comparisons are inclusive: a
/// permuted score equal to the observed score increments both
/// counters. `tick` fires once per completed trial.
pub fn permutation_counts(
    graph: &TopoGraph,
    raw_data: &Mat,
    observed: &Mat,
    neighborhoods: &[Vec<usize>],
    config: &SafeConfig,
    tick: &(dyn Fn() + Sync),
) -> anyhow::Result<(CountMat, CountMat)> {
    let dim = observed.dim();
    let zero = || (CountMat::zeros(dim), CountMat::zeros(dim));

    (0..config.n_iter)
        .into_par_iter()
        .try_fold(zero, |(mut enrich, mut decline), trial| {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(trial as u64));
            let permuted =
                permuted_node_scores(graph, raw_data, neighborhoods, config, &mut rng)?;

            azip!((e in &mut enrich, d in &mut decline, &p in &permuted, &o in observed) {
                if p >= o {
                    *e += 1;
                }
                if p <= o {
                    *d += 1;
                }
            });

            tick();
            Ok((enrich, decline))
        })
        .try_reduce(zero, |(mut e1, mut d1), (e2, d2)| {
            e1 += &e2;
            d1 += &d2;
            Ok((e1, d1))
        })
}

/// Everything one batch call produces: per-mode score matrices plus
/// the parameter records the caller may append to its history.
pub struct SafeBatch {
    pub enrich: Option<NodeScores>,
    pub decline: Option<NodeScores>,
    pub records: Vec<SafeRecord>,
}

/// One full SAFE pass: neighborhoods, observed scores, permutation
/// null, corrected scores for the requested mode(s).
pub fn safe_batch(
    graph: &TopoGraph,
    metadata: &DataTable,
    config: &SafeConfig,
    tick: &(dyn Fn() + Sync),
) -> anyhow::Result<SafeBatch> {
    let node_data = resolve_node_data(graph, &metadata.values, config.shuffle_by)?;

    let neighborhoods = graph.get_neighborhoods(config.nr_threshold);
    let observed = graph.neighborhood_score(&node_data, &neighborhoods, config.agg_mode)?;

    info!(
        "observed scores ready; running {} permutation trials (shuffle by {:?})",
        config.n_iter, config.shuffle_by
    );

    let (enrich_counts, decline_counts) = permutation_counts(
        graph,
        &metadata.values,
        &observed,
        &neighborhoods,
        config,
        tick,
    )?;

    let make_scores = |counts: &CountMat| NodeScores {
        scores: counts_to_safe_scores(counts, config.n_iter),
        features: metadata.columns.clone(),
    };
    let make_record = |mode: SafeMode, scores: &NodeScores| SafeRecord {
        params: SafeParams {
            shuffle_by: config.shuffle_by,
            agg_mode: config.agg_mode,
            nr_threshold: config.nr_threshold,
            n_iter: config.n_iter,
            mode,
        },
        scores: scores.clone(),
    };

    let mut batch = SafeBatch {
        enrich: None,
        decline: None,
        records: vec![],
    };

    if matches!(config.mode, SafeMode::Enrich | SafeMode::Both) {
        let scores = make_scores(&enrich_counts);
        batch.records.push(make_record(SafeMode::Enrich, &scores));
        batch.enrich = Some(scores);
    }
    if matches!(config.mode, SafeMode::Decline | SafeMode::Both) {
        let scores = make_scores(&decline_counts);
        batch.records.push(make_record(SafeMode::Decline, &scores));
        batch.decline = Some(scores);
    }

    Ok(batch)
}
