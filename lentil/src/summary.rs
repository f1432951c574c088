use crate::common::*;
use crate::error::SafeError;
use crate::input::DataTable;
use crate::safe::FeatureScores;
use crate::significance::{safe_score_threshold, significant_nodes, SignificantNodes};

use serde::Serialize;
use std::collections::BTreeMap;
use topo_graph::graph::TopoGraph;

/// Per-feature enrichment statistics
#[derive(Debug, Clone)]
pub struct FeatureSummary {
    pub name: Box<str>,
    /// sum of SAFE scores across all nodes
    pub total_score: f64,
    /// expanded significant node count
    pub enriched_nodes: usize,
    /// samples belonging to any expanded significant node
    pub enriched_samples: usize,
    /// sum of SAFE scores over the significant centroids only
    pub enriched_score: f64,
    /// metadata mass in enriched samples over total metadata mass
    pub abundance_ratio: f64,
    /// enriched score over total score
    pub safe_ratio: f64,
}

/// Reduced structure for detail output: node sets and centroid scores
/// per feature, keyed by feature name
#[derive(Debug, Serialize)]
pub struct SummaryDetails {
    pub enriched_nodes: BTreeMap<Box<str>, Vec<Box<str>>>,
    pub enriched_score: BTreeMap<Box<str>, f64>,
}

fn safe_div(x: f64, y: f64) -> f64 {
    if y == 0.0 {
        f64::NAN
    } else {
        x / y
    }
}

/// Which space the metadata rows live in, settled once by row count.
/// When node and sample counts coincide the sample reading wins.
#[derive(Clone, Copy, PartialEq, Eq)]
enum MetadataSpace {
    Sample,
    Node,
}

fn check_alignment(
    graph: &TopoGraph,
    metadata: &DataTable,
    scores: &FeatureScores,
) -> anyhow::Result<MetadataSpace> {
    let space = if metadata.nrows() == graph.n_samples() {
        MetadataSpace::Sample
    } else if metadata.nrows() == graph.n_nodes() {
        MetadataSpace::Node
    } else {
        return Err(SafeError::ShapeMismatch {
            context: "summary metadata",
            expected: graph.n_samples(),
            found: metadata.nrows(),
        }
        .into());
    };
    if scores.n_nodes() != graph.n_nodes() {
        return Err(SafeError::ShapeMismatch {
            context: "feature-major SAFE scores",
            expected: graph.n_nodes(),
            found: scores.n_nodes(),
        }
        .into());
    }
    if metadata.columns != scores.features {
        anyhow::bail!("metadata and SAFE score features disagree");
    }
    Ok(space)
}

/// Summarize SAFE scores into one row per feature.
///
/// * `metadata` - the raw table the scores were computed from; sample
///   space or node space, matching how the batch was shuffled
/// * `scores` - feature-major SAFE scores
/// * `p_value` - significance cutoff, translated through `n_iter`
pub fn safe_summary(
    graph: &TopoGraph,
    metadata: &DataTable,
    scores: &FeatureScores,
    p_value: f64,
    nr_threshold: f64,
    n_iter: usize,
) -> anyhow::Result<Vec<FeatureSummary>> {
    let space = check_alignment(graph, metadata, scores)?;

    let threshold = safe_score_threshold(p_value, n_iter);
    let neighborhoods = graph.get_neighborhoods(nr_threshold);
    let sig = significant_nodes(scores, threshold, &neighborhoods);

    info!(
        "summarizing {} features at SAFE score cutoff {:.4}",
        scores.n_features(),
        threshold
    );

    let mut rows = Vec::with_capacity(scores.n_features());

    for (f, name) in scores.features.iter().enumerate() {
        let score_row = scores.scores.row(f);
        let total_score = score_row.sum();

        let centroids = &sig.centroids[f];
        let expanded = &sig.expanded[f];

        let enriched_score: f64 = centroids.iter().map(|&n| score_row[n]).sum();

        let samples = graph.node2sample(expanded);
        let feature_column = metadata.values.column(f);
        let feature_total = feature_column.sum();
        let enriched_mass: f64 = match space {
            MetadataSpace::Sample => samples.iter().map(|&s| feature_column[s]).sum(),
            MetadataSpace::Node => expanded.iter().map(|&n| feature_column[n]).sum(),
        };

        rows.push(FeatureSummary {
            name: name.clone(),
            total_score,
            enriched_nodes: expanded.len(),
            enriched_samples: samples.len(),
            enriched_score,
            abundance_ratio: safe_div(enriched_mass, feature_total),
            safe_ratio: safe_div(enriched_score, total_score),
        });
    }

    Ok(rows)
}

/// Detail view of the same extraction: expanded node names and
/// centroid score mass per feature
pub fn summary_details(
    graph: &TopoGraph,
    scores: &FeatureScores,
    p_value: f64,
    nr_threshold: f64,
    n_iter: usize,
) -> anyhow::Result<SummaryDetails> {
    if scores.n_nodes() != graph.n_nodes() {
        return Err(SafeError::ShapeMismatch {
            context: "feature-major SAFE scores",
            expected: graph.n_nodes(),
            found: scores.n_nodes(),
        }
        .into());
    }

    let threshold = safe_score_threshold(p_value, n_iter);
    let neighborhoods = graph.get_neighborhoods(nr_threshold);
    let SignificantNodes {
        centroids,
        expanded,
    } = significant_nodes(scores, threshold, &neighborhoods);

    let mut enriched_nodes = BTreeMap::new();
    let mut enriched_score = BTreeMap::new();

    for (f, name) in scores.features.iter().enumerate() {
        let names: Vec<Box<str>> = expanded[f]
            .iter()
            .map(|&n| graph.node_names[n].clone())
            .collect();
        let mass: f64 = centroids[f].iter().map(|&n| scores.scores[(f, n)]).sum();
        enriched_nodes.insert(name.clone(), names);
        enriched_score.insert(name.clone(), mass);
    }

    Ok(SummaryDetails {
        enriched_nodes,
        enriched_score,
    })
}

fn fmt_stat(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v == 0.0 {
        "0".to_string()
    } else if v.abs() >= 1e-4 {
        format!("{:.4}", v)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        format!("{:.4e}", v)
    }
}

/// Render summary rows as TSV lines, sorted by enriched score
/// descending (NaN-free columns keep their order stable)
pub fn summary_to_lines(rows: &[FeatureSummary]) -> Vec<Box<str>> {
    let mut sorted: Vec<&FeatureSummary> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        b.enriched_score
            .partial_cmp(&a.enriched_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let header = "#name\ttotal_score\tenriched_nodes\tenriched_samples\t\
                  enriched_score\tabundance_ratio\tsafe_ratio";

    let mut lines: Vec<Box<str>> = Vec::with_capacity(rows.len() + 1);
    lines.push(header.into());

    for row in sorted.into_iter() {
        lines.push(
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                row.name,
                fmt_stat(row.total_score),
                row.enriched_nodes,
                row.enriched_samples,
                fmt_stat(row.enriched_score),
                fmt_stat(row.abundance_ratio),
                fmt_stat(row.safe_ratio),
            )
            .into_boxed_str(),
        );
    }

    lines
}
