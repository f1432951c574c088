use lentil::common::Mat;
use lentil::history::SafeHistory;
use lentil::input::DataTable;
use lentil::safe::{safe_batch, SafeConfig, SafeMode, ShuffleBy};
use lentil::significance::{safe_score_threshold, significant_nodes};
use lentil::summary::safe_summary;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::StandardNormal;
use topo_graph::graph::{AggMode, TopoGraph};

/// Path graph A - B - C - D, two samples per node
fn path_graph() -> TopoGraph {
    TopoGraph::from_edges(
        vec!["A".into(), "B".into(), "C".into(), "D".into()],
        vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6, 7]],
        (0..8).map(|i| format!("s{}", i).into()).collect(),
        vec![(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0)],
    )
    .unwrap()
}

fn random_sample_table(rng: &mut StdRng, nrows: usize, ncols: usize) -> DataTable {
    let values = Array2::from_shape_fn((nrows, ncols), |_| {
        let x: f64 = rng.sample(StandardNormal);
        x.abs()
    });
    DataTable {
        values,
        columns: (0..ncols).map(|j| format!("f{}", j).into()).collect(),
        rows: (0..nrows).map(|i| format!("s{}", i).into()).collect(),
    }
}

fn config(shuffle_by: ShuffleBy, n_iter: usize) -> SafeConfig {
    SafeConfig {
        n_iter,
        nr_threshold: 0.25,
        shuffle_by,
        agg_mode: AggMode::Sum,
        mode: SafeMode::Both,
        seed: 7,
    }
}

#[test]
fn pipeline_invariants_hold_end_to_end() -> anyhow::Result<()> {
    let graph = path_graph();
    let mut rng = StdRng::seed_from_u64(99);
    let metadata = random_sample_table(&mut rng, 8, 3);

    let cfg = config(ShuffleBy::Sample, 100);
    let batch = safe_batch(&graph, &metadata, &cfg, &|| {})?;

    let enrich = batch.enrich.as_ref().unwrap();
    let decline = batch.decline.as_ref().unwrap();

    assert_eq!(enrich.scores.dim(), (4, 3));
    assert_eq!(decline.scores.dim(), (4, 3));

    for (&e, &d) in enrich.scores.iter().zip(decline.scores.iter()) {
        assert!((0.0..=1.0).contains(&e));
        assert!((0.0..=1.0).contains(&d));
        // a cell cannot sit deep in both tails at once
        assert!(e.min(d) < 1.0);
    }

    // feature names survive the whole pipeline in order
    assert_eq!(enrich.features, metadata.columns);

    let mut history = SafeHistory::new();
    history.extend(batch.records.iter().cloned());
    assert_eq!(history.len(), 2);
    assert_eq!(history.last_n_iter()?, 100);

    let rows = safe_summary(
        &graph,
        &metadata,
        &enrich.to_feature_major(),
        0.05,
        cfg.nr_threshold,
        history.last_n_iter()?,
    )?;
    assert_eq!(rows.len(), 3);

    for row in rows.iter() {
        assert!(row.enriched_score <= row.total_score + 1e-9);
        assert!(row.enriched_samples <= graph.n_samples());
        if row.total_score > 0.0 {
            assert!(!row.safe_ratio.is_nan());
        }
    }

    Ok(())
}

#[test]
fn node_shuffle_requires_node_rows() -> anyhow::Result<()> {
    let graph = path_graph();

    // node-space metadata: one row per node
    let metadata = DataTable {
        values: Mat::from_shape_vec((4, 1), vec![10.0, 1.0, 1.0, 10.0])?,
        columns: vec!["f".into()],
        rows: vec!["A".into(), "B".into(), "C".into(), "D".into()],
    };

    let batch = safe_batch(&graph, &metadata, &config(ShuffleBy::Node, 50), &|| {})?;
    assert_eq!(batch.enrich.unwrap().scores.dim(), (4, 1));

    // the same table fails under shuffle-by-sample (8 samples expected)
    let err = safe_batch(&graph, &metadata, &config(ShuffleBy::Sample, 50), &|| {});
    assert!(err.is_err());
    Ok(())
}

#[test]
fn significant_sets_shrink_with_pvalue_end_to_end() -> anyhow::Result<()> {
    let graph = path_graph();
    let mut rng = StdRng::seed_from_u64(5);
    let metadata = random_sample_table(&mut rng, 8, 2);

    let cfg = config(ShuffleBy::Sample, 200);
    let batch = safe_batch(&graph, &metadata, &cfg, &|| {})?;
    let scores = batch.enrich.unwrap().to_feature_major();

    let neighborhoods = graph.get_neighborhoods(cfg.nr_threshold);

    let mut last = usize::MAX;
    for pvalue in [1.0, 0.1, 0.01] {
        let threshold = safe_score_threshold(pvalue, cfg.n_iter);
        let sig = significant_nodes(&scores, threshold, &neighborhoods);
        let picked: usize = sig.centroids.iter().map(|c| c.len()).sum();
        assert!(picked <= last);
        last = picked;
    }
    Ok(())
}
