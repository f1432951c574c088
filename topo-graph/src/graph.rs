use clap::ValueEnum;
use fnv::FnvHashMap as HashMap;
use log::info;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use ndarray::prelude::*;
use rayon::prelude::*;

/// Reduction applied to per-node values over a neighborhood
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggMode {
    Sum,
    Mean,
}

/// Direction tag for sample-space <-> node-space conversion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnDirection {
    SampleToNode,
    NodeToSample,
}

/// A topology-preserving graph over clustered samples.
///
/// Nodes are clusters of samples; edges carry the embedding distance
/// between adjacent clusters. The graph answers neighborhood queries
/// (all nodes within a path-distance cutoff) and reduces per-node or
/// per-sample feature values into per-node scores. It never computes
/// the embedding itself.
pub struct TopoGraph {
    /// node identifiers, fixed order
    pub node_names: Vec<Box<str>>,
    /// member sample indices per node, parallel to `node_names`
    pub node_members: Vec<Vec<usize>>,
    /// sample identifiers
    pub sample_names: Vec<Box<str>>,
    /// symmetric CSC adjacency of edge distances (n_nodes x n_nodes)
    pub adjacency: CscMatrix<f32>,
    /// canonical edge list (i < j), deduplicated
    pub edges: Vec<(usize, usize)>,
    /// edge distances, parallel to `edges`
    pub distances: Vec<f32>,
}

impl TopoGraph {
    /// Assemble a graph from node rosters and a weighted edge list.
    ///
    /// * `node_names` - node identifiers in graph order
    /// * `node_members` - sample indices belonging to each node
    /// * `sample_names` - sample identifiers
    /// * `edges` - `(i, j, distance)` triplets, any orientation
    pub fn from_edges(
        node_names: Vec<Box<str>>,
        node_members: Vec<Vec<usize>>,
        sample_names: Vec<Box<str>>,
        edges: Vec<(usize, usize, f32)>,
    ) -> anyhow::Result<TopoGraph> {
        let nn = node_names.len();
        let n_samples = sample_names.len();

        if node_members.len() != nn {
            anyhow::bail!(
                "{} membership lists for {} nodes",
                node_members.len(),
                nn
            );
        }

        for (node, members) in node_members.iter().enumerate() {
            if let Some(&s) = members.iter().find(|&&s| s >= n_samples) {
                anyhow::bail!("node {} refers to unknown sample index {}", node, s);
            }
        }

        let mut canonical: Vec<((usize, usize), f32)> = Vec::with_capacity(edges.len());
        for (i, j, d) in edges {
            if i >= nn || j >= nn {
                anyhow::bail!("edge ({}, {}) outside of {} nodes", i, j, nn);
            }
            if i == j || !d.is_finite() || d < 0.0 {
                continue;
            }
            let key = if i < j { (i, j) } else { (j, i) };
            canonical.push((key, d));
        }

        canonical.sort_by(|a, b| a.0.cmp(&b.0));
        canonical.dedup_by_key(|&mut (ij, _)| ij);

        let mut coo = CooMatrix::new(nn, nn);
        for &((i, j), d) in canonical.iter() {
            coo.push(i, j, d);
            coo.push(j, i, d);
        }
        let adjacency = CscMatrix::from(&coo);

        let (edge_pairs, distances): (Vec<_>, Vec<_>) = canonical.into_iter().unzip();

        info!(
            "graph: {} nodes, {} samples, {} edges",
            nn,
            n_samples,
            edge_pairs.len()
        );

        Ok(TopoGraph {
            node_names,
            node_members,
            sample_names,
            adjacency,
            edges: edge_pairs,
            distances,
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.node_names.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_names.len()
    }

    /// Adjacent nodes of `node` from the CSC adjacency matrix
    pub fn neighbors(&self, node: usize) -> &[usize] {
        let offsets = self.adjacency.col_offsets();
        let start = offsets[node];
        let end = offsets[node + 1];
        &self.adjacency.row_indices()[start..end]
    }

    /// Single-source shortest path distances over edge weights.
    ///
    /// Unreachable nodes keep `f32::INFINITY`. Small dense scan per
    /// step; node counts stay in the hundreds for mapper-style graphs.
    fn shortest_path_distances(&self, source: usize) -> Vec<f32> {
        let nn = self.n_nodes();
        let offsets = self.adjacency.col_offsets();
        let row_indices = self.adjacency.row_indices();
        let values = self.adjacency.values();

        let mut dist = vec![f32::INFINITY; nn];
        let mut visited = vec![false; nn];
        dist[source] = 0.0;

        for _ in 0..nn {
            let mut u = None;
            let mut best = f32::INFINITY;
            for (k, &d) in dist.iter().enumerate() {
                if !visited[k] && d < best {
                    best = d;
                    u = Some(k);
                }
            }
            let Some(u) = u else {
                break;
            };
            visited[u] = true;

            for idx in offsets[u]..offsets[u + 1] {
                let v = row_indices[idx];
                let alt = dist[u] + values[idx];
                if alt < dist[v] {
                    dist[v] = alt;
                }
            }
        }

        dist
    }

    /// Threshold-based neighborhoods for every node.
    ///
    /// The cutoff is the `nr_threshold` quantile (fraction in `[0,1]`,
    /// nearest rank) of all finite pairwise path distances. Each
    /// neighborhood holds every node within the cutoff and always
    /// contains the node itself; unreachable pairs never become
    /// neighbors.
    pub fn get_neighborhoods(&self, nr_threshold: f64) -> Vec<Vec<usize>> {
        let nn = self.n_nodes();

        let dist: Vec<Vec<f32>> = (0..nn)
            .into_par_iter()
            .map(|s| self.shortest_path_distances(s))
            .collect();

        let mut pool: Vec<f32> = dist
            .iter()
            .enumerate()
            .flat_map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .filter(move |&(j, d)| i != j && d.is_finite())
                    .map(|(_, &d)| d)
            })
            .collect();

        if pool.is_empty() {
            // no edges at all; every node stands alone
            return (0..nn).map(|i| vec![i]).collect();
        }

        pool.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let q = nr_threshold.clamp(0.0, 1.0);
        let rank = ((pool.len() - 1) as f64 * q).round() as usize;
        let cutoff = pool[rank];

        info!(
            "neighborhood cutoff {:.4} at quantile {:.2} over {} distances",
            cutoff,
            q,
            pool.len()
        );

        dist.into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .filter(|&(_, d)| d <= cutoff)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect()
    }

    /// Reduce node-space values over each node's neighborhood.
    ///
    /// * `node_data` - node x feature matrix, rows in graph node order
    /// * `neighborhoods` - as returned by [`TopoGraph::get_neighborhoods`]
    /// * `mode` - reduction applied within each neighborhood
    pub fn neighborhood_score(
        &self,
        node_data: &Array2<f64>,
        neighborhoods: &[Vec<usize>],
        mode: AggMode,
    ) -> anyhow::Result<Array2<f64>> {
        let nn = self.n_nodes();
        if node_data.nrows() != nn {
            anyhow::bail!(
                "node data has {} rows for {} nodes",
                node_data.nrows(),
                nn
            );
        }
        if neighborhoods.len() != nn {
            anyhow::bail!(
                "{} neighborhoods for {} nodes",
                neighborhoods.len(),
                nn
            );
        }

        let nf = node_data.ncols();
        let mut scores = Array2::<f64>::zeros((nn, nf));

        for (i, hood) in neighborhoods.iter().enumerate() {
            let mut acc = scores.row_mut(i);
            for &m in hood.iter() {
                acc += &node_data.row(m);
            }
            if mode == AggMode::Mean && !hood.is_empty() {
                acc /= hood.len() as f64;
            }
        }

        Ok(scores)
    }

    /// Convert values between sample space and node space.
    ///
    /// `SampleToNode` averages member samples per node; `NodeToSample`
    /// averages owning nodes per sample. Rows without members (or
    /// samples outside every node) become zero.
    pub fn transform_sn(
        &self,
        data: &Array2<f64>,
        direction: SnDirection,
    ) -> anyhow::Result<Array2<f64>> {
        let nf = data.ncols();
        match direction {
            SnDirection::SampleToNode => {
                if data.nrows() != self.n_samples() {
                    anyhow::bail!(
                        "sample data has {} rows for {} samples",
                        data.nrows(),
                        self.n_samples()
                    );
                }
                let mut out = Array2::<f64>::zeros((self.n_nodes(), nf));
                for (i, members) in self.node_members.iter().enumerate() {
                    if members.is_empty() {
                        continue;
                    }
                    let mut acc = out.row_mut(i);
                    for &s in members.iter() {
                        acc += &data.row(s);
                    }
                    acc /= members.len() as f64;
                }
                Ok(out)
            }
            SnDirection::NodeToSample => {
                if data.nrows() != self.n_nodes() {
                    anyhow::bail!(
                        "node data has {} rows for {} nodes",
                        data.nrows(),
                        self.n_nodes()
                    );
                }
                let mut out = Array2::<f64>::zeros((self.n_samples(), nf));
                let mut owners = vec![0_usize; self.n_samples()];
                for (i, members) in self.node_members.iter().enumerate() {
                    for &s in members.iter() {
                        let mut acc = out.row_mut(s);
                        acc += &data.row(i);
                        owners[s] += 1;
                    }
                }
                for (s, &k) in owners.iter().enumerate() {
                    if k > 1 {
                        let mut acc = out.row_mut(s);
                        acc /= k as f64;
                    }
                }
                Ok(out)
            }
        }
    }

    /// Union of member samples over a set of nodes, deduplicated
    pub fn node2sample(&self, nodes: &[usize]) -> Vec<usize> {
        let mut samples: Vec<usize> = nodes
            .iter()
            .flat_map(|&n| self.node_members[n].iter().copied())
            .collect();
        samples.sort_unstable();
        samples.dedup();
        samples
    }

    /// Node name -> position lookup
    pub fn node_index_map(&self) -> HashMap<Box<str>, usize> {
        self.node_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Path graph A - B - C - D with unit edge distances; one sample
    /// per node plus a shared sample between B and C
    fn path_graph() -> TopoGraph {
        TopoGraph::from_edges(
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            vec![vec![0], vec![1, 4], vec![2, 4], vec![3]],
            vec![
                "s0".into(),
                "s1".into(),
                "s2".into(),
                "s3".into(),
                "s4".into(),
            ],
            vec![(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0)],
        )
        .unwrap()
    }

    #[test]
    fn neighbors_are_symmetric() {
        let g = path_graph();
        for node in 0..g.n_nodes() {
            for &m in g.neighbors(node) {
                assert!(g.neighbors(m).contains(&node));
            }
        }
    }

    #[test]
    fn unit_distance_neighborhoods() {
        let g = path_graph();
        // pairwise path distances are {1,1,1,2,2,3} each counted twice;
        // the 0.25 quantile lands on distance 1 -> direct neighbors only
        let hoods = g.get_neighborhoods(0.25);
        assert_eq!(hoods[0], vec![0, 1]);
        assert_eq!(hoods[1], vec![0, 1, 2]);
        assert_eq!(hoods[2], vec![1, 2, 3]);
        assert_eq!(hoods[3], vec![2, 3]);
    }

    #[test]
    fn neighborhood_scores_sum_mode() {
        let g = path_graph();
        let hoods = g.get_neighborhoods(0.25);
        let data =
            Array2::from_shape_vec((4, 1), vec![10.0, 1.0, 1.0, 10.0]).unwrap();
        let scores = g.neighborhood_score(&data, &hoods, AggMode::Sum).unwrap();
        let expected = [11.0, 12.0, 12.0, 11.0];
        for (i, &e) in expected.iter().enumerate() {
            assert_eq!(scores[(i, 0)], e);
        }
    }

    #[test]
    fn aggregation_is_deterministic() {
        let g = path_graph();
        let hoods = g.get_neighborhoods(0.25);
        let data =
            Array2::from_shape_vec((4, 2), vec![1.0, 0.5, 2.0, 0.5, 3.0, 0.5, 4.0, 0.5])
                .unwrap();
        let a = g.neighborhood_score(&data, &hoods, AggMode::Mean).unwrap();
        let b = g.neighborhood_score(&data, &hoods, AggMode::Mean).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sample_to_node_uses_member_means() {
        let g = path_graph();
        let data = Array2::from_shape_vec(
            (5, 1),
            vec![1.0, 2.0, 4.0, 8.0, 6.0],
        )
        .unwrap();
        let node_data = g.transform_sn(&data, SnDirection::SampleToNode).unwrap();
        assert_eq!(node_data[(0, 0)], 1.0);
        assert_eq!(node_data[(1, 0)], 4.0); // (2 + 6) / 2
        assert_eq!(node_data[(2, 0)], 5.0); // (4 + 6) / 2
        assert_eq!(node_data[(3, 0)], 8.0);
    }

    #[test]
    fn node_to_sample_averages_owners() {
        let g = path_graph();
        let node_data =
            Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 4.0, 8.0]).unwrap();
        let data = g.transform_sn(&node_data, SnDirection::NodeToSample).unwrap();
        assert_eq!(data[(0, 0)], 1.0);
        assert_eq!(data[(4, 0)], 3.0); // shared between B and C
    }

    #[test]
    fn node2sample_deduplicates() {
        let g = path_graph();
        let samples = g.node2sample(&[1, 2]);
        assert_eq!(samples, vec![1, 2, 4]);
    }

    #[test]
    fn disconnected_nodes_stay_out() {
        let g = TopoGraph::from_edges(
            vec!["A".into(), "B".into(), "C".into()],
            vec![vec![0], vec![1], vec![2]],
            vec!["s0".into(), "s1".into(), "s2".into()],
            vec![(0, 1, 1.0)],
        )
        .unwrap();
        let hoods = g.get_neighborhoods(1.0);
        assert_eq!(hoods[0], vec![0, 1]);
        assert_eq!(hoods[1], vec![0, 1]);
        assert_eq!(hoods[2], vec![2]);
    }
}
