//! Grouping of GWAS hits into clusters of SNPs in linkage disequilibrium.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use indexmap::IndexMap;
use rayon::prelude::*;
use thousands::Separable;

use crate::{
    err::AdapterError,
    sources::{LdSource, SnpResolver},
};

use super::ds::{Cluster, GwasSnp, LocatedGwasSnp, Snp};

/// Default minimal r² for two SNPs to be considered linked.
pub const R2_THRESHOLD: f64 = 0.5;

/// Parameters for the LD queries.
#[derive(Debug, Clone)]
pub struct LdParams {
    /// Name of the reference population.
    pub population: String,
    /// Minimal r² of LD neighbours.
    pub r2_threshold: f64,
}

/// Place each GWAS SNP at all of its genomic locations.
///
/// SNPs that cannot be resolved are dropped with a warning.
pub fn locate_gwas_snps(gwas_snps: &[GwasSnp], resolver: &dyn SnpResolver) -> Vec<LocatedGwasSnp> {
    let span = tracing::Span::current();
    gwas_snps
        .par_iter()
        .map(|gwas_snp| {
            let _enter = span.enter();
            match resolver.resolve_snp(&gwas_snp.rs_id) {
                Ok(snps) => snps
                    .into_iter()
                    .map(|snp| LocatedGwasSnp::new(gwas_snp, snp))
                    .collect::<Vec<_>>(),
                Err(e) => {
                    tracing::warn!("could not locate GWAS SNP {}: {}", &gwas_snp.rs_id, e);
                    Vec::new()
                }
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Build the preliminary cluster around one located GWAS SNP.
///
/// The LD neighbourhood always contains the seed itself.  Neighbours that
/// cannot be resolved are skipped; a failing LD query fails the whole
/// precluster.
pub fn build_precluster(
    seed: &LocatedGwasSnp,
    resolver: &dyn SnpResolver,
    ld: &dyn LdSource,
    params: &LdParams,
) -> Result<Cluster, AdapterError> {
    let rs_id = seed.snp.rs_id.as_str();
    let pairs = ld.fetch_ld_neighbors(rs_id, &params.population, params.r2_threshold)?;

    let mut seen = HashSet::new();
    let neighbours = pairs
        .iter()
        .filter(|pair| pair.r2 >= params.r2_threshold)
        .filter_map(|pair| pair.partner_of(rs_id))
        .filter(|partner| *partner != rs_id && seen.insert(*partner))
        .collect::<Vec<_>>();

    let mut ld_snps = Vec::new();
    for neighbour in neighbours {
        match resolver.resolve_snp(neighbour) {
            Ok(snps) => ld_snps.extend(snps),
            Err(e) => tracing::warn!(
                "could not locate LD SNP {} (neighbour of {}): {}",
                neighbour,
                rs_id,
                e
            ),
        }
    }
    ld_snps.push(seed.snp.clone());

    Ok(Cluster {
        gwas_snps: vec![seed.clone()],
        ld_snps,
    })
}

/// Build the preliminary clusters of all seeds; failing LD queries drop the seed.
pub fn build_preclusters(
    seeds: &[LocatedGwasSnp],
    resolver: &dyn SnpResolver,
    ld: &dyn LdSource,
    params: &LdParams,
) -> Vec<Cluster> {
    let span = tracing::Span::current();
    seeds
        .par_iter()
        .filter_map(|seed| {
            let _enter = span.enter();
            match build_precluster(seed, resolver, ld, params) {
                Ok(cluster) => Some(cluster),
                Err(e) => {
                    tracing::warn!(
                        "LD lookup failed for GWAS SNP {}, dropping it from clustering: {}",
                        &seed.snp.rs_id,
                        e
                    );
                    None
                }
            }
        })
        .collect()
}

/// Disjoint-set forest over precluster indices.
#[derive(Debug)]
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        let (large, small) = if self.size[a] >= self.size[b] {
            (a, b)
        } else {
            (b, a)
        };
        self.parent[small] = large;
        self.size[large] += self.size[small];
    }
}

/// Merge preclusters sharing at least one LD SNP (by rsID), transitively.
///
/// The result is a partition: no rsID occurs in the LD SNPs of two clusters.
/// Merged clusters list their seeds in precluster order and their LD SNPs
/// unique by rsID, keeping the first occurrence.  Clusters are ordered by
/// their first precluster.
pub fn merge_preclusters(preclusters: Vec<Cluster>) -> Vec<Cluster> {
    let count = preclusters.len();
    let mut uf = UnionFind::new(count);
    {
        let mut owner: HashMap<&str, usize> = HashMap::new();
        for (idx, cluster) in preclusters.iter().enumerate() {
            for snp in &cluster.ld_snps {
                match owner.get(snp.rs_id.as_str()) {
                    Some(&other) => uf.union(idx, other),
                    None => {
                        owner.insert(snp.rs_id.as_str(), idx);
                    }
                }
            }
        }
    }

    let mut groups: IndexMap<usize, Vec<Cluster>> = IndexMap::new();
    for (idx, cluster) in preclusters.into_iter().enumerate() {
        groups.entry(uf.find(idx)).or_default().push(cluster);
    }

    let result = groups
        .into_values()
        .map(|members| {
            let mut gwas_snps = Vec::new();
            let mut ld_snps: IndexMap<String, Snp> = IndexMap::new();
            for member in members {
                gwas_snps.extend(member.gwas_snps);
                for snp in member.ld_snps {
                    ld_snps.entry(snp.rs_id.clone()).or_insert(snp);
                }
            }
            Cluster {
                gwas_snps,
                ld_snps: ld_snps.into_values().collect(),
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        "merged {} preclusters into {} clusters",
        count.separate_with_commas(),
        result.len().separate_with_commas()
    );

    result
}

/// Bundle GWAS SNPs into clusters of SNPs in LD.
pub fn cluster_gwas_snps(
    gwas_snps: &[GwasSnp],
    resolver: &dyn SnpResolver,
    ld: &dyn LdSource,
    params: &LdParams,
) -> Vec<Cluster> {
    let before_clustering = Instant::now();

    let seeds = locate_gwas_snps(gwas_snps, resolver);
    tracing::info!(
        "found {} locations for {} GWAS SNPs",
        seeds.len().separate_with_commas(),
        gwas_snps.len().separate_with_commas()
    );

    let preclusters = build_preclusters(&seeds, resolver, ld, params);
    let clusters = merge_preclusters(preclusters);
    tracing::info!(
        "found {} clusters from {} GWAS SNP locations in {:?}",
        clusters.len().separate_with_commas(),
        seeds.len().separate_with_commas(),
        before_clustering.elapsed()
    );

    clusters
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pipeline::ds::fixtures::{located, snp};
    use crate::sources::mock::{MockLdSource, MockSnpResolver};

    fn params() -> LdParams {
        LdParams {
            population: "1000GENOMES:phase_3:GBR".into(),
            r2_threshold: R2_THRESHOLD,
        }
    }

    fn precluster(seed: &str, ld_snps: &[&str]) -> Cluster {
        Cluster {
            gwas_snps: vec![located(seed, 1, 1e-6)],
            ld_snps: ld_snps.iter().map(|rs_id| snp(rs_id, "1", 1)).collect(),
        }
    }

    fn ld_ids(cluster: &Cluster) -> Vec<&str> {
        cluster.ld_snps.iter().map(|s| s.rs_id.as_str()).collect()
    }

    fn seed_ids(cluster: &Cluster) -> Vec<&str> {
        cluster
            .gwas_snps
            .iter()
            .map(|s| s.snp.rs_id.as_str())
            .collect()
    }

    fn assert_disjoint(clusters: &[Cluster]) {
        let mut seen = HashSet::new();
        for cluster in clusters {
            for snp in &cluster.ld_snps {
                assert!(seen.insert(snp.rs_id.clone()), "{} in two clusters", snp.rs_id);
            }
        }
    }

    #[test]
    fn merge_disjoint_is_identity() {
        let preclusters = vec![
            precluster("rs1", &["rs1", "rs2"]),
            precluster("rs3", &["rs3", "rs4"]),
        ];

        let merged = merge_preclusters(preclusters.clone());

        assert_eq!(merged, preclusters);
    }

    #[test]
    fn merge_is_idempotent() {
        let preclusters = vec![
            precluster("rs1", &["rs1", "rs2"]),
            precluster("rs3", &["rs3", "rs2"]),
            precluster("rs5", &["rs5", "rs6"]),
        ];

        let once = merge_preclusters(preclusters);
        let twice = merge_preclusters(once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn merge_shared_snp() {
        let merged = merge_preclusters(vec![
            precluster("rs1", &["rs1", "rs2"]),
            precluster("rs3", &["rs2", "rs3"]),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(seed_ids(&merged[0]), vec!["rs1", "rs3"]);
        assert_eq!(ld_ids(&merged[0]), vec!["rs1", "rs2", "rs3"]);
    }

    /// A chain A-B, C-D, B-C only connects everything transitively once the
    /// third precluster is seen.
    #[test]
    fn merge_transitive_chain() {
        let merged = merge_preclusters(vec![
            precluster("rsA", &["rsA", "rsB"]),
            precluster("rsC", &["rsC", "rsD"]),
            precluster("rsE", &["rsE", "rsF"]),
            precluster("rsX", &["rsB", "rsC"]),
            precluster("rsY", &["rsD", "rsF"]),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(
            seed_ids(&merged[0]),
            vec!["rsA", "rsC", "rsE", "rsX", "rsY"]
        );
        assert_eq!(
            ld_ids(&merged[0]),
            vec!["rsA", "rsB", "rsC", "rsD", "rsE", "rsF"]
        );
    }

    #[test]
    fn merge_partition_independent_of_order() {
        let preclusters = vec![
            precluster("rs1", &["rs1", "rs2"]),
            precluster("rs3", &["rs3", "rs4"]),
            precluster("rs5", &["rs4", "rs5", "rs2"]),
            precluster("rs7", &["rs7"]),
        ];
        let mut reversed = preclusters.clone();
        reversed.reverse();

        let as_sets = |clusters: Vec<Cluster>| {
            let mut sets = clusters
                .iter()
                .map(|c| {
                    let mut ids = ld_ids(c)
                        .into_iter()
                        .map(String::from)
                        .collect::<Vec<_>>();
                    ids.sort();
                    ids
                })
                .collect::<Vec<_>>();
            sets.sort();
            sets
        };

        let forward = merge_preclusters(preclusters);
        let backward = merge_preclusters(reversed);
        assert_disjoint(&forward);
        assert_disjoint(&backward);
        assert_eq!(as_sets(forward), as_sets(backward));
    }

    #[test]
    fn merge_keeps_first_coordinates_on_duplicates() {
        let mut first = precluster("rs1", &["rs1"]);
        first.ld_snps.push(snp("rs2", "1", 100));
        let mut second = precluster("rs3", &["rs3"]);
        second.ld_snps.push(snp("rs2", "1", 999));

        let merged = merge_preclusters(vec![first, second]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].ld_snps[1], snp("rs2", "1", 100));
    }

    #[test]
    fn build_precluster_includes_seed_and_resolved_neighbours() -> Result<(), anyhow::Error> {
        let resolver = MockSnpResolver::new()
            .with(snp("rs2", "1", 200))
            .with(snp("rs3", "1", 300))
            .with(snp("rs3", "1", 301));
        let ld = MockLdSource::new()
            .with("rs1", "rs2", 0.9)
            .with("rs3", "rs1", 0.6)
            .with("rs1", "rs4", 0.2);

        let cluster = build_precluster(&located("rs1", 100, 1e-6), &resolver, &ld, &params())?;

        assert_eq!(
            cluster.ld_snps,
            vec![
                snp("rs2", "1", 200),
                snp("rs3", "1", 300),
                snp("rs3", "1", 301),
                snp("rs1", "1", 100),
            ]
        );
        assert_eq!(seed_ids(&cluster), vec!["rs1"]);

        Ok(())
    }

    #[test]
    fn build_precluster_skips_unresolvable_neighbour() -> Result<(), anyhow::Error> {
        let resolver = MockSnpResolver::new().with(snp("rs2", "1", 200));
        let ld = MockLdSource::new()
            .with("rs1", "rs2", 0.9)
            .with("rs1", "rs404", 0.9);

        let cluster = build_precluster(&located("rs1", 100, 1e-6), &resolver, &ld, &params())?;

        assert_eq!(ld_ids(&cluster), vec!["rs2", "rs1"]);

        Ok(())
    }

    #[test]
    fn locate_gwas_snps_multiple_locations_and_failures() {
        let resolver = MockSnpResolver::new()
            .with(snp("rs1", "1", 100))
            .with(snp("rs1", "6", 5000))
            .failing("rs2");
        let gwas_snps = vec![
            GwasSnp {
                rs_id: "rs1".into(),
                disease: "asthma".into(),
                efo: "EFO_0000270".into(),
                pvalue: 1e-8,
                evidence: vec![],
            },
            GwasSnp {
                rs_id: "rs2".into(),
                disease: "asthma".into(),
                efo: "EFO_0000270".into(),
                pvalue: 1e-7,
                evidence: vec![],
            },
        ];

        let located = locate_gwas_snps(&gwas_snps, &resolver);

        assert_eq!(
            located.iter().map(|l| l.snp.clone()).collect::<Vec<_>>(),
            vec![snp("rs1", "1", 100), snp("rs1", "6", 5000)]
        );
        assert!(located.iter().all(|l| l.pvalue == 1e-8));
    }

    #[test]
    fn build_preclusters_survives_failed_ld_lookup() {
        let resolver = MockSnpResolver::new().with(snp("rs2", "1", 200));
        let ld = MockLdSource::new()
            .with("rs1", "rs2", 0.9)
            .failing("rs5");

        let clusters = build_preclusters(
            &[located("rs1", 100, 1e-6), located("rs5", 500, 1e-7)],
            &resolver,
            &ld,
            &params(),
        );

        assert_eq!(clusters.len(), 1);
        assert_eq!(seed_ids(&clusters[0]), vec!["rs1"]);
    }
}
