//! Maps partition key values to the child partitions that may hold them.

use std::sync::Arc;

use relpart_cache::PartitionCache;
use relpart_types::{ChildPartition, PartitionBound, PartitionValue, PartitionedTable, RangeEndpoint};
use tracing::debug;

/// Names of the partitions of `table` that may contain rows whose key is one of `values`.
///
/// List partitions are candidates when their value set intersects `values`. Range partitions are
/// candidates when `[from, to)` intersects the closed span between the smallest and the largest
/// value. Bounds of the wrong shape for the table's strategy never match. The result follows the
/// order of `partitions`.
pub fn resolve_candidates(
    table: &PartitionedTable,
    partitions: &[ChildPartition],
    values: &[PartitionValue],
) -> Vec<String> {
    let (Some(min), Some(max)) = (values.iter().min(), values.iter().max()) else {
        return vec![];
    };
    let lowest = RangeEndpoint::Value(min.clone());
    let highest = RangeEndpoint::Value(max.clone());

    partitions
        .iter()
        .filter(|partition| table.accepts(&partition.bound))
        .filter(|partition| match &partition.bound {
            PartitionBound::List(owned) => owned.iter().any(|v| values.contains(v)),
            PartitionBound::Range { from, to } => *from <= highest && lowest < *to,
        })
        .map(|partition| partition.name.clone())
        .collect()
}

/// Resolves candidates against the cached partition list of a table.
#[derive(Debug, Clone)]
pub struct PartitionResolver {
    cache: Arc<PartitionCache>,
}

impl PartitionResolver {
    /// A resolver reading partitions from `cache`.
    pub fn new(cache: Arc<PartitionCache>) -> Self {
        Self { cache }
    }

    /// Candidate partitions of `table` for `values`, read from a single cache lookup.
    pub async fn resolve(&self, table: &PartitionedTable, values: &[PartitionValue]) -> Vec<String> {
        let partitions = self.cache.fetch_partitions(table.name()).await;
        let candidates = resolve_candidates(table, &partitions, values);
        debug!(
            table = %table.name(),
            n_values = values.len(),
            n_candidates = candidates.len(),
            "resolved partition candidates"
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use relpart_cache::{CacheConfig, FetchError, PartitionSource};
    use relpart_types::{KeyType, PartitionStrategy, bound::parse_bound_expr};

    fn list_table() -> PartitionedTable {
        PartitionedTable::new("list_models", PartitionStrategy::List, "category")
    }

    fn range_table() -> PartitionedTable {
        PartitionedTable::new("range_models", PartitionStrategy::Range, "day")
    }

    fn list_partitions() -> Vec<ChildPartition> {
        vec![
            ChildPartition::new("list_models_a", PartitionBound::list([1, 2]), "list_models"),
            ChildPartition::new("list_models_b", PartitionBound::list([3, 4]), "list_models"),
            ChildPartition::new("list_models_c", PartitionBound::list([5]), "list_models"),
        ]
    }

    fn range_partitions() -> Vec<ChildPartition> {
        vec![
            ChildPartition::new(
                "range_models_low",
                PartitionBound::range(RangeEndpoint::MinValue, 10),
                "range_models",
            ),
            ChildPartition::new("range_models_mid", PartitionBound::range(10, 20), "range_models"),
            ChildPartition::new(
                "range_models_high",
                PartitionBound::range(20, RangeEndpoint::MaxValue),
                "range_models",
            ),
        ]
    }

    fn values(values: &[i64]) -> Vec<PartitionValue> {
        values.iter().copied().map(PartitionValue::from).collect()
    }

    #[test]
    fn list_candidates() {
        let table = list_table();
        let partitions = list_partitions();
        assert_eq!(
            resolve_candidates(&table, &partitions, &values(&[2])),
            vec!["list_models_a"]
        );
        assert_eq!(
            resolve_candidates(&table, &partitions, &values(&[5, 1])),
            vec!["list_models_a", "list_models_c"]
        );
        assert!(resolve_candidates(&table, &partitions, &values(&[9])).is_empty());
    }

    #[test]
    fn range_candidates_use_half_open_bounds() {
        let table = range_table();
        let partitions = range_partitions();
        assert_eq!(
            resolve_candidates(&table, &partitions, &values(&[10])),
            vec!["range_models_mid"]
        );
        assert_eq!(
            resolve_candidates(&table, &partitions, &values(&[9])),
            vec!["range_models_low"]
        );
        assert_eq!(
            resolve_candidates(&table, &partitions, &values(&[-100, 25])),
            vec!["range_models_low", "range_models_mid", "range_models_high"]
        );
    }

    #[test]
    fn empty_inputs() {
        let table = list_table();
        assert!(resolve_candidates(&table, &list_partitions(), &[]).is_empty());
        assert!(resolve_candidates(&table, &[], &values(&[1])).is_empty());
    }

    #[test]
    fn wrong_shape_never_matches() {
        let partitions = vec![
            ChildPartition::new("mixed_range", PartitionBound::range(0, 10), "mixed"),
            ChildPartition::new("mixed_list", PartitionBound::list([1]), "mixed"),
        ];
        assert_eq!(
            resolve_candidates(&list_table(), &partitions, &values(&[1])),
            vec!["mixed_list"]
        );
        assert_eq!(
            resolve_candidates(&range_table(), &partitions, &values(&[1])),
            vec!["mixed_range"]
        );
    }

    #[test]
    fn text_keys() {
        let partitions = vec![
            ChildPartition::new("regions_eu", PartitionBound::list(["de", "fr"]), "regions"),
            ChildPartition::new("regions_us", PartitionBound::list(["us"]), "regions"),
        ];
        let table = PartitionedTable::new("regions", PartitionStrategy::List, "region");
        assert_eq!(
            resolve_candidates(&table, &partitions, &[PartitionValue::from("fr")]),
            vec!["regions_eu"]
        );
    }

    #[test]
    fn bigint_keys_read_from_the_catalog() {
        // bigint and negative bounds are printed quoted by the catalog
        let bound = |expr| parse_bound_expr(expr, KeyType::Integer).unwrap();
        let partitions = vec![
            ChildPartition::new(
                "list_models_a",
                bound("FOR VALUES IN ('1', '2')"),
                "list_models",
            ),
            ChildPartition::new(
                "list_models_n",
                bound("FOR VALUES IN ('-5')"),
                "list_models",
            ),
        ];
        assert_eq!(
            resolve_candidates(&list_table(), &partitions, &values(&[1])),
            vec!["list_models_a"]
        );
        assert_eq!(
            resolve_candidates(&list_table(), &partitions, &values(&[-5])),
            vec!["list_models_n"]
        );

        let partitions = vec![ChildPartition::new(
            "range_models_low",
            bound("FOR VALUES FROM ('0') TO ('10')"),
            "range_models",
        )];
        assert_eq!(
            resolve_candidates(&range_table(), &partitions, &values(&[5])),
            vec!["range_models_low"]
        );
    }

    #[derive(Debug, Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PartitionSource for CountingSource {
        async fn list_partitions(&self, _parent: &str) -> Result<Vec<ChildPartition>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(list_partitions())
        }
    }

    #[tokio::test]
    async fn resolver_reads_through_cache() {
        let source = Arc::new(CountingSource::default());
        let cache = Arc::new(PartitionCache::new(
            Arc::clone(&source) as _,
            CacheConfig::default(),
        ));
        let resolver = PartitionResolver::new(cache);

        let table = list_table();
        assert_eq!(
            resolver.resolve(&table, &values(&[3])).await,
            vec!["list_models_b"]
        );
        assert_eq!(
            resolver.resolve(&table, &values(&[1, 4])).await,
            vec!["list_models_a", "list_models_b"]
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    proptest! {
        /// Every list partition owning one of the values is a candidate and every candidate owns
        /// one of them.
        #[test]
        fn list_candidates_are_exact(
            owned in prop::collection::vec(prop::collection::btree_set(0i64..20, 1..4), 0..6),
            wanted in prop::collection::vec(0i64..20, 0..5),
        ) {
            let table = list_table();
            let partitions = owned
                .iter()
                .enumerate()
                .map(|(i, set)| ChildPartition::new(
                    format!("p{i}"),
                    PartitionBound::list(set.iter().copied()),
                    "list_models",
                ))
                .collect::<Vec<_>>();
            let wanted = values(&wanted);

            let candidates = resolve_candidates(&table, &partitions, &wanted);
            let expected = partitions
                .iter()
                .filter(|p| wanted.iter().any(|v| p.bound.contains(v)))
                .map(|p| p.name.clone())
                .collect::<Vec<_>>();
            prop_assert_eq!(candidates, expected);
        }

        /// The partition holding any value is always among the candidates, in catalog order.
        #[test]
        fn range_candidates_cover_values(
            splits in prop::collection::btree_set(-50i64..50, 1..6),
            wanted in prop::collection::vec(-60i64..60, 1..5),
        ) {
            let table = range_table();
            let mut endpoints = vec![RangeEndpoint::MinValue];
            endpoints.extend(splits.iter().copied().map(RangeEndpoint::from));
            endpoints.push(RangeEndpoint::MaxValue);
            let partitions = endpoints
                .windows(2)
                .enumerate()
                .map(|(i, w)| ChildPartition::new(
                    format!("p{i}"),
                    PartitionBound::range(w[0].clone(), w[1].clone()),
                    "range_models",
                ))
                .collect::<Vec<_>>();
            let wanted = values(&wanted);

            let candidates = resolve_candidates(&table, &partitions, &wanted);
            for value in &wanted {
                let owner = partitions.iter().find(|p| p.bound.contains(value)).unwrap();
                prop_assert!(candidates.contains(&owner.name));
            }
            let order = partitions
                .iter()
                .map(|p| p.name.clone())
                .filter(|name| candidates.contains(name))
                .collect::<Vec<_>>();
            prop_assert_eq!(candidates, order);
        }
    }
}
