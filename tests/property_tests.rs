//! Property-based tests for trueno-ab
//!
//! Following ruchy/trueno/aprender pattern:
//! - Test ordering and lookup invariants of the playground
//! - Run with ProptestConfig::with_cases(32) (each case touches the filesystem)
//! - Must complete in <30 seconds for pre-commit hook

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;
use trueno_ab::adapter::{Adapter, MockAdapter};
use trueno_ab::definition::Definition;
use trueno_ab::id::normalize;
use trueno_ab::{Error, Playground};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Experiment names mapped to (alternative count, assigned index for "p1").
fn arb_experiments() -> impl Strategy<Value = BTreeMap<String, (usize, Option<usize>)>> {
    prop::collection::btree_map(
        "[A-Za-z][A-Za-z ]{0,11}",
        (1usize..5, prop::option::of(0usize..6)),
        1..8,
    )
}

fn write_experiments(
    dir: &std::path::Path,
    experiments: &BTreeMap<String, (usize, Option<usize>)>,
) {
    let definitions: Vec<_> = experiments
        .iter()
        .map(|(name, (alternatives, _))| {
            let values: Vec<usize> = (0..*alternatives).collect();
            json!({"name": name, "alternatives": values})
        })
        .collect();
    std::fs::write(
        dir.join("generated.json"),
        serde_json::to_string(&definitions).unwrap(),
    )
    .unwrap();
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: participant info is ordered by name and lists exactly the
    /// experiments with an in-range assignment
    #[test]
    fn prop_participant_info_ordered_and_complete(experiments in arb_experiments()) {
        // Names that collapse to the same id would overwrite each other.
        let ids: std::collections::BTreeSet<_> = experiments.keys().map(|n| normalize(n)).collect();
        prop_assume!(ids.len() == experiments.len());

        let dir = tempfile::tempdir().unwrap();
        write_experiments(dir.path(), &experiments);

        let adapter = Arc::new(MockAdapter::default());
        let playground = Playground::builder()
            .environment("test")
            .load_path(dir.path())
            .adapter(adapter.clone())
            .autoconnect(true)
            .build()
            .unwrap();

        let mut expected = Vec::new();
        for (name, (alternatives, assigned)) in &experiments {
            if let Some(index) = assigned {
                adapter.ab_add_participant(&normalize(name), *index, "p1").unwrap();
                if index < alternatives {
                    expected.push((name.clone(), *index));
                }
            }
        }

        let info = playground.participant_info("p1").unwrap();
        let actual: Vec<(String, usize)> = info
            .iter()
            .map(|(experiment, alternative)| (experiment.name().to_string(), alternative.index()))
            .collect();

        prop_assert!(actual.windows(2).all(|w| w[0].0 <= w[1].0));
        prop_assert_eq!(actual, expected);
    }

    /// Property: experiment lookup by any spelling resolves through the
    /// normalized id
    #[test]
    fn prop_experiment_lookup_normalizes(name in "[A-Za-z0-9 !?-]{1,16}") {
        let dir = tempfile::tempdir().unwrap();
        let playground = Playground::builder()
            .environment("test")
            .load_path(dir.path())
            .build()
            .unwrap();

        match playground.experiment(&name) {
            Err(Error::NoExperiment(id)) => prop_assert_eq!(id, normalize(&name)),
            other => prop_assert!(false, "unexpected lookup result: {:?}", other.map(|e| e.id().to_string())),
        }
    }
}
