//! Property tests for cycle detection, pattern ordering and token rewriting

use indexmap::IndexMap;
use proptest::prelude::*;
use std::collections::HashMap;
use tcgen::codegen::Rewriter;
use tcgen::directive::PatternRule;
use tcgen::pattern::PatternSet;
use tcgen::validator::{CycleDetector, DependencyEdge};
use tcgen::DeclId;

fn adjacency(edges: &[(u32, u32)]) -> IndexMap<DeclId, Vec<DependencyEdge>> {
    let mut map: IndexMap<DeclId, Vec<DependencyEdge>> = IndexMap::new();
    for (directive, (from, to)) in edges.iter().enumerate() {
        map.entry(DeclId::from_raw(*from))
            .or_default()
            .push(DependencyEdge {
                from: DeclId::from_raw(*from),
                to: DeclId::from_raw(*to),
                directive,
            });
    }
    map
}

/// Forward-only edges over `0..n`, plus one edge pointing back along an
/// existing forward edge
fn dag_with_back_edge() -> impl Strategy<Value = (Vec<(u32, u32)>, (u32, u32))> {
    (3u32..10).prop_flat_map(|n| {
        let pairs: Vec<(u32, u32)> = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect();
        let count = pairs.len();
        (prop::collection::vec(any::<bool>(), count), 0..count).prop_map(
            move |(keep, chosen)| {
                let mut edges: Vec<(u32, u32)> = pairs
                    .iter()
                    .zip(&keep)
                    .filter(|(_, keep)| **keep)
                    .map(|(pair, _)| *pair)
                    .collect();
                let (i, j) = pairs[chosen];
                if !edges.contains(&(i, j)) {
                    edges.push((i, j));
                }
                (edges, (j, i))
            },
        )
    })
}

/// Rules over distinct single-letter patterns, handed over in random order
fn shuffled_rules() -> impl Strategy<Value = Vec<PatternRule>> {
    (
        prop::collection::vec("[a-d]{0,3}", 4),
        prop::collection::vec(0i32..3, 4),
    )
        .prop_flat_map(|(replacements, orders)| {
            let rules: Vec<PatternRule> = ["a", "b", "c", "d"]
                .iter()
                .zip(replacements)
                .zip(orders)
                .enumerate()
                .map(|(index, ((pattern, replacement), order))| PatternRule {
                    pattern: pattern.to_string(),
                    replacement,
                    order,
                    index,
                })
                .collect();
            Just(rules).prop_shuffle()
        })
}

proptest! {
    #[test]
    fn forward_only_graphs_have_no_cycles((edges, _) in dag_with_back_edge()) {
        let map = adjacency(&edges);
        prop_assert!(CycleDetector::new(&map).closing_edges().is_empty());
    }

    #[test]
    fn back_edge_is_always_flagged((mut edges, back) in dag_with_back_edge()) {
        edges.push(back);
        let map = adjacency(&edges);
        let flagged = CycleDetector::new(&map).closing_edges();
        let back_edge = DependencyEdge {
            from: DeclId::from_raw(back.0),
            to: DeclId::from_raw(back.1),
            directive: edges.len() - 1,
        };
        prop_assert!(flagged.contains(&back_edge), "{:?} not in {:?}", back_edge, flagged);
    }

    #[test]
    fn pattern_order_ignores_input_order(rules in shuffled_rules(), input in "[a-e]{0,12}") {
        let mut sorted = rules.clone();
        sorted.sort_by_key(|rule| rule.index);

        let (shuffled, failures) = PatternSet::compile(rules);
        let (declared, _) = PatternSet::compile(sorted);
        prop_assert!(failures.is_empty());
        prop_assert_eq!(shuffled.apply(&input), declared.apply(&input));
        prop_assert_eq!(shuffled.apply(&input), shuffled.apply(&input));
    }

    #[test]
    fn text_without_the_parameter_is_untouched(text in "[a-zA-SU-Z0-9 ;=(){}<>.,+]{0,40}") {
        let substitutions = HashMap::from([("T".to_string(), "int".to_string())]);
        let rewritten = Rewriter::new(&substitutions).tracking_locals().rewrite(&text);
        prop_assert_eq!(rewritten, Ok(text));
    }
}
