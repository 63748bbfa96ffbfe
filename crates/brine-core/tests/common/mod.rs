// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use brine_core::{
    EClassId, Engine, EngineBuilder, EngineOptions, Pattern, Preset, Rewrite, Snapshot, Strategy,
    Timeline,
};

/// Engine with a zero clock so timelines are byte-identical across runs.
pub fn test_engine() -> Engine {
    EngineBuilder::new().clock(brine_core::zero_clock).build()
}

/// Loads and runs `preset` under `options`, returning the timeline.
pub fn run(preset: &Preset, options: EngineOptions) -> Timeline {
    let mut engine = test_engine();
    engine
        .load_preset(preset.clone(), options)
        .expect("preset should load");
    engine.run_until_halt().expect("run should complete")
}

pub fn rewrite(name: &str, lhs: &str, rhs: &str) -> Rewrite {
    Rewrite::parse(name, lhs, rhs).expect("rewrite should parse")
}

pub fn preset(id: &str, root: &str, rewrites: &[(&str, &str, &str)]) -> Preset {
    let mut p = Preset::new(id, id, Pattern::parse(root).expect("root should parse"));
    for (name, lhs, rhs) in rewrites {
        p = p.with_rewrite(rewrite(name, lhs, rhs));
    }
    p
}

// ── Seed scenario presets ────────────────────────────────────────────────────

/// Multiplicative identity: the product collapses into its left factor.
pub fn mul_one_preset() -> Preset {
    preset("mul-one", "*(a, 1)", &[("mul-one", "*(?x, 1)", "?x")])
}

/// Congruence via leaf merge: a ≡ b forces f(a) ≡ f(b).
pub fn leaf_merge_preset() -> Preset {
    preset("leaf-merge", "list(f(a), f(b))", &[("a-to-b", "a", "b")])
}

/// Associativity both ways; hashconsing keeps the expansion finite.
pub fn assoc_preset() -> Preset {
    preset(
        "assoc",
        "+(+(a, b), c)",
        &[
            ("assoc-left", "+(?a, +(?b, ?c))", "+(+(?a, ?b), ?c)"),
            ("assoc-right", "+(+(?a, ?b), ?c)", "+(?a, +(?b, ?c))"),
        ],
    )
}

/// Commutativity; saturates once both orderings exist.
pub fn comm_preset() -> Preset {
    preset("comm", "*(a, b)", &[("comm", "*(?x, ?y)", "*(?y, ?x)")])
}

/// Cascading leaf merges that collapse the f- and g-towers.
pub fn cascade_preset() -> Preset {
    preset(
        "cascade",
        "list(g(f(a)), g(f(b)), g(f(c)))",
        &[("a-to-b", "a", "b"), ("b-to-c", "b", "c")],
    )
}

/// Self-referential rule; the graph becomes its own parent.
pub fn cycle_preset() -> Preset {
    preset("cycle", "a", &[("grow", "a", "f(a)")])
}

// ── Snapshot inspection helpers ──────────────────────────────────────────────

/// Canonical ids that are their own representative in `snapshot`.
pub fn canonical_classes(snapshot: &Snapshot) -> Vec<EClassId> {
    snapshot
        .eclasses
        .iter()
        .map(|c| c.view.id)
        .filter(|&id| {
            snapshot
                .union_find
                .get(id.index())
                .is_some_and(|s| s.is_canonical)
        })
        .collect()
}

/// Renders the canonical key of a node view under `snapshot`'s union-find.
pub fn canonical_key(snapshot: &Snapshot, op: &str, args: &[EClassId]) -> String {
    if args.is_empty() {
        return op.to_owned();
    }
    let rendered: Vec<String> = args
        .iter()
        .map(|&a| {
            snapshot
                .canonical_of(a)
                .unwrap_or(a)
                .to_string()
        })
        .collect();
    format!("{}({})", op, rendered.join(","))
}

/// The hashcons image of a final snapshot: canonical key → canonical class.
pub fn hashcons_image(snapshot: &Snapshot) -> BTreeMap<String, EClassId> {
    let mut image = BTreeMap::new();
    for class in &snapshot.eclasses {
        let id = class.view.id;
        if !snapshot
            .union_find
            .get(id.index())
            .is_some_and(|s| s.is_canonical)
        {
            continue;
        }
        for node in &class.view.nodes {
            image.insert(canonical_key(snapshot, &node.op, &node.args), id);
        }
    }
    image
}

/// The canonical partition as sets of node keys per class.
pub fn partition(snapshot: &Snapshot) -> BTreeSet<Vec<String>> {
    let mut out = BTreeSet::new();
    for class in &snapshot.eclasses {
        let id = class.view.id;
        if !snapshot
            .union_find
            .get(id.index())
            .is_some_and(|s| s.is_canonical)
        {
            continue;
        }
        let keys: Vec<String> = class
            .view
            .nodes
            .iter()
            .map(|n| canonical_key(snapshot, &n.op, &n.args))
            .collect();
        out.insert(keys);
    }
    out
}

/// Structural search: the canonical class containing a concrete term, walking
/// class views the way the matcher walks the class map.
pub fn class_of_term(snapshot: &Snapshot, pattern: &Pattern) -> Option<EClassId> {
    let classes = canonical_classes(snapshot);
    classes
        .into_iter()
        .find(|&c| class_matches(snapshot, c, pattern))
}

fn class_matches(snapshot: &Snapshot, class: EClassId, pattern: &Pattern) -> bool {
    let Some(entry) = snapshot.class(class) else {
        return false;
    };
    match pattern {
        Pattern::Var(_) => true,
        Pattern::Pinned(id) => snapshot.canonical_of(*id) == Some(class),
        Pattern::Literal(op) => entry
            .view
            .nodes
            .iter()
            .any(|n| n.args.is_empty() && n.op == *op),
        Pattern::App { op, args } => entry.view.nodes.iter().any(|n| {
            n.op == *op
                && n.args.len() == args.len()
                && n.args.iter().zip(args).all(|(&a, sub)| {
                    snapshot
                        .canonical_of(a)
                        .is_some_and(|c| class_matches(snapshot, c, sub))
                })
        }),
    }
}

/// Phase labels of a timeline, for shape assertions.
pub fn phase_labels(timeline: &Timeline) -> Vec<&'static str> {
    timeline.states.iter().map(|s| s.phase.label()).collect()
}

/// Eager and deferred options with the zero clock's defaults.
pub fn eager() -> EngineOptions {
    EngineOptions::new(Strategy::Eager)
}

pub fn deferred() -> EngineOptions {
    EngineOptions::new(Strategy::Deferred)
}
