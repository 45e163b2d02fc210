//! Invariant 6: `TotalCount = len(Items)`, `FilteredCount <= TotalCount`,
//! and filtered elements are exactly those for which `Filter` is truthy.

use compozy_core::ids::TaskId;
use compozy_core::task_config::{BaseConfig, BasicConfig, CollectionConfig, CollectionMode, TaskConfig};
use compozy_normalizer::{evaluate_collection, NormalizationContext};
use compozy_template::TemplateEngine;
use proptest::prelude::*;
use serde_json::json;

fn item_template() -> TaskConfig {
    TaskConfig::Basic(BasicConfig {
        base: BaseConfig {
            id: TaskId::from("child"),
            ..Default::default()
        },
        action: "noop".into(),
    })
}

proptest! {
    #[test]
    fn filtered_count_never_exceeds_total_and_matches_predicate(flags in proptest::collection::vec(any::<bool>(), 0..20)) {
        let users: Vec<_> = flags.iter().map(|&active| json!({"active": active})).collect();
        let expected_filtered = flags.iter().filter(|&&f| f).count();

        let cfg = CollectionConfig {
            base: BaseConfig { id: TaskId::from("coll"), ..Default::default() },
            items: "{{ workflow.input.users }}".into(),
            filter: Some("{{ item.active }}".into()),
            item_var: "item".into(),
            index_var: "index".into(),
            mode: CollectionMode::Sequential,
            batch: None,
            task: Box::new(item_template()),
        };

        let engine = TemplateEngine::default();
        let vars = json!({"workflow": {"input": {"users": users}}});
        let ctx = NormalizationContext::new(vars, &engine, 10_000);

        let evaluation = evaluate_collection(&cfg, &ctx).unwrap();
        prop_assert_eq!(evaluation.total_count, flags.len());
        prop_assert!(evaluation.filtered_count <= evaluation.total_count);
        prop_assert_eq!(evaluation.filtered_count, expected_filtered);
    }
}
