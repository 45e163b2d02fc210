//! Token/cost usage aggregation, merged by `(provider, model)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: Option<f64>,
}

impl UsageEntry {
    fn accumulate(&mut self, other: &UsageEntry) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.cost = match (self.cost, other.cost) {
            (Some(a), Some(b)) => Some(a + b),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub entries: Vec<UsageEntry>,
}

impl Usage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `summary` into `self`, keyed by `(provider, model)`. Commutative
    /// and associative: the entry set and each entry's totals do not depend
    /// on merge order, so concurrent `MergeUsage` callers never race each
    /// other into an inconsistent total.
    pub fn merge(&mut self, summary: &Usage) {
        for incoming in &summary.entries {
            match self
                .entries
                .iter_mut()
                .find(|e| e.provider == incoming.provider && e.model == incoming.model)
            {
                Some(existing) => existing.accumulate(incoming),
                None => self.entries.push(incoming.clone()),
            }
        }
        self.entries.sort_by(|a, b| (&a.provider, &a.model).cmp(&(&b.provider, &b.model)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_entry() -> impl Strategy<Value = UsageEntry> {
        ("provider-a|provider-b", "model-x|model-y", 0u64..1000, 0u64..1000).prop_map(
            |(provider, model, prompt, completion)| UsageEntry {
                provider: provider.to_string(),
                model: model.to_string(),
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
                cost: None,
            },
        )
    }

    proptest! {
        #[test]
        fn merge_is_commutative(a in proptest::collection::vec(arb_entry(), 0..6), b in proptest::collection::vec(arb_entry(), 0..6)) {
            let mut left = Usage { entries: a.clone() };
            left.merge(&Usage { entries: b.clone() });

            let mut right = Usage { entries: b };
            right.merge(&Usage { entries: a });

            prop_assert_eq!(left, right);
        }
    }

    #[test]
    fn merge_accumulates_same_provider_model_pair() {
        let mut usage = Usage {
            entries: vec![UsageEntry {
                provider: "openai".into(),
                model: "gpt-4".into(),
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
                cost: Some(0.1),
            }],
        };
        usage.merge(&Usage {
            entries: vec![UsageEntry {
                provider: "openai".into(),
                model: "gpt-4".into(),
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
                cost: Some(0.05),
            }],
        });
        assert_eq!(usage.entries.len(), 1);
        assert_eq!(usage.entries[0].total_tokens, 20);
        assert!((usage.entries[0].cost.unwrap() - 0.15).abs() < 1e-9);
    }
}
