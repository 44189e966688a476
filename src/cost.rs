//! Token cost estimation.
//!
//! Cost is observability only: an unknown model yields zero cost and a
//! warning, never an error.
use crate::session::Session;
use std::collections::BTreeSet;

/// USD per million tokens, input and output priced independently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const fn price(input_per_million: f64, output_per_million: f64) -> ModelPricing {
    ModelPricing {
        input_per_million,
        output_per_million,
    }
}

const PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-4o", price(2.50, 10.00)),
    ("gpt-4o-mini", price(0.15, 0.60)),
    ("gpt-4.1", price(2.00, 8.00)),
    ("gpt-4.1-mini", price(0.40, 1.60)),
    ("gpt-4.1-nano", price(0.10, 0.40)),
    ("gpt-4-turbo", price(10.00, 30.00)),
    ("gpt-4", price(30.00, 60.00)),
    ("gpt-3.5-turbo", price(0.50, 1.50)),
    ("o1", price(15.00, 60.00)),
    ("o3", price(2.00, 8.00)),
    ("o4-mini", price(1.10, 4.40)),
    ("claude-3-5-sonnet", price(3.00, 15.00)),
    ("claude-3-7-sonnet", price(3.00, 15.00)),
    ("claude-sonnet-4", price(3.00, 15.00)),
    ("claude-3-5-haiku", price(0.80, 4.00)),
    ("claude-3-haiku", price(0.25, 1.25)),
    ("claude-3-opus", price(15.00, 75.00)),
    ("claude-opus-4", price(15.00, 75.00)),
];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallCost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Exact model name first, then the longest matching family prefix.
pub fn lookup_pricing(model: &str) -> Option<ModelPricing> {
    if let Some((_, pricing)) = PRICING.iter().find(|(name, _)| *name == model) {
        return Some(*pricing);
    }
    PRICING
        .iter()
        .filter(|(name, _)| model.starts_with(name))
        .max_by_key(|(name, _)| name.len())
        .map(|(_, pricing)| *pricing)
}

pub fn cost_with(pricing: ModelPricing, input_tokens: u64, output_tokens: u64) -> CallCost {
    let input_cost = input_tokens as f64 * pricing.input_per_million / 1_000_000.0;
    let output_cost = output_tokens as f64 * pricing.output_per_million / 1_000_000.0;
    CallCost {
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

/// Accumulates usage into a session and remembers which unknown models were
/// already reported.
#[derive(Debug, Default)]
pub struct CostTracker {
    unpriced_reported: BTreeSet<String>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cost(&mut self, model: &str, input_tokens: u64, output_tokens: u64) -> CallCost {
        match lookup_pricing(model) {
            Some(pricing) => cost_with(pricing, input_tokens, output_tokens),
            None => {
                if self.unpriced_reported.insert(model.to_string()) {
                    tracing::warn!(model, "no pricing known for model; cost not tracked");
                }
                CallCost::default()
            }
        }
    }

    /// Add one call's usage to the session totals and return its cost.
    pub fn record(
        &mut self,
        session: &mut Session,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> CallCost {
        let cost = self.cost(model, input_tokens, output_tokens);
        session.total_input_tokens += input_tokens;
        session.total_output_tokens += output_tokens;
        session.estimated_cost += cost.total_cost;
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_beats_prefix() {
        let mini = lookup_pricing("gpt-4o-mini").unwrap();
        assert_eq!(mini.input_per_million, 0.15);
        let full = lookup_pricing("gpt-4o").unwrap();
        assert_eq!(full.input_per_million, 2.50);
    }

    #[test]
    fn dated_model_names_use_longest_prefix() {
        let pricing = lookup_pricing("gpt-4o-mini-2024-07-18").unwrap();
        assert_eq!(pricing.output_per_million, 0.60);
        let pricing = lookup_pricing("claude-3-5-haiku-20241022").unwrap();
        assert_eq!(pricing.input_per_million, 0.80);
    }

    #[test]
    fn unknown_model_costs_nothing() {
        let mut tracker = CostTracker::new();
        assert_eq!(tracker.cost("llama-local", 1_000, 1_000), CallCost::default());
    }

    #[test]
    fn one_million_tokens_costs_list_price() {
        let mut tracker = CostTracker::new();
        let cost = tracker.cost("claude-sonnet-4-20250514", 1_000_000, 1_000_000);
        assert!((cost.input_cost - 3.0).abs() < 1e-9);
        assert!((cost.output_cost - 15.0).abs() < 1e-9);
        assert!((cost.total_cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn session_totals_are_additive() {
        let calls: [(u64, u64); 5] = [
            (1_200, 800),
            (15_000, 4_000),
            (0, 0),
            (7, 3),
            (250_000, 16_384),
        ];
        let mut tracker = CostTracker::new();
        let mut session = Session::new();
        for (input, output) in calls {
            tracker.record(&mut session, "gpt-4.1", input, output);
        }
        // gpt-4.1: $2.00 in, $8.00 out per million tokens.
        let expected: f64 = calls
            .iter()
            .map(|(input, output)| (*input as f64 * 2.00 + *output as f64 * 8.00) / 1_000_000.0)
            .sum();
        assert!((expected - 0.701_91).abs() < 1e-9);
        assert!((session.estimated_cost - expected).abs() < 1e-9);
        assert_eq!(
            session.total_input_tokens,
            calls.iter().map(|(i, _)| i).sum::<u64>()
        );
        assert_eq!(
            session.total_output_tokens,
            calls.iter().map(|(_, o)| o).sum::<u64>()
        );
    }
}
