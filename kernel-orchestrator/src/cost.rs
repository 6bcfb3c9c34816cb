//! Per-model cost table for live cost estimation.

use rust_decimal::Decimal;
use std::collections::HashMap;

/// Dollars per million input/output tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCost {
    /// $/million input tokens.
    pub input_per_million: Decimal,
    /// $/million output tokens.
    pub output_per_million: Decimal,
}

impl ModelCost {
    /// Build a cost entry from per-million-token dollar amounts.
    pub const fn new(input_per_million: Decimal, output_per_million: Decimal) -> Self {
        Self { input_per_million, output_per_million }
    }

    /// Estimated cost of one turn, given token counts. Zero for either side
    /// yields zero contribution from that side.
    pub fn estimate(&self, input_tokens: u32, output_tokens: u32) -> Decimal {
        let input_cost = self.input_per_million * Decimal::from(input_tokens) / Decimal::from(1_000_000);
        let output_cost = self.output_per_million * Decimal::from(output_tokens) / Decimal::from(1_000_000);
        input_cost + output_cost
    }

    /// A small built-in default table covering a handful of well-known models.
    ///
    /// Callers extend or override entries via [`crate::OrchestratorConfig::cost_table`];
    /// an unknown model identifier simply estimates to zero rather than failing.
    pub fn default_table() -> HashMap<String, ModelCost> {
        let mut table = HashMap::new();
        table.insert(
            "claude-opus-4".to_string(),
            ModelCost::new(Decimal::new(15, 0), Decimal::new(75, 0)),
        );
        table.insert(
            "claude-sonnet-4".to_string(),
            ModelCost::new(Decimal::new(3, 0), Decimal::new(15, 0)),
        );
        table.insert(
            "claude-haiku-4".to_string(),
            ModelCost::new(Decimal::new(1, 0), Decimal::new(5, 0)),
        );
        table.insert(
            "gpt-4o".to_string(),
            ModelCost::new(Decimal::new(25, 1), Decimal::new(10, 0)),
        );
        table
    }
}
