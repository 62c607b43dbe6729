/// Dollar rate per 1,000 tokens for one (provider, model) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl CostRate {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

/// Externally-configured pricing hook. The core never hardcodes rates; a
/// deployment supplies its own table (loaded from config, a remote price
/// list, whatever). `ZeroCostRateTable` keeps every call accounting-safe when
/// no table is wired up.
pub trait CostRateTable: Send + Sync {
    fn rate(&self, provider: &str, model: &str) -> CostRate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroCostRateTable;

impl CostRateTable for ZeroCostRateTable {
    fn rate(&self, _provider: &str, _model: &str) -> CostRate {
        CostRate::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_table_never_charges() {
        let table = ZeroCostRateTable;
        assert_eq!(table.rate("openai", "gpt-4o").cost(1_000_000, 1_000_000), 0.0);
    }

    #[test]
    fn cost_scales_with_tokens() {
        let rate = CostRate {
            input_per_1k: 0.01,
            output_per_1k: 0.03,
        };
        assert_eq!(rate.cost(2000, 1000), 0.02 + 0.03);
    }
}
