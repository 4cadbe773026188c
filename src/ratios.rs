use std::collections::BTreeMap;

/// `numerator / denominator`, or exactly 0 when the divisor is zero or
/// either operand is not finite.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if !numerator.is_finite() || !denominator.is_finite() || denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Pairwise ratios inside one feature group.
#[derive(Debug, Clone)]
pub struct RatioExpander {
    columns: Vec<String>,
}

impl RatioExpander {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Names produced by `expand`, two per unordered pair.
    pub fn output_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.columns.len() * self.columns.len());
        for (i, a) in self.columns.iter().enumerate() {
            for b in &self.columns[i + 1..] {
                names.push(format!("{}_to_{}", a, b));
                names.push(format!("{}_to_{}", b, a));
            }
        }
        names
    }

    /// Writes every `a_to_b` and `b_to_a` into `out`. A group column absent
    /// from `values` counts as non-finite.
    pub fn expand(&self, values: &BTreeMap<String, f64>, out: &mut BTreeMap<String, f64>) {
        for (i, a) in self.columns.iter().enumerate() {
            let va = values.get(a).copied().unwrap_or(f64::NAN);
            for b in &self.columns[i + 1..] {
                let vb = values.get(b).copied().unwrap_or(f64::NAN);
                out.insert(format!("{}_to_{}", a, b), safe_ratio(va, vb));
                out.insert(format!("{}_to_{}", b, a), safe_ratio(vb, va));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_non_finite_operands_give_zero() {
        assert_eq!(safe_ratio(1.0, 0.0), 0.0);
        assert_eq!(safe_ratio(f64::NAN, 2.0), 0.0);
        assert_eq!(safe_ratio(2.0, f64::INFINITY), 0.0);
        assert_eq!(safe_ratio(6.0, 3.0), 2.0);
        assert_eq!(safe_ratio(f64::MAX, 1e-300), 0.0);
    }

    #[test]
    fn expand_produces_both_directions() {
        let expander = RatioExpander::new(["a", "b", "c"]);
        let values: BTreeMap<String, f64> =
            [("a".to_string(), 4.0), ("b".to_string(), 0.0), ("c".to_string(), 2.0)]
                .into_iter()
                .collect();
        let mut out = BTreeMap::new();
        expander.expand(&values, &mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(out["a_to_b"], 0.0);
        assert_eq!(out["b_to_a"], 0.0);
        assert_eq!(out["a_to_c"], 2.0);
        assert_eq!(out["c_to_a"], 0.5);
        let names: Vec<String> = out.keys().cloned().collect();
        let mut expected = expander.output_names();
        expected.sort();
        assert_eq!(names, expected);
    }
}
