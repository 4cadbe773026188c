/// Next-period direction labels for a price sequence in date order.
/// `Some(1)` when the next price is strictly higher, `Some(0)` otherwise.
/// The last element is `None`: the live row has no next price.
pub fn generate_labels(prices: &[f64]) -> Vec<Option<u8>> {
    let mut labels: Vec<Option<u8>> = prices
        .windows(2)
        .map(|pair| Some(u8::from(pair[1] > pair[0])))
        .collect();
    if !prices.is_empty() {
        labels.push(None);
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_is_one_only_on_strict_increase() {
        let labels = generate_labels(&[10.0, 11.0, 11.0, 9.0, 12.0]);
        assert_eq!(labels, vec![Some(1), Some(0), Some(0), Some(1), None]);
    }

    #[test]
    fn single_and_empty_inputs() {
        assert_eq!(generate_labels(&[5.0]), vec![None]);
        assert!(generate_labels(&[]).is_empty());
    }
}
