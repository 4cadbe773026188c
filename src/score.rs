/// Lower probability bound of every score bucket, highest bucket first.
const SCORE_BUCKETS: [(f64, u8); 9] = [
    (0.80, 10),
    (0.75, 9),
    (0.70, 8),
    (0.60, 7),
    (0.50, 6),
    (0.45, 5),
    (0.40, 4),
    (0.35, 3),
    (0.30, 2),
];

/// Turns a class-1 probability into the ordinal 1-10 score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreMapper;

impl ScoreMapper {
    /// `None` when the probability is not a number.
    pub fn map(&self, probability: f64) -> Option<u8> {
        if probability.is_nan() {
            return None;
        }
        let score = SCORE_BUCKETS
            .iter()
            .find(|(bound, _)| probability >= *bound)
            .map_or(1, |(_, score)| *score);
        Some(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries() {
        let mapper = ScoreMapper;
        assert_eq!(mapper.map(0.82), Some(10));
        assert_eq!(mapper.map(0.80), Some(10));
        assert_eq!(mapper.map(0.75), Some(9));
        assert_eq!(mapper.map(0.7499), Some(8));
        assert_eq!(mapper.map(0.65), Some(7));
        assert_eq!(mapper.map(0.5), Some(6));
        assert_eq!(mapper.map(0.45), Some(5));
        assert_eq!(mapper.map(0.41), Some(4));
        assert_eq!(mapper.map(0.35), Some(3));
        assert_eq!(mapper.map(0.30), Some(2));
        assert_eq!(mapper.map(0.29), Some(1));
        assert_eq!(mapper.map(0.0), Some(1));
    }

    #[test]
    fn nan_has_no_score() {
        assert_eq!(ScoreMapper.map(f64::NAN), None);
    }
}
