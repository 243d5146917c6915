//! Truncation guard — distrusts suspiciously short stage-2 extractions.

/// Thresholds for the truncation heuristic.
///
/// The rule is deliberately asymmetric: when stage-1 produced a substantial
/// text and stage-2's extraction is much shorter, the extraction is assumed
/// to be a lossy artifact of the lighter model, NOT a correctly-found short
/// message. The full stage-1 text is substituted in that case. Testers
/// should expect false "truncation" flags on genuinely short extractions
/// from long sources — that trade-off is intentional.
#[derive(Debug, Clone, Copy)]
pub struct TruncationPolicy {
    /// Stage-1 texts at or below this length are never overridden.
    pub min_source_len: usize,
    /// Extractions shorter than this fraction of the source are overridden.
    pub min_keep_ratio: f64,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self {
            min_source_len: 100,
            min_keep_ratio: 0.3,
        }
    }
}

impl TruncationPolicy {
    /// Whether an extraction of `extracted_len` chars from a source of
    /// `source_len` chars should be treated as truncated.
    ///
    /// Lengths are character counts, not byte counts; emoji-heavy titles
    /// must not cross the threshold early.
    pub fn is_truncated(&self, source_len: usize, extracted_len: usize) -> bool {
        source_len > self.min_source_len
            && (extracted_len as f64) < (source_len as f64) * self.min_keep_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_source_never_truncated() {
        let policy = TruncationPolicy::default();
        assert!(!policy.is_truncated(100, 0));
        assert!(!policy.is_truncated(50, 5));
    }

    #[test]
    fn short_extraction_from_long_source_is_truncated() {
        let policy = TruncationPolicy::default();
        assert!(policy.is_truncated(101, 30));
        assert!(policy.is_truncated(800, 100));
    }

    #[test]
    fn ratio_boundary() {
        let policy = TruncationPolicy::default();
        // 0.3 × 1000 = 300: strictly-less-than comparison.
        assert!(policy.is_truncated(1000, 299));
        assert!(!policy.is_truncated(1000, 300));
    }

    #[test]
    fn clean_long_extraction_not_truncated() {
        let policy = TruncationPolicy::default();
        assert!(!policy.is_truncated(800, 750));
    }
}
