//! Test-runner output parsing.
//!
//! Grading trusts the counts a test runner prints over its exit code, so
//! the parser recognizes a prioritized sequence of common output formats.
//! Unrecognized output parses to all-zero counts (and therefore a zero
//! score) rather than failing.

use std::sync::OnceLock;

use regex::Regex;

/// Pass/fail/total counts extracted from test-runner output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

enum PatternShape {
    /// Captures (passed, failed, total).
    PassFailTotal,
    /// Captures (passed, total); failures are not reported separately.
    PassTotal,
    /// Captures (passed, failed); total is their sum.
    PassFail,
    /// Captures (passed); everything ran passed.
    PassOnly,
}

struct TestPattern {
    regex: Regex,
    shape: PatternShape,
}

/// Recognized formats, most specific first:
/// jest/vitest triple, jest pass-only, generic pass/fail pair, generic
/// pass-only.
fn patterns() -> &'static [TestPattern] {
    static PATTERNS: OnceLock<Vec<TestPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                r"(?is)Tests:\s*(\d+)\s*passed.*?(\d+)\s*failed.*?(\d+)\s*total",
                PatternShape::PassFailTotal,
            ),
            (
                r"(?is)Tests:\s*(\d+)\s*passed.*?(\d+)\s*total",
                PatternShape::PassTotal,
            ),
            (r"(?is)(\d+)\s*pass.*?(\d+)\s*fail", PatternShape::PassFail),
            (r"(?i)(\d+)\s*pass", PatternShape::PassOnly),
        ]
        .into_iter()
        .filter_map(|(pattern, shape)| {
            Regex::new(pattern).ok().map(|regex| TestPattern { regex, shape })
        })
        .collect()
    })
}

/// Parses pass/fail/total counts out of combined test-runner output.
pub fn parse_test_output(output: &str) -> TestCounts {
    for pattern in patterns() {
        if let Some(caps) = pattern.regex.captures(output) {
            let group = |idx: usize| -> u32 {
                caps.get(idx)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0)
            };

            return match pattern.shape {
                PatternShape::PassFailTotal => TestCounts {
                    passed: group(1),
                    failed: group(2),
                    total: group(3),
                },
                PatternShape::PassTotal => TestCounts {
                    passed: group(1),
                    failed: 0,
                    total: group(2),
                },
                PatternShape::PassFail => {
                    let passed = group(1);
                    let failed = group(2);
                    TestCounts {
                        passed,
                        failed,
                        total: passed + failed,
                    }
                }
                PatternShape::PassOnly => {
                    let passed = group(1);
                    TestCounts {
                        passed,
                        failed: 0,
                        total: passed,
                    }
                }
            };
        }
    }

    TestCounts::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jest_triple() {
        let counts = parse_test_output("Tests: 8 passed, 2 failed, 10 total");
        assert_eq!(
            counts,
            TestCounts {
                passed: 8,
                failed: 2,
                total: 10
            }
        );
    }

    #[test]
    fn test_jest_pass_only() {
        let counts = parse_test_output("Tests:  12 passed, 12 total\nSnapshots: 0 total");
        assert_eq!(
            counts,
            TestCounts {
                passed: 12,
                failed: 0,
                total: 12
            }
        );
    }

    #[test]
    fn test_generic_pass_fail_pair_across_lines() {
        let counts = parse_test_output("42 pass\n3 fail");
        assert_eq!(
            counts,
            TestCounts {
                passed: 42,
                failed: 3,
                total: 45
            }
        );
    }

    #[test]
    fn test_generic_pass_only() {
        let counts = parse_test_output("ok: 7 pass (11ms)");
        assert_eq!(
            counts,
            TestCounts {
                passed: 7,
                failed: 0,
                total: 7
            }
        );
    }

    #[test]
    fn test_unrecognized_output_is_zero() {
        let counts = parse_test_output("Segmentation fault (core dumped)");
        assert_eq!(counts, TestCounts::default());
    }

    #[test]
    fn test_triple_beats_pair_priority() {
        // The pair pattern would also match here; the triple must win.
        let counts = parse_test_output("Tests: 3 passed, 1 failed, 4 total");
        assert_eq!(counts.total, 4);
        assert_eq!(counts.failed, 1);
    }
}
