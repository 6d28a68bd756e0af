//! Periodic eligibility scheduling for cyclic keys.
//!
//! Every word of a vocabulary gets a window inside a repeating period during
//! which it may be chosen. Word `i` of `N` gets a window `P*(N-i)/N` long, so
//! early words are eligible most of the time and the full cardinality of the
//! vocabulary only shows up gradually. Word 0's window spans the whole period,
//! so every instant has at least one eligible word.

use std::time::Duration;

use crate::Rng;

/// Random probes attempted before falling back to a linear scan.
const PROBES: usize = 5;

/// Errors produced when building a [`PeriodicEligibility`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The vocabulary is empty
    #[error("eligibility vocabulary must not be empty")]
    EmptyVocabulary,
    /// The period is zero
    #[error("eligibility period must be greater than zero")]
    ZeroPeriod,
}

/// A half-open window `[start, end)` inside the period during which `word`
/// may be chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityPeriod {
    /// The word this window belongs to
    pub word: String,
    /// Window start, offset from the beginning of the period
    pub start: Duration,
    /// Window end, exclusive
    pub end: Duration,
}

impl EligibilityPeriod {
    fn contains(&self, t: Duration) -> bool {
        self.start <= t && t < self.end
    }
}

/// Answers which word of a vocabulary is eligible at a point in time.
#[derive(Debug, Clone)]
pub struct PeriodicEligibility {
    periods: Vec<EligibilityPeriod>,
    period: Duration,
}

impl PeriodicEligibility {
    /// Build windows for `words` over `period`.
    ///
    /// # Errors
    ///
    /// Fails if `words` is empty or `period` is zero.
    pub fn new<S>(rng: &mut Rng, words: &[S], period: Duration) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        if words.is_empty() {
            return Err(Error::EmptyVocabulary);
        }
        if period.is_zero() {
            return Err(Error::ZeroPeriod);
        }
        let cardinality = words.len() as u128;
        let total = period.as_nanos();
        let periods = words
            .iter()
            .enumerate()
            .map(|(i, word)| {
                let remaining = cardinality - i as u128;
                let length = nanos(total * remaining / cardinality);
                let slack = period - length;
                let start = slack.mul_f64(rng.float(0.0, 1.0)).min(slack);
                EligibilityPeriod {
                    word: word.as_ref().to_string(),
                    start,
                    end: start + length,
                }
            })
            .collect();
        Ok(Self { periods, period })
    }

    /// The windows, in vocabulary order.
    #[must_use]
    pub fn periods(&self) -> &[EligibilityPeriod] {
        &self.periods
    }

    /// The repeating period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    fn offset(&self, elapsed: Duration) -> Duration {
        nanos(elapsed.as_nanos() % self.period.as_nanos())
    }

    /// Choose a word eligible at `elapsed`.
    ///
    /// A few uniform probes are tried first, then a scan of all windows.
    pub fn eligible_word(&self, rng: &mut Rng, elapsed: Duration) -> &str {
        let t = self.offset(elapsed);
        for _ in 0..PROBES {
            let probe = &self.periods[rng.intn(self.periods.len())];
            if probe.contains(t) {
                return &probe.word;
            }
        }
        self.eligible_word_fallback(rng, elapsed)
    }

    /// Every word eligible at `elapsed`, in vocabulary order.
    #[must_use]
    pub fn eligible_words(&self, elapsed: Duration) -> Vec<&str> {
        let t = self.offset(elapsed);
        self.periods
            .iter()
            .filter(|p| p.contains(t))
            .map(|p| p.word.as_str())
            .collect()
    }

    /// Choose uniformly among every word eligible at `elapsed`, or the first
    /// word if none is.
    pub fn eligible_word_fallback(&self, rng: &mut Rng, elapsed: Duration) -> &str {
        let eligible = self.eligible_words(elapsed);
        match rng.choice(&eligible) {
            Some(word) => *word,
            None => &self.periods[0].word,
        }
    }
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Exact for any `n` derived from a `Duration`.
fn nanos(n: u128) -> Duration {
    let secs = u64::try_from(n / NANOS_PER_SEC).unwrap_or(u64::MAX);
    let subsec = u32::try_from(n % NANOS_PER_SEC).unwrap_or_default();
    Duration::new(secs, subsec)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::{Error, PeriodicEligibility};
    use crate::{Rng, words::NOUNS};

    #[test]
    fn windows_fit_inside_period() {
        let mut rng = Rng::from_seed_str("windows");
        let period = Duration::from_secs(60);
        let pe = PeriodicEligibility::new(&mut rng, &NOUNS[..50], period).expect("valid");
        let mut last_len = Duration::MAX;
        for p in pe.periods() {
            assert!(p.end <= period, "{p:?}");
            let len = p.end - p.start;
            assert!(len <= last_len);
            last_len = len;
        }
        assert_eq!(pe.periods()[0].start, Duration::ZERO);
        assert_eq!(pe.periods()[0].end, period);
    }

    #[test]
    fn long_periods_keep_the_first_window_whole() {
        let mut rng = Rng::from_seed_str("long");
        let period = Duration::from_secs(20_000_000_000);
        let pe = PeriodicEligibility::new(&mut rng, &NOUNS[..10], period).expect("valid");
        assert_eq!(pe.periods()[0].start, Duration::ZERO);
        assert_eq!(pe.periods()[0].end, period);
        for p in pe.periods() {
            assert!(p.end <= period, "{p:?}");
        }
        let last = period - Duration::from_nanos(1);
        assert!(pe.eligible_words(last).contains(&NOUNS[0]));
    }

    #[test]
    fn rejects_degenerate_input() {
        let mut rng = Rng::from_seed_str("degenerate");
        let empty: [&str; 0] = [];
        assert_eq!(
            PeriodicEligibility::new(&mut rng, &empty, Duration::from_secs(1)).unwrap_err(),
            Error::EmptyVocabulary
        );
        assert_eq!(
            PeriodicEligibility::new(&mut rng, &["a"], Duration::ZERO).unwrap_err(),
            Error::ZeroPeriod
        );
    }

    #[test]
    fn chosen_word_is_eligible() {
        let mut rng = Rng::from_seed_str("chosen");
        let pe = PeriodicEligibility::new(&mut rng, &NOUNS[..20], Duration::from_secs(10))
            .expect("valid");
        for ms in (0..30_000).step_by(37) {
            let elapsed = Duration::from_millis(ms);
            let word = pe.eligible_word(&mut rng, elapsed).to_string();
            assert!(pe.eligible_words(elapsed).contains(&word.as_str()));
        }
    }

    #[test]
    fn cardinality_grows_through_the_period() {
        let mut rng = Rng::from_seed_str("gradual");
        let pe = PeriodicEligibility::new(&mut rng, &NOUNS[..40], Duration::from_secs(100))
            .expect("valid");
        let counts: Vec<usize> = (0..100)
            .map(|s| pe.eligible_words(Duration::from_secs(s)).len())
            .collect();
        assert!(counts.iter().any(|&c| c < 40));
        assert!(counts.iter().all(|&c| c >= 1));
    }

    proptest! {
        #[test]
        fn every_instant_is_covered(
            seed: u64,
            n in 1_usize..200,
            period_ms in 1_u64..1_000_000,
            t_ms: u64,
        ) {
            let mut rng = Rng::with_stream("covering", seed);
            let words: Vec<String> = (0..n).map(|i| format!("w{i}")).collect();
            let pe = PeriodicEligibility::new(&mut rng, &words, Duration::from_millis(period_ms))
                .expect("valid");
            let elapsed = Duration::from_millis(t_ms);
            prop_assert!(!pe.eligible_words(elapsed).is_empty());
            let word = pe.eligible_word_fallback(&mut rng, elapsed);
            prop_assert!(words.iter().any(|w| w == word));
        }
    }
}
