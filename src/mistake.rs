use std::ops::RangeInclusive;

use rand::Rng;

use crate::config::TypingConfig;
use crate::keyboard::qwerty_adjacent_letter;

// Mistake timing is its own sub-model, separate from drift-corrected pacing.

/// Minimum pause between the last decoy character and the first backspace.
pub const REVIEW_PAUSE_MIN_MS: u64 = 40;
/// Gap after each backspace.
pub const BACKSPACE_GAP_MS: RangeInclusive<u64> = 20..=60;

const NEIGHBOUR_SHARE: f64 = 0.5;

/// A decoy run typed in place of `correct`, then erased and retyped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MistakeChunk {
    correct: Vec<char>,
    decoy: Vec<char>,
}

impl MistakeChunk {
    pub fn len(&self) -> usize {
        self.correct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correct.is_empty()
    }

    pub fn correct(&self) -> &[char] {
        &self.correct
    }

    pub fn decoy(&self) -> &[char] {
        &self.decoy
    }

    pub fn decoy_string(&self) -> String {
        self.decoy.iter().collect()
    }

    /// Backspaces needed to erase the decoy: always exactly its length.
    pub fn backspaces(&self) -> usize {
        self.decoy.len()
    }
}

/// Decides when to inject a mistake chunk and builds it.
#[derive(Debug, Default, Clone)]
pub struct MistakeInjector {
    in_flight: usize,
    injected: usize,
}

impl MistakeInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Chunks started this session.
    pub fn injected(&self) -> usize {
        self.injected
    }

    pub fn should_trigger(&self, c: char, config: &TypingConfig, rng: &mut impl Rng) -> bool {
        config.typos_enabled
            && !config.strict_pace
            && c.is_ascii_alphanumeric()
            && self.in_flight < config.max_concurrent_mistakes
            && rng.gen_range(0..100u32) < config.mistake_chance_percent
    }

    /// Build a chunk covering `source[cursor..]`, at most `max_mistake_chars` long.
    pub fn plan(
        &self,
        source: &[char],
        cursor: usize,
        config: &TypingConfig,
        rng: &mut impl Rng,
    ) -> MistakeChunk {
        let remaining = source.len().saturating_sub(cursor);
        let len = rng
            .gen_range(1..=config.max_mistake_chars.max(1))
            .min(remaining);
        let correct = source[cursor..cursor + len].to_vec();
        let decoy = decoy_for(&correct, rng);
        MistakeChunk { correct, decoy }
    }

    pub fn begin(&mut self) {
        self.in_flight += 1;
        self.injected += 1;
    }

    pub fn finish(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// One decoy letter per correct character. Letters come from the QWERTY
/// neighbours of the intended key about half the time, otherwise a-z; when the
/// first intended character is uppercase each letter is uppercased with
/// probability one half.
pub fn decoy_for(correct: &[char], rng: &mut impl Rng) -> Vec<char> {
    let upper_bias = correct.first().is_some_and(|c| c.is_ascii_uppercase());

    correct
        .iter()
        .map(|&intended| {
            let neighbour = if rng.gen_bool(NEIGHBOUR_SHARE) {
                qwerty_adjacent_letter(intended, rng)
            } else {
                None
            };
            let letter = neighbour
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or_else(|| char::from(b'a' + rng.gen_range(0..26u8)));

            if upper_bias && rng.gen_bool(0.5) {
                letter.to_ascii_uppercase()
            } else {
                letter
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn typo_config(chance: u32, max_chars: usize) -> TypingConfig {
        TypingConfig {
            mistake_chance_percent: chance,
            max_mistake_chars: max_chars,
            typos_enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn certain_chance_triggers_on_alphanumerics_only() {
        let injector = MistakeInjector::new();
        let cfg = typo_config(100, 1);
        let mut rng = StdRng::seed_from_u64(3);

        assert!(injector.should_trigger('a', &cfg, &mut rng));
        assert!(injector.should_trigger('7', &cfg, &mut rng));
        assert!(!injector.should_trigger(' ', &cfg, &mut rng));
        assert!(!injector.should_trigger('.', &cfg, &mut rng));
        assert!(!injector.should_trigger('é', &cfg, &mut rng));
    }

    #[test]
    fn disabled_by_strict_pace_typos_off_or_zero_chance() {
        let injector = MistakeInjector::new();
        let mut rng = StdRng::seed_from_u64(3);

        let strict = TypingConfig {
            strict_pace: true,
            ..typo_config(100, 1)
        };
        assert!(!injector.should_trigger('a', &strict, &mut rng));

        let off = TypingConfig {
            typos_enabled: false,
            ..typo_config(100, 1)
        };
        assert!(!injector.should_trigger('a', &off, &mut rng));

        let never = typo_config(0, 1);
        for _ in 0..1000 {
            assert!(!injector.should_trigger('a', &never, &mut rng));
        }
    }

    #[test]
    fn concurrency_cap_blocks_nested_chunks() {
        let mut injector = MistakeInjector::new();
        let cfg = typo_config(100, 1);
        let mut rng = StdRng::seed_from_u64(3);

        injector.begin();
        assert_eq!(injector.in_flight(), 1);
        assert!(!injector.should_trigger('a', &cfg, &mut rng));
        injector.finish();
        assert_eq!(injector.in_flight(), 0);
        assert!(injector.should_trigger('a', &cfg, &mut rng));
        assert_eq!(injector.injected(), 1);

        // An unbalanced finish never underflows.
        injector.finish();
        assert_eq!(injector.in_flight(), 0);
    }

    #[test]
    fn chunk_length_is_bounded_and_clamped_to_remaining_text() {
        let injector = MistakeInjector::new();
        let cfg = typo_config(100, 4);
        let source: Vec<char> = "abcdefgh".chars().collect();
        let mut rng = StdRng::seed_from_u64(11);

        let mut seen_max = false;
        for _ in 0..500 {
            let chunk = injector.plan(&source, 0, &cfg, &mut rng);
            assert!((1..=4).contains(&chunk.len()));
            seen_max |= chunk.len() == 4;
        }
        assert!(seen_max, "length should reach max_mistake_chars");

        for _ in 0..100 {
            let chunk = injector.plan(&source, 6, &cfg, &mut rng);
            assert!(chunk.len() <= 2);
            assert_eq!(chunk.correct(), &source[6..6 + chunk.len()]);
        }
    }

    #[test]
    fn backspaces_always_match_decoy_length() {
        let injector = MistakeInjector::new();
        let cfg = typo_config(100, 6);
        let source: Vec<char> = "Playback engine".chars().collect();
        let mut rng = StdRng::seed_from_u64(5);

        for cursor in 0..source.len() {
            let chunk = injector.plan(&source, cursor, &cfg, &mut rng);
            assert_eq!(chunk.backspaces(), chunk.decoy().len());
            assert_eq!(chunk.decoy().len(), chunk.len());
        }
    }

    #[test]
    fn decoys_are_letters_matching_case_bias() {
        let mut rng = StdRng::seed_from_u64(8);

        let lower = decoy_for(&['h', 'e', 'l', 'l', 'o'], &mut rng);
        assert!(lower.iter().all(|c| c.is_ascii_lowercase()));

        let mut saw_upper = false;
        for _ in 0..50 {
            let decoy = decoy_for(&['W', 'o'], &mut rng);
            assert!(decoy.iter().all(|c| c.is_ascii_alphabetic()));
            saw_upper |= decoy.iter().any(|c| c.is_ascii_uppercase());
        }
        assert!(saw_upper);
    }
}
