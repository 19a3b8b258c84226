//! Input mutation: small random perturbations of the seed, gated by a
//! caller-supplied validity predicate.
//!
//! The production predicate — "the target still spawns a thread on this
//! input" — involves running the program and stays outside this tool; the
//! mutator only needs a closure.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;

use anyhow::{Result, ensure};

const ASCII_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ASCII_DIGITS: &[u8] = b"0123456789";
const ASCII_PUNCTUATION: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
const ASCII_WHITESPACE: &[u8] = b" \t\n\r\x0b\x0c";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Change,
    New,
    Delete,
}

const METHODS: [Method; 3] = [Method::Change, Method::New, Method::Delete];
const METHOD_WEIGHTS: [u32; 3] = [10, 1, 1];

/// Derive a replacement byte from `x`: one of six generator families chosen
/// uniformly — arithmetic neighbors, letters, digits, punctuation,
/// whitespace, or any byte.
fn mutate_byte<R: Rng>(x: u8, rng: &mut R) -> u8 {
    match rng.gen_range(0..6u8) {
        0 => *[
            x.wrapping_add(1),
            x.wrapping_sub(1),
            x ^ 1,
            x.wrapping_shl(1),
            x.wrapping_shr(1),
        ]
        .choose(rng)
        .expect("non-empty"),
        1 => *ASCII_LETTERS.choose(rng).expect("non-empty"),
        2 => *ASCII_DIGITS.choose(rng).expect("non-empty"),
        3 => *ASCII_PUNCTUATION.choose(rng).expect("non-empty"),
        4 => *ASCII_WHITESPACE.choose(rng).expect("non-empty"),
        _ => rng.gen_range(0..=255u8),
    }
}

/// Applies validated mutation steps to an input buffer in place.
pub struct Mutator<F> {
    checker: F,
}

impl<F> Mutator<F>
where
    F: FnMut(&[u8]) -> bool,
{
    pub fn new(checker: F) -> Self {
        Self { checker }
    }

    /// Apply `num` accepted mutation steps; candidates failing the validity
    /// predicate are discarded and re-rolled.
    pub fn mutate<R: Rng>(&mut self, input: &mut Vec<u8>, num: usize, rng: &mut R) -> Result<()> {
        ensure!((self.checker)(input), "input seed rejected by the validity predicate");
        let mut changed = 0;
        while changed < num {
            let candidate = Self::mutate_once(input, rng);
            if (self.checker)(&candidate) {
                *input = candidate;
                changed += 1;
            }
        }
        Ok(())
    }

    fn mutate_once<R: Rng>(input: &[u8], rng: &mut R) -> Vec<u8> {
        let n = input.len();
        let loc = rng.gen_range(0..=n);
        let (method, value) = if loc == n {
            // one past the end: always grow
            (Method::New, rng.gen_range(0..=255u8))
        } else {
            let index = WeightedIndex::new(METHOD_WEIGHTS)
                .expect("static weights")
                .sample(rng);
            (METHODS[index], input[loc])
        };
        let value = mutate_byte(value, rng);
        let mut out = input.to_vec();
        match method {
            Method::New => out.insert(loc, value),
            Method::Delete => {
                out.remove(loc);
            }
            Method::Change => out[loc] = value,
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn applies_the_requested_number_of_steps() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut mutator = Mutator::new(|_: &[u8]| true);
        let mut input = b"hello world".to_vec();
        mutator.mutate(&mut input, 4, &mut rng).unwrap();
        assert!(!input.is_empty());
    }

    #[test]
    fn rejected_candidates_are_rerolled() {
        let mut rng = StdRng::seed_from_u64(2);
        // only accept even lengths; the seed has one
        let mut mutator = Mutator::new(|b: &[u8]| b.len() % 2 == 0);
        let mut input = vec![0u8; 8];
        mutator.mutate(&mut input, 3, &mut rng).unwrap();
        assert_eq!(input.len() % 2, 0);
    }

    #[test]
    fn invalid_seed_is_refused() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut mutator = Mutator::new(|_: &[u8]| false);
        let mut input = vec![1u8];
        assert!(mutator.mutate(&mut input, 1, &mut rng).is_err());
    }

    #[test]
    fn mutation_is_deterministic_per_seed() {
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut mutator = Mutator::new(|_: &[u8]| true);
            let mut input = b"seed-bytes".to_vec();
            mutator.mutate(&mut input, 5, &mut rng).unwrap();
            input
        };
        assert_eq!(run(9), run(9));
        assert_ne!(run(9), run(10));
    }

    #[test]
    fn empty_input_can_only_grow() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut mutator = Mutator::new(|_: &[u8]| true);
        let mut input = Vec::new();
        mutator.mutate(&mut input, 1, &mut rng).unwrap();
        assert_eq!(input.len(), 1);
    }
}
