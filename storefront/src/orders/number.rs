//! Order numbers
//!
//! `FC` + UTC date + seconds of day + random suffix, e.g. `FC241019-52311-K7QD`.
//! Collisions are possible and handled by the store retrying with a fresh one.

use chrono::{DateTime, Timelike, Utc};
use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate(now_millis: i64) -> String {
    let at = DateTime::<Utc>::from_timestamp_millis(now_millis).unwrap_or_else(Utc::now);
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!(
        "FC{}-{:05}-{}",
        at.format("%y%m%d"),
        at.num_seconds_from_midnight(),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        // 2024-10-19T14:31:51Z
        let number = generate(1_729_348_311_000);
        assert!(number.starts_with("FC241019-52311-"), "{number}");
        assert_eq!(number.len(), "FC241019-52311-K7QD".len());
    }

    #[test]
    fn test_suffix_varies() {
        let numbers: std::collections::HashSet<_> =
            (0..50).map(|_| generate(1_729_348_311_000)).collect();
        assert!(numbers.len() > 1);
    }
}
