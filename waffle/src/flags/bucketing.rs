use sha1::{Digest, Sha1};

// 53 bits fit the f64 mantissa exactly, so the scaled value stays below 1.0.
const BUCKET_BITS: u32 = 53;
const BUCKET_SCALE: u64 = 1 << BUCKET_BITS;

/// Maps a flag name and an identity token to a value in `[0, 100)`.
///
/// Given the same flag and token it always returns the same value, and values
/// are uniformly distributed across tokens, so showing a flag to 20% of callers
/// is `bucket(flag, token) < 20.0`. The flag name salts the hash so a caller
/// in the lowest bucket of one flag is not in the lowest bucket of every flag.
pub fn bucket(flag_name: &str, identity_token: &str) -> f64 {
    let hash_key = format!("{flag_name}.{identity_token}");
    let digest = Sha1::digest(hash_key.as_bytes());

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let hash_val = u64::from_be_bytes(head) >> (64 - BUCKET_BITS);

    hash_val as f64 / BUCKET_SCALE as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::random_string;

    #[test]
    fn test_bucket_is_deterministic() {
        let first = bucket("new_checkout", "user_42");
        for _ in 0..10 {
            assert_eq!(bucket("new_checkout", "user_42"), first);
        }
    }

    #[test]
    fn test_bucket_known_values_are_stable() {
        // Bucketing must not drift between releases, or users without a
        // cookie get reshuffled.
        for (flag, token, expected) in [
            ("flag", "a", 37.11486005815874),
            ("flag", "b", 40.13393556271404),
            ("other_flag", "a", 88.81601126380733),
            ("baz", "anon", 3.998876368976012),
        ] {
            let value = bucket(flag, token);
            assert!(
                (value - expected).abs() < 1e-9,
                "bucket({flag}, {token}) = {value}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_bucket_range() {
        for _ in 0..10_000 {
            let token = random_string("", 12);
            let value = bucket("range_check", &token);
            assert!((0.0..100.0).contains(&value), "{value} out of range");
        }
        assert!(bucket("", "") < 100.0);
    }

    #[test]
    fn test_bucket_is_roughly_uniform() {
        let samples = 20_000;
        let mut deciles = [0usize; 10];
        for i in 0..samples {
            let value = bucket("uniformity", &format!("user_{i}"));
            deciles[(value / 10.0) as usize] += 1;
        }

        let expected = samples / 10;
        for (decile, count) in deciles.iter().enumerate() {
            let deviation = (*count as f64 - expected as f64).abs() / expected as f64;
            assert!(
                deviation < 0.1,
                "decile {decile} has {count} values, expected about {expected}"
            );
        }
    }

    #[test]
    fn test_bucket_below_percent_matches_share() {
        let samples = 10_000;
        let included = (0..samples)
            .filter(|i| bucket("share", &format!("token_{i}")) < 30.0)
            .count();
        let share = included as f64 / samples as f64;
        assert!((0.27..0.33).contains(&share), "share was {share}");
    }
}
