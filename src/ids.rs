use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

const SUFFIX_LEN: usize = 6;

/// Generates `<millis-hex>-<hash>` ids. The millisecond prefix keeps ids
/// roughly creation-ordered; the hashed v7 seed keeps them unique.
pub fn generate_id<F>(now: OffsetDateTime, mut exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    let prefix = millis_hex(now);

    for _ in 0..64 {
        let candidate = format!("{}-{}", prefix, hashed_seed(SUFFIX_LEN));
        if !exists(&candidate) {
            return candidate;
        }
    }

    format!("{}-{}", prefix, &Uuid::now_v7().simple().to_string()[..16])
}

fn hashed_seed(len: usize) -> String {
    let seed = Uuid::now_v7();
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..len].to_string()
}

fn millis_hex(now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("{:x}", millis.max(0))
}

/// Short form for terminal output: the hash suffix.
pub fn display_id(id: &str) -> &str {
    id.rsplit_once('-').map_or(id, |(_, suffix)| suffix)
}
