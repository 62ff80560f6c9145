use blake2::{Blake2b512, Digest};

/// Maps a user to a stable bucket in `0..100`. The first 8 bytes of the Blake2b digest of the user id are read as a
/// big-endian integer.
pub fn traffic_bucket(user_id: &str) -> u8 {
    let digest = Blake2b512::digest(user_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}

/// Whether the user falls inside a traffic split of `cut_percentage` percent.
pub fn is_in_traffic_split(user_id: &str, cut_percentage: u8) -> bool {
    traffic_bucket(user_id) < cut_percentage
}
