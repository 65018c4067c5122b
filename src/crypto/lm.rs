use super::des::des7_encrypt;

pub type LmHash = [u8; 16];

const MAGIC: &[u8; 8] = b"KGS!@#$%";

/// LMOWFv1: the uppercased password, truncated or zero padded to 14 bytes,
/// keys two DES encryptions of a constant.
pub fn lmowfv1(password: &str) -> LmHash {
    let mut key = [0u8; 14];
    for (k, b) in key.iter_mut().zip(password.to_uppercase().bytes()) {
        *k = b;
    }

    let mut lm_hash = LmHash::default();
    lm_hash[..8].copy_from_slice(&des7_encrypt(&key[..7], MAGIC));
    lm_hash[8..].copy_from_slice(&des7_encrypt(&key[7..], MAGIC));
    lm_hash
}
