use des::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use des::Des;

/// Spreads 56 key bits over 8 bytes, leaving the low bit of each byte for
/// odd parity.
pub fn des_56bits_to_64bits(key7: &[u8]) -> [u8; 8] {
    debug_assert_eq!(key7.len(), 7);

    let mut key8 = [0u8; 8];
    for (i, byte) in key8.iter_mut().enumerate() {
        let v = match i {
            0 => key7[0],
            7 => key7[6] << 1,
            _ => (key7[i - 1] << (8 - i)) | (key7[i] >> i),
        };
        let v = v & !1;
        *byte = if v.count_ones() % 2 == 0 { v | 1 } else { v };
    }

    key8
}

pub fn des7_encrypt(key7: &[u8], plain: &[u8; 8]) -> [u8; 8] {
    let key8 = des_56bits_to_64bits(key7);
    des_encrypt(&key8, plain)
}

pub fn des_encrypt(key8: &[u8; 8], plain: &[u8; 8]) -> [u8; 8] {
    let cipher = Des::new(GenericArray::from_slice(&key8[..]));
    let mut block = GenericArray::clone_from_slice(&plain[..]);
    cipher.encrypt_block(&mut block);

    let mut out = [0u8; 8];
    out.copy_from_slice(block.as_slice());
    out
}
