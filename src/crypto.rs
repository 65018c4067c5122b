//! NTLM cryptographic primitives (MS-NLMP 3.3 and 6).

use hmac::{Hmac, Mac};
use md4::Md4;
use md5::{Digest, Md5};
use rand::{rngs::OsRng, RngCore};
use rc4::{consts::U16, KeyInit, Rc4, StreamCipher};

use crate::messages::{
    flags::{Flags, NTLMSSP_NEGOTIATE_KEY_EXCH, NTLMSSP_NEGOTIATE_SEAL, NTLMSSP_NEGOTIATE_SIGN},
    utils::to_array,
    EncryptedRandomSessionKey, ExportedSessionKey, KeyExchangeKey,
};

pub(crate) mod des;
pub(crate) mod lm;
pub(crate) mod nt;
pub(crate) mod ntlmv1;
pub(crate) mod ntlmv2;

pub fn md4(input: &[u8]) -> [u8; 16] {
    to_array(&Md4::digest(input)[..])
}

pub fn md5(input: &[u8]) -> [u8; 16] {
    to_array(&Md5::digest(input)[..])
}

/// HMAC-MD5 over the concatenation of `parts`.
pub fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> [u8; 16] {
    let mut mac =
        <Hmac<Md5> as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    to_array(&mac.finalize().into_bytes()[..])
}

/// DESL: the 16 byte key is zero padded to 21 bytes and split into three DES
/// keys, each encrypting `data`.
pub fn desl(key: &[u8; 16], data: &[u8; 8]) -> [u8; 24] {
    let mut extended_key = [0u8; 21];
    extended_key[..16].copy_from_slice(key);

    let mut response = [0u8; 24];
    for (chunk, key7) in response.chunks_exact_mut(8).zip(extended_key.chunks_exact(7)) {
        chunk.copy_from_slice(&des::des7_encrypt(key7, data));
    }
    response
}

pub fn nonce<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes[..]);
    bytes
}

/// Picks the exported session key and, when a key exchange was negotiated for
/// signing or sealing, seals it with RC4 under the key exchange key.
pub fn encrypt_random_session_key(
    flags: &Flags,
    key_exchange_key: &KeyExchangeKey,
    exported_session_key: Option<ExportedSessionKey>,
) -> (ExportedSessionKey, Option<EncryptedRandomSessionKey>) {
    if flags.has_flag(NTLMSSP_NEGOTIATE_KEY_EXCH)
        && (flags.has_flag(NTLMSSP_NEGOTIATE_SIGN) || flags.has_flag(NTLMSSP_NEGOTIATE_SEAL))
    {
        let exported_session_key = exported_session_key.unwrap_or_else(nonce);
        let mut sealed = exported_session_key;
        let mut rc4 = <Rc4<U16> as KeyInit>::new(key_exchange_key.into());
        rc4.apply_keystream(&mut sealed);
        (exported_session_key, Some(sealed.to_vec().into()))
    } else {
        (*key_exchange_key, None)
    }
}
