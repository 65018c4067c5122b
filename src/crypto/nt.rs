use super::{hmac_md5, md4};
use crate::messages::utils::utf16le;

pub type NtHash = [u8; 16];

/// NTOWFv1: MD4 of the UTF-16LE password.
pub fn ntowfv1(password: &str) -> NtHash {
    md4(&utf16le(password))
}

/// NTOWFv2, also used as LMOWFv2. The user name is uppercased, the domain is
/// taken as given.
pub fn ntowfv2(username: &str, hash: &NtHash, domain_name: &str) -> NtHash {
    let user = format!("{}{}", username.to_uppercase(), domain_name);
    hmac_md5(&hash[..], &[&utf16le(&user)])
}
