use crate::{
    crypto::{des::des7_encrypt, desl, hmac_md5, lm::LmHash, md4, md5, nt::NtHash},
    messages::{
        flags::{
            Flags, NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY, NTLMSSP_NEGOTIATE_LM_KEY,
            NTLMSSP_REQUEST_NON_NT_SESSION_KEY,
        },
        utils::to_array,
        ClientChallenge, KeyExchangeKey, Lmv1Challenge, Ntv1Challenge, ServerChallenge,
        SessionBaseKey,
    },
};

/// NTLM v1 responses (MS-NLMP 3.3.1).
///
/// With `no_lm_response` the LM slot repeats the NT response instead of
/// carrying the weak DESL(LMOWF) value.
pub fn compute_response(
    flags: &Flags,
    response_key_nt: &NtHash,
    response_key_lm: &LmHash,
    server_challenge: &ServerChallenge,
    client_challenge: &ClientChallenge,
    no_lm_response: bool,
) -> (Lmv1Challenge, Ntv1Challenge, SessionBaseKey) {
    let session_base_key = md4(response_key_nt);

    if flags.has_flag(NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY) {
        let mut server_client_challenge = [0u8; 16];
        server_client_challenge[..8].copy_from_slice(server_challenge);
        server_client_challenge[8..].copy_from_slice(client_challenge);
        let digest = md5(&server_client_challenge[..]);

        let nt_response = Ntv1Challenge {
            response: desl(response_key_nt, &to_array(&digest[..8])),
        };
        let lm_response = Lmv1Challenge::from_client_challenge(client_challenge);
        (lm_response, nt_response, session_base_key)
    } else {
        let nt_response = Ntv1Challenge {
            response: desl(response_key_nt, server_challenge),
        };
        let lm_response = if no_lm_response {
            Lmv1Challenge {
                response: nt_response.response,
            }
        } else {
            Lmv1Challenge {
                response: desl(response_key_lm, server_challenge),
            }
        };
        (lm_response, nt_response, session_base_key)
    }
}

/// KXKEY (MS-NLMP 3.4.5.1).
pub fn kxkey(
    flags: &Flags,
    session_base_key: &SessionBaseKey,
    lm_response: &Lmv1Challenge,
    lm_hash: &LmHash,
    server_challenge: &ServerChallenge,
) -> KeyExchangeKey {
    let lm_prefix: [u8; 8] = to_array(&lm_response.response[..8]);

    if flags.has_flag(NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY) {
        hmac_md5(session_base_key, &[&server_challenge[..], &lm_prefix[..]])
    } else if flags.has_flag(NTLMSSP_NEGOTIATE_LM_KEY) {
        let mut key_exchange_key = KeyExchangeKey::default();
        key_exchange_key[..8].copy_from_slice(&des7_encrypt(&lm_hash[..7], &lm_prefix));
        let key = [lm_hash[7], 0xbd, 0xbd, 0xbd, 0xbd, 0xbd, 0xbd];
        key_exchange_key[8..].copy_from_slice(&des7_encrypt(&key, &lm_prefix));
        key_exchange_key
    } else if flags.has_flag(NTLMSSP_REQUEST_NON_NT_SESSION_KEY) {
        let mut key_exchange_key = KeyExchangeKey::default();
        key_exchange_key[..8].copy_from_slice(&lm_hash[..8]);
        key_exchange_key
    } else {
        *session_base_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::*;
    use crate::messages::flags::*;

    const SESSION_BASE_KEY: SessionBaseKey = [
        0xd8, 0x72, 0x62, 0xb0, 0xcd, 0xe4, 0xb1, 0xcb, 0x74, 0x99, 0xbe, 0xcc, 0xcd, 0xf1, 0x07,
        0x84,
    ];
    const NT_RESPONSE: [u8; 24] = [
        0x67, 0xc4, 0x30, 0x11, 0xf3, 0x02, 0x98, 0xa2, 0xad, 0x35, 0xec, 0xe6, 0x4f, 0x16, 0x33,
        0x1c, 0x44, 0xbd, 0xbe, 0xd9, 0x27, 0x84, 0x1f, 0x94,
    ];
    const LM_RESPONSE: [u8; 24] = [
        0x98, 0xde, 0xf7, 0xb8, 0x7f, 0x88, 0xaa, 0x5d, 0xaf, 0xe2, 0xdf, 0x77, 0x96, 0x88, 0xa1,
        0x72, 0xde, 0xf1, 0x1c, 0x7d, 0x5c, 0xcd, 0xef, 0x13,
    ];

    #[test]
    fn without_extended_session_security() {
        let flags = Flags(FLAGS_V1);
        let (lm, nt, sbk) = compute_response(
            &flags,
            &NT_HASH,
            &LM_HASH,
            &SERVER_CHALLENGE,
            &CLIENT_CHALLENGE,
            false,
        );

        pretty_assertions::assert_eq!(nt.response, NT_RESPONSE);
        pretty_assertions::assert_eq!(lm.response, LM_RESPONSE);
        pretty_assertions::assert_eq!(sbk, SESSION_BASE_KEY);

        let key_exchange_key = kxkey(&flags, &sbk, &lm, &LM_HASH, &SERVER_CHALLENGE);
        pretty_assertions::assert_eq!(key_exchange_key, SESSION_BASE_KEY);
    }

    #[test]
    fn no_lm_response_repeats_nt() {
        let (lm, nt, _) = compute_response(
            &Flags(FLAGS_V1),
            &NT_HASH,
            &LM_HASH,
            &SERVER_CHALLENGE,
            &CLIENT_CHALLENGE,
            true,
        );
        pretty_assertions::assert_eq!(lm.response, nt.response);
    }

    #[test]
    fn with_extended_session_security() {
        let nt_response = [
            0x75, 0x37, 0xf8, 0x03, 0xae, 0x36, 0x71, 0x28, 0xca, 0x45, 0x82, 0x04, 0xbd, 0xe7,
            0xca, 0xf8, 0x1e, 0x97, 0xed, 0x26, 0x83, 0x26, 0x72, 0x32,
        ];

        let mut flags = Flags(FLAGS_V1);
        flags.set_flag(NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY);
        let (lm, nt, sbk) = compute_response(
            &flags,
            &NT_HASH,
            &LM_HASH,
            &SERVER_CHALLENGE,
            &CLIENT_CHALLENGE,
            false,
        );
        pretty_assertions::assert_eq!(nt.response, nt_response);
        pretty_assertions::assert_eq!(lm, Lmv1Challenge::from_client_challenge(&CLIENT_CHALLENGE));
        pretty_assertions::assert_eq!(sbk, SESSION_BASE_KEY);

        pretty_assertions::assert_eq!(
            kxkey(&flags, &sbk, &lm, &LM_HASH, &SERVER_CHALLENGE),
            hmac_md5(&sbk, &[&SERVER_CHALLENGE[..], &CLIENT_CHALLENGE[..]])
        );
    }

    #[test]
    fn negotiate_lm_key() {
        let key_exchange_key: KeyExchangeKey = [
            0xb0, 0x9e, 0x37, 0x9f, 0x7f, 0xbe, 0xcb, 0x1e, 0xaf, 0x0a, 0xfd, 0xcb, 0x03, 0x83,
            0xc8, 0xa0,
        ];
        let lm_response = Lmv1Challenge {
            response: LM_RESPONSE,
        };

        let mut flags = Flags(FLAGS_V1);
        flags.set_flag(NTLMSSP_NEGOTIATE_LM_KEY);
        let kek = kxkey(
            &flags,
            &SESSION_BASE_KEY,
            &lm_response,
            &LM_HASH,
            &SERVER_CHALLENGE,
        );
        pretty_assertions::assert_eq!(key_exchange_key, kek);
    }

    #[test]
    fn non_nt_session_key() {
        let mut flags = Flags(FLAGS_V1);
        flags.set_flag(NTLMSSP_REQUEST_NON_NT_SESSION_KEY);
        let lm_response = Lmv1Challenge {
            response: LM_RESPONSE,
        };
        let kek = kxkey(
            &flags,
            &SESSION_BASE_KEY,
            &lm_response,
            &LM_HASH,
            &SERVER_CHALLENGE,
        );
        pretty_assertions::assert_eq!(&kek[..8], &LM_HASH[..8]);
        pretty_assertions::assert_eq!(&kek[8..], &[0u8; 8][..]);
    }
}
