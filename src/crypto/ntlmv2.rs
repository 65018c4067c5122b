use crate::{
    crypto::{hmac_md5, nt::NtHash},
    messages::{
        AvPair, ClientChallenge, FileTime, Lmv2Challenge, Ntv2Challenge, Ntv2ClientChallenge,
        ServerChallenge, SessionBaseKey, Wire,
    },
};

/// NTLMv2 responses (MS-NLMP 3.3.2). `response_key` is NTOWFv2, which also
/// serves as LMOWFv2.
pub fn compute_response(
    response_key: &NtHash,
    server_challenge: &ServerChallenge,
    client_challenge: &ClientChallenge,
    timestamp: FileTime,
    target_infos: &[AvPair],
) -> (Lmv2Challenge, Ntv2Challenge, SessionBaseKey) {
    let temp = Ntv2ClientChallenge {
        timestamp,
        challenge_from_client: *client_challenge,
        target_infos: target_infos.to_vec(),
    };
    let nt_proof_str = hmac_md5(response_key, &[&server_challenge[..], &temp.serialize()[..]]);

    let lm_challenge = Lmv2Challenge {
        response: hmac_md5(response_key, &[&server_challenge[..], &client_challenge[..]]),
        challenge_from_client: *client_challenge,
    };

    let session_base_key = hmac_md5(response_key, &[&nt_proof_str[..]]);

    (
        lm_challenge,
        Ntv2Challenge {
            nt_proof_str,
            client_challenge: temp,
        },
        session_base_key,
    )
}
