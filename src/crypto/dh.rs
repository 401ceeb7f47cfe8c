// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! 2048-bit Oakley Group 2 Diffie-Hellman and the I2P-specific key-material
//! derivation from the shared secret.

use num_bigint::BigUint;
use num_traits::Zero;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::constants::{DH_PUBLIC_LEN, SESSION_KEY_LEN};

/// The 2048-bit MODP prime I2P's DH handshake runs over, big-endian.
/// Generator is 2.
const OAKLEY_GROUP2_P_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519",
    "B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7",
    "EC6F44C42E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F",
    "24117C4B1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C5",
    "5D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB9E",
    "D529077096966D670C354E4ABC9804F1746C08CA18217C32905E462",
    "E36CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA051015728E5",
    "A8AACAA68FFFFFFFFFFFFFFFF",
);

fn group_modulus() -> BigUint {
    BigUint::parse_bytes(OAKLEY_GROUP2_P_HEX.as_bytes(), 16)
        .expect("static Oakley group 2 modulus must parse")
}

/// An ephemeral DH key pair as handed out by the pool. Cleared on
/// transition to `Established`.
#[derive(Clone)]
pub struct DhKeyPair {
    x: BigUint,
    pub public: [u8; DH_PUBLIC_LEN],
}

impl DhKeyPair {
    /// Generate a fresh ephemeral pair. Exposed for pool implementations;
    /// the SSU core itself never calls this directly.
    pub fn generate() -> Self {
        let p = group_modulus();
        let mut rng = OsRng;
        let mut x_bytes = vec![0u8; 32];
        rng.fill(x_bytes.as_mut_slice());
        let mut x = BigUint::from_bytes_be(&x_bytes);
        if x.is_zero() {
            x = BigUint::from(2u8);
        }
        let g = BigUint::from(2u8);
        let y = g.modpow(&x, &p);
        let mut public = [0u8; DH_PUBLIC_LEN];
        let y_bytes = y.to_bytes_be();
        public[DH_PUBLIC_LEN - y_bytes.len()..].copy_from_slice(&y_bytes);
        Self { x, public }
    }

    /// Complete the agreement with the peer's public value, producing the
    /// raw 256-byte shared secret.
    pub fn agree(&self, peer_public: &[u8; DH_PUBLIC_LEN]) -> [u8; DH_PUBLIC_LEN] {
        let p = group_modulus();
        let peer_y = BigUint::from_bytes_be(peer_public);
        let s = peer_y.modpow(&self.x, &p);
        let mut out = [0u8; DH_PUBLIC_LEN];
        let s_bytes = s.to_bytes_be();
        out[DH_PUBLIC_LEN - s_bytes.len()..].copy_from_slice(&s_bytes);
        out
    }
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair").field("public", &hex::encode(self.public)).finish()
    }
}

/// Session key material derived from the raw DH shared secret.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    pub session_key: [u8; SESSION_KEY_LEN],
    pub mac_key: [u8; SESSION_KEY_LEN],
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeys").finish_non_exhaustive()
    }
}

/// Error returned when the shared secret has more than 32 leading zero
/// bytes — I2P treats this agreement as malformed.
#[derive(Debug, thiserror::Error)]
#[error("malformed DH agreement: too many leading zero bytes")]
pub struct MalformedAgreement;

/// Post-process a raw 256-byte DH shared secret into `(session_key,
/// mac_key)` per the three-branch derivation rule.
pub fn derive_keys(s: &[u8; DH_PUBLIC_LEN]) -> Result<DerivedKeys, MalformedAgreement> {
    if s[0] & 0x80 != 0 {
        let mut session_key = [0u8; SESSION_KEY_LEN];
        session_key[0] = 0x00;
        session_key[1..].copy_from_slice(&s[0..31]);
        let mut mac_key = [0u8; SESSION_KEY_LEN];
        mac_key.copy_from_slice(&s[31..63]);
        Ok(DerivedKeys { session_key, mac_key })
    } else if s[0] != 0 {
        let mut session_key = [0u8; SESSION_KEY_LEN];
        session_key.copy_from_slice(&s[0..32]);
        let mut mac_key = [0u8; SESSION_KEY_LEN];
        mac_key.copy_from_slice(&s[32..64]);
        Ok(DerivedKeys { session_key, mac_key })
    } else {
        let skip = s.iter().take_while(|&&b| b == 0).count();
        if skip > 32 {
            return Err(MalformedAgreement);
        }
        let mut session_key = [0u8; SESSION_KEY_LEN];
        session_key.copy_from_slice(&s[skip..skip + 32]);

        let digest = Sha256::digest(&s[skip..64]);
        let mut mac_key = [0u8; SESSION_KEY_LEN];
        mac_key.copy_from_slice(&digest);
        Ok(DerivedKeys { session_key, mac_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_bit_branch_shifts_session_key_by_one() {
        let mut s = [0x10u8; DH_PUBLIC_LEN];
        s[0] = 0x80;
        let keys = derive_keys(&s).expect("should derive");
        assert_eq!(keys.session_key[0], 0x00);
        assert_eq!(keys.session_key[1], 0x80);
        assert_eq!(keys.mac_key[0], s[31]);
    }

    #[test]
    fn nonzero_first_byte_takes_direct_32_32_split() {
        let mut s = [0x11u8; DH_PUBLIC_LEN];
        s[0] = 0x01;
        let keys = derive_keys(&s).expect("should derive");
        assert_eq!(keys.session_key, s[0..32]);
        assert_eq!(keys.mac_key, s[32..64]);
    }

    #[test]
    fn leading_zero_byte_skips_and_hashes_remainder() {
        let mut s = [0x22u8; DH_PUBLIC_LEN];
        s[0] = 0x00;
        s[1] = 0x33;
        let keys = derive_keys(&s).expect("should derive");
        assert_eq!(&keys.session_key[..], &s[1..33]);
        assert_eq!(&keys.mac_key[..], &Sha256::digest(&s[1..64])[..]);
    }

    #[test]
    fn more_than_32_leading_zeros_is_malformed() {
        let s = [0u8; DH_PUBLIC_LEN];
        assert!(derive_keys(&s).is_err());
    }

    #[test]
    fn agreement_round_trips_between_two_peers() {
        let alice = DhKeyPair::generate();
        let bob = DhKeyPair::generate();
        let s_alice = alice.agree(&bob.public);
        let s_bob = bob.agree(&alice.public);
        assert_eq!(s_alice, s_bob);
    }
}
