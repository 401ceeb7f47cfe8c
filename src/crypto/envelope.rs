// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The crypto envelope wrapped around every SSU datagram: AES-256-CBC over
//! the post-MAC region, keyed HMAC-MD5 over
//! `encrypted_body || iv || u16_be(encrypted_len)`.

use aes::Aes256;
use cbc::{Decryptor, Encryptor};
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use md5::Md5;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::constants::{IV_LEN, MAC_LEN};
use crate::error::{Result, SsuError};

type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;
type HmacMd5 = Hmac<Md5>;

/// Round a length up to the next 16-byte boundary.
pub fn padded_len(n: usize) -> usize {
    let rem = n % 16;
    if rem == 0 { n } else { n + (16 - rem) }
}

/// Fill `buf[from..]` with cryptographically random padding bytes; padding
/// bytes are uniformly random, never zero.
pub fn random_pad(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// Encrypt `body` in place (PKCS7-free, pre-padded to a 16-byte multiple by
/// the caller) with a random IV, and compute the HMAC-MD5 MAC over
/// `encrypted || iv || u16_be(len)`.
///
/// Returns `(mac, iv)`; the caller writes both into the header slots.
pub fn seal(body: &mut [u8], aes_key: &[u8; 32], mac_key: &[u8; 32]) -> ([u8; MAC_LEN], [u8; IV_LEN]) {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let mac = seal_with_iv(body, aes_key, mac_key, &iv);
    (mac, iv)
}

/// Variant of [`seal`] for the one case that needs a caller-chosen IV: the
/// SessionCreated/SessionConfirmed signature field, which Bob/Alice
/// pre-encrypt under the session key using the same IV the outer envelope
/// will use.
pub fn seal_with_iv(body: &mut [u8], aes_key: &[u8; 32], mac_key: &[u8; 32], iv: &[u8; IV_LEN]) -> [u8; MAC_LEN] {
    debug_assert_eq!(body.len() % 16, 0, "body must be padded to a 16-byte boundary");

    let enc = Aes256CbcEnc::new(aes_key.into(), iv.into());
    encrypt_blocks_in_place(enc, body);

    compute_mac(body, iv, mac_key)
}

/// Verify `mac` against `encrypted || iv || u16_be(len)` and, on success,
/// decrypt `body` in place. Returns `SsuError::Mac` on mismatch; the body
/// is left untouched so the caller may retry under a different candidate
/// key — the session key first, then the local intro key.
pub fn open(
    body: &mut [u8],
    iv: &[u8; IV_LEN],
    mac: &[u8; MAC_LEN],
    aes_key: &[u8; 32],
    mac_key: &[u8; 32],
) -> Result<()> {
    let expected = compute_mac(body, iv, mac_key);
    if !constant_time_eq(&expected, mac) {
        return Err(SsuError::Mac);
    }

    let dec = Aes256CbcDec::new(aes_key.into(), iv.into());
    decrypt_blocks_in_place(dec, body);
    Ok(())
}

/// Raw AES-256-CBC encrypt with no MAC, used for the SessionCreated
/// signature's inner encryption pass.
pub fn encrypt_in_place(body: &mut [u8], key: &[u8; 32], iv: &[u8; IV_LEN]) {
    let enc = Aes256CbcEnc::new(key.into(), iv.into());
    encrypt_blocks_in_place(enc, body);
}

/// Inverse of [`encrypt_in_place`].
pub fn decrypt_in_place(body: &mut [u8], key: &[u8; 32], iv: &[u8; IV_LEN]) {
    let dec = Aes256CbcDec::new(key.into(), iv.into());
    decrypt_blocks_in_place(dec, body);
}

fn compute_mac(encrypted_body: &[u8], iv: &[u8; IV_LEN], mac_key: &[u8; 32]) -> [u8; MAC_LEN] {
    // The full 32-byte key is used with HMAC-MD5 even though MD5's block is
    // larger; the HMAC construction handles this internally.
    let mut hmac = HmacMd5::new_from_slice(mac_key).expect("HMAC accepts any key length");
    hmac.update(encrypted_body);
    hmac.update(iv);
    hmac.update(&(encrypted_body.len() as u16).to_be_bytes());
    let tag = hmac.finalize().into_bytes();
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&tag);
    out
}

fn encrypt_blocks_in_place(mut enc: Aes256CbcEnc, body: &mut [u8]) {
    for block in body.chunks_exact_mut(16) {
        enc.encrypt_block_mut(block.into());
    }
}

fn decrypt_blocks_in_place(mut dec: Aes256CbcDec, body: &mut [u8]) {
    for block in body.chunks_exact_mut(16) {
        dec.decrypt_block_mut(block.into());
    }
}

fn constant_time_eq(a: &[u8; MAC_LEN], b: &[u8; MAC_LEN]) -> bool {
    let mut diff = 0u8;
    for i in 0..MAC_LEN {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_len_is_0_when_already_aligned_else_complement() {
        assert_eq!(padded_len(32), 32);
        assert_eq!(padded_len(33), 48);
        assert_eq!(padded_len(1), 16);
        assert_eq!(padded_len(0), 0);
    }

    #[test]
    fn seal_then_open_round_trips() {
        let aes_key = [0x11u8; 32];
        let mac_key = [0x22u8; 32];
        let mut body = b"0123456789ABCDEF0123456789ABCDEF".to_vec();
        body.truncate(padded_len(body.len()));
        let original = body.clone();

        let (mac, iv) = seal(&mut body, &aes_key, &mac_key);
        assert_ne!(body, original, "ciphertext should differ from plaintext");

        open(&mut body, &iv, &mac, &aes_key, &mac_key).expect("should verify");
        assert_eq!(body, original);
    }

    #[test]
    fn flipped_mac_bit_is_rejected() {
        let aes_key = [0x33u8; 32];
        let mac_key = [0x44u8; 32];
        let mut body = vec![0u8; 32];
        let (mut mac, iv) = seal(&mut body, &aes_key, &mac_key);
        mac[0] ^= 0x01;
        let err = open(&mut body, &iv, &mac, &aes_key, &mac_key).unwrap_err();
        assert!(matches!(err, SsuError::Mac));
    }
}
