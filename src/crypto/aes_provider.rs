//! Reference `CryptoProvider` implementation (SPEC_FULL.md §2): AES-CBC
//! encipherment and AES-CMAC (truncated to 8 bytes) MACing, the same
//! primitive family `recmo-icao-9303-nfc` uses for ICAO 9303 secure
//! messaging. This is the crate's test/demo collaborator, not the only
//! legal implementation of the contract in `sm::crypto`.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use std::sync::Mutex;

use crate::error::SecureMessagingError;
use crate::sm::crypto::{iso_unpad, CryptoProvider};

type CbcEnc = cbc::Encryptor<Aes128>;
type CbcDec = cbc::Decryptor<Aes128>;

/// AES-128 based secure-messaging crypto provider.
///
/// Owns the session send-sequence counter (spec.md §3): each
/// encipher/decipher call derives a fresh IV from the current SSC value
/// (encrypted under the encipherment key, the convention health-card SM
/// and ICAO 9303 both use) and then advances it.
pub struct AesCryptoProvider {
    enc_key: [u8; 16],
    mac_key: [u8; 16],
    ssc: Mutex<u64>,
}

impl AesCryptoProvider {
    pub fn new(enc_key: [u8; 16], mac_key: [u8; 16]) -> AesCryptoProvider {
        AesCryptoProvider { enc_key, mac_key, ssc: Mutex::new(0) }
    }

    fn next_iv(&self) -> [u8; 16] {
        let mut ssc = self.ssc.lock().unwrap();
        *ssc += 1;
        let mut block = [0u8; 16];
        block[8..].copy_from_slice(&ssc.to_be_bytes());
        drop(ssc);

        let cipher = Aes128::new(GenericArray::from_slice(&self.enc_key));
        let mut ga = GenericArray::clone_from_slice(&block);
        cipher.encrypt_block(&mut ga);
        ga.into()
    }
}

impl CryptoProvider for AesCryptoProvider {
    fn encipher(&self, plain: &[u8]) -> Vec<u8> {
        let mut buf = self.iso_pad(plain, 16);
        let iv = self.next_iv();
        let ciphertext_len = buf.len();
        CbcEnc::new(&self.enc_key.into(), &iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, ciphertext_len)
            .expect("buffer is already a block multiple");

        let mut out = Vec::with_capacity(1 + buf.len());
        out.push(0x01);
        out.extend_from_slice(&buf);
        out
    }

    fn decipher(&self, data: &[u8]) -> Result<Vec<u8>, SecureMessagingError> {
        let (pad_ind, cryptogram) = data.split_first().ok_or(SecureMessagingError::BadPadding)?;
        if *pad_ind != 0x01 {
            return Err(SecureMessagingError::BadPaddingIndicator(*pad_ind));
        }

        let iv = self.next_iv();
        let mut buf = cryptogram.to_vec();
        let plain_padded = CbcDec::new(&self.enc_key.into(), &iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| SecureMessagingError::BadPadding)?;
        iso_unpad(plain_padded)
    }

    fn mac(&self, message: &[u8]) -> Vec<u8> {
        let mut cmac = Cmac::<Aes128>::new_from_slice(&self.mac_key).expect("16-byte key");
        cmac.update(message);
        cmac.finalize().into_bytes()[..8].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encipher_decipher_round_trip() {
        let provider = AesCryptoProvider::new([0x11; 16], [0x22; 16]);
        let plain = b"hello, card".to_vec();
        let cryptogram = provider.encipher(&plain);
        let recovered = provider.decipher(&cryptogram).unwrap();
        assert_eq!(recovered, plain);
    }

    #[test]
    fn rejects_bad_padding_indicator() {
        let provider = AesCryptoProvider::new([0x11; 16], [0x22; 16]);
        let mut cryptogram = provider.encipher(b"data");
        cryptogram[0] = 0x02;
        assert_eq!(
            provider.decipher(&cryptogram),
            Err(SecureMessagingError::BadPaddingIndicator(0x02))
        );
    }

    #[test]
    fn mac_is_deterministic_and_eight_bytes() {
        let provider = AesCryptoProvider::new([0x11; 16], [0x22; 16]);
        let tag1 = provider.mac(b"command bytes");
        let tag2 = provider.mac(b"command bytes");
        assert_eq!(tag1, tag2);
        assert_eq!(tag1.len(), 8);
    }
}
