//! The pluggable crypto contract the secure-messaging transformer is
//! built against (spec.md §4.E). Cryptographic primitives themselves are
//! out of scope per spec.md §1; this trait is the seam.

use crate::error::SecureMessagingError;

/// Crypto collaborator for the secure-messaging transformer.
///
/// Implementors own the session keys and the send-sequence counter
/// (spec.md §3: "Session counters (SSC) are owned by the concrete crypto
/// provider, not by the transformer").
pub trait CryptoProvider {
    /// `plain -> pad_ind(0x01) ∥ cryptogram`.
    fn encipher(&self, plain: &[u8]) -> Vec<u8>;

    /// `pad_ind ∥ cryptogram -> plain`. Fails if the padding indicator is
    /// not `0x01` or if the deciphered plaintext is not correctly
    /// ISO/IEC 7816-4 padded.
    fn decipher(&self, data: &[u8]) -> Result<Vec<u8>, SecureMessagingError>;

    /// Compute a MAC over `message`.
    fn mac(&self, message: &[u8]) -> Vec<u8>;

    /// Verify `tag` is the MAC of `message`.
    fn verify_mac(&self, message: &[u8], tag: &[u8]) -> bool {
        self.mac(message) == tag
    }

    /// ISO/IEC 7816-4 padding: append `80`, then `00` bytes, up to the
    /// next multiple of `block_len`.
    fn iso_pad(&self, bytes: &[u8], block_len: usize) -> Vec<u8> {
        let mut out = bytes.to_vec();
        out.push(0x80);
        while out.len() % block_len != 0 {
            out.push(0x00);
        }
        out
    }
}

/// Remove ISO/IEC 7816-4 padding, failing if it is malformed.
pub fn iso_unpad(padded: &[u8]) -> Result<Vec<u8>, SecureMessagingError> {
    let marker = padded
        .iter()
        .rposition(|&b| b != 0x00)
        .ok_or(SecureMessagingError::BadPadding)?;
    if padded[marker] != 0x80 {
        return Err(SecureMessagingError::BadPadding);
    }
    Ok(padded[..marker].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl CryptoProvider for Noop {
        fn encipher(&self, plain: &[u8]) -> Vec<u8> {
            let mut out = vec![0x01];
            out.extend_from_slice(plain);
            out
        }
        fn decipher(&self, data: &[u8]) -> Result<Vec<u8>, SecureMessagingError> {
            Ok(data[1..].to_vec())
        }
        fn mac(&self, _message: &[u8]) -> Vec<u8> {
            vec![0; 8]
        }
    }

    #[test]
    fn pad_unpad_round_trip() {
        let n = Noop;
        let padded = n.iso_pad(b"hello", 16);
        assert_eq!(padded.len(), 16);
        assert_eq!(iso_unpad(&padded).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn pad_exact_block_adds_full_extra_block() {
        let n = Noop;
        let padded = n.iso_pad(&[0xAAu8; 16], 16);
        assert_eq!(padded.len(), 32);
    }
}
