//! Card-individual key derivation (spec.md §3, tested by property 5).
//!
//! No teacher counterpart; grounded on spec.md's KDF formulas directly,
//! using `sha2` (named in SPEC_FULL.md §2) and `ruint` for the single
//! big-integer reduction the EC scalar needs.

use ruint::aliases::U256;
use sha2::{Digest, Sha256};

const SUFFIX_ENC: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
const SUFFIX_MAC: [u8; 4] = [0x00, 0x00, 0x00, 0x02];

/// brainpoolP256r1 group order (RFC 5639 §3.4).
const BRAINPOOL_P256R1_ORDER: &str =
    "A9FB57DBA1EEA9BC3E660A909D838D718C397AA3B561A6F7901E0E82974856A7";

fn kdf_digest(master: &[u8], iccsn: &[u8], suffix: [u8; 4]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(master);
    hasher.update(iccsn);
    hasher.update(suffix);
    hasher.finalize().into()
}

/// `K = first 16 bytes of SHA-256(master ∥ iccsn ∥ suffix)`.
pub fn derive_128(master: &[u8], iccsn: &[u8], suffix: [u8; 4]) -> [u8; 16] {
    let digest = kdf_digest(master, iccsn, suffix);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// `K = SHA-256(master ∥ iccsn ∥ suffix)`.
pub fn derive_256(master: &[u8], iccsn: &[u8], suffix: [u8; 4]) -> [u8; 32] {
    kdf_digest(master, iccsn, suffix)
}

/// `d = SHA-256(master_elc256 ∥ iccsn ∥ 00000001) mod n`.
pub fn derive_ec_scalar(master_elc256: &[u8], iccsn: &[u8]) -> [u8; 32] {
    let digest = kdf_digest(master_elc256, iccsn, SUFFIX_ENC);
    let n = U256::from_str_radix(BRAINPOOL_P256R1_ORDER, 16).expect("valid curve order literal");
    let d = U256::from_be_bytes::<32>(digest) % n;
    d.to_be_bytes::<32>()
}

/// An AES-128 enc/mac key pair derived for one card.
#[derive(Clone)]
pub struct KeyPair128 {
    pub enc: [u8; 16],
    pub mac: [u8; 16],
}

impl KeyPair128 {
    pub fn derive(master: &[u8], iccsn: &[u8]) -> KeyPair128 {
        KeyPair128 { enc: derive_128(master, iccsn, SUFFIX_ENC), mac: derive_128(master, iccsn, SUFFIX_MAC) }
    }
}

/// An AES-256 enc/mac key pair derived for one card.
#[derive(Clone)]
pub struct KeyPair256 {
    pub enc: [u8; 32],
    pub mac: [u8; 32],
}

impl KeyPair256 {
    pub fn derive(master: &[u8], iccsn: &[u8]) -> KeyPair256 {
        KeyPair256 { enc: derive_256(master, iccsn, SUFFIX_ENC), mac: derive_256(master, iccsn, SUFFIX_MAC) }
    }
}

/// The eight symmetric card-individual keys named by spec.md §3:
/// `{CMS, CUP} x {AES-128, AES-256} x {enc, mac}`.
#[derive(Clone)]
pub struct SymmetricKeys {
    pub cms128: KeyPair128,
    pub cup128: KeyPair128,
    pub cms256: KeyPair256,
    pub cup256: KeyPair256,
}

/// Master-key material for one card family (spec.md §4.G): five
/// byte strings, treated as secrets at rest even though their bit
/// patterns are fixed by the spec.
pub struct MasterKeys {
    pub cms128: Vec<u8>,
    pub cup128: Vec<u8>,
    pub cms256: Vec<u8>,
    pub cup256: Vec<u8>,
    pub admin_cms_elc256: Vec<u8>,
}

impl MasterKeys {
    /// Derive all eight symmetric keys plus the EC scalar for one card.
    pub fn derive_all(&self, iccsn: &[u8]) -> (SymmetricKeys, [u8; 32]) {
        let symmetric = SymmetricKeys {
            cms128: KeyPair128::derive(&self.cms128, iccsn),
            cup128: KeyPair128::derive(&self.cup128, iccsn),
            cms256: KeyPair256::derive(&self.cms256, iccsn),
            cup256: KeyPair256::derive(&self.cup256, iccsn),
        };
        let ec_scalar = derive_ec_scalar(&self.admin_cms_elc256, iccsn);
        (symmetric, ec_scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iccsn_20() -> Vec<u8> {
        (0u8..20).collect()
    }

    #[test]
    fn property5_kenc128_matches_formula() {
        let master = vec![0xAAu8; 16];
        let iccsn = iccsn_20();
        let mut hasher = Sha256::new();
        hasher.update(&master);
        hasher.update(&iccsn);
        hasher.update(SUFFIX_ENC);
        let expect: [u8; 32] = hasher.finalize().into();
        assert_eq!(derive_128(&master, &iccsn, SUFFIX_ENC), expect[..16]);
    }

    #[test]
    fn enc_and_mac_keys_differ() {
        let master = vec![0x01u8; 32];
        let iccsn = iccsn_20();
        let pair = KeyPair256::derive(&master, &iccsn);
        assert_ne!(pair.enc, pair.mac);
    }

    #[test]
    fn ec_scalar_is_reduced_mod_curve_order() {
        let master = vec![0xFFu8; 32];
        let iccsn = iccsn_20();
        let d = derive_ec_scalar(&master, &iccsn);
        let n = U256::from_str_radix(BRAINPOOL_P256R1_ORDER, 16).unwrap();
        assert!(U256::from_be_bytes::<32>(d) < n);
    }
}
