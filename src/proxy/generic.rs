//! Generic card-proxy boot sequence (spec.md §4.F).
//!
//! No teacher counterpart; grounded on spec.md §4.F's numbered steps and
//! §6's SFI table. Reads are plaintext (no secure-messaging session
//! exists yet — it is derived from material this boot sequence reads).

use tracing::debug;

use crate::cvc::CvCertificate;
use crate::error::{Error, Result};
use crate::keys::{MasterKeys, SymmetricKeys};
use crate::proxy::Transmitter;
use crate::tlv::{der_integer_as_u32, parse_all, TlvValue};
use crate::apdu::{Command, Ne};

const INS_SELECT: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;

const SFI_ATR: u8 = 29;
const SFI_VERSION2: u8 = 17;
const SFI_GDO: u8 = 2;
const SFI_CA_CERT: u8 = 7;

const TAG_BUFFER_SIZES: u8 = 0xE0;
const TAG_OS_VERSION: u8 = 0xD0;
const TAG_PRODUCT_2: u8 = 0xD2;
const TAG_PRODUCT_3: u8 = 0xD3;
const TAG_PRODUCT_4: u8 = 0xD4;

/// The four maximum-APDU-length buffer sizes from `EF.ATR`'s tag `E0`
/// data object. Falls back to the ICAO/gematik lower bounds when the
/// card omits the data object (spec.md §4.F step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizes {
    pub max_cmd_plain: u32,
    pub max_rsp_plain: u32,
    pub max_cmd_sm: u32,
    pub max_rsp_sm: u32,
}

impl BufferSizes {
    const LOWER_BOUND: BufferSizes =
        BufferSizes { max_cmd_plain: 1033, max_rsp_plain: 32770, max_cmd_sm: 1033, max_rsp_sm: 1033 };
}

/// OS/product identification strings read from `EF.ATR` (spec.md §4.F
/// step 2, tags `D0`/`D2`-`D4`).
#[derive(Debug, Clone, Default)]
pub struct ProductInfo {
    pub os_version: String,
    pub product_2: String,
    pub product_3: String,
    pub product_4: String,
}

fn select_binary_sfi(sfi: u8) -> u8 {
    0x80 | sfi
}

fn read_binary(transport: &impl Transmitter, sfi: u8, offset: u8, ne: Ne) -> Result<Vec<u8>> {
    let cmd = Command::with_ne(0x00, INS_READ_BINARY, select_binary_sfi(sfi), offset, ne);
    let resp = transport.send_apdu(&cmd)?;
    if !resp.is_ok() {
        return Err(Error::TrailerMismatch(resp.trailer));
    }
    Ok(resp.data)
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// The output of the generic boot sequence: everything the variant-
/// specific layer (`proxy::variants`) needs to go on and read its own
/// certificates.
pub struct GenericProxy {
    pub buffer_sizes: BufferSizes,
    pub product_info: ProductInfo,
    pub iccsn: Vec<u8>,
    /// The low 8 bytes of `iccsn` (spec.md §3/scenario S5's `ICCSN8`):
    /// the short serial form used where the full ICCSN is wider than
    /// what the surrounding protocol carries.
    pub iccsn8: [u8; 8],
    pub ca_certificate: CvCertificate,
    pub symmetric_keys: SymmetricKeys,
    pub ec_private_scalar: [u8; 32],
}

/// The 8-byte card serial proper: `iccsn` bytes 2-9, skipping the
/// leading major-industry-identifier/country-code pair (spec.md §3/S5
/// — the worked example's `ICCSN8` is the second through ninth bytes
/// of the `EF.GDO` read, not the buffer's trailing bytes, which are
/// zero padding).
fn iccsn8(iccsn: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    let end = iccsn.len().min(10);
    let start = end.saturating_sub(8);
    out[..end - start].copy_from_slice(&iccsn[start..end]);
    out
}

impl GenericProxy {
    /// Run the boot sequence described in spec.md §4.F against
    /// `transport`, deriving card-individual keys from `master_keys`.
    pub fn boot(transport: &impl Transmitter, master_keys: &MasterKeys) -> Result<GenericProxy> {
        // Step 1: select MF without AID.
        let select_mf = Command::case1(0x00, INS_SELECT, 0x04, 0x0C);
        let resp = transport.send_apdu(&select_mf)?;
        if !resp.is_ok() {
            return Err(Error::TrailerMismatch(resp.trailer));
        }

        // Step 2: EF.ATR, short wildcard.
        let atr_bytes = read_binary(transport, SFI_ATR, 0x00, Ne::SHORT_WILDCARD)?;
        let (buffer_sizes, product_info) = parse_ef_atr(&atr_bytes)?;
        debug!(os_version = %product_info.os_version, "read EF.ATR");

        // Step 3: EF.Version2, extended wildcard.
        let _version2 = read_binary(transport, SFI_VERSION2, 0x00, Ne::EXTENDED_WILDCARD)?;

        // Step 4: EF.GDO, offset 2, short wildcard; bytes are the ICCSN.
        let iccsn = read_binary(transport, SFI_GDO, 0x02, Ne::SHORT_WILDCARD)?;
        let iccsn8 = iccsn8(&iccsn);
        debug!(iccsn = %hex_string(&iccsn), iccsn8 = %hex_string(&iccsn8), "read EF.GDO");

        // Step 5: CA certificate, extended wildcard.
        let ca_cert_bytes = read_binary(transport, SFI_CA_CERT, 0x00, Ne::EXTENDED_WILDCARD)?;
        let ca_certificate =
            CvCertificate::parse(&ca_cert_bytes).map_err(|e| Error::InvalidApdu(e.to_string()))?;

        // Step 6: derive the eight symmetric keys plus the EC scalar.
        let (symmetric_keys, ec_private_scalar) = master_keys.derive_all(&iccsn);

        Ok(GenericProxy { buffer_sizes, product_info, iccsn, iccsn8, ca_certificate, symmetric_keys, ec_private_scalar })
    }
}

fn parse_ef_atr(bytes: &[u8]) -> Result<(BufferSizes, ProductInfo)> {
    let nodes = parse_all(bytes).map_err(|e| Error::InvalidApdu(e.to_string()))?;

    let buffer_sizes = nodes
        .iter()
        .find(|t| t.tag == TAG_BUFFER_SIZES)
        .and_then(|t| t.children())
        .map(|children| {
            let mut values = children.iter().filter_map(|c| c.primitive()).map(der_integer_as_u32);
            BufferSizes {
                max_cmd_plain: values.next().unwrap_or(BufferSizes::LOWER_BOUND.max_cmd_plain),
                max_rsp_plain: values.next().unwrap_or(BufferSizes::LOWER_BOUND.max_rsp_plain),
                max_cmd_sm: values.next().unwrap_or(BufferSizes::LOWER_BOUND.max_cmd_sm),
                max_rsp_sm: values.next().unwrap_or(BufferSizes::LOWER_BOUND.max_rsp_sm),
            }
        })
        .unwrap_or(BufferSizes::LOWER_BOUND);

    let as_string = |tag: u8| -> String {
        nodes
            .iter()
            .find(|t| t.tag == tag)
            .and_then(|t| t.primitive())
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    };
    let product_info = ProductInfo {
        os_version: as_string(TAG_OS_VERSION),
        product_2: as_string(TAG_PRODUCT_2),
        product_3: as_string(TAG_PRODUCT_3),
        product_4: as_string(TAG_PRODUCT_4),
    };

    Ok((buffer_sizes, product_info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::{Response, Trailer};
    use crate::keys::MasterKeys;
    use crate::tlv::Tlv;
    use std::cell::RefCell;

    fn ef_atr_bytes(sizes: [u32; 4]) -> Vec<u8> {
        let ints: Vec<Tlv> = sizes
            .iter()
            .map(|v| Tlv { tag: 0x02, value: TlvValue::Primitive(v.to_be_bytes().to_vec()) })
            .collect();
        let buffer_do = Tlv { tag: TAG_BUFFER_SIZES, value: TlvValue::Constructed(ints) };
        let os_do = Tlv { tag: TAG_OS_VERSION, value: TlvValue::Primitive(b"G2.1".to_vec()) };
        let mut out = buffer_do.encode();
        out.extend(os_do.encode());
        out
    }

    fn cv_cert_bytes(car: &str) -> Vec<u8> {
        let car_do = Tlv { tag: 0x42, value: TlvValue::Primitive(car.as_bytes().to_vec()) };
        let body = Tlv { tag: 0x30, value: TlvValue::Constructed(vec![car_do]) };
        body.encode()
    }

    struct FakeCard {
        ef_atr: Vec<u8>,
        iccsn: Vec<u8>,
        ca_cert: Vec<u8>,
        calls: RefCell<Vec<(u8, u8, u8)>>,
    }

    impl Transmitter for FakeCard {
        fn send_apdu(&self, apdu: &Command) -> Result<Response> {
            self.calls.borrow_mut().push((apdu.ins, apdu.p1, apdu.p2));
            match (apdu.ins, apdu.p1) {
                (INS_SELECT, _) => Ok(Response { data: Vec::new(), trailer: Trailer::OK }),
                (INS_READ_BINARY, p1) if p1 == select_binary_sfi(SFI_ATR) => {
                    Ok(Response { data: self.ef_atr.clone(), trailer: Trailer::OK })
                }
                (INS_READ_BINARY, p1) if p1 == select_binary_sfi(SFI_VERSION2) => {
                    Ok(Response { data: Vec::new(), trailer: Trailer::OK })
                }
                (INS_READ_BINARY, p1) if p1 == select_binary_sfi(SFI_GDO) => {
                    Ok(Response { data: self.iccsn.clone(), trailer: Trailer::OK })
                }
                (INS_READ_BINARY, p1) if p1 == select_binary_sfi(SFI_CA_CERT) => {
                    Ok(Response { data: self.ca_cert.clone(), trailer: Trailer::OK })
                }
                _ => panic!("unexpected APDU in boot sequence test"),
            }
        }
    }

    fn master_keys() -> MasterKeys {
        MasterKeys {
            cms128: vec![0x01; 16],
            cup128: vec![0x02; 16],
            cms256: vec![0x03; 32],
            cup256: vec![0x04; 32],
            admin_cms_elc256: vec![0x05; 32],
        }
    }

    #[test]
    fn boot_reads_in_spec_order_and_derives_keys() {
        let card = FakeCard {
            ef_atr: ef_atr_bytes([2000, 3000, 1500, 1500]),
            iccsn: vec![0xAB; 20],
            ca_cert: cv_cert_bytes("DEGKVCA"),
            calls: RefCell::new(Vec::new()),
        };
        let proxy = GenericProxy::boot(&card, &master_keys()).unwrap();

        assert_eq!(proxy.buffer_sizes.max_cmd_plain, 2000);
        assert_eq!(proxy.product_info.os_version, "G2.1");
        assert_eq!(proxy.iccsn, vec![0xAB; 20]);
        assert_eq!(proxy.iccsn8, [0xAB; 8]);
        assert_eq!(proxy.ca_certificate.car, b"DEGKVCA");

        let calls = card.calls.borrow();
        assert_eq!(calls[0].0, INS_SELECT);
        assert_eq!(calls[1].1, select_binary_sfi(SFI_ATR));
        assert_eq!(calls[2].1, select_binary_sfi(SFI_VERSION2));
        assert_eq!(calls[3].1, select_binary_sfi(SFI_GDO));
        assert_eq!(calls[4].1, select_binary_sfi(SFI_CA_CERT));
    }

    #[test]
    fn iccsn8_is_the_low_8_bytes_of_the_full_serial() {
        // spec.md §3/S5: READ BINARY on EF.GDO returns this 20-byte
        // buffer; ICCSN8 is its low 16 hex digits.
        let gdo: Vec<u8> = vec![0x80, 0x27, 0x12, 0x34, 0x56, 0x78, 0x90, 0x12, 0x34, 0x56]
            .into_iter()
            .chain(std::iter::repeat(0x00).take(10))
            .collect();
        assert_eq!(iccsn8(&gdo), [0x34, 0x56, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn missing_buffer_size_do_falls_back_to_lower_bounds() {
        let card = FakeCard {
            ef_atr: Tlv { tag: TAG_OS_VERSION, value: TlvValue::Primitive(b"G2.1".to_vec()) }.encode(),
            iccsn: vec![0xCD; 20],
            ca_cert: cv_cert_bytes("DEGKVCA"),
            calls: RefCell::new(Vec::new()),
        };
        let proxy = GenericProxy::boot(&card, &master_keys()).unwrap();
        assert_eq!(proxy.buffer_sizes, BufferSizes::LOWER_BOUND);
    }
}
