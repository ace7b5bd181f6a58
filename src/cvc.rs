//! Card-verifiable certificates (spec.md §4.F/§4.H).
//!
//! CV certificates nest two-byte tags (`7F21` the certificate, `7F4E` the
//! body, `42` the CAR, …) that `crate::tlv`'s single-byte-tag codec
//! doesn't cover, so this module carries its own narrow BER-TLV walk
//! rather than widening the shared one for a single caller.

/// A parsed card-verifiable certificate: only the two fields the chain
/// importer (`cert_chain.rs`) and the proxy layer actually consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvCertificate {
    /// Certification Authority Reference (tag `42`), copied verbatim.
    pub car: Vec<u8>,
    /// The certificate's full encoded bytes, sent as-is in
    /// `PSO VERIFY CERTIFICATE`'s data field.
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CvcParseError {
    #[error("truncated certificate")]
    Truncated,
    #[error("length field is not a supported BER form")]
    UnsupportedLength,
    #[error("certificate has no CAR (tag 42) data object")]
    MissingCar,
}

struct RawTlv<'a> {
    tag: u32,
    body: &'a [u8],
}

fn read_tag(bytes: &[u8]) -> Result<(u32, &[u8]), CvcParseError> {
    let first = *bytes.first().ok_or(CvcParseError::Truncated)?;
    if first & 0x1F != 0x1F {
        return Ok((first as u32, &bytes[1..]));
    }
    let second = *bytes.get(1).ok_or(CvcParseError::Truncated)?;
    Ok((((first as u32) << 8) | second as u32, &bytes[2..]))
}

fn read_len(bytes: &[u8]) -> Result<(usize, &[u8]), CvcParseError> {
    let first = *bytes.first().ok_or(CvcParseError::Truncated)?;
    if first & 0x80 == 0 {
        return Ok((first as usize, &bytes[1..]));
    }
    let n = (first & 0x7F) as usize;
    if n == 0 || n > 2 {
        return Err(CvcParseError::UnsupportedLength);
    }
    let rest = &bytes[1..];
    if rest.len() < n {
        return Err(CvcParseError::Truncated);
    }
    let len = rest[..n].iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok((len, &rest[n..]))
}

fn parse_one(bytes: &[u8]) -> Result<(RawTlv<'_>, &[u8]), CvcParseError> {
    let (tag, rest) = read_tag(bytes)?;
    let (len, rest) = read_len(rest)?;
    if rest.len() < len {
        return Err(CvcParseError::Truncated);
    }
    let (body, remainder) = rest.split_at(len);
    Ok((RawTlv { tag, body }, remainder))
}

fn parse_all(mut bytes: &[u8]) -> Result<Vec<RawTlv<'_>>, CvcParseError> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let (tlv, rest) = parse_one(bytes)?;
        out.push(tlv);
        bytes = rest;
    }
    Ok(out)
}

/// Find a tag's primitive value anywhere in the tree (constructed tags
/// are identified here by bit 0x20 on the first tag byte, same BER rule
/// as `crate::tlv`).
fn find_recursive(nodes: &[RawTlv<'_>], wanted: u32) -> Option<Vec<u8>> {
    for node in nodes {
        if node.tag == wanted {
            return Some(node.body.to_vec());
        }
        let first_byte = if node.tag > 0xFF { (node.tag >> 8) as u8 } else { node.tag as u8 };
        if first_byte & 0x20 != 0 {
            if let Ok(children) = parse_all(node.body) {
                if let Some(found) = find_recursive(&children, wanted) {
                    return Some(found);
                }
            }
        }
    }
    None
}

const TAG_CAR: u32 = 0x42;

impl CvCertificate {
    /// Parse `raw` (the full certificate as read off the card, tag
    /// `7F21` outermost) and extract its CAR.
    pub fn parse(raw: &[u8]) -> Result<CvCertificate, CvcParseError> {
        let nodes = parse_all(raw)?;
        let car = find_recursive(&nodes, TAG_CAR).ok_or(CvcParseError::MissingCar)?;
        Ok(CvCertificate { car, value: raw.to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(tag: &[u8], body: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.push(body.len() as u8);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn extracts_car_from_nested_certificate() {
        let car_do = wrap(&[0x42], b"DEGKVZTEST");
        let chr_do = wrap(&[0x5F, 0x20], b"DEEGKTEST00001");
        let body = wrap(&[0x7F, 0x4E], &[car_do, chr_do].concat());
        let sig = wrap(&[0x5F, 0x37], &[0xAAu8; 8]);
        let cert = wrap(&[0x7F, 0x21], &[body, sig].concat());

        let parsed = CvCertificate::parse(&cert).unwrap();
        assert_eq!(parsed.car, b"DEGKVZTEST");
        assert_eq!(parsed.value, cert);
    }

    #[test]
    fn missing_car_is_an_error() {
        let body = wrap(&[0x7F, 0x4E], &wrap(&[0x5F, 0x20], b"X"));
        let cert = wrap(&[0x7F, 0x21], &body);
        assert_eq!(CvCertificate::parse(&cert), Err(CvcParseError::MissingCar));
    }
}
