//! Minimal BER-TLV codec for the single-byte-tag data objects this crate
//! actually walks (spec.md §1 treats the TLV codec as an assumed
//! external collaborator; this module is that collaborator's concrete
//! shape here — see `DESIGN.md` for why it's hand-rolled rather than
//! driving `iso7816-tlv` directly).
//!
//! Every tag named by spec.md (`81`, `87`, `8E`, `97`, `99`, `E0`, `D0`,
//! `D2`-`D4`, DER integer `02`) fits in one byte, so multi-byte tag
//! numbers (the `0x1F` continuation form) are not implemented.

/// A single BER-TLV node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u8,
    pub value: TlvValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvValue {
    Primitive(Vec<u8>),
    Constructed(Vec<Tlv>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    #[error("truncated TLV")]
    Truncated,
    #[error("multi-byte tag numbers are not supported")]
    UnsupportedTag,
    #[error("length field is not a supported BER form")]
    UnsupportedLength,
}

impl Tlv {
    pub fn primitive(&self) -> Option<&[u8]> {
        match &self.value {
            TlvValue::Primitive(b) => Some(b),
            TlvValue::Constructed(_) => None,
        }
    }

    pub fn children(&self) -> Option<&[Tlv]> {
        match &self.value {
            TlvValue::Constructed(c) => Some(c),
            TlvValue::Primitive(_) => None,
        }
    }

    pub fn find(&self, tag: u8) -> Option<&Tlv> {
        self.children()?.iter().find(|t| t.tag == tag)
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = match &self.value {
            TlvValue::Primitive(b) => b.clone(),
            TlvValue::Constructed(children) => children.iter().flat_map(Tlv::encode).collect(),
        };
        let mut out = vec![self.tag];
        out.extend(encode_len(body.len()));
        out.extend(body);
        out
    }
}

/// BER length encoding: short form for 0..=127, long form (`0x81 len` /
/// `0x82 len_hi len_lo`) otherwise.
pub fn encode_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len <= 0xFF {
        vec![0x81, len as u8]
    } else {
        vec![0x82, (len >> 8) as u8, len as u8]
    }
}

fn parse_len(bytes: &[u8]) -> Result<(usize, &[u8]), TlvError> {
    let first = *bytes.first().ok_or(TlvError::Truncated)?;
    if first & 0x80 == 0 {
        return Ok((first as usize, &bytes[1..]));
    }
    let n = (first & 0x7F) as usize;
    if n == 0 || n > 2 {
        return Err(TlvError::UnsupportedLength);
    }
    let rest = &bytes[1..];
    if rest.len() < n {
        return Err(TlvError::Truncated);
    }
    let len = rest[..n].iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok((len, &rest[n..]))
}

/// Parse one TLV node from the front of `bytes`, returning it along with
/// the unconsumed remainder.
pub fn parse_one(bytes: &[u8]) -> Result<(Tlv, &[u8]), TlvError> {
    let tag = *bytes.first().ok_or(TlvError::Truncated)?;
    if tag & 0x1F == 0x1F {
        return Err(TlvError::UnsupportedTag);
    }
    let (len, rest) = parse_len(&bytes[1..])?;
    if rest.len() < len {
        return Err(TlvError::Truncated);
    }
    let (body, remainder) = rest.split_at(len);
    let value = if tag & 0x20 != 0 {
        TlvValue::Constructed(parse_all(body)?)
    } else {
        TlvValue::Primitive(body.to_vec())
    };
    Ok((Tlv { tag, value }, remainder))
}

/// Parse a full buffer as a sequence of sibling TLV nodes.
pub fn parse_all(mut bytes: &[u8]) -> Result<Vec<Tlv>, TlvError> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let (tlv, rest) = parse_one(bytes)?;
        out.push(tlv);
        bytes = rest;
    }
    Ok(out)
}

/// Interpret a DER INTEGER's big-endian two's-complement bytes as an
/// unsigned value (the four buffer-length DOs in `EF.ATR` are always
/// non-negative; spec.md §4.F).
pub fn der_integer_as_u32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primitive() {
        let tlv = Tlv { tag: 0x81, value: TlvValue::Primitive(vec![1, 2, 3]) };
        let encoded = tlv.encode();
        assert_eq!(encoded, vec![0x81, 3, 1, 2, 3]);
        let (parsed, rest) = parse_one(&encoded).unwrap();
        assert_eq!(parsed, tlv);
        assert!(rest.is_empty());
    }

    #[test]
    fn round_trips_constructed() {
        let inner = Tlv { tag: 0x02, value: TlvValue::Primitive(vec![0x04, 0x09]) };
        let outer = Tlv { tag: 0xE0, value: TlvValue::Constructed(vec![inner.clone(), inner]) };
        let encoded = outer.encode();
        let (parsed, _) = parse_one(&encoded).unwrap();
        assert_eq!(parsed.children().unwrap().len(), 2);
    }

    #[test]
    fn long_form_length() {
        let body = vec![0xAAu8; 200];
        let tlv = Tlv { tag: 0x87, value: TlvValue::Primitive(body.clone()) };
        let encoded = tlv.encode();
        assert_eq!(encoded[1], 0x81);
        let (parsed, _) = parse_one(&encoded).unwrap();
        assert_eq!(parsed.primitive().unwrap(), &body[..]);
    }
}
