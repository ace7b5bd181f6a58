//! CV-certificate chain importer (spec.md §4.H).
//!
//! No teacher counterpart; grounded directly on the pseudocode in
//! spec.md §4.H. The only design decision left open by that pseudocode
//! is what `MSE_SET`/`PSO_VERIFY_CERT`'s instruction bytes are; this
//! module uses the standard ISO/IEC 7816-8 codes (`MSE` = `22`, `PSO` =
//! `2A`) since spec.md gives P1/P2 but not INS.

use std::collections::HashSet;

use crate::apdu::{Command, Trailer};
use crate::cvc::CvCertificate;
use crate::error::{Error, Result};
use crate::proxy::Transmitter;
use crate::tlv::{Tlv, TlvValue};

const INS_MSE: u8 = 0x22;
const INS_PSO: u8 = 0x2A;
const TAG_CAR_DO: u8 = 0x83;

fn mse_set_data(car: &[u8]) -> Vec<u8> {
    Tlv { tag: TAG_CAR_DO, value: TlvValue::Primitive(car.to_vec()) }.encode()
}

/// Walk `chain` (ordered from the end-entity certificate at index 0
/// outward to increasingly-trusted issuers) and install it on the card
/// reachable through `transport`, per spec.md §4.H.
pub fn import_chain<T: Transmitter>(transport: &T, chain: &[CvCertificate]) -> Result<()> {
    if chain.is_empty() {
        return Err(Error::UnknownAnchor);
    }

    let trailer_6a88 = Trailer(0x6A, 0x88);
    let mut direction: i64 = 1;
    let mut accept: HashSet<Trailer> = [trailer_6a88, Trailer::OK].into_iter().collect();
    let mut index: i64 = 0;

    loop {
        if index < 0 || index as usize >= chain.len() {
            return Err(Error::UnknownAnchor);
        }
        let cvc = &chain[index as usize];

        let mse_cmd = Command::with_data(0x00, INS_MSE, 0x81, 0xB6, mse_set_data(&cvc.car));
        let mse_resp = transport.send_apdu(&mse_cmd)?;
        if !accept.contains(&mse_resp.trailer) {
            return Err(Error::TrailerMismatch(mse_resp.trailer));
        }

        if mse_resp.trailer == Trailer::OK {
            // The 6A88 signal is only honoured once: the first MSE_SET
            // that succeeds while 6A88 is still accepted is the anchor
            // the card already knows, so the walk reverses from here.
            if accept.contains(&trailer_6a88) {
                direction = -1;
                accept = [Trailer::OK].into_iter().collect();
            }

            let verify_cmd = Command::with_data(0x00, INS_PSO, 0x00, 0xBE, cvc.value.clone());
            let verify_resp = transport.send_apdu(&verify_cmd)?;
            if verify_resp.trailer != Trailer::OK {
                return Err(Error::TrailerMismatch(verify_resp.trailer));
            }

            if direction == -1 && index == 0 {
                return Ok(());
            }
        }

        index += direction;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::Response;
    use std::cell::RefCell;

    fn cert(car: &str) -> CvCertificate {
        CvCertificate { car: car.as_bytes().to_vec(), value: format!("cert:{car}").into_bytes() }
    }

    /// A fake card: `anchor_car` is the CAR the card already trusts.
    /// `MSE_SET` answers `9000` for it, and (once the anchor has been
    /// found once) for every subsequent reference too — modelling a
    /// well-formed chain where each certificate verifies under the key
    /// installed by the previous step — and `6A88` otherwise.
    struct FakeCard {
        anchor_car: Vec<u8>,
        found_anchor: RefCell<bool>,
        log: RefCell<Vec<(u8, Vec<u8>)>>,
    }

    impl Transmitter for FakeCard {
        fn send_apdu(&self, apdu: &Command) -> Result<Response> {
            self.log.borrow_mut().push((apdu.ins, apdu.data.clone()));
            match apdu.ins {
                INS_MSE => {
                    if *self.found_anchor.borrow() {
                        return Ok(Response { data: Vec::new(), trailer: Trailer::OK });
                    }
                    let tlv = Tlv { tag: TAG_CAR_DO, value: TlvValue::Primitive(self.anchor_car.clone()) };
                    let car_do = tlv.encode();
                    if apdu.data == car_do {
                        *self.found_anchor.borrow_mut() = true;
                        Ok(Response { data: Vec::new(), trailer: Trailer::OK })
                    } else {
                        Ok(Response { data: Vec::new(), trailer: Trailer(0x6A, 0x88) })
                    }
                }
                INS_PSO => Ok(Response { data: Vec::new(), trailer: Trailer::OK }),
                _ => panic!("unexpected INS"),
            }
        }
    }

    #[test]
    fn s6_anchor_found_partway_through_walks_back_to_zero() {
        // chain[2] is the anchor; chain[0] is the end-entity key.
        let chain = vec![cert("leaf"), cert("mid"), cert("anchor")];
        let card = FakeCard { anchor_car: b"anchor".to_vec(), found_anchor: RefCell::new(false), log: RefCell::new(Vec::new()) };
        import_chain(&card, &chain).unwrap();

        let log = card.log.borrow();
        // Forward probe: MSE at 0 (6A88), 1 (6A88), 2 (9000, flips).
        // Down phase re-sends MSE at each step too: 2 (already sent,
        // now the PSO follows), then MSE+PSO at 1, then MSE+PSO at 0.
        // Total MSE_SET: 0,1,2,1,0 = 5. Total PSO_VERIFY: 2,1,0 = 3.
        let mse_count = log.iter().filter(|(ins, _)| *ins == INS_MSE).count();
        let pso_count = log.iter().filter(|(ins, _)| *ins == INS_PSO).count();
        assert_eq!(mse_count, 5);
        assert_eq!(pso_count, 3);
    }

    #[test]
    fn chain_exhausted_without_anchor_is_an_error() {
        let chain = vec![cert("leaf"), cert("mid")];
        let card = FakeCard { anchor_car: b"never-seen".to_vec(), found_anchor: RefCell::new(false), log: RefCell::new(Vec::new()) };
        assert_eq!(import_chain(&card, &chain), Err(Error::UnknownAnchor));
    }

    #[test]
    fn single_certificate_chain_where_it_is_its_own_anchor() {
        let chain = vec![cert("anchor")];
        let card = FakeCard { anchor_car: b"anchor".to_vec(), found_anchor: RefCell::new(false), log: RefCell::new(Vec::new()) };
        import_chain(&card, &chain).unwrap();
    }
}
