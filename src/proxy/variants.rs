//! Card-proxy variants (spec.md §4.G).
//!
//! No teacher counterpart; grounded on spec.md §4.G's per-variant bullet
//! list and §6's per-variant SFI table. Spec.md gives exact AID bytes
//! for three of the five variants; the SMC-K analogue and the
//! connector-level module are only named descriptively, so their AIDs
//! and key references below are placeholders consistent with the
//! gematik AID family the named variants use (see `DESIGN.md`).

use crate::cvc::CvCertificate;
use crate::error::Result;
use crate::keys::MasterKeys;
use crate::proxy::generic::GenericProxy;
use crate::proxy::Transmitter;
use crate::apdu::Command;

const INS_SELECT: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;

fn select_aid(transport: &impl Transmitter, aid: &[u8]) -> Result<()> {
    let cmd = Command::with_data(0x00, INS_SELECT, 0x04, 0x0C, aid.to_vec());
    let resp = transport.send_apdu(&cmd)?;
    if !resp.is_ok() {
        return Err(crate::error::Error::TrailerMismatch(resp.trailer));
    }
    Ok(())
}

fn read_cert(transport: &impl Transmitter, sfi: u8) -> Result<CvCertificate> {
    let cmd = Command::with_ne(0x00, INS_READ_BINARY, 0x80 | sfi, 0x00, crate::apdu::Ne::EXTENDED_WILDCARD);
    let resp = transport.send_apdu(&cmd)?;
    if !resp.is_ok() {
        return Err(crate::error::Error::TrailerMismatch(resp.trailer));
    }
    CvCertificate::parse(&resp.data).map_err(|e| crate::error::Error::InvalidApdu(e.to_string()))
}

/// Mandatory contract every variant implements (spec.md §4.G).
pub trait SmAuthentication {
    fn get_cvc4_sm(&self) -> &CvCertificate;
}

/// Implemented by variants that also expose a role-authentication key.
pub trait RoleAuthentication {
    fn get_cvc_role_authentication(&self) -> &CvCertificate;
}

/// Implemented only by the connector-level module (spec.md §4.G).
pub trait TrustedChannelAuthentication {
    fn get_cvc4_tc(&self) -> &CvCertificate;
}

/// Key reference of a variant's authentication-for-SM private key.
/// (Byte value is not given by spec.md; see `DESIGN.md`.)
const KEY_REF_SM_AUTH: u8 = 0x02;
/// Key reference of a variant's role-authentication private key, where
/// distinct from `KEY_REF_SM_AUTH`.
const KEY_REF_ROLE_AUTH: u8 = 0x03;

/// `eGK` — the insured person's card (AID `D2 76 00 01 44 80 00`).
pub struct PatientCard {
    pub generic: GenericProxy,
    cvc_sm: CvCertificate,
}

impl PatientCard {
    pub const AID: [u8; 7] = [0xD2, 0x76, 0x00, 0x01, 0x44, 0x80, 0x00];
    pub const SFI_AUT_CVC: u8 = 6;
    pub const KEY_REF_SM_AUTH: u8 = KEY_REF_SM_AUTH;

    pub fn boot(transport: &impl Transmitter, master_keys: &MasterKeys) -> Result<PatientCard> {
        let generic = GenericProxy::boot(transport, master_keys)?;
        select_aid(transport, &Self::AID)?;
        let cvc_sm = read_cert(transport, Self::SFI_AUT_CVC)?;
        Ok(PatientCard { generic, cvc_sm })
    }
}

impl SmAuthentication for PatientCard {
    fn get_cvc4_sm(&self) -> &CvCertificate {
        &self.cvc_sm
    }
}

/// `HBA` — the healthcare-professional card (AID `D2 76 00 01 46 06`).
pub struct ProfessionalCard {
    pub generic: GenericProxy,
    cvc_role: CvCertificate,
    cvc_sm: CvCertificate,
}

impl ProfessionalCard {
    pub const AID: [u8; 6] = [0xD2, 0x76, 0x00, 0x01, 0x46, 0x06];
    pub const SFI_AUTR: u8 = 6;
    pub const SFI_AUTD_RPE: u8 = 9;
    pub const KEY_REF_SM_AUTH: u8 = KEY_REF_SM_AUTH;
    pub const KEY_REF_ROLE_AUTH: u8 = KEY_REF_ROLE_AUTH;

    pub fn boot(transport: &impl Transmitter, master_keys: &MasterKeys) -> Result<ProfessionalCard> {
        let generic = GenericProxy::boot(transport, master_keys)?;
        select_aid(transport, &Self::AID)?;
        let cvc_role = read_cert(transport, Self::SFI_AUTR)?;
        let cvc_sm = read_cert(transport, Self::SFI_AUTD_RPE)?;
        Ok(ProfessionalCard { generic, cvc_role, cvc_sm })
    }
}

impl SmAuthentication for ProfessionalCard {
    fn get_cvc4_sm(&self) -> &CvCertificate {
        &self.cvc_sm
    }
}

impl RoleAuthentication for ProfessionalCard {
    fn get_cvc_role_authentication(&self) -> &CvCertificate {
        &self.cvc_role
    }
}

/// Which of the two module-card flavours a [`ModuleCard`] is (spec.md
/// §4.G: `D276 0001 4480 03` and "an SMC-K analogue").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleCardFlavour {
    Smc0300,
    SmcK,
}

impl ModuleCardFlavour {
    fn aid(self) -> [u8; 8] {
        match self {
            ModuleCardFlavour::Smc0300 => [0xD2, 0x76, 0x00, 0x01, 0x44, 0x80, 0x00, 0x03],
            // Not given literally by spec.md; follows the same AID
            // family with the next product-type byte (see DESIGN.md).
            ModuleCardFlavour::SmcK => [0xD2, 0x76, 0x00, 0x01, 0x44, 0x80, 0x00, 0x04],
        }
    }
}

/// A module card (SMC-B/SMC-K family).
pub struct ModuleCard {
    pub generic: GenericProxy,
    pub flavour: ModuleCardFlavour,
    cvc_sm: CvCertificate,
}

impl ModuleCard {
    pub const SFI_AUTD_RPS: u8 = 10;
    pub const KEY_REF_SM_AUTH: u8 = KEY_REF_SM_AUTH;

    pub fn boot(
        transport: &impl Transmitter,
        master_keys: &MasterKeys,
        flavour: ModuleCardFlavour,
    ) -> Result<ModuleCard> {
        let generic = GenericProxy::boot(transport, master_keys)?;
        select_aid(transport, &flavour.aid())?;
        let cvc_sm = read_cert(transport, Self::SFI_AUTD_RPS)?;
        Ok(ModuleCard { generic, flavour, cvc_sm })
    }
}

impl SmAuthentication for ModuleCard {
    fn get_cvc4_sm(&self) -> &CvCertificate {
        &self.cvc_sm
    }
}

/// The connector-level module, the only variant that additionally
/// exposes a trusted-channel authentication certificate (spec.md §4.G).
pub struct ConnectorModule {
    pub generic: GenericProxy,
    cvc_sm: CvCertificate,
    cvc_tc: CvCertificate,
}

impl ConnectorModule {
    /// Not given literally by spec.md; follows the same AID family as
    /// the module-card flavours (see `DESIGN.md`).
    pub const AID: [u8; 8] = [0xD2, 0x76, 0x00, 0x01, 0x44, 0x80, 0x00, 0x05];
    pub const SFI_AUTD_RPS: u8 = 10;
    /// No SFI is named for the trusted-channel certificate; reused at
    /// the next free slot in the same range (see `DESIGN.md`).
    pub const SFI_AUT_TC: u8 = 11;
    pub const KEY_REF_SM_AUTH: u8 = KEY_REF_SM_AUTH;

    pub fn boot(transport: &impl Transmitter, master_keys: &MasterKeys) -> Result<ConnectorModule> {
        let generic = GenericProxy::boot(transport, master_keys)?;
        select_aid(transport, &Self::AID)?;
        let cvc_sm = read_cert(transport, Self::SFI_AUTD_RPS)?;
        let cvc_tc = read_cert(transport, Self::SFI_AUT_TC)?;
        Ok(ConnectorModule { generic, cvc_sm, cvc_tc })
    }
}

impl SmAuthentication for ConnectorModule {
    fn get_cvc4_sm(&self) -> &CvCertificate {
        &self.cvc_sm
    }
}

impl TrustedChannelAuthentication for ConnectorModule {
    fn get_cvc4_tc(&self) -> &CvCertificate {
        &self.cvc_tc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::{Response, Trailer};
    use crate::tlv::{Tlv, TlvValue};
    use std::cell::RefCell;

    fn cv_cert_bytes(car: &str) -> Vec<u8> {
        let car_do = Tlv { tag: 0x42, value: TlvValue::Primitive(car.as_bytes().to_vec()) };
        Tlv { tag: 0x30, value: TlvValue::Constructed(vec![car_do]) }.encode()
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

    /// A fake card that answers every SELECT/READ BINARY with `9000`;
    /// `EF.GDO`/`EF.ATR`/CA-cert reads (generic boot) return minimal
    /// stand-ins, and any other READ BINARY returns a certificate tagged
    /// with its own SFI as the CAR, so tests can tell reads apart.
    struct FakeCard;

    impl Transmitter for FakeCard {
        fn send_apdu(&self, apdu: &Command) -> Result<Response> {
            match apdu.ins {
                INS_SELECT => Ok(Response { data: Vec::new(), trailer: Trailer::OK }),
                INS_READ_BINARY => {
                    let sfi = apdu.p1 & 0x1F;
                    Ok(Response { data: cv_cert_bytes(&format!("SFI{sfi}")), trailer: Trailer::OK })
                }
                _ => panic!("unexpected INS"),
            }
        }
    }

    #[test]
    fn patient_card_exposes_sm_certificate() {
        let card = FakeCard;
        let proxy = PatientCard::boot(&card, &master_keys()).unwrap();
        assert_eq!(proxy.get_cvc4_sm().car, b"SFI6");
    }

    #[test]
    fn professional_card_exposes_role_and_sm_certificates() {
        let card = FakeCard;
        let proxy = ProfessionalCard::boot(&card, &master_keys()).unwrap();
        assert_eq!(proxy.get_cvc_role_authentication().car, b"SFI6");
        assert_eq!(proxy.get_cvc4_sm().car, b"SFI9");
    }

    #[test]
    fn connector_module_exposes_trusted_channel_certificate() {
        let card = FakeCard;
        let proxy = ConnectorModule::boot(&card, &master_keys()).unwrap();
        assert_eq!(proxy.get_cvc4_sm().car, b"SFI10");
        assert_eq!(proxy.get_cvc4_tc().car, b"SFI11");
    }

    #[test]
    fn module_card_flavours_select_distinct_aids() {
        let card = FakeCard;
        let smc_b = ModuleCard::boot(&card, &master_keys(), ModuleCardFlavour::Smc0300).unwrap();
        let smc_k = ModuleCard::boot(&card, &master_keys(), ModuleCardFlavour::SmcK).unwrap();
        assert_ne!(ModuleCardFlavour::Smc0300.aid(), ModuleCardFlavour::SmcK.aid());
        assert_eq!(smc_b.get_cvc4_sm().car, b"SFI10");
        assert_eq!(smc_k.get_cvc4_sm().car, b"SFI10");
    }
}
