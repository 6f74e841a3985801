//! Terminal Authentication.
//!
//! The terminal proves its read entitlement to the chip: a chain of
//! card-verifiable certificates is pushed for on-card validation, then the
//! chip issues a challenge which the terminal signs together with the
//! document identity and the hash of its Chip Authentication ephemeral key
//! (ICAO Doc 9303 Part 11 ยง 7.1, BSI TR-03110).
//!
//! Certificate parsing and chain building happen outside this crate; the
//! caller supplies the certificates in validation order together with the
//! references the card needs.


use std::fmt;

use tracing::instrument;

use crate::crypt::signature;
use crate::iso7816::apdu::{Apdu, CommandHeader, Data, Response};
use crate::iso7816::card::{CommunicationError, SmartCard};
use crate::der_util;


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    SetDigitalSignatureTemplate,
    VerifyCertificate,
    SetAuthenticationTemplate,
    GetChallenge,
    ExternalAuthenticate,
}
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetDigitalSignatureTemplate => write!(f, "MSE:Set DST"),
            Self::VerifyCertificate => write!(f, "PSO:Verify Certificate"),
            Self::SetAuthenticationTemplate => write!(f, "MSE:Set AT"),
            Self::GetChallenge => write!(f, "GET CHALLENGE"),
            Self::ExternalAuthenticate => write!(f, "EXTERNAL AUTHENTICATE"),
        }
    }
}


#[derive(Debug)]
pub enum Error {
    OperationFailed {
        operation: Operation,
        response: Response,
    },
    ChallengeLength { obtained: usize },
    Signing(signature::Error),
    EmptyCertificateChain,
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::OperationFailed { operation, response }
                => write!(f, "operation {:?} failed with response code 0x{:04X}", operation, response.trailer.to_word()),
            Self::ChallengeLength { obtained }
                => write!(f, "challenge has length {}, expected 8", obtained),
            Self::Signing(e)
                => write!(f, "signing the challenge failed: {}", e),
            Self::EmptyCertificateChain
                => write!(f, "no card-verifiable certificates supplied"),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Signing(e) => Some(e),
            _ => None,
        }
    }
}
impl From<signature::Error> for Error {
    fn from(value: signature::Error) -> Self { Self::Signing(value) }
}


/// One card-verifiable certificate ready to be pushed to the chip.
///
/// `body_and_signature` is the concatenated content of the `7F21` template:
/// the certificate body (`7F4E`) followed by the signature (`5F37`).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CvCertificate {
    pub body_and_signature: Vec<u8>,
    pub authority_reference: Vec<u8>,
    pub holder_reference: Vec<u8>,
}


/// Signs the Terminal Authentication challenge with the terminal's private
/// key, which typically lives in secure hardware outside this crate.
pub trait TerminalSigner {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, signature::Error>;
}


/// Runs Terminal Authentication.
///
/// `id_picc` is the document number with check digit after Basic Access
/// Control, or the compressed chip ephemeral key after PACE.
/// `ephemeral_key_hash` is the hash of the terminal's Chip Authentication
/// ephemeral public key.
#[instrument(skip_all)]
pub fn perform<SC: SmartCard + ?Sized>(
    card: &mut SC,
    certificates: &[CvCertificate],
    signer: &dyn TerminalSigner,
    id_picc: &[u8],
    ephemeral_key_hash: &[u8],
) -> Result<(), CommunicationError> {
    let terminal_certificate = certificates.last()
        .ok_or(Error::EmptyCertificateChain)?;

    for certificate in certificates {
        set_digital_signature_template(card, &certificate.authority_reference)?;
        verify_certificate(card, &certificate.body_and_signature)?;
    }

    // announce which certificate's key will sign the challenge
    set_authentication_template(card, &terminal_certificate.holder_reference)?;

    let challenge = get_challenge(card)?;

    let mut signing_input = Vec::with_capacity(id_picc.len() + challenge.len() + ephemeral_key_hash.len());
    signing_input.extend(id_picc);
    signing_input.extend(&challenge);
    signing_input.extend(ephemeral_key_hash);
    let terminal_signature = signer.sign(&signing_input)
        .map_err(Error::from)?;

    external_authenticate(card, terminal_signature)?;
    Ok(())
}

fn set_digital_signature_template<SC: SmartCard + ?Sized>(card: &mut SC, authority_reference: &[u8]) -> Result<(), CommunicationError> {
    let mut request_data = Vec::new();
    request_data.push(0x83);
    der_util::encode_primitive_length(&mut request_data, authority_reference.len());
    request_data.extend(authority_reference);

    let request = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0x22, // MANAGE SECURITY ENVIRONMENT
            p1: 0b1000_0001, // verification, set
            p2: 0xB6, // digital signature template
        },
        data: Data::RequestDataShort { request_data },
    };
    let response = card.communicate(&request)?;
    if response.trailer.to_word() == 0x9000 {
        Ok(())
    } else {
        Err(Error::OperationFailed {
            operation: Operation::SetDigitalSignatureTemplate,
            response,
        }.into())
    }
}

fn verify_certificate<SC: SmartCard + ?Sized>(card: &mut SC, body_and_signature: &[u8]) -> Result<(), CommunicationError> {
    let request = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0x2A, // PERFORM SECURITY OPERATION
            p1: 0x00,
            p2: 0xBE, // verify self-descriptive certificate
        },
        data: Data::RequestDataShort {
            request_data: body_and_signature.to_vec(),
        },
    };
    let response = card.communicate(&request)?;
    if response.trailer.to_word() == 0x9000 {
        Ok(())
    } else {
        Err(Error::OperationFailed {
            operation: Operation::VerifyCertificate,
            response,
        }.into())
    }
}

fn set_authentication_template<SC: SmartCard + ?Sized>(card: &mut SC, holder_reference: &[u8]) -> Result<(), CommunicationError> {
    let mut request_data = Vec::new();
    request_data.push(0x83);
    der_util::encode_primitive_length(&mut request_data, holder_reference.len());
    request_data.extend(holder_reference);

    let request = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0x22, // MANAGE SECURITY ENVIRONMENT
            p1: 0b1000_0001, // verification, set
            p2: 0xA4, // control reference template for authentication
        },
        data: Data::RequestDataShort { request_data },
    };
    let response = card.communicate(&request)?;
    if response.trailer.to_word() == 0x9000 {
        Ok(())
    } else {
        Err(Error::OperationFailed {
            operation: Operation::SetAuthenticationTemplate,
            response,
        }.into())
    }
}

fn get_challenge<SC: SmartCard + ?Sized>(card: &mut SC) -> Result<Vec<u8>, CommunicationError> {
    let request = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0x84, // GET CHALLENGE
            p1: 0x00,
            p2: 0x00,
        },
        data: Data::ResponseDataShort { response_data_length: 8 },
    };
    let response = card.communicate(&request)?;
    if response.trailer.to_word() != 0x9000 {
        return Err(Error::OperationFailed {
            operation: Operation::GetChallenge,
            response,
        }.into());
    }
    if response.data.len() != 8 {
        return Err(Error::ChallengeLength { obtained: response.data.len() }.into());
    }
    Ok(response.data)
}

fn external_authenticate<SC: SmartCard + ?Sized>(card: &mut SC, terminal_signature: Vec<u8>) -> Result<(), CommunicationError> {
    let request = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0x82, // EXTERNAL AUTHENTICATE
            p1: 0x00,
            p2: 0x00,
        },
        data: Data::RequestDataShort {
            request_data: terminal_signature,
        },
    };
    let response = card.communicate(&request)?;
    if response.trailer.to_word() == 0x9000 {
        Ok(())
    } else {
        Err(Error::OperationFailed {
            operation: Operation::ExternalAuthenticate,
            response,
        }.into())
    }
}
