//! The smart-card transport interface.


use std::fmt;

use tracing::trace;

use crate::active_authentication;
use crate::chip_authentication;
use crate::iso7816::apdu;
use crate::pace;
use crate::secure_messaging;
use crate::terminal_authentication;


#[derive(Debug)]
pub enum CommunicationError {
    Write(apdu::WriteError),
    Pcsc(pcsc::Error),
    ShortResponse,
    SecureMessaging(secure_messaging::Error),
    Pace(pace::Error),
    ChipAuthentication(chip_authentication::Error),
    TerminalAuthentication(terminal_authentication::Error),
    ActiveAuthentication(active_authentication::Error),
}
impl fmt::Display for CommunicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write(e) => write!(f, "APDU write error: {}", e),
            Self::Pcsc(e) => write!(f, "PCSC error: {}", e),
            Self::ShortResponse => write!(f, "response too short"),
            Self::SecureMessaging(e) => write!(f, "Secure Messaging error: {}", e),
            Self::Pace(e) => write!(f, "PACE error: {}", e),
            Self::ChipAuthentication(e) => write!(f, "Chip Authentication error: {}", e),
            Self::TerminalAuthentication(e) => write!(f, "Terminal Authentication error: {}", e),
            Self::ActiveAuthentication(e) => write!(f, "Active Authentication error: {}", e),
        }
    }
}
impl std::error::Error for CommunicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Write(e) => Some(e),
            Self::Pcsc(e) => Some(e),
            Self::ShortResponse => None,
            Self::SecureMessaging(e) => Some(e),
            Self::Pace(e) => Some(e),
            Self::ChipAuthentication(e) => Some(e),
            Self::TerminalAuthentication(e) => Some(e),
            Self::ActiveAuthentication(e) => Some(e),
        }
    }
}
impl From<apdu::WriteError> for CommunicationError {
    fn from(value: apdu::WriteError) -> Self { Self::Write(value) }
}
impl From<pcsc::Error> for CommunicationError {
    fn from(value: pcsc::Error) -> Self { Self::Pcsc(value) }
}
impl From<secure_messaging::Error> for CommunicationError {
    fn from(value: secure_messaging::Error) -> Self { Self::SecureMessaging(value) }
}
impl From<pace::Error> for CommunicationError {
    fn from(value: pace::Error) -> Self { Self::Pace(value) }
}
impl From<chip_authentication::Error> for CommunicationError {
    fn from(value: chip_authentication::Error) -> Self { Self::ChipAuthentication(value) }
}
impl From<terminal_authentication::Error> for CommunicationError {
    fn from(value: terminal_authentication::Error) -> Self { Self::TerminalAuthentication(value) }
}
impl From<active_authentication::Error> for CommunicationError {
    fn from(value: active_authentication::Error) -> Self { Self::ActiveAuthentication(value) }
}


/// A smart card compatible with ISO/IEC 7816.
pub trait SmartCard {
    /// Send a request APDU to the smart card and receive a response APDU.
    fn communicate(&mut self, request: &apdu::Apdu) -> Result<apdu::Response, CommunicationError>;
}
impl SmartCard for pcsc::Card {
    fn communicate(&mut self, request: &apdu::Apdu) -> Result<apdu::Response, CommunicationError> {
        let mut out_buf = Vec::new();
        request.write_bytes(&mut out_buf)?;
        trace!("sending to card: {}", crate::hex_bytes(&out_buf));
        let mut in_buf = vec![0u8; request.data.response_data_length().unwrap_or(0) + 2];
        let in_slice = self.transmit(&out_buf, &mut in_buf)?;
        trace!("received from card: {}", crate::hex_bytes(in_slice));
        apdu::Response::from_slice(in_slice)
            .ok_or(CommunicationError::ShortResponse)
    }
}
