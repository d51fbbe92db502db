//! AT command vocabulary.
//!
//! Fixed commands are constants; parameterised ones are built by the
//! functions below. Commands are written without the trailing CR/LF, which
//! the command engine appends.

/// Liveness check.
pub const AT: &str = "AT";
/// Soft reset to the stored profile.
pub const RESET: &str = "ATZ";
/// Restore factory defaults.
pub const FACTORY_RESET: &str = "AT&F";
/// Identification (used by the detector probe).
pub const IDENTIFY: &str = "ATI";

/// SIM PIN state.
pub const SIM_STATE: &str = "AT+CPIN?";
/// Signal quality.
pub const SIGNAL_QUALITY: &str = "AT+CSQ";
/// Current operator.
pub const OPERATOR: &str = "AT+COPS?";
/// Automatic operator selection.
pub const OPERATOR_AUTO: &str = "AT+COPS=0";
/// Network registration status.
pub const REGISTRATION: &str = "AT+CREG?";
/// GPRS attach status.
pub const GPRS_ATTACH: &str = "AT+CGATT?";

/// Model identification.
pub const MODEL: &str = "AT+CGMM";
/// Firmware revision.
pub const FIRMWARE: &str = "AT+CGMR";
/// Device serial number (IMEI).
pub const IMEI: &str = "AT+CGSN";
/// Subscriber identity.
pub const IMSI: &str = "AT+CIMI";
/// SIM card identifier.
pub const ICCID: &str = "AT+CCID";
/// Subscriber number.
pub const MSISDN: &str = "AT+CNUM";

/// SMS text mode.
pub const SMS_TEXT_MODE: &str = "AT+CMGF=1";
/// SMS PDU mode.
pub const SMS_PDU_MODE: &str = "AT+CMGF=0";
/// New message indications routed to the terminal.
pub const SMS_NOTIFICATIONS: &str = "AT+CNMI=2,2,0,0,0";
/// List every stored message.
pub const SMS_LIST_ALL: &str = "AT+CMGL=\"ALL\"";
/// Calling line identification.
pub const CALLER_ID: &str = "AT+CLIP=1";

/// GSM default alphabet character set.
pub const CHARSET_GSM: &str = "AT+CSCS=\"GSM\"";
/// International reference alphabet character set.
pub const CHARSET_IRA: &str = "AT+CSCS=\"IRA\"";

/// Message terminator (Ctrl-Z) ending an SMS body.
pub const CTRL_Z: char = '\x1A';

/// USSD data coding scheme used for requests (GSM 7-bit, language unspecified).
pub const USSD_DCS: u8 = 15;

/// Sets the packet data context APN.
#[must_use]
pub fn set_apn(apn: &str) -> String {
    format!("AT+CGDCONT=1,\"IP\",\"{apn}\"")
}

/// Starts a text-mode submission with a quoted destination.
#[must_use]
pub fn compose_quoted(number: &str) -> String {
    format!("AT+CMGS=\"{number}\"")
}

/// Starts a text-mode submission with an unquoted destination.
#[must_use]
pub fn compose_unquoted(number: &str) -> String {
    format!("AT+CMGS={number}")
}

/// Starts a PDU-mode submission of `tpdu_len` octets.
#[must_use]
pub fn compose_pdu(tpdu_len: usize) -> String {
    format!("AT+CMGS={tpdu_len}")
}

/// Deletes the message stored at `index`.
#[must_use]
pub fn delete_sms(index: u32) -> String {
    format!("AT+CMGD={index}")
}

/// Sends a USSD request with a quoted payload.
#[must_use]
pub fn ussd_quoted(payload: &str) -> String {
    format!("AT+CUSD=1,\"{payload}\",{USSD_DCS}")
}

/// Sends a USSD request with an unquoted payload.
#[must_use]
pub fn ussd_unquoted(payload: &str) -> String {
    format!("AT+CUSD=1,{payload},{USSD_DCS}")
}
