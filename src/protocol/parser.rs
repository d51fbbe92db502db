//! Parsers for AT command responses.
//!
//! Each parser takes a single response line (or a whole [`Response`]) and
//! returns `None` when the expected field is absent or malformed. None of
//! them fail: callers decide whether a missing field matters.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::protocol::response::{Response, Terminal, is_error_code};
use crate::types::{SmsRecord, SmsStatus};

/// CSQ value meaning "not known or not detectable".
pub const CSQ_UNKNOWN: u8 = 99;
/// Highest meaningful CSQ value.
pub const CSQ_MAX: u8 = 31;
/// COPS `<mode>` value the modem reports while roaming.
pub const COPS_ROAMING_MODE: u8 = 2;

/// Operator information from `+COPS:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorInfo {
    /// Selection mode, the first field.
    pub mode: u8,
    /// Operator name, if registered.
    pub name: Option<String>,
    /// Access technology, if reported.
    pub act: Option<u8>,
}

impl OperatorInfo {
    /// Returns true if the mode field carries the roaming code.
    #[must_use]
    pub const fn is_roaming(&self) -> bool {
        self.mode == COPS_ROAMING_MODE
    }
}

/// A USSD reply from `+CUSD:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UssdReply {
    /// Session status (0 done, 1 further action required, 2 terminated...).
    pub status: u8,
    /// Reply payload, empty if none was present.
    pub payload: String,
    /// Data coding scheme, if reported.
    pub dcs: Option<u8>,
}

/// Splits a comma-separated parameter list, honouring double quotes.
///
/// Quotes are removed and fields trimmed; empty fields are kept.
#[must_use]
pub fn split_fields(params: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in params.chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current).trim().to_owned()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_owned());
    fields
}

/// Returns the parameters after `prefix` (e.g. `+CSQ:`) in `line`.
fn params<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.find(prefix)
        .map(|pos| line[pos + prefix.len()..].trim())
}

/// Parses the raw RSSI value from `+CSQ: <rssi>,<ber>`.
#[must_use]
pub fn parse_csq(line: &str) -> Option<u8> {
    let params = params(line, "+CSQ:")?;
    split_fields(params).first()?.parse().ok()
}

/// Maps a raw CSQ value to a 0-100 percentage.
///
/// 99 means unknown; everything else is `round(csq * 100 / 31)` capped at 100.
#[must_use]
pub fn signal_percent(csq: u8) -> Option<u8> {
    if csq == CSQ_UNKNOWN {
        return None;
    }
    let percent = (u32::from(csq) * 100 + u32::from(CSQ_MAX) / 2) / u32::from(CSQ_MAX);
    u8::try_from(percent.min(100)).ok()
}

/// Parses `+COPS: <mode>[,<format>,"<oper>"[,<AcT>]]`.
#[must_use]
pub fn parse_cops(line: &str) -> Option<OperatorInfo> {
    let fields = split_fields(params(line, "+COPS:")?);
    let mode = fields.first()?.parse().ok()?;
    let name = fields
        .get(2)
        .filter(|name| !name.is_empty())
        .cloned();
    let act = fields.get(3).and_then(|act| act.parse().ok());
    Some(OperatorInfo { mode, name, act })
}

/// Parses the registration status from `+CREG: [<n>,]<stat>[,...]`.
#[must_use]
pub fn parse_creg(line: &str) -> Option<u8> {
    let fields = split_fields(params(line, "+CREG:")?);
    let stat = if fields.len() == 1 {
        fields.first()
    } else {
        fields.get(1)
    };
    stat?.parse().ok()
}

/// Returns true for home (1) or roaming (5) registration.
#[must_use]
pub const fn is_registered(stat: u8) -> bool {
    matches!(stat, 1 | 5)
}

/// Parses `+CGATT: <state>`.
#[must_use]
pub fn parse_cgatt(line: &str) -> Option<bool> {
    match params(line, "+CGATT:")? {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

/// Parses the SIM state from `+CPIN: <code>`.
#[must_use]
pub fn parse_cpin(line: &str) -> Option<String> {
    params(line, "+CPIN:")
        .map(|state| state.trim_matches('"').to_owned())
        .filter(|state| !state.is_empty())
}

/// Parses the number from `+CNUM: "<alpha>","<number>",<type>`.
#[must_use]
pub fn parse_cnum(line: &str) -> Option<String> {
    split_fields(params(line, "+CNUM:")?)
        .into_iter()
        .nth(1)
        .filter(|number| !number.is_empty())
}

/// Extracts the ICCID from a `AT+CCID` response.
///
/// Modems answer either with a bare value or prefixed by `+CCID:`,
/// `^ICCID:` or `+ICCID:`.
#[must_use]
pub fn parse_iccid(response: &Response) -> Option<String> {
    let line = response.info_line()?;
    let value = ["+CCID:", "^ICCID:", "+ICCID:"]
        .iter()
        .find_map(|prefix| params(line, prefix))
        .unwrap_or(line);
    let value = value.trim_matches('"').trim();
    (!value.is_empty()).then(|| value.to_owned())
}

/// Parses `+CUSD: <m>[,"<str>"[,<dcs>]]`.
#[must_use]
pub fn parse_cusd(line: &str) -> Option<UssdReply> {
    let fields = split_fields(params(line, "+CUSD:")?);
    let status = fields.first()?.parse().ok()?;
    let payload = fields.get(1).cloned().unwrap_or_default();
    let dcs = fields.get(2).and_then(|dcs| dcs.parse().ok());
    Some(UssdReply {
        status,
        payload,
        dcs,
    })
}

/// Parses an SMS service-centre timestamp `yy/MM/dd,hh:mm:ss±zz`.
///
/// `zz` is the zone offset in quarter hours.
#[must_use]
pub fn parse_sms_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim().trim_matches('"');
    let split = text.rfind(['+', '-'])?;
    let (local, zone) = text.split_at(split);

    let naive = NaiveDateTime::parse_from_str(local, "%y/%m/%d,%H:%M:%S").ok()?;
    let quarters: i32 = zone.parse().ok()?;
    let offset = FixedOffset::east_opt(quarters * 15 * 60)?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses a `+CMGL:` header into (index, status, number, timestamp text).
fn parse_cmgl_header(line: &str) -> Result<(u32, SmsStatus, String, Option<String>)> {
    let params = params(line, "+CMGL:")
        .ok_or_else(|| Error::protocol(format!("not a CMGL header: {line}")))?;
    let fields = split_fields(params);
    if fields.len() < 3 {
        return Err(Error::protocol(format!("short CMGL header: {line}")));
    }

    let index = fields[0]
        .parse()
        .map_err(|_| Error::protocol(format!("bad CMGL index: {line}")))?;
    let status = SmsStatus::from_text(&fields[1])
        .ok_or_else(|| Error::protocol(format!("bad CMGL status: {line}")))?;
    let number = fields[2].clone();
    let timestamp = fields.get(4).filter(|ts| !ts.is_empty()).cloned();

    Ok((index, status, number, timestamp))
}

/// Parses a text-mode `AT+CMGL` listing into SMS records.
///
/// Each message is a header line followed by one or more body lines. A
/// malformed header is logged and its message skipped.
#[must_use]
pub fn parse_cmgl(response: &Response, modem_id: Option<&str>) -> Vec<SmsRecord> {
    let mut records = Vec::new();
    let mut lines = response.lines.iter().peekable();

    while let Some(line) = lines.next() {
        if !line.starts_with("+CMGL:") {
            continue;
        }

        let mut body = Vec::new();
        while let Some(next) = lines.peek() {
            if next.starts_with("+CMGL:")
                || Terminal::from_line(next) == Some(Terminal::Ok)
                || is_error_code(next)
            {
                break;
            }
            body.push(next.as_str());
            lines.next();
        }

        match parse_cmgl_header(line) {
            Ok((id, status, number, timestamp)) => {
                let timestamp = timestamp
                    .as_deref()
                    .and_then(parse_sms_timestamp)
                    .unwrap_or_else(Utc::now);
                records.push(SmsRecord {
                    id,
                    modem_id: modem_id.map(str::to_owned),
                    status,
                    number,
                    body: body.join("\n"),
                    timestamp,
                });
            }
            Err(e) => tracing::warn!("skipping SMS: {}", e),
        }
    }

    records
}
