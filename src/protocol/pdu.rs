//! SMS-SUBMIT PDU encoding for PDU-mode submission.
//!
//! Layout of the hex string written after the `AT+CMGS=<len>` prompt:
//! ```text
//! ┌──────┬──────┬────┬────────────────┬─────┬─────┬─────┬─────────┐
//! │ SCA  │ 0x01 │ MR │ DA (len,toa,..)│ PID │ DCS │ UDL │   UD    │
//! │ 0x00 │ SUB  │ 00 │ semi-octets    │ 00  │00/08│     │         │
//! └──────┴──────┴────┴────────────────┴─────┴─────┴─────┴─────────┘
//! ```
//! `SCA` 0x00 selects the SIM's default service centre and is not counted
//! in the `<len>` given to `AT+CMGS`.

use bytes::{BufMut, BytesMut};

use crate::codec;
use crate::error::{Error, Result};

/// Message type indicator for SMS-SUBMIT, no validity period.
const FIRST_OCTET_SUBMIT: u8 = 0x01;
/// International number type-of-address.
const TOA_INTERNATIONAL: u8 = 0x91;
/// Unknown number type-of-address.
const TOA_UNKNOWN: u8 = 0x81;
/// GSM 7-bit default alphabet data coding scheme.
const DCS_GSM7: u8 = 0x00;
/// UCS-2 data coding scheme.
const DCS_UCS2: u8 = 0x08;

/// Maximum septets in a single GSM 7-bit message.
pub const MAX_GSM7_SEPTETS: usize = 160;
/// Maximum UTF-16 units in a single UCS-2 message.
pub const MAX_UCS2_UNITS: usize = 70;
/// Maximum digits in a destination address.
pub const MAX_ADDRESS_DIGITS: usize = 20;

/// An encoded SMS-SUBMIT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitPdu {
    /// Uppercase hex of SCA + TPDU.
    pub hex: String,
    /// TPDU length in octets, the `AT+CMGS` argument.
    pub tpdu_len: usize,
}

/// Encodes `text` for `number` as a single SMS-SUBMIT.
///
/// GSM 7-bit is used when every character is in the default alphabet,
/// UCS-2 otherwise.
///
/// # Errors
///
/// Returns a protocol error if the number has no digits or contains
/// anything other than digits after an optional `+`/`00` prefix, or if
/// the text does not fit a single message.
pub fn encode_submit(number: &str, text: &str) -> Result<SubmitPdu> {
    let (toa, digits) = split_number(number)?;

    let (dcs, udl, user_data) = if codec::is_gsm7_compatible(text) {
        let septets: Vec<u8> = text.chars().filter_map(codec::septet).collect();
        if septets.len() > MAX_GSM7_SEPTETS {
            return Err(Error::protocol(format!(
                "message of {} septets exceeds {MAX_GSM7_SEPTETS}",
                septets.len()
            )));
        }
        (DCS_GSM7, septets.len(), pack_septets(&septets))
    } else {
        let units: Vec<u16> = text.encode_utf16().collect();
        if units.len() > MAX_UCS2_UNITS {
            return Err(Error::protocol(format!(
                "UCS-2 message of {} units exceeds {MAX_UCS2_UNITS}",
                units.len()
            )));
        }
        let data: Vec<u8> = units.iter().flat_map(|u| u.to_be_bytes()).collect();
        (DCS_UCS2, data.len(), data)
    };

    let address = semi_octets(digits);

    let mut tpdu = BytesMut::with_capacity(7 + address.len() + user_data.len());
    tpdu.put_u8(FIRST_OCTET_SUBMIT);
    tpdu.put_u8(0x00); // Message reference, assigned by the modem
    tpdu.put_u8(octet(digits.len())?);
    tpdu.put_u8(toa);
    tpdu.put_slice(&address);
    tpdu.put_u8(0x00); // Protocol identifier
    tpdu.put_u8(dcs);
    tpdu.put_u8(octet(udl)?);
    tpdu.put_slice(&user_data);

    Ok(SubmitPdu {
        hex: format!("00{}", hex::encode_upper(&tpdu)),
        tpdu_len: tpdu.len(),
    })
}

/// Splits a number into its type-of-address and bare digits.
fn split_number(number: &str) -> Result<(u8, &str)> {
    let (toa, digits) = if let Some(rest) = number.strip_prefix('+') {
        (TOA_INTERNATIONAL, rest)
    } else if let Some(rest) = number.strip_prefix("00") {
        (TOA_INTERNATIONAL, rest)
    } else {
        (TOA_UNKNOWN, number)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::protocol(format!(
            "invalid destination number for PDU: {number}"
        )));
    }
    if digits.len() > MAX_ADDRESS_DIGITS {
        return Err(Error::protocol(format!(
            "destination number has {} digits, at most {MAX_ADDRESS_DIGITS} allowed",
            digits.len()
        )));
    }
    Ok((toa, digits))
}

/// Length field as a single octet.
fn octet(len: usize) -> Result<u8> {
    u8::try_from(len).map_err(|_| Error::protocol(format!("PDU field length {len} exceeds 255")))
}

/// Encodes digits as swapped semi-octets, padding an odd count with `F`.
fn semi_octets(digits: &str) -> Vec<u8> {
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let low = pair[0] - b'0';
            let high = pair.get(1).map_or(0x0F, |d| d - b'0');
            (high << 4) | low
        })
        .collect()
}

/// Packs 7-bit septets into octets, least significant bits first.
fn pack_septets(septets: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(septets.len() * 7 / 8 + 1);
    let mut acc: u32 = 0;
    let mut bits = 0;

    for &septet in septets {
        acc |= u32::from(septet & 0x7F) << bits;
        bits += 7;
        while bits >= 8 {
            packed.push((acc & 0xFF) as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        packed.push((acc & 0xFF) as u8);
    }

    packed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_septets() {
        let septets: Vec<u8> = "hellohello".chars().filter_map(codec::septet).collect();
        assert_eq!(
            hex::encode_upper(pack_septets(&septets)),
            "E8329BFD4697D9EC37"
        );
    }

    #[test]
    fn test_semi_octets() {
        assert_eq!(hex::encode_upper(semi_octets("213555123456")), "125355214365");
        assert_eq!(hex::encode_upper(semi_octets("12345")), "2143F5");
    }

    #[test]
    fn test_encode_submit_gsm7() {
        let pdu = encode_submit("+213555123456", "hellohello").unwrap();
        assert_eq!(
            pdu.hex,
            "0001000C9112535521436500000AE8329BFD4697D9EC37"
        );
        assert_eq!(pdu.tpdu_len, 22);
    }

    #[test]
    fn test_encode_submit_ucs2() {
        let pdu = encode_submit("0555123456", "سلام").unwrap();
        // DCS 08, UDL 8 octets
        assert!(pdu.hex.contains("81505521436500080806330644062706"));
        assert_eq!(pdu.tpdu_len, 7 + 5 + 8);
    }

    #[test]
    fn test_encode_submit_rejects_bad_number() {
        assert!(encode_submit("+21355x", "hi").is_err());
        assert!(encode_submit("+", "hi").is_err());
    }

    #[test]
    fn test_encode_submit_rejects_long_number() {
        let longest = format!("+{}", "1".repeat(MAX_ADDRESS_DIGITS));
        let pdu = encode_submit(&longest, "hi").unwrap();
        // Address length octet after first octet and message reference
        assert!(pdu.hex.starts_with("00010014"));

        let too_long = format!("+{}", "1".repeat(MAX_ADDRESS_DIGITS + 1));
        let err = encode_submit(&too_long, "hi").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));

        let wrapping = "1".repeat(256);
        assert!(encode_submit(&wrapping, "hi").is_err());
    }

    #[test]
    fn test_encode_submit_rejects_long_text() {
        let text = "a".repeat(MAX_GSM7_SEPTETS + 1);
        assert!(encode_submit("+213555123456", &text).is_err());
    }
}
