//! AT protocol definitions.
//!
//! This module contains the text-level protocol pieces:
//! - Line decoding of the raw byte stream
//! - The AT command vocabulary
//! - Response classification and parsing
//! - SMS-SUBMIT PDU encoding

pub mod at;
pub mod line;
pub mod parser;
pub mod pdu;
pub mod response;

pub use line::{LineDecoder, MAX_LINE_BUFFER};
pub use parser::{OperatorInfo, UssdReply};
pub use pdu::{SubmitPdu, encode_submit};
pub use response::{Response, Terminal, is_error_code};
