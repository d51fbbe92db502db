//! Response model for AT commands.
//!
//! A response is the list of lines read after a command up to and
//! including the line carrying a terminal token.

use crate::error::{Error, Result};

/// Token that ends a command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminal {
    /// Command executed successfully.
    Ok,
    /// Command failed (`ERROR`, `+CME ERROR`, `+CMS ERROR`, `FAIL`).
    Error,
    /// Compose prompt, the modem is waiting for a message body.
    Prompt,
}

impl Terminal {
    /// Classifies a single response line.
    ///
    /// Matching is by containment, so `+CMS ERROR: 500` counts as an
    /// error and `OK` inside a longer line counts as success. Errors are
    /// checked first.
    #[must_use]
    pub fn from_line(line: &str) -> Option<Self> {
        if line.contains("ERROR") || line.contains("FAIL") {
            Some(Self::Error)
        } else if line.contains("OK") {
            Some(Self::Ok)
        } else if line.starts_with('>') {
            Some(Self::Prompt)
        } else {
            None
        }
    }
}

/// Returns true for a bare final result code: `ERROR`, `+CME ERROR: <n>`
/// or `+CMS ERROR: <n>`.
///
/// Unlike [`Terminal::from_line`], free text that merely mentions an error
/// does not count.
#[must_use]
pub fn is_error_code(line: &str) -> bool {
    line == "ERROR" || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR")
}

/// A complete command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The command that produced this response.
    pub command: String,
    /// Every line received, including echo and the terminal line.
    pub lines: Vec<String>,
    /// The terminal token that ended the response.
    pub terminal: Terminal,
}

impl Response {
    /// Returns true if the response ended with `OK`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.terminal == Terminal::Ok
    }

    /// Returns true if the modem is waiting for a message body.
    #[must_use]
    pub fn is_prompt(&self) -> bool {
        self.terminal == Terminal::Prompt
    }

    /// Converts an `ERROR`/`FAIL` response into a protocol error.
    pub fn into_ok(self) -> Result<Self> {
        if self.terminal == Terminal::Error {
            return Err(Error::protocol(format!(
                "{} failed: {}",
                self.command,
                self.last_line()
            )));
        }
        Ok(self)
    }

    /// Returns the whole response as newline-joined text.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns the terminal line.
    #[must_use]
    pub fn last_line(&self) -> &str {
        self.lines.last().map_or("", String::as_str)
    }

    /// Returns true if any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    /// Returns the first line starting with `prefix` (e.g. `+CSQ:`).
    #[must_use]
    pub fn find(&self, prefix: &str) -> Option<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .find(|line| line.starts_with(prefix))
    }

    /// Returns the first payload line: not the command echo, not a
    /// terminal line.
    ///
    /// Used for bare-value answers such as `AT+CGMM` or `AT+CIMI`.
    #[must_use]
    pub fn info_line(&self) -> Option<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .find(|line| !is_echo(line, &self.command) && Terminal::from_line(line).is_none())
    }
}

fn is_echo(line: &str, command: &str) -> bool {
    line.eq_ignore_ascii_case(command) || line.to_ascii_uppercase().starts_with("AT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(command: &str, lines: &[&str], terminal: Terminal) -> Response {
        Response {
            command: command.to_owned(),
            lines: lines.iter().map(|l| (*l).to_owned()).collect(),
            terminal,
        }
    }

    #[test]
    fn test_terminal_classification() {
        assert_eq!(Terminal::from_line("OK"), Some(Terminal::Ok));
        assert_eq!(Terminal::from_line("ERROR"), Some(Terminal::Error));
        assert_eq!(Terminal::from_line("+CMS ERROR: 500"), Some(Terminal::Error));
        assert_eq!(Terminal::from_line("COMMAND FAIL"), Some(Terminal::Error));
        assert_eq!(Terminal::from_line(">"), Some(Terminal::Prompt));
        assert_eq!(Terminal::from_line("+CSQ: 17,99"), None);
    }

    #[test]
    fn test_is_error_code() {
        assert!(is_error_code("ERROR"));
        assert!(is_error_code("+CME ERROR: 10"));
        assert!(is_error_code("+CMS ERROR: 304"));
        assert!(!is_error_code("Recharge ERROR, veuillez reessayer"));
        assert!(!is_error_code("+CUSD: 0,\"FAILED\",15"));
    }

    #[test]
    fn test_info_line_skips_echo() {
        let resp = response("AT+CGMM", &["AT+CGMM", "E3372", "OK"], Terminal::Ok);
        assert_eq!(resp.info_line(), Some("E3372"));

        let resp = response("AT+CIMI", &["603021234567890", "OK"], Terminal::Ok);
        assert_eq!(resp.info_line(), Some("603021234567890"));

        let resp = response("AT+CIMI", &["OK"], Terminal::Ok);
        assert_eq!(resp.info_line(), None);
    }

    #[test]
    fn test_into_ok() {
        let resp = response("AT+CMGD=1", &["ERROR"], Terminal::Error);
        let err = resp.into_ok().unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));

        let resp = response("AT", &["OK"], Terminal::Ok);
        assert!(resp.into_ok().is_ok());
    }

    #[test]
    fn test_find() {
        let resp = response("AT+CSQ", &["AT+CSQ", "+CSQ: 20,99", "OK"], Terminal::Ok);
        assert_eq!(resp.find("+CSQ:"), Some("+CSQ: 20,99"));
        assert!(resp.contains("20,99"));
        assert_eq!(resp.text(), "AT+CSQ\n+CSQ: 20,99\nOK");
    }
}
