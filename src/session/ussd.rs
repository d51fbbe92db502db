//! USSD requests and balance queries.

use chrono::Utc;

use crate::codec;
use crate::error::{Error, Result};
use crate::protocol::parser::{self, UssdReply};
use crate::protocol::{Terminal, at};
use crate::session::ModemSession;
use crate::transport::Transport;
use crate::types::UssdExchange;

/// Data coding scheme of UCS-2 USSD replies.
const DCS_UCS2: u8 = 72;

/// A USSD request format, tried in [`UssdFormat::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UssdFormat {
    /// GSM 7-bit text, quoted.
    Encoded,
    /// GSM 7-bit septets as hex, quoted.
    Hex,
    /// Sanitized text, unquoted.
    Raw,
}

impl UssdFormat {
    /// Request order.
    pub const ORDER: [Self; 3] = [Self::Encoded, Self::Hex, Self::Raw];

    /// Short name for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Encoded => "encoded",
            Self::Hex => "hex",
            Self::Raw => "raw",
        }
    }

    /// Builds the `AT+CUSD` request for a sanitized command.
    #[must_use]
    pub fn request(self, sanitized: &str) -> String {
        match self {
            Self::Encoded => at::ussd_quoted(&codec::encode_7bit(sanitized)),
            Self::Hex => at::ussd_quoted(&codec::encode_hex_7bit(sanitized)),
            Self::Raw => at::ussd_unquoted(sanitized),
        }
    }

    /// Decodes a reply payload.
    ///
    /// UCS-2 replies are hex-decoded whatever the request format; hex
    /// requests get hex replies decoded through the GSM alphabet.
    #[must_use]
    pub fn decode_reply(self, reply: &UssdReply) -> String {
        if reply.dcs == Some(DCS_UCS2) {
            if let Some(text) = codec::decode_ucs2_hex(&reply.payload) {
                return text;
            }
        }
        if self == Self::Hex && codec::looks_like_hex(&reply.payload) {
            return codec::decode_hex_7bit(&reply.payload);
        }
        reply.payload.clone()
    }
}

impl<T: Transport> ModemSession<T> {
    /// Sends a USSD request, trying each [`UssdFormat`] in order.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if `command` has no valid USSD characters,
    /// and [`Error::AllMethodsFailed`] once every format has failed.
    pub async fn send_ussd(&self, command: &str) -> Result<UssdExchange> {
        self.traced(async {
            let _op = self.op.lock().await;
            let result = self.send_ussd_locked(command).await;
            self.settle(result)
        })
        .await
    }

    /// Queries the account balance.
    ///
    /// Each configured balance code is tried in order and the first reply
    /// mentioning a balance keyword wins. If none does, the first code is
    /// sent once more and its reply returned as is.
    ///
    /// # Errors
    ///
    /// Fails only if the final request fails.
    pub async fn get_balance(&self) -> Result<UssdExchange> {
        self.traced(async {
            let _op = self.op.lock().await;
            let result = self.query_balance().await;
            self.settle(result)
        })
        .await
    }

    async fn query_balance(&self) -> Result<UssdExchange> {
        let codes = &self.config.balance_codes;
        for code in codes {
            match self.send_ussd_locked(code).await {
                Ok(exchange) if self.mentions_balance(&exchange.response) => {
                    tracing::info!("balance from {}: {}", code, exchange.response);
                    return Ok(exchange);
                }
                Ok(exchange) => {
                    tracing::debug!("{} reply is not a balance: {}", code, exchange.response);
                }
                Err(e) => tracing::debug!("balance code {} failed: {}", code, e),
            }
        }

        let first = codes.first().ok_or_else(|| Error::InvalidConfig {
            reason: "no balance codes configured".into(),
        })?;
        tracing::debug!("no balance keyword found, falling back to {}", first);
        self.send_ussd_locked(first).await
    }

    fn mentions_balance(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.config
            .balance_keywords
            .iter()
            .any(|keyword| text.contains(&keyword.to_lowercase()))
    }

    async fn send_ussd_locked(&self, command: &str) -> Result<UssdExchange> {
        tracing::info!("sending USSD {}", command);

        self.preflight().await;
        if self.step(at::CHARSET_IRA).await.is_none() {
            self.step(at::CHARSET_GSM).await;
        }

        let sanitized = codec::sanitize_for_ussd(command);
        if sanitized.is_empty() {
            return Err(Error::protocol(format!(
                "USSD command has no valid characters: {command}"
            )));
        }

        let mut last = None;
        let mut attempts = 0;
        for format in UssdFormat::ORDER {
            attempts += 1;
            match self.ussd_attempt(format, &sanitized).await {
                Ok((response, raw_response)) => {
                    tracing::info!("USSD {} answered ({} format)", command, format.label());
                    return Ok(UssdExchange {
                        command: command.to_owned(),
                        modem_id: Some(self.identity.id.clone()),
                        response,
                        raw_response,
                        success: true,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    tracing::warn!("USSD {} format failed: {}", format.label(), e);
                    last = Some(e);
                }
            }
        }

        let last = last.unwrap_or_else(|| Error::protocol("no USSD format attempted"));
        tracing::error!("USSD {} failed", command);
        Err(Error::AllMethodsFailed {
            operation: "USSD",
            attempts,
            last: Box::new(last),
        })
    }

    /// Sends one request and returns the decoded reply with the raw trace.
    async fn ussd_attempt(&self, format: UssdFormat, sanitized: &str) -> Result<(String, String)> {
        let request = format.request(sanitized);
        let timeout = self.config.ussd_timeout;
        let response = self.engine.send(&request, timeout, 1).await?;
        let mut raw = response.text();

        // The reply text may itself contain ERROR or FAIL, which ends
        // collection on the +CUSD line. That is still a reply.
        let line = match response.find("+CUSD:") {
            Some(line) => line.to_owned(),
            None if response.terminal != Terminal::Ok => {
                return Err(Error::protocol(format!(
                    "{request} failed: {}",
                    response.last_line()
                )));
            }
            // Some modems acknowledge first and deliver the reply unsolicited
            None => {
                let line = self
                    .engine
                    .read_until(timeout, |line| line.contains("+CUSD:"))
                    .await?
                    .ok_or_else(|| Error::timeout(&request, timeout))?;
                raw.push('\n');
                raw.push_str(&line);
                line
            }
        };

        let reply = parser::parse_cusd(&line)
            .ok_or_else(|| Error::protocol(format!("malformed USSD reply: {line}")))?;
        let text = format.decode_reply(&reply);
        if text.is_empty() {
            return Err(Error::protocol(format!(
                "empty USSD reply (status {})",
                reply.status
            )));
        }
        Ok((text, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::connected;
    use crate::transport::scripted::{ScriptedTransport, healthy_modem, lines};

    fn reply(payload: &str, dcs: Option<u8>) -> UssdReply {
        UssdReply {
            status: 0,
            payload: payload.to_owned(),
            dcs,
        }
    }

    fn ussd_requests(writes: &[String]) -> Vec<String> {
        writes
            .iter()
            .filter(|w| w.starts_with("AT+CUSD"))
            .cloned()
            .collect()
    }

    #[test]
    fn test_request_formats() {
        assert_eq!(UssdFormat::Encoded.request("*223#"), "AT+CUSD=1,\"*223#\",15");
        assert_eq!(UssdFormat::Hex.request("*223#"), "AT+CUSD=1,\"2A32323323\",15");
        assert_eq!(UssdFormat::Raw.request("*223#"), "AT+CUSD=1,*223#,15");
    }

    #[test]
    fn test_decode_reply() {
        assert_eq!(
            UssdFormat::Encoded.decode_reply(&reply("0053006F006C00640065", Some(72))),
            "Solde"
        );
        assert_eq!(UssdFormat::Hex.decode_reply(&reply("2A32", Some(15))), "*2");
        assert_eq!(UssdFormat::Encoded.decode_reply(&reply("2A32", Some(15))), "2A32");
        assert_eq!(
            UssdFormat::Hex.decode_reply(&reply("Solde 10 DA", Some(15))),
            "Solde 10 DA"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_ussd() {
        let (session, writes) = connected(ScriptedTransport::healthy()).await;

        let exchange = session.send_ussd(" *223# ").await.unwrap();
        assert!(exchange.success);
        assert_eq!(exchange.command, " *223# ");
        assert_eq!(exchange.response, "Votre solde est 100 DA");
        assert!(exchange.raw_response.contains("+CUSD: 0"));
        assert_eq!(exchange.modem_id.as_deref(), Some("modem-ttyUSB0"));

        let writes = writes.lock().unwrap().clone();
        assert!(writes.contains(&"AT+CSCS=\"IRA\"".to_owned()));
        assert_eq!(ussd_requests(&writes), vec!["AT+CUSD=1,\"*223#\",15"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_ussd_charset_fallback() {
        let (session, writes) = connected(ScriptedTransport::new(|written| {
            if written == at::CHARSET_IRA {
                lines(&["ERROR"])
            } else {
                healthy_modem(written)
            }
        }))
        .await;

        session.send_ussd("*100#").await.unwrap();
        let writes = writes.lock().unwrap().clone();
        let ira = writes.iter().position(|w| w == at::CHARSET_IRA).unwrap();
        assert_eq!(writes[ira + 1], at::CHARSET_GSM);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_ussd_unsolicited_reply() {
        let (session, _) = connected(ScriptedTransport::new(|written| {
            if written.starts_with("AT+CUSD") {
                lines(&["OK", "+CUSD: 1,\"Menu: 1 Solde\",15"])
            } else {
                healthy_modem(written)
            }
        }))
        .await;

        let exchange = session.send_ussd("*101#").await.unwrap();
        assert_eq!(exchange.response, "Menu: 1 Solde");
        assert!(exchange.raw_response.ends_with("+CUSD: 1,\"Menu: 1 Solde\",15"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_ussd_reply_mentioning_failure_is_sent_once() {
        let (session, writes) = connected(ScriptedTransport::new(|written| {
            if written.starts_with("AT+CUSD") {
                lines(&["+CUSD: 0,\"Recharge FAILED: code invalide\",15", "OK"])
            } else {
                healthy_modem(written)
            }
        }))
        .await;

        let exchange = session.send_ussd("*610*123#").await.unwrap();
        assert!(exchange.success);
        assert_eq!(exchange.response, "Recharge FAILED: code invalide");
        assert_eq!(
            ussd_requests(&writes.lock().unwrap()),
            vec!["AT+CUSD=1,\"*610*123#\",15"]
        );

        // Same for an ERROR inside the reply text
        let (session, writes) = connected(ScriptedTransport::new(|written| {
            if written.starts_with("AT+CUSD") {
                lines(&["+CUSD: 0,\"ERROR: solde insuffisant\",15", "OK"])
            } else {
                healthy_modem(written)
            }
        }))
        .await;

        let exchange = session.send_ussd("*610*123#").await.unwrap();
        assert_eq!(exchange.response, "ERROR: solde insuffisant");
        assert_eq!(ussd_requests(&writes.lock().unwrap()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_ussd_falls_back_through_formats() {
        let (session, writes) = connected(ScriptedTransport::new(|written| {
            match written {
                // Empty payload counts as a failure
                "AT+CUSD=1,\"*223#\",15" => lines(&["+CUSD: 0,\"\",15", "OK"]),
                "AT+CUSD=1,\"2A32323323\",15" => lines(&["+CME ERROR: 100"]),
                "AT+CUSD=1,*223#,15" => lines(&["+CUSD: 0,\"Solde: 50 DA\",15", "OK"]),
                _ => healthy_modem(written),
            }
        }))
        .await;

        let exchange = session.send_ussd("*223#").await.unwrap();
        assert_eq!(exchange.response, "Solde: 50 DA");
        assert_eq!(
            ussd_requests(&writes.lock().unwrap()),
            vec![
                "AT+CUSD=1,\"*223#\",15",
                "AT+CUSD=1,\"2A32323323\",15",
                "AT+CUSD=1,*223#,15"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_ussd_all_methods_failed() {
        let (session, _) = connected(ScriptedTransport::new(|written| {
            if written.starts_with("AT+CUSD") {
                lines(&["+CUSD: 4", "OK"])
            } else {
                healthy_modem(written)
            }
        }))
        .await;

        let err = session.send_ussd("*223#").await.unwrap_err();
        assert!(matches!(
            err,
            Error::AllMethodsFailed {
                operation: "USSD",
                attempts: 3,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_ussd_rejects_empty_command() {
        let (session, writes) = connected(ScriptedTransport::healthy()).await;
        let err = session.send_ussd("!!!").await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(ussd_requests(&writes.lock().unwrap()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_balance_keyword_match() {
        let (session, writes) = connected(ScriptedTransport::new(|written| {
            match written {
                "AT+CUSD=1,\"*223#\",15" => lines(&["+CUSD: 0,\"Service indisponible\",15", "OK"]),
                "AT+CUSD=1,\"*100#\",15" => lines(&["+CUSD: 0,\"Your balance is 120 DZD\",15", "OK"]),
                _ => healthy_modem(written),
            }
        }))
        .await;

        let exchange = session.get_balance().await.unwrap();
        assert_eq!(exchange.response, "Your balance is 120 DZD");
        assert_eq!(exchange.command, "*100#");
        assert_eq!(ussd_requests(&writes.lock().unwrap()).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_balance_falls_back_to_first_code() {
        let (session, writes) = connected(ScriptedTransport::new(|written| {
            if written.starts_with("AT+CUSD") {
                lines(&["+CUSD: 0,\"Bienvenue\",15", "OK"])
            } else {
                healthy_modem(written)
            }
        }))
        .await;

        let exchange = session.get_balance().await.unwrap();
        assert_eq!(exchange.command, "*223#");
        assert_eq!(exchange.response, "Bienvenue");
        // Four codes, then the first one again
        assert_eq!(ussd_requests(&writes.lock().unwrap()).len(), 5);
    }
}
