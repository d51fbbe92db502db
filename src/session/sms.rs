//! SMS listing, submission and deletion.

use crate::error::{Error, Result};
use crate::protocol::{Terminal, at, is_error_code, parser, pdu};
use crate::session::ModemSession;
use crate::transport::Transport;
use crate::types::SmsRecord;

/// A way of submitting an SMS, tried in [`SmsStrategy::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmsStrategy {
    /// Text mode, `AT+CMGS="<number>"`.
    QuotedText,
    /// Text mode, `AT+CMGS=<number>`.
    UnquotedText,
    /// PDU mode, `AT+CMGS=<octets>` followed by the hex SMS-SUBMIT.
    Pdu,
}

impl SmsStrategy {
    /// Submission order.
    pub const ORDER: [Self; 3] = [Self::QuotedText, Self::UnquotedText, Self::Pdu];

    /// Short name for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::QuotedText => "quoted text",
            Self::UnquotedText => "unquoted text",
            Self::Pdu => "PDU",
        }
    }
}

/// Puts `number` into international form.
///
/// Numbers starting with `+` or `00` are kept; a local leading zero is
/// replaced by `country_code`, and any other number gets it prepended.
/// Spaces and dashes are dropped.
#[must_use]
pub fn normalize_number(number: &str, country_code: &str) -> String {
    let number: String = number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if number.starts_with('+') || number.starts_with("00") {
        number
    } else if let Some(local) = number.strip_prefix('0') {
        format!("{country_code}{local}")
    } else {
        format!("{country_code}{number}")
    }
}

impl<T: Transport> ModemSession<T> {
    /// Lists every message stored on the modem.
    ///
    /// Malformed entries are skipped.
    ///
    /// # Errors
    ///
    /// Fails if the listing command fails or times out.
    pub async fn get_sms_messages(&self) -> Result<Vec<SmsRecord>> {
        self.traced(async {
            let _op = self.op.lock().await;
            let records = self.settle(self.list_sms().await)?;
            tracing::info!("listed {} SMS", records.len());
            Ok(records)
        })
        .await
    }

    /// Sends `text` to `number`, trying each [`SmsStrategy`] in order.
    ///
    /// Returns the strategy that succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllMethodsFailed`] carrying the last failure once
    /// every strategy has failed.
    pub async fn send_sms(&self, number: &str, text: &str) -> Result<SmsStrategy> {
        self.traced(async {
            let _op = self.op.lock().await;
            let number = normalize_number(number, &self.config.country_code);
            tracing::info!("sending SMS to {}", number);

            self.sms_preflight().await;

            let mut last = None;
            let mut attempts = 0;
            for strategy in SmsStrategy::ORDER {
                attempts += 1;
                tracing::debug!("trying {} submission", strategy.label());
                match self.submit(strategy, &number, text).await {
                    Ok(()) => {
                        tracing::info!("SMS sent to {} via {}", number, strategy.label());
                        return self.settle(Ok(strategy));
                    }
                    Err(e) => {
                        tracing::warn!("{} submission failed: {}", strategy.label(), e);
                        last = Some(e);
                    }
                }
            }

            let last = last.unwrap_or_else(|| Error::protocol("no SMS method attempted"));
            tracing::error!("failed to send SMS to {}", number);
            self.settle(Err(Error::AllMethodsFailed {
                operation: "SMS",
                attempts,
                last: Box::new(last),
            }))
        })
        .await
    }

    /// Deletes the message stored at `index`.
    ///
    /// Returns true if the modem answered `OK`.
    ///
    /// # Errors
    ///
    /// Fails if the command times out or the link is lost.
    pub async fn delete_sms(&self, index: u32) -> Result<bool> {
        self.traced(async {
            let _op = self.op.lock().await;
            let response = self
                .settle(self.engine.send_default(&at::delete_sms(index)).await)?;
            if response.is_ok() {
                tracing::info!("deleted SMS {}", index);
            } else {
                tracing::warn!("failed to delete SMS {}: {}", index, response.last_line());
            }
            Ok(response.is_ok())
        })
        .await
    }

    async fn list_sms(&self) -> Result<Vec<SmsRecord>> {
        self.step(at::SMS_TEXT_MODE).await;
        let mut response = self.engine.send_default(at::SMS_LIST_ALL).await?;

        // A body mentioning ERROR or FAIL ends collection early
        while response.terminal == Terminal::Error
            && response.contains("+CMGL:")
            && !is_error_code(response.last_line())
        {
            match self
                .engine
                .await_terminal(at::SMS_LIST_ALL, self.engine.timeout())
                .await
            {
                Ok(rest) => {
                    response.lines.extend(rest.lines);
                    response.terminal = rest.terminal;
                }
                Err(e) => {
                    tracing::warn!("SMS listing cut short: {}", e);
                    break;
                }
            }
        }

        if !response.contains("+CMGL:") {
            response = response.into_ok()?;
        } else if response.terminal == Terminal::Error {
            tracing::warn!("SMS listing ended with {}", response.last_line());
        }
        Ok(parser::parse_cmgl(&response, Some(self.id())))
    }

    /// Liveness, SIM, registration, reset, text mode, charset and signal.
    ///
    /// Problems are logged; none of them stops the submission.
    async fn sms_preflight(&self) {
        self.preflight().await;
        self.step(at::SMS_TEXT_MODE).await;
        self.step(at::CHARSET_GSM).await;

        let csq = self
            .step(at::SIGNAL_QUALITY)
            .await
            .and_then(|r| r.find("+CSQ:").and_then(parser::parse_csq));
        if csq == Some(parser::CSQ_UNKNOWN) {
            tracing::warn!("no signal, SMS may fail");
        }
    }

    async fn submit(&self, strategy: SmsStrategy, number: &str, text: &str) -> Result<()> {
        match strategy {
            SmsStrategy::QuotedText => self.compose(&at::compose_quoted(number), text).await,
            SmsStrategy::UnquotedText => self.compose(&at::compose_unquoted(number), text).await,
            SmsStrategy::Pdu => {
                let result = self.submit_pdu(number, text).await;
                if self.step(at::SMS_TEXT_MODE).await.is_none() {
                    tracing::warn!("failed to restore SMS text mode");
                }
                result
            }
        }
    }

    async fn submit_pdu(&self, number: &str, text: &str) -> Result<()> {
        let submit = pdu::encode_submit(number, text)?;
        self.engine
            .send(at::SMS_PDU_MODE, self.config.step_timeout, 1)
            .await?
            .into_ok()?;
        self.compose(&at::compose_pdu(submit.tpdu_len), &submit.hex)
            .await
    }

    /// Opens a submission with `command`, then writes `body` and Ctrl-Z.
    async fn compose(&self, command: &str, body: &str) -> Result<()> {
        let response = self
            .engine
            .send(command, self.config.compose_timeout, 1)
            .await?;
        if !response.is_prompt() {
            return Err(Error::protocol(format!(
                "no prompt after {command}: {}",
                response.last_line()
            )));
        }

        self.engine
            .write_raw(format!("{body}{}", at::CTRL_Z))
            .await?;
        self.engine
            .await_terminal(command, self.config.sms_timeout)
            .await?
            .into_ok()?;
        Ok(())
    }
}
