// ABOUTME: Host implementation that renders bridge callbacks on a terminal
// ABOUTME: Chat lines go to the writer; every other callback is a structured log event

use chrono::{DateTime, Utc};
use mdbridge_core::{DisplayMessage, ErrorSeverity, HostCallbacks, TypingState};
use mdbridge_engine::Jid;
use std::io::Write;
use std::sync::Mutex;

/// Console host for the replay harness
pub struct ConsoleHost<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleHost<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{}", line) {
            tracing::warn!(error = %e, "Failed to write console output");
        }
    }
}

/// One-line rendering of a displayed message
pub fn format_message(message: &DisplayMessage) -> String {
    let sender = message
        .sender_display_name
        .clone()
        .unwrap_or_else(|| message.sender.to_string());
    let direction = if message.is_self { "me" } else { sender.as_str() };
    let mut line = format!(
        "[{}] {} <{}> {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        message.chat,
        direction,
        message.body.replace('\n', " | ")
    );
    if !message.quoted_body.is_empty() {
        line.push_str(&format!(" (re: \"{}\")", message.quoted_body));
    }
    if message.historical {
        line.push_str(" [history]");
    }
    line
}

impl<W: Write + Send> HostCallbacks for ConsoleHost<W> {
    fn display_text_message(&self, message: &DisplayMessage) {
        self.write_line(&format_message(message));
    }

    fn update_contact_name(&self, jid: &str, name: &str) {
        tracing::info!(jid = %jid, name = %name, "Contact name");
    }

    fn report_error(&self, severity: ErrorSeverity, message: &str) {
        self.write_line(&format!("!! {} error: {}", severity, message));
    }

    fn notify_connected(&self) {
        self.write_line("** connected");
    }

    fn notify_pairing_succeeded(&self) {
        self.write_line("** pairing succeeded");
    }

    fn update_typing_state(&self, chat: &Jid, sender: &Jid, state: TypingState) {
        tracing::debug!(chat = %chat, sender = %sender, ?state, "Typing state");
    }

    fn update_presence(&self, jid: &Jid, online: bool, last_seen: Option<DateTime<Utc>>) {
        tracing::debug!(jid = %jid, online, ?last_seen, "Presence");
    }

    fn update_avatar(&self, jid: &Jid, image: &[u8]) {
        tracing::info!(jid = %jid, size = image.len(), "Avatar updated");
    }

    fn display_qr_code(&self, code: &str) {
        self.write_line(&format!("** scan to pair: {}", code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> DisplayMessage {
        DisplayMessage {
            chat: Jid::user("15550002"),
            is_group: false,
            is_self: false,
            sender: Jid::user("15550002"),
            sender_display_name: Some("Bob".to_string()),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            body: "/tmp/a.jpg\nlook".to_string(),
            quoted_body: "hello".to_string(),
            historical: false,
        }
    }

    #[test]
    fn test_format_message() {
        assert_eq!(
            format_message(&message()),
            "[2023-11-14 22:13:20] 15550002@s.whatsapp.net <Bob> /tmp/a.jpg | look (re: \"hello\")"
        );
    }

    #[test]
    fn test_self_and_history_markers() {
        let mut m = message();
        m.is_self = true;
        m.historical = true;
        m.quoted_body.clear();
        let line = format_message(&m);
        assert!(line.contains("<me>"));
        assert!(line.ends_with("[history]"));
    }

    #[test]
    fn test_callbacks_write_lines() {
        let host = ConsoleHost::new(Vec::new());
        host.display_text_message(&message());
        host.report_error(ErrorSeverity::Transient, "Disconnected.");
        host.notify_connected();
        host.display_qr_code("2@abc");

        let output = String::from_utf8(host.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "!! transient error: Disconnected.");
        assert_eq!(lines[2], "** connected");
        assert_eq!(lines[3], "** scan to pair: 2@abc");
    }
}
