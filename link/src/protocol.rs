//! Command families and wire framing
//!
//! Mount drivers expose the same "send a raw command, get a string back"
//! operation under different names. Each name is a [`CommandFamily`]; the
//! families differ in how the firmware behind them expects commands to be
//! terminated.

use crate::TERMINATOR;
use std::fmt;

/// A driver entry point capable of sending a raw command string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    /// ASCOM-style `CommandString(command, raw)`
    CommandString,
    SendCommandString,
    SendString,
    Command,
}

impl CommandFamily {
    /// Probe order used when a driver exposes more than one family
    pub const PROBE_ORDER: [CommandFamily; 4] = [
        CommandFamily::CommandString,
        CommandFamily::SendCommandString,
        CommandFamily::SendString,
        CommandFamily::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandFamily::CommandString => "CommandString",
            CommandFamily::SendCommandString => "SendCommandString",
            CommandFamily::SendString => "SendString",
            CommandFamily::Command => "Command",
        }
    }

    /// Pick the first family in probe order that the driver advertises
    pub fn select(available: &[CommandFamily]) -> Option<CommandFamily> {
        Self::PROBE_ORDER
            .into_iter()
            .find(|family| available.contains(family))
    }

    /// Suffix appended after any trailing terminators have been stripped.
    ///
    /// Firmware reached through the fallback families expects an extra
    /// `,#` after the terminator.
    pub fn terminator(&self) -> &'static str {
        match self {
            CommandFamily::CommandString => "#",
            CommandFamily::SendCommandString
            | CommandFamily::SendString
            | CommandFamily::Command => "#,#",
        }
    }

    /// Frame a command for this family
    pub fn normalize(&self, command: &str) -> String {
        let mut framed = command.trim_end_matches(TERMINATOR).to_string();
        framed.push_str(self.terminator());
        framed
    }
}

impl fmt::Display for CommandFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A driver property reporting whether the device is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionProperty {
    Connected,
    IsConnected,
}

impl ConnectionProperty {
    pub const PROBE_ORDER: [ConnectionProperty; 2] =
        [ConnectionProperty::Connected, ConnectionProperty::IsConnected];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionProperty::Connected => "Connected",
            ConnectionProperty::IsConnected => "IsConnected",
        }
    }

    pub fn select(available: &[ConnectionProperty]) -> Option<ConnectionProperty> {
        Self::PROBE_ORDER
            .into_iter()
            .find(|property| available.contains(property))
    }
}

impl fmt::Display for ConnectionProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strip trailing terminators, line endings and spaces from a reply
pub fn clean_response(raw: &str) -> &str {
    raw.trim_end_matches(|c| c == TERMINATOR || c == '\r' || c == '\n' || c == ' ')
}

/// Render a reply for logs: escaped line endings, length, and up to 64 bytes of hex
pub fn format_debug(raw: Option<&str>) -> String {
    let s = match raw {
        None => return "(null)".to_string(),
        Some("") => return "(empty)".to_string(),
        Some(s) => s,
    };

    let mut out = s.replace('\r', "\\r").replace('\n', "\\n");
    out.push_str(&format!(" [len={}]", s.len()));
    out.push_str(" hex=");
    for byte in s.bytes().take(64) {
        out.push_str(&format!("{:02X}", byte));
    }
    out
}
