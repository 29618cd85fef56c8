//! STOMP 1.2 frame codec
//!
//! ```text
//! COMMAND
//! header1:value1
//! header2:value2
//!
//! body^@
//! ```
//!
//! Header values escape `\\`, `\n`, `\r` and `:`; CONNECT and CONNECTED
//! frames are left unescaped as the protocol requires.

use std::fmt;

/// NUL octet terminating every frame
pub const FRAME_TERMINATOR: char = '\0';

pub const ACCEPT_VERSION: &str = "1.2";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StompFrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    #[error("missing header/body separator")]
    MissingSeparator,
}

/// Frame commands used by a subscribing client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            "DISCONNECT" => Self::Disconnect,
            _ => return None,
        })
    }

    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name`; repeated headers keep the first entry.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ── Client frames ──────────────────────────────────────

    pub fn connect(host: &str, heartbeat: (u32, u32)) -> Self {
        Self::new(StompCommand::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", format!("{},{}", heartbeat.0, heartbeat.1))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    // ── Codec ──────────────────────────────────────────────

    /// Encode to wire text, terminator included.
    pub fn serialize(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get_header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(FRAME_TERMINATOR);
        out
    }

    /// Decode one frame. Leading heart-beat EOLs are skipped; a missing
    /// terminator is tolerated.
    pub fn parse(raw: &str) -> Result<Self, StompFrameError> {
        let raw = raw.trim_start_matches(['\r', '\n']);
        let raw = raw.trim_end_matches(['\r', '\n']);
        let raw = raw.strip_suffix(FRAME_TERMINATOR).unwrap_or(raw);
        if raw.is_empty() {
            return Err(StompFrameError::Empty);
        }

        let (head, body) = split_head(raw)?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

        let command_line = lines.next().unwrap_or_default();
        let command = StompCommand::parse(command_line)
            .ok_or_else(|| StompFrameError::UnknownCommand(command_line.to_string()))?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| StompFrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Self {
            command,
            headers,
            body: body.to_string(),
        };
        if let Some(len) = frame
            .get_header("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            if len <= frame.body.len() && frame.body.is_char_boundary(len) {
                frame.body.truncate(len);
            }
        }
        Ok(frame)
    }

    /// True for a heart-beat (a bare EOL with no frame).
    pub fn is_heartbeat(raw: &str) -> bool {
        raw.chars().all(|c| c == '\n' || c == '\r')
    }
}

impl fmt::Display for StompFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        if let Some(destination) = self.get_header("destination") {
            write!(f, " {destination}")?;
        }
        Ok(())
    }
}

/// Split at the first blank line. A frame with headers only may omit it.
fn split_head(raw: &str) -> Result<(&str, &str), StompFrameError> {
    if let Some(idx) = raw.find("\n\n") {
        return Ok((&raw[..idx], &raw[idx + 2..]));
    }
    if let Some(idx) = raw.find("\r\n\r\n") {
        return Ok((&raw[..idx], &raw[idx + 4..]));
    }
    if raw.contains('\n') || !raw.contains(':') {
        return Ok((raw, ""));
    }
    Err(StompFrameError::MissingSeparator)
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, StompFrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompFrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}
