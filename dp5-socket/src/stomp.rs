//! STOMP 1.2 frame encoding and parsing.
//!
//! The notification channel speaks STOMP over WebSocket text messages. A
//! message carries zero or more frames; a bare EOL is a heart-beat.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while parsing inbound frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown STOMP command {0:?}")]
    UnknownCommand(String),

    #[error("truncated frame: {0}")]
    Truncated(&'static str),

    #[error("malformed header line {0:?}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in {0:?}")]
    InvalidEscape(String),

    #[error("invalid content-length {0:?}")]
    InvalidContentLength(String),
}

/// STOMP frame commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn from_name(s: &str) -> Option<Self> {
        let command = match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        };
        Some(command)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim, without escaping.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered frame headers. Repeated names are kept; lookups return the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameHeaders(Vec<(String, String)>);

impl FrameHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Group values by header name, preserving arrival order per name.
    pub fn to_multimap(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in &self.0 {
            map.entry(name.clone()).or_default().push(value.clone());
        }
        map
    }
}

/// Heart-beat settings as carried in the `heart-beat` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartBeat {
    /// Smallest interval at which the sender can emit heart-beats (0 = never).
    pub send_ms: u64,
    /// Desired interval between received heart-beats (0 = none wanted).
    pub receive_ms: u64,
}

impl HeartBeat {
    pub fn new(send_ms: u64, receive_ms: u64) -> Self {
        Self {
            send_ms,
            receive_ms,
        }
    }

    /// Parse `"cx,cy"`. Anything malformed means no heart-beats.
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split(',').map(|p| p.trim().parse::<u64>());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Ok(send_ms)), Some(Ok(receive_ms)), None) => Self {
                send_ms,
                receive_ms,
            },
            _ => Self::default(),
        }
    }

    pub fn to_header(&self) -> String {
        format!("{},{}", self.send_ms, self.receive_ms)
    }

    /// Interval at which the client must send heart-beats, if any.
    pub fn outgoing_interval(client: HeartBeat, server: HeartBeat) -> Option<Duration> {
        if client.send_ms == 0 || server.receive_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(client.send_ms.max(server.receive_ms)))
        }
    }

    /// Interval at which the server has agreed to send heart-beats, if any.
    pub fn incoming_interval(client: HeartBeat, server: HeartBeat) -> Option<Duration> {
        if server.send_ms == 0 || client.receive_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(server.send_ms.max(client.receive_ms)))
        }
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: FrameHeaders,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: FrameHeaders::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// CONNECT frame for a STOMP 1.1/1.2 server.
    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Self::new(StompCommand::Connect)
            .header("accept-version", "1.1,1.2")
            .header("host", host)
            .header("heart-beat", heart_beat.to_header())
    }

    pub fn subscribe(id: &str, destination: &str, receipt: Option<&str>) -> Self {
        let frame = Self::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination);
        with_receipt(frame, receipt)
    }

    pub fn unsubscribe(id: &str, receipt: Option<&str>) -> Self {
        with_receipt(Self::new(StompCommand::Unsubscribe).header("id", id), receipt)
    }

    pub fn disconnect(receipt: Option<&str>) -> Self {
        with_receipt(Self::new(StompCommand::Disconnect), receipt)
    }

    /// Serialize to wire format, NUL-terminated.
    pub fn encode(&self) -> String {
        let escape_headers = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in self.headers.iter() {
            if escape_headers {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.headers.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn with_receipt(frame: StompFrame, receipt: Option<&str>) -> StompFrame {
    match receipt {
        Some(id) => frame.header("receipt", id),
        None => frame,
    }
}

/// Parse every frame in one inbound message. Heart-beat EOLs are skipped.
pub fn parse_frames(input: &str) -> Result<Vec<StompFrame>, FrameError> {
    let mut frames = Vec::new();
    let mut rest = skip_eols(input);
    while !rest.is_empty() {
        let (frame, remaining) = parse_one(rest)?;
        frames.push(frame);
        rest = skip_eols(remaining);
    }
    Ok(frames)
}

fn skip_eols(mut input: &str) -> &str {
    loop {
        if let Some(r) = input.strip_prefix("\r\n") {
            input = r;
        } else if let Some(r) = input.strip_prefix('\n') {
            input = r;
        } else {
            return input;
        }
    }
}

fn take_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = input[..idx].strip_suffix('\r').unwrap_or(&input[..idx]);
    Some((line, &input[idx + 1..]))
}

fn parse_one(input: &str) -> Result<(StompFrame, &str), FrameError> {
    let (command_line, mut rest) = take_line(input).ok_or(FrameError::Truncated("command"))?;
    let command = StompCommand::from_name(command_line)
        .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;
    let unescape_headers = command.escapes_headers();

    let mut headers = FrameHeaders::new();
    loop {
        let (line, remaining) = take_line(rest).ok_or(FrameError::Truncated("headers"))?;
        rest = remaining;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if unescape_headers {
            headers.push(unescape(name)?, unescape(value)?);
        } else {
            headers.push(name, value);
        }
    }

    let (body, rest) = match headers.get("content-length") {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
            let body = rest
                .get(..len)
                .ok_or_else(|| FrameError::InvalidContentLength(raw.to_string()))?;
            let after = rest[len..]
                .strip_prefix('\0')
                .ok_or(FrameError::Truncated("body terminator"))?;
            (body, after)
        }
        None => {
            let nul = rest.find('\0').ok_or(FrameError::Truncated("body terminator"))?;
            (&rest[..nul], &rest[nul + 1..])
        }
    };

    Ok((
        StompFrame {
            command,
            headers,
            body: body.to_string(),
        },
        rest,
    ))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_connect() {
        let frame = StompFrame::connect("localhost", HeartBeat::new(10_000, 10_000));
        assert_eq!(
            frame.encode(),
            "CONNECT\naccept-version:1.1,1.2\nhost:localhost\nheart-beat:10000,10000\n\n\0"
        );
    }

    #[test]
    fn test_encode_subscribe_with_receipt() {
        let frame = StompFrame::subscribe("sub-0", "/topic/events", Some("receipt-1"));
        assert_eq!(
            frame.encode(),
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/events\nreceipt:receipt-1\n\n\0"
        );
    }

    #[test]
    fn test_encode_escapes_and_content_length() {
        let frame = StompFrame::new(StompCommand::Send)
            .header("note", "a:b\nc")
            .with_body("hi");
        assert_eq!(
            frame.encode(),
            "SEND\nnote:a\\cb\\nc\ncontent-length:2\n\nhi\0"
        );
    }

    #[test]
    fn test_parse_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/events\nsubscription:sub-0\nmessage-id:7\n\n{\"notificationType\":\"SCAN_MILESTONE\"}\0";
        let frames = parse_frames(raw).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.headers.get("subscription"), Some("sub-0"));
        assert_eq!(frame.body, "{\"notificationType\":\"SCAN_MILESTONE\"}");
    }

    #[test]
    fn test_parse_unescapes_headers_except_connected() {
        let frames = parse_frames("MESSAGE\nx-path:a\\cb\\\\c\n\n\0").unwrap();
        assert_eq!(frames[0].headers.get("x-path"), Some("a:b\\c"));

        let frames = parse_frames("CONNECTED\nserver:raw\\c\n\n\0").unwrap();
        assert_eq!(frames[0].headers.get("server"), Some("raw\\c"));
    }

    #[test]
    fn test_parse_content_length_body_with_nul() {
        let frames = parse_frames("MESSAGE\ncontent-length:3\n\na\0b\0").unwrap();
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn test_parse_multiple_frames_and_heartbeats() {
        let raw = "\n\r\nRECEIPT\nreceipt-id:r1\n\n\0\nERROR\nmessage:bad\n\noops\0\n";
        let frames = parse_frames(raw).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, StompCommand::Receipt);
        assert_eq!(frames[1].command, StompCommand::Error);
        assert_eq!(frames[1].body, "oops");
    }

    #[test]
    fn test_heartbeat_only_message() {
        assert!(parse_frames("\n").unwrap().is_empty());
        assert!(parse_frames("").unwrap().is_empty());
    }

    #[test]
    fn test_repeated_headers() {
        let frames = parse_frames("MESSAGE\nfoo:1\nfoo:2\nbar:x\n\n\0").unwrap();
        let headers = &frames[0].headers;
        assert_eq!(headers.get("foo"), Some("1"));
        assert_eq!(headers.get_all("foo").collect::<Vec<_>>(), vec!["1", "2"]);
        let map = headers.to_multimap();
        assert_eq!(map["foo"], vec!["1".to_string(), "2".to_string()]);
        assert_eq!(map["bar"], vec!["x".to_string()]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_frames("BOGUS\n\n\0"),
            Err(FrameError::UnknownCommand("BOGUS".into()))
        );
        assert_eq!(
            parse_frames("MESSAGE\nnocolon\n\n\0"),
            Err(FrameError::MalformedHeader("nocolon".into()))
        );
        assert_eq!(
            parse_frames("MESSAGE\nk:v\n\nbody without terminator"),
            Err(FrameError::Truncated("body terminator"))
        );
        assert!(matches!(
            parse_frames("MESSAGE\nk:\\x\n\n\0"),
            Err(FrameError::InvalidEscape(_))
        ));
        assert!(matches!(
            parse_frames("MESSAGE\ncontent-length:99\n\nshort\0"),
            Err(FrameError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn test_heartbeat_negotiation() {
        let client = HeartBeat::new(10_000, 10_000);
        assert_eq!(
            HeartBeat::outgoing_interval(client, HeartBeat::new(0, 20_000)),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            HeartBeat::outgoing_interval(client, HeartBeat::new(5_000, 0)),
            None
        );
        assert_eq!(
            HeartBeat::outgoing_interval(HeartBeat::default(), HeartBeat::new(0, 1_000)),
            None
        );
        assert_eq!(
            HeartBeat::incoming_interval(client, HeartBeat::new(15_000, 0)),
            Some(Duration::from_secs(15))
        );
        assert_eq!(
            HeartBeat::incoming_interval(client, HeartBeat::new(0, 15_000)),
            None
        );
        assert_eq!(HeartBeat::parse("0, 4000"), HeartBeat::new(0, 4_000));
        assert_eq!(HeartBeat::parse("garbage"), HeartBeat::default());
    }
}
