/* This file is part of DChat
 *
 * Copyright (C) 2026 The DChat developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use log::debug;

use super::contact::{is_valid_onion, is_valid_port, MAX_NICKNAME};
use crate::{Error, Result};

/// Protocol version carried in the first header line.
pub const PROTO_VERSION: &str = "1.0";

/// Upper bound on the content length of a single PDU.
pub const MAX_CONTENT_LEN: usize = 4096;

/// Content type of a PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    TextPlain,
    ApplicationOctet,
    ControlDiscover,
    ControlReplay,
}

impl ContentType {
    pub fn name(&self) -> &'static str {
        match self {
            ContentType::TextPlain => "text/plain",
            ContentType::ApplicationOctet => "application/octet",
            ContentType::ControlDiscover => "control/discover",
            ContentType::ControlReplay => "control/replay",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "text/plain" => Some(ContentType::TextPlain),
            "application/octet" => Some(ContentType::ApplicationOctet),
            "control/discover" => Some(ContentType::ControlDiscover),
            "control/replay" => Some(ContentType::ControlReplay),
            _ => None,
        }
    }
}

/// A framed DChat protocol data unit: header lines terminated by `\n`,
/// a blank line, then exactly `Content-Length` bytes of payload.
#[derive(Debug, Clone)]
pub struct Pdu {
    pub content_type: ContentType,
    /// Onion address of the sender
    pub onion_id: String,
    /// Listening port of the sender
    pub lport: u16,
    /// Display name of the sender
    pub nickname: String,
    pub content: String,
}

impl Pdu {
    /// Initializes a PDU with the given sender identity and an empty
    /// content part.
    pub fn new(
        content_type: ContentType,
        onion_id: &str,
        lport: u16,
        nickname: &str,
    ) -> Result<Self> {
        if !is_valid_onion(onion_id) {
            return Err(Error::InvalidContact)
        }

        if !is_valid_port(lport) {
            return Err(Error::InvalidContact)
        }

        if nickname.len() > MAX_NICKNAME {
            return Err(Error::InvalidContact)
        }

        Ok(Self {
            content_type,
            onion_id: onion_id.to_string(),
            lport,
            nickname: nickname.to_string(),
            content: String::new(),
        })
    }

    pub fn content_length(&self) -> usize {
        self.content.len()
    }

    /// Serializes the PDU into its wire form.
    pub fn encode(&self) -> String {
        let mut raw = String::new();
        raw.push_str(&format!("Version: {}\n", PROTO_VERSION));
        raw.push_str(&format!("Content-Type: {}\n", self.content_type.name()));
        raw.push_str(&format!("Onion-ID: {}\n", self.onion_id));
        raw.push_str(&format!("Listen-Port: {}\n", self.lport));
        raw.push_str(&format!("Nickname: {}\n", self.nickname));
        raw.push_str(&format!("Content-Length: {}\n", self.content_length()));
        raw.push('\n');
        raw.push_str(&self.content);
        raw
    }

    /// Extracts a fraction of the content beginning at `start` and ending
    /// at the next `delim` byte. Returns the index of the delimiter and
    /// the slice before it, delimiter excluded.
    pub fn get_content_part(&self, start: usize, delim: u8) -> Result<(usize, &str)> {
        let bytes = self.content.as_bytes();

        if start >= bytes.len() {
            return Err(Error::MalformedFrame("content offset out of range"))
        }

        match bytes[start..].iter().position(|&b| b == delim) {
            Some(offset) => {
                let end = start + offset;
                Ok((end, &self.content[start..end]))
            }
            None => Err(Error::MalformedFrame("unterminated content part")),
        }
    }
}

/// Reads a single `\n` terminated line, rejecting oversized ones. The
/// terminator and an optional preceding `\r` are stripped.
async fn read_line<R: AsyncRead + Unpin>(stream: &mut R) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        stream.read_exact(&mut byte).await?;

        if byte[0] == b'\n' {
            break
        }

        line.push(byte[0]);

        if line.len() > MAX_CONTENT_LEN {
            return Err(Error::MalformedFrame("header line too long"))
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }

    Ok(String::from_utf8(line)?)
}

/// Header fields collected while decoding an inbound PDU.
#[derive(Default)]
struct Headers {
    content_type: Option<ContentType>,
    onion_id: Option<String>,
    lport: Option<u16>,
    nickname: String,
    content_length: usize,
}

/// Decodes one header line into the collected fields.
fn decode_header(headers: &mut Headers, line: &str) -> Result<()> {
    let (key, value) = match line.split_once(':') {
        Some(kv) => kv,
        None => return Err(Error::MalformedFrame("header line without separator")),
    };

    // A single space is required after the separator
    let value = match value.strip_prefix(' ') {
        Some(v) => v,
        None => return Err(Error::MalformedFrame("missing space after header key")),
    };

    match key {
        "Content-Type" => match ContentType::from_name(value) {
            Some(ct) => headers.content_type = Some(ct),
            None => return Err(Error::MalformedFrame("unknown content type")),
        },

        "Content-Length" => {
            let len = match value.parse::<usize>() {
                Ok(l) => l,
                Err(_) => return Err(Error::MalformedFrame("invalid content length")),
            };

            if len > MAX_CONTENT_LEN {
                return Err(Error::MalformedFrame("content length too large"))
            }

            headers.content_length = len;
        }

        "Onion-ID" => {
            if !is_valid_onion(value) {
                return Err(Error::MalformedFrame("invalid onion id"))
            }

            headers.onion_id = Some(value.to_string());
        }

        "Listen-Port" => {
            let lport = match value.parse::<u16>() {
                Ok(p) => p,
                Err(_) => return Err(Error::MalformedFrame("invalid listening port")),
            };

            if !is_valid_port(lport) {
                return Err(Error::MalformedFrame("invalid listening port"))
            }

            headers.lport = Some(lport);
        }

        "Nickname" => {
            let mut nickname = value.to_string();
            // Overlong names are cut, not rejected
            if nickname.len() > MAX_NICKNAME {
                let mut cut = MAX_NICKNAME;
                while !nickname.is_char_boundary(cut) {
                    cut -= 1;
                }
                nickname.truncate(cut);
            }
            headers.nickname = nickname;
        }

        _ => return Err(Error::MalformedFrame("unknown header")),
    }

    Ok(())
}

/// Reads a whole PDU from a stream: the version line, the header lines up
/// to the blank separator, then exactly `Content-Length` payload bytes.
pub async fn read_pdu<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Pdu> {
    let version = read_line(stream).await?;
    if version != format!("Version: {}", PROTO_VERSION) {
        return Err(Error::MalformedFrame("unsupported protocol version"))
    }

    let mut headers = Headers::default();

    loop {
        let line = read_line(stream).await?;

        if line.is_empty() {
            break
        }

        decode_header(&mut headers, &line)?;
    }

    // Content type, onion id and listening port are mandatory
    let content_type = match headers.content_type {
        Some(ct) => ct,
        None => return Err(Error::MalformedFrame("missing content type")),
    };

    let onion_id = match headers.onion_id {
        Some(o) => o,
        None => return Err(Error::MalformedFrame("missing onion id")),
    };

    let lport = match headers.lport {
        Some(p) => p,
        None => return Err(Error::MalformedFrame("missing listening port")),
    };

    let mut content = vec![0u8; headers.content_length];
    if headers.content_length > 0 {
        stream.read_exact(&mut content).await?;
    }
    let content = String::from_utf8(content)?;

    debug!(
        target: "net::message",
        "read {} pdu from {}, {} content bytes",
        content_type.name(), onion_id, content.len(),
    );

    Ok(Pdu { content_type, onion_id, lport, nickname: headers.nickname, content })
}

/// Writes a PDU to a stream. Returns the total amount of bytes written.
pub async fn write_pdu<W: AsyncWrite + Unpin>(stream: &mut W, pdu: &Pdu) -> Result<usize> {
    let raw = pdu.encode();

    stream.write_all(raw.as_bytes()).await?;
    stream.flush().await?;

    debug!(
        target: "net::message",
        "sent {} pdu, {} bytes", pdu.content_type.name(), raw.len(),
    );

    Ok(raw.len())
}

#[cfg(test)]
mod tests {
    use futures::io::Cursor;
    use smol::future;

    use super::*;

    const ONION: &str = "aaaaaaaaaaaaaaaa.onion";

    fn discover_pdu() -> Pdu {
        let mut pdu = Pdu::new(ContentType::ControlDiscover, ONION, 5000, "alice").unwrap();
        pdu.content = "bbbbbbbbbbbbbbbb.onion 5001\ncccccccccccccccc.onion 5002\n".to_string();
        pdu
    }

    #[test]
    fn test_encode_layout() {
        let pdu = discover_pdu();
        let raw = pdu.encode();

        let expected = format!(
            "Version: 1.0\n\
             Content-Type: control/discover\n\
             Onion-ID: {}\n\
             Listen-Port: 5000\n\
             Nickname: alice\n\
             Content-Length: {}\n\
             \n\
             {}",
            ONION,
            pdu.content.len(),
            pdu.content,
        );
        assert_eq!(raw, expected);
    }

    #[test]
    fn test_pdu_roundtrip() {
        let pdu = discover_pdu();
        let raw = pdu.encode();

        let parsed = future::block_on(async {
            let mut stream = Cursor::new(raw.into_bytes());
            read_pdu(&mut stream).await.unwrap()
        });

        assert_eq!(parsed.content_type, ContentType::ControlDiscover);
        assert_eq!(parsed.onion_id, pdu.onion_id);
        assert_eq!(parsed.lport, pdu.lport);
        assert_eq!(parsed.nickname, pdu.nickname);
        assert_eq!(parsed.content, pdu.content);
    }

    #[test]
    fn test_write_read_roundtrip() {
        future::block_on(async {
            let pdu = discover_pdu();
            let mut stream = Cursor::new(Vec::new());
            let written = write_pdu(&mut stream, &pdu).await.unwrap();
            assert_eq!(written, pdu.encode().len());

            let mut stream = Cursor::new(stream.into_inner());
            let parsed = read_pdu(&mut stream).await.unwrap();
            assert_eq!(parsed.content, pdu.content);
        });
    }

    fn parse(raw: &str) -> Result<Pdu> {
        future::block_on(async {
            let mut stream = Cursor::new(raw.as_bytes().to_vec());
            read_pdu(&mut stream).await
        })
    }

    #[test]
    fn test_read_pdu_crlf() {
        let raw = format!(
            "Version: 1.0\r\nContent-Type: text/plain\r\nOnion-ID: {}\r\n\
             Listen-Port: 5000\r\nNickname: alice\r\nContent-Length: 2\r\n\r\nhi",
            ONION
        );
        let pdu = parse(&raw).unwrap();
        assert_eq!(pdu.content_type, ContentType::TextPlain);
        assert_eq!(pdu.content, "hi");
    }

    #[test]
    fn test_read_pdu_bad_version() {
        let raw = format!(
            "Version: 2.0\nContent-Type: text/plain\nOnion-ID: {}\n\
             Listen-Port: 5000\nContent-Length: 0\n\n",
            ONION
        );
        assert!(matches!(parse(&raw), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_read_pdu_missing_mandatory_header() {
        // No Onion-ID
        let raw = "Version: 1.0\nContent-Type: text/plain\nListen-Port: 5000\n\
                   Content-Length: 0\n\n";
        assert!(matches!(parse(raw), Err(Error::MalformedFrame("missing onion id"))));

        // No Listen-Port
        let raw = format!(
            "Version: 1.0\nContent-Type: text/plain\nOnion-ID: {}\nContent-Length: 0\n\n",
            ONION
        );
        assert!(matches!(parse(&raw), Err(Error::MalformedFrame("missing listening port"))));
    }

    #[test]
    fn test_read_pdu_rejects_bad_headers() {
        // Unknown header key
        let raw = format!("Version: 1.0\nX-Unknown: hm\nOnion-ID: {}\n\n", ONION);
        assert!(matches!(parse(&raw), Err(Error::MalformedFrame("unknown header"))));

        // Missing space after the separator
        let raw = "Version: 1.0\nContent-Type:text/plain\n\n";
        assert!(matches!(
            parse(raw),
            Err(Error::MalformedFrame("missing space after header key"))
        ));

        // Oversized content length
        let raw = format!(
            "Version: 1.0\nContent-Type: text/plain\nOnion-ID: {}\n\
             Listen-Port: 5000\nContent-Length: 5000\n\n",
            ONION
        );
        assert!(matches!(parse(&raw), Err(Error::MalformedFrame("content length too large"))));
    }

    #[test]
    fn test_read_pdu_truncated_content() {
        let raw = format!(
            "Version: 1.0\nContent-Type: text/plain\nOnion-ID: {}\n\
             Listen-Port: 5000\nContent-Length: 10\n\nshort",
            ONION
        );
        assert!(matches!(parse(&raw), Err(Error::Io(_))));
    }

    #[test]
    fn test_nickname_truncated() {
        let long_name = "x".repeat(MAX_NICKNAME + 10);
        let raw = format!(
            "Version: 1.0\nContent-Type: text/plain\nOnion-ID: {}\n\
             Listen-Port: 5000\nNickname: {}\nContent-Length: 0\n\n",
            ONION, long_name
        );
        let pdu = parse(&raw).unwrap();
        assert_eq!(pdu.nickname.len(), MAX_NICKNAME);
    }

    #[test]
    fn test_get_content_part() {
        let pdu = discover_pdu();

        let (end, line) = pdu.get_content_part(0, b'\n').unwrap();
        assert_eq!(line, "bbbbbbbbbbbbbbbb.onion 5001");
        assert_eq!(end, line.len());

        let (end2, line2) = pdu.get_content_part(end + 1, b'\n').unwrap();
        assert_eq!(line2, "cccccccccccccccc.onion 5002");
        assert_eq!(end2, pdu.content.len() - 1);

        // Offset beyond the content
        assert!(pdu.get_content_part(pdu.content.len(), b'\n').is_err());

        // No delimiter before the end of content
        let mut pdu = discover_pdu();
        pdu.content = "no newline here".to_string();
        assert!(matches!(
            pdu.get_content_part(0, b'\n'),
            Err(Error::MalformedFrame("unterminated content part"))
        ));
    }

    #[test]
    fn test_pdu_new_validates_sender() {
        assert!(Pdu::new(ContentType::TextPlain, "bad", 5000, "alice").is_err());
        assert!(Pdu::new(ContentType::TextPlain, ONION, 0, "alice").is_err());
        let long_name = "x".repeat(MAX_NICKNAME + 1);
        assert!(Pdu::new(ContentType::TextPlain, ONION, 5000, &long_name).is_err());
        assert!(Pdu::new(ContentType::TextPlain, ONION, 5000, "").is_ok());
    }
}
