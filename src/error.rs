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

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub enum Error {
    Io(std::io::ErrorKind),
    Utf8Error,
    ParseFailed(&'static str),
    /// Contact fields rejected by the onion or port validator
    InvalidContact,
    /// PDU truncated or violating the frame grammar
    MalformedFrame(&'static str),
    /// Payload line not `<onion> <port>\n`
    MalformedContactLine(&'static str),
    /// Contact table operation given a bad slot index
    IndexOutOfBounds(usize),
    /// Contact table resize below one or below the live count
    InvalidSize(usize),
    /// Dial, write or close on a peer connection failed
    TransportError(String),
    /// Operation on a link that has already been closed
    ChannelStopped,
    TomlDeserializeError(String),
    SetLoggerError(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {:?}", err),
            Error::Utf8Error => f.write_str("Malformed UTF8"),
            Error::ParseFailed(err) => write!(f, "Parse failed: {}", err),
            Error::InvalidContact => f.write_str("Invalid contact"),
            Error::MalformedFrame(err) => write!(f, "Malformed frame: {}", err),
            Error::MalformedContactLine(err) => {
                write!(f, "Malformed contact line: {}", err)
            }
            Error::IndexOutOfBounds(n) => write!(f, "Index out of bounds: {}", n),
            Error::InvalidSize(n) => write!(f, "Invalid contactlist size: {}", n),
            Error::TransportError(err) => write!(f, "Transport error: {}", err),
            Error::ChannelStopped => f.write_str("Channel stopped"),
            Error::TomlDeserializeError(err) => write!(f, "Toml parsing error: {}", err),
            Error::SetLoggerError(err) => write!(f, "SetLogger error: {}", err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err.kind())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_err: std::string::FromUtf8Error) -> Error {
        Error::Utf8Error
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_err: std::str::Utf8Error) -> Error {
        Error::Utf8Error
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Error {
        Error::TomlDeserializeError(err.to_string())
    }
}

impl From<log::SetLoggerError> for Error {
    fn from(err: log::SetLoggerError) -> Error {
        Error::SetLoggerError(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error::TomlDeserializeError(err.to_string())
    }
}
