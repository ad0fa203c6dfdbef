//! TFTP packet codec (RFC 1350 with the RFC 2347 option extension).

use thiserror::Error;

const OP_RRQ: u16 = 1;
const OP_WRQ: u16 = 2;
const OP_DATA: u16 = 3;
const OP_ACK: u16 = 4;
const OP_ERROR: u16 = 5;
const OP_OACK: u16 = 6;

pub const ERR_UNDEFINED: u16 = 0;
pub const ERR_NOT_FOUND: u16 = 1;
pub const ERR_ACCESS_VIOLATION: u16 = 2;
pub const ERR_ILLEGAL_OPERATION: u16 = 4;

/// `(name, value)` pairs as they appear on the wire.
pub type Options = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq {
        filename: String,
        mode: String,
        options: Options,
    },
    Wrq {
        filename: String,
        mode: String,
        options: Options,
    },
    Data {
        block: u16,
        data: Vec<u8>,
    },
    Ack {
        block: u16,
    },
    Error {
        code: u16,
        message: String,
    },
    Oack {
        options: Options,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too short")]
    TooShort,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),
    #[error("unterminated string field")]
    Unterminated,
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("option {0:?} has no value")]
    DanglingOption(String),
}

impl Packet {
    pub fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        let (opcode, body) = split_u16(buf)?;
        match opcode {
            OP_RRQ | OP_WRQ => {
                let mut fields = Fields(body);
                let filename = fields.next_string()?;
                let mode = fields.next_string()?.to_ascii_lowercase();
                let options = fields.options()?;
                Ok(if opcode == OP_RRQ {
                    Packet::Rrq {
                        filename,
                        mode,
                        options,
                    }
                } else {
                    Packet::Wrq {
                        filename,
                        mode,
                        options,
                    }
                })
            }
            OP_DATA => {
                let (block, data) = split_u16(body)?;
                Ok(Packet::Data {
                    block,
                    data: data.to_vec(),
                })
            }
            OP_ACK => {
                let (block, _) = split_u16(body)?;
                Ok(Packet::Ack { block })
            }
            OP_ERROR => {
                let (code, rest) = split_u16(body)?;
                // Some clients omit the terminating NUL.
                let message = match Fields(rest).next_string() {
                    Ok(message) => message,
                    Err(PacketError::Unterminated) => String::from_utf8_lossy(rest).into_owned(),
                    Err(e) => return Err(e),
                };
                Ok(Packet::Error { code, message })
            }
            OP_OACK => Ok(Packet::Oack {
                options: Fields(body).options()?,
            }),
            other => Err(PacketError::UnknownOpcode(other)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Packet::Rrq {
                filename,
                mode,
                options,
            }
            | Packet::Wrq {
                filename,
                mode,
                options,
            } => {
                let opcode = if matches!(self, Packet::Rrq { .. }) {
                    OP_RRQ
                } else {
                    OP_WRQ
                };
                out.extend_from_slice(&opcode.to_be_bytes());
                push_string(&mut out, filename);
                push_string(&mut out, mode);
                push_options(&mut out, options);
            }
            Packet::Data { block, data } => {
                out.extend_from_slice(&OP_DATA.to_be_bytes());
                out.extend_from_slice(&block.to_be_bytes());
                out.extend_from_slice(data);
            }
            Packet::Ack { block } => {
                out.extend_from_slice(&OP_ACK.to_be_bytes());
                out.extend_from_slice(&block.to_be_bytes());
            }
            Packet::Error { code, message } => {
                out.extend_from_slice(&OP_ERROR.to_be_bytes());
                out.extend_from_slice(&code.to_be_bytes());
                push_string(&mut out, message);
            }
            Packet::Oack { options } => {
                out.extend_from_slice(&OP_OACK.to_be_bytes());
                push_options(&mut out, options);
            }
        }
        out
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Packet::Error {
            code,
            message: message.into(),
        }
    }
}

fn split_u16(buf: &[u8]) -> Result<(u16, &[u8]), PacketError> {
    match buf {
        [hi, lo, rest @ ..] => Ok((u16::from_be_bytes([*hi, *lo]), rest)),
        _ => Err(PacketError::TooShort),
    }
}

fn push_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn push_options(out: &mut Vec<u8>, options: &Options) {
    for (name, value) in options {
        push_string(out, name);
        push_string(out, value);
    }
}

/// NUL-terminated string fields.
struct Fields<'a>(&'a [u8]);

impl Fields<'_> {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn next_string(&mut self) -> Result<String, PacketError> {
        let end = self
            .0
            .iter()
            .position(|&b| b == 0)
            .ok_or(PacketError::Unterminated)?;
        let s = std::str::from_utf8(&self.0[..end]).map_err(|_| PacketError::InvalidUtf8)?;
        self.0 = &self.0[end + 1..];
        Ok(s.to_string())
    }

    fn options(&mut self) -> Result<Options, PacketError> {
        let mut options = Vec::new();
        while !self.is_empty() {
            let name = self.next_string()?;
            let value = match self.next_string() {
                Ok(value) => value,
                Err(PacketError::Unterminated) => return Err(PacketError::DanglingOption(name)),
                Err(e) => return Err(e),
            };
            options.push((name, value));
        }
        Ok(options)
    }
}
