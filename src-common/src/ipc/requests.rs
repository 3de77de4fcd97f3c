//! Control requests and their token encoding.

use thiserror::Error;

use super::tokens::{CodecError, TokenLine};

/// Usage summary returned for an unknown opcode.
pub const SERVER_USAGE: &str =
    "[start <framerate> <framesBufferSize> <monitorIndex> [sizeFlag] | stop <folder> | cancel | disconnect | kill]";

/// Numeric request opcodes as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Start = 0,
    Stop = 1,
    Cancel = 2,
    Disconnect = 3,
    Kill = 4,
}

impl Opcode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Opcode::Start),
            1 => Some(Opcode::Stop),
            2 => Some(Opcode::Cancel),
            3 => Some(Opcode::Disconnect),
            4 => Some(Opcode::Kill),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Start => "start",
            Opcode::Stop => "stop",
            Opcode::Cancel => "cancel",
            Opcode::Disconnect => "disconnect",
            Opcode::Kill => "kill",
        }
    }
}

/// Raw request line: numeric opcode plus argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub opcode: i64,
    pub args: Vec<String>,
}

impl RequestFrame {
    pub fn encode(&self) -> String {
        let mut line = self.opcode.to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    pub fn decode(line: &str) -> Result<Self, CodecError> {
        let tokens = TokenLine::parse(line);
        let opcode = tokens.get_int(0)?;
        Ok(Self {
            opcode,
            args: tokens.tokens()[1..].to_vec(),
        })
    }
}

/// Parameters of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// Samples kept per second
    pub frame_rate: u32,
    /// Frames in count mode, megabytes in size-budget mode
    pub buffer_capacity: usize,
    /// Index into the enumerated monitor list
    pub monitor_index: usize,
    /// Interpret `buffer_capacity` as a memory budget
    pub size_budget: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            frame_rate: 10,
            buffer_capacity: 60,
            monitor_index: 0,
            size_budget: false,
        }
    }
}

/// Errors raised while interpreting a request line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Nothing but whitespace was received
    #[error("empty request, expected {}", SERVER_USAGE)]
    Empty,
    /// The opcode token is not numeric
    #[error("{0} is not a valid server request")]
    InvalidOpcode(String),
    /// The opcode is numeric but unassigned
    #[error("Server Usage: {}", SERVER_USAGE)]
    UnknownOpcode(i64),
    /// Wrong number of arguments for the opcode
    #[error("Server Usage: {}", usage(.0))]
    Usage(Opcode),
    /// An argument failed to parse or is out of range
    #[error("{name} must be {expected}, got {token}")]
    InvalidArgument {
        name: &'static str,
        expected: &'static str,
        token: String,
    },
}

fn usage(opcode: &Opcode) -> &'static str {
    match opcode {
        Opcode::Start => "start <framerate> <framesBufferSize> <monitorIndex> [sizeFlag]",
        Opcode::Stop => "stop <folderPath>",
        Opcode::Cancel => "cancel",
        Opcode::Disconnect => "disconnect",
        Opcode::Kill => "kill",
    }
}

/// A decoded control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Start(StartOptions),
    /// Flush retained frames into `destination`, which may contain spaces
    Stop { destination: String },
    Cancel,
    Disconnect,
    Kill,
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Start(_) => Opcode::Start,
            Request::Stop { .. } => Opcode::Stop,
            Request::Cancel => Opcode::Cancel,
            Request::Disconnect => Opcode::Disconnect,
            Request::Kill => Opcode::Kill,
        }
    }

    pub fn to_frame(&self) -> RequestFrame {
        let args = match self {
            Request::Start(options) => vec![
                options.frame_rate.to_string(),
                options.buffer_capacity.to_string(),
                options.monitor_index.to_string(),
                if options.size_budget { "1" } else { "0" }.to_string(),
            ],
            Request::Stop { destination } => vec![destination.clone()],
            Request::Cancel | Request::Disconnect | Request::Kill => Vec::new(),
        };
        RequestFrame {
            opcode: self.opcode().code(),
            args,
        }
    }

    pub fn encode(&self) -> String {
        self.to_frame().encode()
    }

    pub fn from_frame(frame: &RequestFrame) -> Result<Self, RequestError> {
        let opcode = Opcode::from_code(frame.opcode).ok_or(RequestError::UnknownOpcode(frame.opcode))?;
        let args = TokenLine::from_tokens(frame.args.iter().map(String::as_str));

        match opcode {
            Opcode::Start => {
                if !(3..=4).contains(&args.len()) {
                    return Err(RequestError::Usage(opcode));
                }
                let frame_rate = int_arg(&args, 0, "framerate", "a positive integer")?;
                let buffer_capacity = int_arg(&args, 1, "framesBufferSize", "a non-negative integer")?;
                let monitor_index = int_arg(&args, 2, "monitorIndex", "a non-negative integer")?;
                let size_budget = if args.len() == 4 {
                    match args.get(3).map_err(|_| RequestError::Usage(opcode))? {
                        "1" => true,
                        "0" => false,
                        other => {
                            return Err(RequestError::InvalidArgument {
                                name: "sizeFlag",
                                expected: "0 or 1",
                                token: other.to_string(),
                            })
                        }
                    }
                } else {
                    false
                };

                let invalid = |name, expected, value: i64| RequestError::InvalidArgument {
                    name,
                    expected,
                    token: value.to_string(),
                };
                let frame_rate = u32::try_from(frame_rate)
                    .ok()
                    .filter(|rate| *rate >= 1)
                    .ok_or_else(|| invalid("framerate", "a positive integer", frame_rate))?;
                let buffer_capacity = usize::try_from(buffer_capacity).map_err(|_| {
                    invalid("framesBufferSize", "a non-negative integer", buffer_capacity)
                })?;
                let monitor_index = usize::try_from(monitor_index)
                    .map_err(|_| invalid("monitorIndex", "a non-negative integer", monitor_index))?;

                Ok(Request::Start(StartOptions {
                    frame_rate,
                    buffer_capacity,
                    monitor_index,
                    size_budget,
                }))
            }
            Opcode::Stop => {
                if args.is_empty() {
                    return Err(RequestError::Usage(opcode));
                }
                let destination = args.join_from(0).map_err(|_| RequestError::Usage(opcode))?;
                Ok(Request::Stop { destination })
            }
            Opcode::Cancel => Ok(Request::Cancel),
            Opcode::Disconnect => Ok(Request::Disconnect),
            Opcode::Kill => Ok(Request::Kill),
        }
    }

    /// Decode a full request line.
    pub fn decode(line: &str) -> Result<Self, RequestError> {
        let frame = RequestFrame::decode(line).map_err(|e| match e {
            CodecError::Format { token } => RequestError::InvalidOpcode(token),
            CodecError::Index { .. } => RequestError::Empty,
        })?;
        Self::from_frame(&frame)
    }
}

fn int_arg(
    args: &TokenLine,
    index: usize,
    name: &'static str,
    expected: &'static str,
) -> Result<i64, RequestError> {
    args.get_int(index).map_err(|e| match e {
        CodecError::Format { token } => RequestError::InvalidArgument {
            name,
            expected,
            token,
        },
        CodecError::Index { .. } => RequestError::Usage(Opcode::Start),
    })
}
