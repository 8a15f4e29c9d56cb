//! Fixed-size control-frame wire codec.
//!
//! Every control frame is a 20-byte record: a `u32` command tag followed by
//! a four-`u32` payload. Only the fields relevant to the active tag carry
//! meaning; the rest are written as zero, exactly as the original C union
//! would leave unused members holding whatever the last write left behind --
//! except we zero them so the wire bytes are reproducible. Native byte order
//! throughout: both ends of the socket are local processes on the same host.

use std::io::{self, Read, Write};

/// Number of bytes in one control frame: `cmd` plus the four-`u32` union.
pub const FRAME_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Cmd {
    Open = 0,
    Close = 1,
    Data = 2,
    StreamStart = 3,
    StreamStop = 4,
    UserId = 5,
}

impl Cmd {
    fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Cmd::Open),
            1 => Some(Cmd::Close),
            2 => Some(Cmd::Data),
            3 => Some(Cmd::StreamStart),
            4 => Some(Cmd::StreamStop),
            5 => Some(Cmd::UserId),
            _ => None,
        }
    }
}

/// The four-`u32` OPEN payload: sample rate, channel (mask or count
/// depending on channel-mask mode), format, frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamWireConfig {
    pub sample_rate: u32,
    pub channel: u32,
    pub format: u32,
    pub frame_count: u32,
}

/// A decoded control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Open(StreamWireConfig),
    Close,
    Data { data_size: u32 },
    StreamStart,
    StreamStop,
    UserId(u32),
}

impl Frame {
    fn cmd(&self) -> Cmd {
        match self {
            Frame::Open(_) => Cmd::Open,
            Frame::Close => Cmd::Close,
            Frame::Data { .. } => Cmd::Data,
            Frame::StreamStart => Cmd::StreamStart,
            Frame::StreamStop => Cmd::StreamStop,
            Frame::UserId(_) => Cmd::UserId,
        }
    }

    /// Encode this frame as the fixed 20-byte wire record.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut fields = [0u32; 4];
        match self {
            Frame::Open(cfg) => {
                fields = [cfg.sample_rate, cfg.channel, cfg.format, cfg.frame_count];
            }
            Frame::Data { data_size } => fields[0] = *data_size,
            Frame::UserId(id) => fields[0] = *id,
            Frame::Close | Frame::StreamStart | Frame::StreamStop => {}
        }

        let mut buf = [0u8; FRAME_SIZE];
        buf[0..4].copy_from_slice(&(self.cmd() as u32).to_ne_bytes());
        for (i, field) in fields.iter().enumerate() {
            let offset = 4 + i * 4;
            buf[offset..offset + 4].copy_from_slice(&field.to_ne_bytes());
        }
        buf
    }

    /// Decode a frame from a 20-byte wire record. Returns `None` if the
    /// command tag is unrecognized.
    pub fn decode(buf: &[u8; FRAME_SIZE]) -> Option<Self> {
        let cmd = Cmd::from_u32(u32::from_ne_bytes(buf[0..4].try_into().unwrap()))?;
        let field = |i: usize| -> u32 {
            let offset = 4 + i * 4;
            u32::from_ne_bytes(buf[offset..offset + 4].try_into().unwrap())
        };

        Some(match cmd {
            Cmd::Open => Frame::Open(StreamWireConfig {
                sample_rate: field(0),
                channel: field(1),
                format: field(2),
                frame_count: field(3),
            }),
            Cmd::Close => Frame::Close,
            Cmd::Data => Frame::Data {
                data_size: field(0),
            },
            Cmd::StreamStart => Frame::StreamStart,
            Cmd::StreamStop => Frame::StreamStop,
            Cmd::UserId => Frame::UserId(field(0)),
        })
    }

    /// Write this frame to `w` in one call, retrying only on `EINTR`. A
    /// short write is reported as `NetError::ShortFrameWrite`, matching the
    /// source's treatment of partial control-frame writes as fatal to that
    /// frame.
    pub fn write_to<W: Write>(&self, mut w: W) -> crate::error::NetResult<()> {
        let buf = self.encode();
        loop {
            match w.write(&buf) {
                Ok(n) if n == FRAME_SIZE => return Ok(()),
                Ok(n) => {
                    return Err(crate::error::NetError::ShortFrameWrite {
                        expected: FRAME_SIZE,
                        wrote: n,
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!("control frame write failed: {e}");
                    return Err(crate::error::NetError::ShortFrameWrite {
                        expected: FRAME_SIZE,
                        wrote: 0,
                    });
                }
            }
        }
    }

    /// Read one frame from `r`, retrying only on `EINTR`.
    pub fn read_from<R: Read>(mut r: R) -> crate::error::NetResult<Self> {
        let mut buf = [0u8; FRAME_SIZE];
        let mut read = 0;
        while read < FRAME_SIZE {
            match r.read(&mut buf[read..]) {
                Ok(0) => {
                    return Err(crate::error::NetError::ShortFrameRead {
                        expected: FRAME_SIZE,
                        read,
                    })
                }
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    return Err(crate::error::NetError::ShortFrameRead {
                        expected: FRAME_SIZE,
                        read,
                    })
                }
            }
        }
        Frame::decode(&buf).ok_or(crate::error::NetError::ShortFrameRead {
            expected: FRAME_SIZE,
            read: FRAME_SIZE,
        })
    }
}
