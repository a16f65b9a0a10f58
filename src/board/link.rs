// UART bridge to the chassis board (motors, servo, patrol sensors, encoders)
//
// Framed packet protocol in both directions:
// [0xAA, 0x55, Opcode, Length, Params..., Checksum]
// Length counts params + checksum; checksum is the complement of the byte sum
// over opcode, length and params.
//
// Motor/servo writes are fire-and-forget. Line-sensor queries and pings get a
// reply frame. The board streams one Pulse frame per detected encoder edge;
// pulses that arrive while a reply is awaited are queued, not dropped.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use serialport::{self, SerialPort};
use tracing::debug;

use crate::chassis::state::{Direction, LineReading, Servo, Wheel};

use super::ChassisBus;

/// Default serial configuration for the board bridge
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

/// Packet header bytes
const HEADER: [u8; 2] = [0xAA, 0x55];

/// Frame opcodes, both directions
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // Host -> board
    SetMotor = 0x01,
    StopMotor = 0x02,
    StopAll = 0x03,
    SetServo = 0x04,
    ReadLine = 0x05,
    Ping = 0x06,

    // Board -> host
    LineState = 0x41,
    Pong = 0x46,
    Pulse = 0x50,
}

/// Error types for board communication
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid frame from board: {reason}")]
    InvalidFrame { reason: String },

    #[error("Checksum mismatch on opcode 0x{opcode:02X}")]
    ChecksumMismatch { opcode: u8 },

    #[error("Timeout waiting for board reply to opcode 0x{opcode:02X}")]
    Timeout { opcode: u8 },
}

pub type Result<T> = std::result::Result<T, BoardError>;

/// A frame decoded from the board's byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    LineState { side: u8, on_line: bool },
    Pong,
    Pulse { wheel: u8 },
}

/// Chassis board bus over a serial port.
pub struct BoardLink {
    port: Box<dyn SerialPort>,
    rx: Vec<u8>,
    pending_pulses: VecDeque<Wheel>,
}

impl BoardLink {
    /// Open a new connection to the chassis board
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port,
            rx: Vec::new(),
            pending_pulses: VecDeque::new(),
        })
    }

    /// Calculate checksum for a frame (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a frame with header and checksum
    fn build_frame(opcode: Opcode, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 1) as u8; // params + checksum
        let mut frame = Vec::with_capacity(5 + params.len());

        frame.extend_from_slice(&HEADER);
        frame.push(opcode as u8);
        frame.push(length);
        frame.extend_from_slice(params);

        // Checksum over opcode, length, params
        let checksum_data = &frame[2..];
        frame.push(Self::checksum(checksum_data));

        frame
    }

    fn send_frame(&mut self, opcode: Opcode, params: &[u8]) -> Result<()> {
        let frame = Self::build_frame(opcode, params);
        self.port.write_all(&frame)?;
        self.port.flush()?;
        Ok(())
    }

    /// Move every byte the port has buffered into the receive buffer without
    /// blocking.
    fn pump_available(&mut self) -> Result<()> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(());
        }
        let start = self.rx.len();
        self.rx.resize(start + available, 0);
        let read = self.port.read(&mut self.rx[start..])?;
        self.rx.truncate(start + read);
        Ok(())
    }

    /// Decode buffered frames, stashing pulses; returns the first non-pulse
    /// frame, if any.
    fn drain_rx_buffer(&mut self) -> Result<Option<Frame>> {
        loop {
            match parse_frame(&self.rx) {
                Err(e) => {
                    // Skip a byte so the next call resynchronizes past the
                    // corrupted frame.
                    self.rx.drain(..1);
                    return Err(e);
                }
                Ok(None) => {
                    // No complete frame yet: shed the bytes that can no
                    // longer start one, or a noisy line with no headers
                    // grows the buffer without bound.
                    prune_to_header(&mut self.rx);
                    return Ok(None);
                }
                Ok(Some((frame, consumed))) => {
                    self.rx.drain(..consumed);
                    if let Frame::Pulse { wheel } = frame {
                        if let Some(wheel) = Wheel::from_id(wheel) {
                            self.pending_pulses.push_back(wheel);
                        }
                        // Unknown channel: drop silently, same leniency as
                        // the count accessors.
                        continue;
                    }
                    return Ok(Some(frame));
                }
            }
        }
    }

    /// Block (up to the port timeout per read) until a non-pulse frame
    /// arrives.
    fn read_reply(&mut self, request: Opcode) -> Result<Frame> {
        loop {
            if let Some(frame) = self.drain_rx_buffer()? {
                return Ok(frame);
            }

            let mut chunk = [0u8; 64];
            let read = self.port.read(&mut chunk).map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    BoardError::Timeout {
                        opcode: request as u8,
                    }
                } else {
                    BoardError::Io(e)
                }
            })?;
            self.rx.extend_from_slice(&chunk[..read]);
        }
    }

    /// Check that the board is alive
    pub fn ping(&mut self) -> Result<bool> {
        self.send_frame(Opcode::Ping, &[])?;
        match self.read_reply(Opcode::Ping) {
            Ok(Frame::Pong) => Ok(true),
            Ok(frame) => Err(BoardError::InvalidFrame {
                reason: format!("expected pong, got {:?}", frame),
            }),
            Err(BoardError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl ChassisBus for BoardLink {
    fn set_motor(&mut self, wheel: Wheel, dir: Direction, power: u8) -> Result<()> {
        debug!("Set motor {:?}: {:?} at {}", wheel, dir, power);
        let dir_byte = match dir {
            Direction::Forward => 0,
            Direction::Backward => 1,
        };
        self.send_frame(Opcode::SetMotor, &[wheel as u8, dir_byte, power])
    }

    fn stop_motor(&mut self, wheel: Wheel) -> Result<()> {
        debug!("Stop motor {:?}", wheel);
        self.send_frame(Opcode::StopMotor, &[wheel as u8])
    }

    fn stop_all(&mut self) -> Result<()> {
        debug!("Stop all motors");
        self.send_frame(Opcode::StopAll, &[])
    }

    fn set_servo_angle(&mut self, servo: Servo, angle: u8) -> Result<()> {
        debug!("Servo {:?} to {} degrees", servo, angle);
        self.send_frame(Opcode::SetServo, &[servo as u8, angle])
    }

    fn read_line_sensor(&mut self, side: Wheel) -> Result<LineReading> {
        self.send_frame(Opcode::ReadLine, &[side as u8])?;
        match self.read_reply(Opcode::ReadLine)? {
            Frame::LineState { side: got, on_line } if got == side as u8 => Ok(if on_line {
                LineReading::OnLine
            } else {
                LineReading::OffLine
            }),
            frame => Err(BoardError::InvalidFrame {
                reason: format!("expected line state for {:?}, got {:?}", side, frame),
            }),
        }
    }

    fn drain_pulses(&mut self) -> Result<Vec<Wheel>> {
        self.pump_available()?;
        // Replies are never in flight here, so everything decoded is a pulse.
        let _ = self.drain_rx_buffer()?;
        Ok(self.pending_pulses.drain(..).collect())
    }
}

/// Drop buffered bytes that can no longer belong to a frame: everything
/// ahead of the first header, or everything but a trailing header-start byte
/// that may pair up once more data arrives.
pub(crate) fn prune_to_header(buf: &mut Vec<u8>) {
    let keep_from = match buf.windows(2).position(|w| w == HEADER) {
        Some(p) => p,
        None if buf.last() == Some(&HEADER[0]) => buf.len() - 1,
        None => buf.len(),
    };
    buf.drain(..keep_from);
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes consumed, or `None` if the
/// buffer does not yet hold a complete frame. Leading garbage before a header
/// is skipped one byte at a time so a corrupted stream resynchronizes.
pub(crate) fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
    // Resync: find the header
    let mut start = 0;
    while start + 1 < buf.len() && buf[start..start + 2] != HEADER {
        start += 1;
    }
    if start + 4 > buf.len() {
        return Ok(None);
    }

    let opcode = buf[start + 2];
    let length = buf[start + 3] as usize;
    let end = start + 4 + length;
    if end > buf.len() {
        return Ok(None);
    }

    let body = &buf[start + 2..end - 1]; // opcode, length, params
    let received_checksum = buf[end - 1];
    if BoardLink::checksum(body) != received_checksum {
        return Err(BoardError::ChecksumMismatch { opcode });
    }

    let params = &body[2..];
    let frame = match opcode {
        x if x == Opcode::LineState as u8 => {
            if params.len() < 2 {
                return Err(BoardError::InvalidFrame {
                    reason: format!("line state frame with {} params", params.len()),
                });
            }
            Frame::LineState {
                side: params[0],
                on_line: params[1] != 0,
            }
        }
        x if x == Opcode::Pong as u8 => Frame::Pong,
        x if x == Opcode::Pulse as u8 => {
            if params.is_empty() {
                return Err(BoardError::InvalidFrame {
                    reason: "pulse frame without wheel tag".to_string(),
                });
            }
            Frame::Pulse { wheel: params[0] }
        }
        other => {
            return Err(BoardError::InvalidFrame {
                reason: format!("unknown opcode 0x{:02X}", other),
            });
        }
    };

    Ok(Some((frame, end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // Opcode=SetMotor, Length=4, Params=[wheel 0, dir 0, power 200]
        let data = [0x01u8, 4, 0, 0, 200];
        let checksum = BoardLink::checksum(&data);
        // ~(1+4+0+0+200) = ~205 = 50
        assert_eq!(checksum, 50);
    }

    #[test]
    fn test_build_frame() {
        let frame = BoardLink::build_frame(Opcode::Ping, &[]);
        // Header (2) + Opcode (1) + Length (1) + Checksum (1) = 5 bytes
        assert_eq!(frame.len(), 5);
        assert_eq!(frame[0], 0xAA);
        assert_eq!(frame[1], 0x55);
        assert_eq!(frame[2], 0x06); // PING opcode
        assert_eq!(frame[3], 1); // Length (checksum only)
    }

    #[test]
    fn test_parse_pulse_frame() {
        let frame = BoardLink::build_frame(Opcode::Pulse, &[1]);
        let (decoded, consumed) = parse_frame(&frame).unwrap().unwrap();
        assert_eq!(decoded, Frame::Pulse { wheel: 1 });
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn test_parse_line_state_frame() {
        let frame = BoardLink::build_frame(Opcode::LineState, &[0, 1]);
        let (decoded, _) = parse_frame(&frame).unwrap().unwrap();
        assert_eq!(
            decoded,
            Frame::LineState {
                side: 0,
                on_line: true
            }
        );
    }

    #[test]
    fn test_parse_incomplete_frame() {
        let frame = BoardLink::build_frame(Opcode::LineState, &[0, 1]);
        assert_eq!(parse_frame(&frame[..4]).unwrap(), None);
    }

    #[test]
    fn test_parse_resyncs_past_garbage() {
        let mut stream = vec![0x00, 0xFF, 0x13];
        stream.extend_from_slice(&BoardLink::build_frame(Opcode::Pong, &[]));
        let (decoded, consumed) = parse_frame(&stream).unwrap().unwrap();
        assert_eq!(decoded, Frame::Pong);
        assert_eq!(consumed, stream.len());
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let mut frame = BoardLink::build_frame(Opcode::Pulse, &[0]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            parse_frame(&frame),
            Err(BoardError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_prune_discards_headerless_garbage() {
        let mut buf = vec![0x00, 0x13, 0x37, 0x42];
        prune_to_header(&mut buf);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_prune_keeps_partial_frame_after_garbage() {
        let mut partial = BoardLink::build_frame(Opcode::Pulse, &[0]);
        partial.truncate(3);
        let mut buf = vec![0x99, 0x13];
        buf.extend_from_slice(&partial);
        prune_to_header(&mut buf);
        assert_eq!(buf, partial);
    }

    #[test]
    fn test_prune_keeps_trailing_header_start() {
        // A lone 0xAA at the tail may become a header when the 0x55 arrives.
        let mut buf = vec![0x13, 0x37, 0xAA];
        prune_to_header(&mut buf);
        assert_eq!(buf, vec![0xAA]);
    }

    #[test]
    fn test_parse_back_to_back_frames() {
        let mut stream = BoardLink::build_frame(Opcode::Pulse, &[0]);
        stream.extend_from_slice(&BoardLink::build_frame(Opcode::Pulse, &[1]));

        let (first, consumed) = parse_frame(&stream).unwrap().unwrap();
        assert_eq!(first, Frame::Pulse { wheel: 0 });
        let (second, _) = parse_frame(&stream[consumed..]).unwrap().unwrap();
        assert_eq!(second, Frame::Pulse { wheel: 1 });
    }
}
