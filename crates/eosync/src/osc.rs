//! Framed OSC transport.
//!
//! OSC over a stream socket prefixes every packet with a 4-byte big-endian
//! length. [`OscStream`] owns both directions: outbound packets are either
//! written immediately or queued (the per-tick flush writes at most one
//! queued packet, FIFO), inbound bytes accumulate until complete frames can
//! be peeled off and decoded into [`Command`] records.
//!
//! Packet encode/decode is delegated to `rosc`; only the framing lives here.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use rosc::{OscMessage, OscPacket, OscType};

use crate::log::{Log, LogKind};
use crate::socket::TcpConnection;

const FRAME_HEADER: usize = 4;

/// One decoded inbound message.
#[derive(Debug, Clone)]
pub struct Command {
    pub path: String,
    pub args: Vec<OscType>,
}

/// Framed OSC stream over a [`TcpConnection`].
#[derive(Debug, Default)]
pub struct OscStream {
    outbound: VecDeque<Vec<u8>>,
    inbound: BytesMut,
}

impl OscStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode and send a message. `immediate` writes it out right now;
    /// otherwise it joins the queue and the per-tick flush delivers it.
    pub fn send(&mut self, tcp: &mut TcpConnection, log: &mut Log, msg: OscMessage, immediate: bool) -> bool {
        let packet = match rosc::encoder::encode(&OscPacket::Message(msg)) {
            Ok(bytes) => bytes,
            Err(err) => {
                log.error(format!("OSC packet creation failed: {err}"));
                return false;
            }
        };

        if immediate {
            send_packet(tcp, log, &packet)
        } else {
            self.outbound.push_back(packet);
            true
        }
    }

    /// Flush at most one queued packet.
    pub fn tick(&mut self, tcp: &mut TcpConnection, log: &mut Log) {
        if let Some(packet) = self.outbound.pop_front() {
            send_packet(tcp, log, &packet);
        }
    }

    /// Read one socket chunk (bounded by `timeout`) and append every
    /// complete inbound message to `out`, in wire order. Partial frames
    /// stay buffered; a dropped connection discards the buffer.
    pub fn recv(
        &mut self,
        tcp: &mut TcpConnection,
        log: &mut Log,
        timeout: Duration,
        out: &mut VecDeque<Command>,
    ) {
        if let Some(chunk) = tcp.recv(log, timeout) {
            self.inbound.extend_from_slice(&chunk);
        }

        if !tcp.is_connected() {
            self.inbound.clear();
            return;
        }

        for frame in extract_frames(&mut self.inbound) {
            log.add(LogKind::Recv, format!("received OSC packet [{}]", frame.len()));
            match rosc::decoder::decode_udp(&frame) {
                Ok((_, packet)) => push_packet(packet, out),
                Err(err) => log.error(format!("OSC packet decode failed: {err:?}")),
            }
        }
    }

    /// Number of packets still waiting in the outbound queue.
    pub fn pending_sends(&self) -> usize {
        self.outbound.len()
    }

    /// Drop all queued outbound packets and buffered inbound bytes.
    pub fn clear(&mut self) {
        self.outbound.clear();
        self.inbound.clear();
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> &VecDeque<Vec<u8>> {
        &self.outbound
    }
}

/// Frame and write one packet. Failure is already logged and reflected in
/// the connection state by the socket layer.
fn send_packet(tcp: &mut TcpConnection, log: &mut Log, packet: &[u8]) -> bool {
    let framed = frame_packet(packet);
    if tcp.send(log, &framed) {
        log.add(LogKind::Send, format!("sent OSC packet [{}]", framed.len()));
        true
    } else {
        false
    }
}

/// Prepend the big-endian length word.
fn frame_packet(packet: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(FRAME_HEADER + packet.len());
    framed.extend_from_slice(&(packet.len() as i32).to_be_bytes());
    framed.extend_from_slice(packet);
    framed
}

/// Peel every complete frame off the accumulator. A length word of zero or
/// less costs only its own four bytes.
fn extract_frames(buf: &mut BytesMut) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    loop {
        if buf.len() < FRAME_HEADER {
            break;
        }
        let declared = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let len = declared.max(0) as usize;
        if len == 0 {
            buf.advance(FRAME_HEADER);
            continue;
        }
        if buf.len() < FRAME_HEADER + len {
            break;
        }
        buf.advance(FRAME_HEADER);
        frames.push(buf.split_to(len).to_vec());
    }
    frames
}

/// Flatten a packet into messages, recursing through bundles in order.
fn push_packet(packet: OscPacket, out: &mut VecDeque<Command>) {
    match packet {
        OscPacket::Message(msg) => out.push_back(Command {
            path: msg.addr,
            args: msg.args,
        }),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                push_packet(inner, out);
            }
        }
    }
}

/// Render an argument as a string, the way the console's own tooling does:
/// numbers print in decimal form, booleans as words.
pub fn arg_as_string(arg: &OscType) -> Option<String> {
    match arg {
        OscType::String(s) => Some(s.clone()),
        OscType::Int(i) => Some(i.to_string()),
        OscType::Long(i) => Some(i.to_string()),
        OscType::Float(f) => Some(f.to_string()),
        OscType::Double(f) => Some(f.to_string()),
        OscType::Bool(b) => Some(b.to_string()),
        OscType::Char(c) => Some(c.to_string()),
        _ => None,
    }
}

/// Read an argument as an unsigned count, accepting numeric strings.
pub fn arg_as_u32(arg: &OscType) -> Option<u32> {
    match arg {
        OscType::Int(i) => u32::try_from(*i).ok(),
        OscType::Long(i) => u32::try_from(*i).ok(),
        OscType::Float(f) if *f >= 0.0 => Some(*f as u32),
        OscType::Double(f) if *f >= 0.0 => Some(*f as u32),
        OscType::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Read an argument as a number, accepting numeric strings. A string that
/// is not a plain number (such as a `"1-5"` range) yields `None`.
pub fn arg_as_f64(arg: &OscType) -> Option<f64> {
    match arg {
        OscType::Int(i) => Some(f64::from(*i)),
        OscType::Long(i) => Some(*i as f64),
        OscType::Float(f) => Some(f64::from(*f)),
        OscType::Double(f) => Some(*f),
        OscType::String(s) => s.parse().ok(),
        _ => None,
    }
}
