//! SLIP framing for the Shearwater BLE serial service.
//!
//! Outgoing packets are SLIP byte-stuffed, terminated with END, and split
//! into link frames of at most 32 bytes. Every frame starts with a 2-byte
//! header: the total number of frames in the packet and the 0-based index
//! of this frame. Inbound notification chunks carry the same header.

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// SLIP payload bytes per link frame (32 bytes minus the frame header).
pub const FRAME_PAYLOAD: usize = 30;

/// SLIP-encode `packet` and split it into link frames.
///
/// Escapes are counted up front so the frame-count byte is known before
/// the first frame is emitted.
pub fn encode_frames(packet: &[u8]) -> Vec<Vec<u8>> {
    let escapes = packet.iter().filter(|&&b| b == END || b == ESC).count();
    let encoded_len = packet.len() + escapes + 1;
    let n_frames = ((encoded_len + FRAME_PAYLOAD - 1) / FRAME_PAYLOAD) as u8;

    let mut encoded = Vec::with_capacity(encoded_len);
    for &byte in packet {
        match byte {
            END => {
                encoded.push(ESC);
                encoded.push(ESC_END);
            }
            ESC => {
                encoded.push(ESC);
                encoded.push(ESC_ESC);
            }
            _ => encoded.push(byte),
        }
    }
    encoded.push(END);

    encoded
        .chunks(FRAME_PAYLOAD)
        .enumerate()
        .map(|(index, content)| {
            let mut frame = Vec::with_capacity(2 + content.len());
            frame.push(n_frames);
            frame.push(index as u8);
            frame.extend_from_slice(content);
            frame
        })
        .collect()
}

/// Streaming SLIP decoder over link frames.
///
/// Strips the 2-byte frame header from each chunk, then runs the SLIP
/// state machine over the rest. A packet completes on the first END once
/// the buffer is non-empty; leading ENDs are ignored.
#[derive(Default, Debug)]
pub struct SlipDecoder {
    buffer: Vec<u8>,
    escaped: bool,
}

impl SlipDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one link frame; returns the de-stuffed packet on END.
    pub fn feed_frame(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        for &byte in frame.get(2..)? {
            if self.escaped {
                self.escaped = false;
                match byte {
                    ESC_END => self.buffer.push(END),
                    ESC_ESC => self.buffer.push(ESC),
                    other => self.buffer.push(other),
                }
                continue;
            }
            match byte {
                END => {
                    if !self.buffer.is_empty() {
                        return Some(std::mem::take(&mut self.buffer));
                    }
                }
                ESC => self.escaped = true,
                other => self.buffer.push(other),
            }
        }
        None
    }
}
