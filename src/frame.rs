//! RFC 6455 framing: an incremental parser and a frame builder.
//!
//! The parser is byte-fed: [`FrameParser::feed`] consumes whatever prefix of
//! the input it can and reports either a completed frame or that it needs
//! more bytes, so the caller can drive it straight from a socket buffer in
//! arbitrary chunk sizes. Payloads are never copied; a completed frame
//! borrows the fed slice. No extensions are negotiated, so RSV bits and
//! reserved opcodes are hard protocol errors.

use crate::utf8::{self, Utf8Validator};

/// 2 base bytes + 8 extended-length bytes + 4 mask bytes.
pub const MAX_HEADER_LEN: usize = 14;

/// Control frames carry at most this many payload bytes.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Reserved opcodes (0x3-0x7, 0xB-0xF) come back as `None`.
    pub fn from_u8(b: u8) -> Option<Opcode> {
        match b {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    pub fn is_control(self) -> bool {
        (self as u8) & 0x08 != 0
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    #[error("frame payload exceeds the configured maximum")]
    TooLarge,
}

/// A completed frame. `payload` borrows the slice passed to the completing
/// [`FrameParser::feed`] call and covers the payload bytes consumed by that
/// call; when a frame arrived split across several feeds this is only the
/// final chunk, and `payload_len` carries the full length so a caller
/// feeding from a stable buffer can recover the whole contiguous span.
/// Masked payloads are left masked; `mask` carries the key.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub opcode: Opcode,
    pub fin: bool,
    pub payload_len: usize,
    pub payload: &'a [u8],
    pub mask: Option<[u8; 4]>,
}

/// Outcome of one feed call: how many input bytes were consumed, and the
/// frame those bytes completed, if any.
#[derive(Debug)]
pub struct Feed<'a> {
    pub consumed: usize,
    pub frame: Option<RawFrame<'a>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct FrameHeader {
    fin: bool,
    masked: bool,
    payload_len: u64,
    mask_key: [u8; 4],
}

/// Incremental frame parser. One instance per connection; state carries
/// across feeds and across frames (fragmentation tracking).
#[derive(Debug)]
pub struct FrameParser {
    max_frame_size: usize,

    hdr: [u8; MAX_HEADER_LEN],
    hdr_need: usize,
    hdr_have: usize,
    cur: Option<(FrameHeader, Opcode)>,
    payload_read: u64,

    in_fragmented_message: bool,
    first_fragment_opcode: Opcode,

    text: Utf8Validator,
    // CLOSE payloads are copied aside so code and reason can be checked
    // once the frame is complete; they are capped at 125 bytes anyway.
    close_buf: [u8; MAX_CONTROL_PAYLOAD],
    close_len: usize,
}

impl FrameParser {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            hdr: [0; MAX_HEADER_LEN],
            hdr_need: 2,
            hdr_have: 0,
            cur: None,
            payload_read: 0,
            in_fragmented_message: false,
            first_fragment_opcode: Opcode::Text,
            text: Utf8Validator::new(),
            close_buf: [0; MAX_CONTROL_PAYLOAD],
            close_len: 0,
        }
    }

    /// Decode the accumulated header bytes. `Ok(true)` means the header is
    /// complete; `Ok(false)` means more bytes are needed (and `hdr_need`
    /// has been raised accordingly).
    fn parse_header(&mut self) -> Result<bool, FrameError> {
        if self.hdr_have < self.hdr_need {
            return Ok(false);
        }
        let h = &self.hdr;
        let b0 = h[0];
        let b1 = h[1];

        if (b0 >> 4) & 0x07 != 0 {
            return Err(FrameError::Protocol("reserved bits set"));
        }
        let opcode =
            Opcode::from_u8(b0 & 0x0F).ok_or(FrameError::Protocol("reserved opcode"))?;

        let mut hdr = FrameHeader {
            fin: b0 & 0x80 != 0,
            masked: b1 & 0x80 != 0,
            ..Default::default()
        };
        let len7 = u64::from(b1 & 0x7F);

        let mut need = 2;
        if len7 <= 125 {
            hdr.payload_len = len7;
        } else if len7 == 126 {
            need += 2;
            if self.hdr_have < need {
                self.hdr_need = need;
                return Ok(false);
            }
            hdr.payload_len = u64::from(u16::from_be_bytes([h[2], h[3]]));
        } else {
            need += 8;
            if self.hdr_have < need {
                self.hdr_need = need;
                return Ok(false);
            }
            if h[2] & 0x80 != 0 {
                return Err(FrameError::Protocol("64-bit length with high bit set"));
            }
            let mut ext = [0u8; 8];
            ext.copy_from_slice(&h[2..10]);
            hdr.payload_len = u64::from_be_bytes(ext);
        }

        if hdr.masked {
            let after_len = need;
            need += 4;
            if self.hdr_have < need {
                self.hdr_need = need;
                return Ok(false);
            }
            hdr.mask_key.copy_from_slice(&h[after_len..after_len + 4]);
        }

        if opcode.is_control() {
            if !hdr.fin {
                return Err(FrameError::Protocol("fragmented control frame"));
            }
            if hdr.payload_len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(FrameError::Protocol("control frame payload over 125 bytes"));
            }
        }
        if hdr.payload_len > self.max_frame_size as u64 {
            return Err(FrameError::TooLarge);
        }

        self.cur = Some((hdr, opcode));
        Ok(true)
    }

    /// Whether the current frame's payload belongs to a TEXT message and
    /// therefore goes through the streaming UTF-8 validator.
    fn carries_text(&self, opcode: Opcode) -> bool {
        match opcode {
            Opcode::Text => true,
            Opcode::Continuation => {
                self.in_fragmented_message && self.first_fragment_opcode == Opcode::Text
            }
            _ => false,
        }
    }

    fn validate_close_payload(&self) -> Result<(), FrameError> {
        match self.close_len {
            0 => return Ok(()),
            1 => return Err(FrameError::Protocol("close payload of one byte")),
            _ => {}
        }
        let code = u16::from_be_bytes([self.close_buf[0], self.close_buf[1]]);
        let valid = matches!(
            code,
            1000..=1003 | 1007..=1011 | 3000..=4999
        );
        if !valid {
            return Err(FrameError::Protocol("invalid close code"));
        }
        if !utf8::validate(&self.close_buf[2..self.close_len]) {
            return Err(FrameError::Protocol("close reason is not valid UTF-8"));
        }
        Ok(())
    }

    /// Feed a chunk of input. Consumes bytes from the front of `input`;
    /// `Feed::consumed` reports how many. At most one frame completes per
    /// call; trailing input beyond it is left for the next call.
    pub fn feed<'a>(&mut self, input: &'a [u8]) -> Result<Feed<'a>, FrameError> {
        let mut consumed = 0;

        if self.cur.is_none() {
            loop {
                while self.hdr_have < self.hdr_need && consumed < input.len() {
                    self.hdr[self.hdr_have] = input[consumed];
                    self.hdr_have += 1;
                    consumed += 1;
                }
                if self.parse_header()? {
                    break;
                }
                if consumed == input.len() {
                    return Ok(Feed {
                        consumed,
                        frame: None,
                    });
                }
                // hdr_need grew; pull the extra bytes now
            }
        }

        let (hdr, opcode) = self.cur.expect("header decoded above");
        let text_frame = self.carries_text(opcode);

        let remaining = hdr.payload_len - self.payload_read;
        let avail = (input.len() - consumed) as u64;
        let take = remaining.min(avail) as usize;
        let chunk = &input[consumed..consumed + take];
        consumed += take;
        self.payload_read += take as u64;

        if text_frame && !self.text.feed(chunk) {
            return Err(FrameError::Protocol("invalid UTF-8 in text payload"));
        }
        if opcode == Opcode::Close {
            self.close_buf[self.close_len..self.close_len + take].copy_from_slice(chunk);
            self.close_len += take;
        }

        if self.payload_read < hdr.payload_len {
            return Ok(Feed {
                consumed,
                frame: None,
            });
        }

        // Frame complete: payload-dependent rules, then fragmentation
        // bookkeeping, then reset for the next frame.
        if opcode == Opcode::Close {
            self.validate_close_payload()?;
        }
        if !opcode.is_control() {
            match opcode {
                Opcode::Continuation => {
                    if !self.in_fragmented_message {
                        return Err(FrameError::Protocol(
                            "continuation frame outside a fragmented message",
                        ));
                    }
                    if hdr.fin {
                        self.in_fragmented_message = false;
                    }
                }
                _ => {
                    if self.in_fragmented_message {
                        return Err(FrameError::Protocol(
                            "new data frame inside a fragmented message",
                        ));
                    }
                    if !hdr.fin {
                        self.in_fragmented_message = true;
                        self.first_fragment_opcode = opcode;
                    }
                }
            }
            // On the FIN frame of a text message the validator must not be
            // left holding a partial scalar.
            if text_frame && hdr.fin && !self.text.finish() {
                return Err(FrameError::Protocol("truncated UTF-8 at end of text message"));
            }
        }

        let frame = RawFrame {
            opcode,
            fin: hdr.fin,
            payload_len: hdr.payload_len as usize,
            payload: chunk,
            mask: hdr.masked.then_some(hdr.mask_key),
        };

        self.cur = None;
        self.hdr_need = 2;
        self.hdr_have = 0;
        self.payload_read = 0;
        self.close_len = 0;

        Ok(Feed {
            consumed,
            frame: Some(frame),
        })
    }
}

/// XOR `data` in place with the 4-byte mask, starting at mask offset 0.
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, b) in data.iter_mut().enumerate() {
        *b ^= mask[i & 3];
    }
}

/// Number of bytes a frame header occupies for a payload of `payload_len`.
pub fn header_len(payload_len: usize, masked: bool) -> usize {
    let ext = if payload_len <= 125 {
        0
    } else if payload_len <= 0xFFFF {
        2
    } else {
        8
    };
    2 + ext + if masked { 4 } else { 0 }
}

/// Serialize one frame into `out`. Returns the total encoded length, or
/// `None` when `out` is too small. `mask` engages client masking: the key
/// is written after the length and the payload is XORed while copied.
pub fn build_frame(
    out: &mut [u8],
    fin: bool,
    opcode: Opcode,
    mask: Option<[u8; 4]>,
    payload: &[u8],
) -> Option<usize> {
    let need = header_len(payload.len(), mask.is_some()) + payload.len();
    if out.len() < need {
        return None;
    }

    out[0] = (if fin { 0x80 } else { 0 }) | (opcode as u8);
    let mut pos = 2;
    if payload.len() <= 125 {
        out[1] = payload.len() as u8;
    } else if payload.len() <= 0xFFFF {
        out[1] = 126;
        out[2..4].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        pos = 4;
    } else {
        out[1] = 127;
        out[2..10].copy_from_slice(&(payload.len() as u64).to_be_bytes());
        pos = 10;
    }

    match mask {
        Some(key) => {
            out[1] |= 0x80;
            out[pos..pos + 4].copy_from_slice(&key);
            pos += 4;
            for (i, b) in payload.iter().enumerate() {
                out[pos + i] = b ^ key[i & 3];
            }
        }
        None => {
            out[pos..pos + payload.len()].copy_from_slice(payload);
        }
    }
    Some(need)
}
