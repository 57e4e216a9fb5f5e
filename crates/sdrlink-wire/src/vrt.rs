//! VRT-style framed packet header codec.
//!
//! Every sample and status packet on the data transport starts with a
//! header derived from VITA-49 IF framing, encoded as little-endian 32-bit
//! words:
//!
//! ```text
//! word 0   type[31:28] cid[27] tlr[26] sob[25] eob[24] tsi[23:22] tsf[21:20] count[19:16] size[15:0]
//! word 1   stream id
//! word 2   integer timestamp (TSI), if present
//! word 3-4 fractional timestamp (TSF, 64-bit tick count, high word first), if present
//! ...      payload words
//! last     trailer, if present
//! ```
//!
//! The class id field is never emitted, and so never counts against the
//! header budget. The decoder still tolerates it when present.
//!
//! All functions operate on raw byte slices and perform no I/O.

use sdrlink_core::{Error, Result};

/// Largest header, in 32-bit words: header, stream id, two class id words,
/// TSI, and two TSF words.
pub const MAX_IF_HDR_WORDS32: usize = 7;

/// Smallest decodable header: header word plus stream id.
pub const MIN_IF_HDR_WORDS32: usize = 2;

/// Words occupied by the class id field.
const CLASS_ID_WORDS32: usize = 2;

/// Words occupied by the trailer.
const TLR_WORDS32: usize = 1;

/// Header budget on the receive path, in bytes: the largest header, plus a
/// trailer the device always appends, minus the class id we never use.
pub const RX_HEADER_BYTES: usize =
    (MAX_IF_HDR_WORDS32 + TLR_WORDS32 - CLASS_ID_WORDS32) * 4;

/// Header budget on the transmit path, in bytes: the largest header minus
/// the class id we never use.
pub const TX_HEADER_BYTES: usize = (MAX_IF_HDR_WORDS32 - CLASS_ID_WORDS32) * 4;

/// Packet type nibble for IF data with a stream id.
const TYPE_DATA: u32 = 0x1;
/// Packet type nibble for context with a stream id.
const TYPE_CONTEXT: u32 = 0x4;
/// Packet type nibble for extension context with a stream id.
const TYPE_EXT_CONTEXT: u32 = 0x5;

const FLAG_CLASS_ID: u32 = 1 << 27;
const FLAG_TRAILER: u32 = 1 << 26;
const FLAG_SOB: u32 = 1 << 25;
const FLAG_EOB: u32 = 1 << 24;
const TSI_SHIFT: u32 = 22;
const TSF_SHIFT: u32 = 20;
/// TSI mode written when an integer timestamp is present ("other").
const TSI_OTHER: u32 = 0x3;
/// TSF mode written when a fractional timestamp is present (sample count).
const TSF_SAMPLE_COUNT: u32 = 0x1;

/// Kind of framed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketType {
    /// Sample data.
    #[default]
    Data,
    /// Status or notification (overflow, async events).
    Context,
}

/// Decoded (or to-be-encoded) header fields of one framed packet.
///
/// On [`pack_le`], the caller fills in everything except the three
/// `num_*` word counts other than `num_payload_words32`; the encoder
/// computes `num_header_words32` and `num_packet_words32`. On
/// [`unpack_le`], every field is produced by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IfPacketInfo {
    /// Data or context.
    pub packet_type: PacketType,
    /// Stream identifier.
    pub stream_id: u32,
    /// 4-bit rolling packet counter.
    pub packet_count: u8,
    /// Whether an integer timestamp is present.
    pub has_tsi: bool,
    /// Integer timestamp (seconds).
    pub tsi: u32,
    /// Whether a fractional timestamp is present.
    pub has_tsf: bool,
    /// Fractional timestamp (device clock ticks).
    pub tsf: u64,
    /// Whether a trailer word follows the payload.
    pub has_tlr: bool,
    /// Trailer word.
    pub tlr: u32,
    /// Start of burst.
    pub sob: bool,
    /// End of burst.
    pub eob: bool,
    /// Payload length in 32-bit words.
    pub num_payload_words32: usize,
    /// Header length in 32-bit words.
    pub num_header_words32: usize,
    /// Total packet length in 32-bit words, including header and trailer.
    pub num_packet_words32: usize,
}

impl IfPacketInfo {
    /// Byte offset where the payload begins.
    pub fn payload_offset(&self) -> usize {
        self.num_header_words32 * 4
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.num_payload_words32 * 4
    }

    /// Total packet length in bytes.
    pub fn packet_len(&self) -> usize {
        self.num_packet_words32 * 4
    }

    /// True when both timestamp fields are present.
    pub fn has_time(&self) -> bool {
        self.has_tsi && self.has_tsf
    }
}

/// Header length in words for the given flags (never includes class id).
pub fn header_words32(info: &IfPacketInfo) -> usize {
    MIN_IF_HDR_WORDS32 + info.has_tsi as usize + 2 * info.has_tsf as usize
}

fn put_word(buf: &mut [u8], index: usize, word: u32) {
    buf[index * 4..index * 4 + 4].copy_from_slice(&word.to_le_bytes());
}

fn get_word(buf: &[u8], index: usize) -> u32 {
    u32::from_le_bytes([
        buf[index * 4],
        buf[index * 4 + 1],
        buf[index * 4 + 2],
        buf[index * 4 + 3],
    ])
}

/// Encode the header (and trailer, if any) of a packet into `buf`.
///
/// The header is written at the start of `buf`; the payload is expected to
/// occupy the following `num_payload_words32` words and is left untouched;
/// the trailer, when `has_tlr` is set, is written after the payload.
/// `num_header_words32` and `num_packet_words32` are updated in `info`.
pub fn pack_le(info: &mut IfPacketInfo, buf: &mut [u8]) -> Result<()> {
    let header_words = header_words32(info);
    let packet_words = header_words
        .checked_add(info.num_payload_words32)
        .and_then(|w| w.checked_add(info.has_tlr as usize))
        .filter(|&w| w <= 0xFFFF)
        .ok_or_else(|| {
            Error::InvalidParameter(format!(
                "packet of {} payload words exceeds the 16-bit size field",
                info.num_payload_words32
            ))
        })?;
    if packet_words * 4 > buf.len() {
        return Err(Error::InvalidParameter(format!(
            "packet needs {} bytes, buffer holds {}",
            packet_words * 4,
            buf.len()
        )));
    }

    let type_bits = match info.packet_type {
        PacketType::Data => TYPE_DATA,
        PacketType::Context => TYPE_EXT_CONTEXT,
    };

    let mut word0 = type_bits << 28;
    if info.has_tlr {
        word0 |= FLAG_TRAILER;
    }
    if info.sob {
        word0 |= FLAG_SOB;
    }
    if info.eob {
        word0 |= FLAG_EOB;
    }
    if info.has_tsi {
        word0 |= TSI_OTHER << TSI_SHIFT;
    }
    if info.has_tsf {
        word0 |= TSF_SAMPLE_COUNT << TSF_SHIFT;
    }
    word0 |= ((info.packet_count & 0x0F) as u32) << 16;
    word0 |= packet_words as u32;

    put_word(buf, 0, word0);
    put_word(buf, 1, info.stream_id);

    let mut index = 2;
    if info.has_tsi {
        put_word(buf, index, info.tsi);
        index += 1;
    }
    if info.has_tsf {
        put_word(buf, index, (info.tsf >> 32) as u32);
        put_word(buf, index + 1, info.tsf as u32);
    }
    if info.has_tlr {
        put_word(buf, packet_words - 1, info.tlr);
    }

    info.num_header_words32 = header_words;
    info.num_packet_words32 = packet_words;
    Ok(())
}

/// Decode a packet header from a received buffer.
///
/// The buffer must hold at least [`MIN_IF_HDR_WORDS32`] words and the
/// declared packet size must fit within it. Bytes beyond the declared size
/// are ignored. Timestamp and trailer presence are inferred from the header
/// flags.
pub fn unpack_le(buf: &[u8]) -> Result<IfPacketInfo> {
    if buf.len() < MIN_IF_HDR_WORDS32 * 4 {
        return Err(Error::MalformedHeader(format!(
            "packet too short: {} bytes, minimum is {}",
            buf.len(),
            MIN_IF_HDR_WORDS32 * 4
        )));
    }

    let word0 = get_word(buf, 0);
    let packet_words = (word0 & 0xFFFF) as usize;

    if packet_words * 4 > buf.len() {
        return Err(Error::MalformedHeader(format!(
            "packet size ({} words = {} bytes) exceeds buffer length ({} bytes)",
            packet_words,
            packet_words * 4,
            buf.len()
        )));
    }

    let packet_type = match word0 >> 28 {
        TYPE_DATA => PacketType::Data,
        TYPE_CONTEXT | TYPE_EXT_CONTEXT => PacketType::Context,
        other => {
            return Err(Error::MalformedHeader(format!(
                "unsupported packet type 0x{:X}",
                other
            )));
        }
    };

    let has_cid = word0 & FLAG_CLASS_ID != 0;
    let has_tlr = word0 & FLAG_TRAILER != 0;
    let has_tsi = (word0 >> TSI_SHIFT) & 0x3 != 0;
    let has_tsf = (word0 >> TSF_SHIFT) & 0x3 != 0;

    let header_words = MIN_IF_HDR_WORDS32
        + if has_cid { CLASS_ID_WORDS32 } else { 0 }
        + has_tsi as usize
        + 2 * has_tsf as usize;

    if header_words + has_tlr as usize > packet_words {
        return Err(Error::MalformedHeader(format!(
            "declared size of {} words cannot hold a {}-word header{}",
            packet_words,
            header_words,
            if has_tlr { " and trailer" } else { "" }
        )));
    }

    let stream_id = get_word(buf, 1);
    let mut index = MIN_IF_HDR_WORDS32 + if has_cid { CLASS_ID_WORDS32 } else { 0 };

    let mut tsi = 0;
    if has_tsi {
        tsi = get_word(buf, index);
        index += 1;
    }
    let mut tsf = 0;
    if has_tsf {
        tsf = ((get_word(buf, index) as u64) << 32) | get_word(buf, index + 1) as u64;
    }

    let tlr = if has_tlr {
        get_word(buf, packet_words - 1)
    } else {
        0
    };

    Ok(IfPacketInfo {
        packet_type,
        stream_id,
        packet_count: ((word0 >> 16) & 0x0F) as u8,
        has_tsi,
        tsi,
        has_tsf,
        tsf,
        has_tlr,
        tlr,
        sob: word0 & FLAG_SOB != 0,
        eob: word0 & FLAG_EOB != 0,
        num_payload_words32: packet_words - header_words - has_tlr as usize,
        num_header_words32: header_words,
        num_packet_words32: packet_words,
    })
}

/// The context code of a status packet: its first payload word.
///
/// Returns `None` when the packet has no payload.
pub fn context_code(buf: &[u8], info: &IfPacketInfo) -> Option<u32> {
    if info.num_payload_words32 == 0 || info.payload_offset() + 4 > buf.len() {
        return None;
    }
    Some(get_word(buf, info.num_header_words32))
}

/// Number of packets missing between two consecutive 4-bit packet counts.
///
/// Returns 0 when `current` directly follows `previous`.
pub fn packets_lost(previous: u8, current: u8) -> u8 {
    current.wrapping_sub(previous).wrapping_sub(1) & 0x0F
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
