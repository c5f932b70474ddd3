//! Chunked linear-sweep decoder over iced-x86.
//!
//! Decoding walks the input in [`CHUNK_SIZE`] windows. Within a window the
//! iced decoder runs until it stalls on an undecodable byte; the sweep then
//! resumes one byte past the stall point (byte-level resynchronization), so a
//! data island inside a code section costs at most its own bytes. After a
//! clean window the next one starts exactly at the previous window's last
//! instruction end, which keeps instructions that straddle a window boundary
//! intact.

use iced_x86::{Decoder, DecoderOptions, Formatter, IntelFormatter, MemorySizeOptions};
use std::collections::VecDeque;

use crate::{CancelToken, Error, Result};

use super::{Annotator, Instruction, CHUNK_SIZE};

/// Build the formatter all streams share the configuration of: Intel syntax,
/// `0x` hex literals, lowercase, explicit memory sizes and `[rip+0x..]`
/// displacement rendering. The analysis passes parse this exact shape.
fn make_formatter() -> IntelFormatter {
    let mut formatter = IntelFormatter::new();
    let options = formatter.options_mut();
    options.set_hex_prefix("0x".into());
    options.set_hex_suffix("".into());
    options.set_uppercase_hex(false);
    options.set_small_hex_numbers_in_decimal(false);
    options.set_branch_leading_zeros(false);
    options.set_show_branch_size(false);
    options.set_space_after_operand_separator(true);
    options.set_rip_relative_addresses(true);
    options.set_memory_size_options(MemorySizeOptions::Always);
    formatter
}

/// Start a lazy disassembly of `bytes` mapped at `base_va`.
///
/// The returned stream yields [`Instruction`]s in address order and may be
/// abandoned at any point; everything already yielded stays valid. Pass an
/// [`Annotator`] to have comments resolved inline during decoding.
///
/// # Errors
///
/// Returns [`Error::Empty`] for an empty slice and a descriptive error for a
/// bitness other than 32 or 64.
pub fn disassemble<'a>(
    bytes: &'a [u8],
    base_va: u64,
    bitness: u32,
    annotator: Option<&'a Annotator<'a>>,
) -> Result<InstructionStream<'a>> {
    if bytes.is_empty() {
        return Err(Error::Empty);
    }
    if bitness != 32 && bitness != 64 {
        return Err(Error::Error(format!(
            "Invalid bitness {bitness}, must be 32 or 64"
        )));
    }

    Ok(InstructionStream {
        bytes,
        base_va,
        bitness,
        offset: 0,
        pending: VecDeque::new(),
        annotator,
        token: None,
        formatter: make_formatter(),
        done: false,
    })
}

/// Lazy instruction stream over one byte range.
///
/// Not `Sync`: the underlying decoder state is single-threaded. Concurrent
/// disassembly uses one stream per thread; the annotator behind it is pure and
/// may be shared.
pub struct InstructionStream<'a> {
    bytes: &'a [u8],
    base_va: u64,
    bitness: u32,
    offset: usize,
    pending: VecDeque<Instruction>,
    annotator: Option<&'a Annotator<'a>>,
    token: Option<CancelToken>,
    formatter: IntelFormatter,
    done: bool,
}

impl<'a> InstructionStream<'a> {
    /// Attach a cancellation token, polled before each chunk.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Decode one chunk into the pending queue, advancing the sweep offset.
    fn decode_chunk(&mut self) {
        if self.offset >= self.bytes.len() {
            self.done = true;
            return;
        }
        if let Some(token) = &self.token {
            if token.is_cancelled() {
                self.done = true;
                return;
            }
        }

        let chunk_end = (self.offset + CHUNK_SIZE).min(self.bytes.len());
        let chunk = &self.bytes[self.offset..chunk_end];
        let chunk_ip = self.base_va + self.offset as u64;

        let mut decoder = Decoder::with_ip(self.bitness, chunk, chunk_ip, DecoderOptions::NONE);
        let mut consumed = 0_usize;

        while decoder.can_decode() {
            let decoded = decoder.decode();
            if decoded.is_invalid() {
                break;
            }

            let start = (decoded.ip() - chunk_ip) as usize;
            let size = decoded.len();

            let mut mnemonic = String::new();
            self.formatter.format_mnemonic(&decoded, &mut mnemonic);
            let mut operand_text = String::new();
            self.formatter.format_all_operands(&decoded, &mut operand_text);

            let comment = self
                .annotator
                .and_then(|a| a.comment(decoded.ip(), size, &operand_text));

            self.pending.push_back(Instruction {
                address: decoded.ip(),
                bytes: chunk[start..start + size].to_vec(),
                mnemonic,
                operands: operand_text,
                size,
                comment,
            });

            consumed = start + size;
        }

        if consumed == 0 {
            // Nothing decoded at this position: resynchronize one byte forward.
            self.offset += 1;
        } else {
            self.offset += consumed;
        }
    }
}

impl Iterator for InstructionStream<'_> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        while self.pending.is_empty() && !self.done {
            self.decode_chunk();
        }
        self.pending.pop_front()
    }
}
