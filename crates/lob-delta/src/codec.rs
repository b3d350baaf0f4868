//! The opaque delta codec interface and a default implementation.
//!
//! The wire format and apply semantics in §4.E treat the codec as a pair of
//! black boxes: `compress(base, input) -> delta` and
//! `decompress(base, delta) -> output`, with SHA-1 verification of the
//! result done by the caller. [`RollingSignatureCodec`] is one concrete,
//! swappable implementation of that interface — a weak rolling checksum
//! locates candidate matching blocks between base and target, a strong
//! SHA-1 digest confirms each candidate, and the delta is a sequence of
//! `Copy`/`Literal` opcodes.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use sha1::{Digest, Sha1};

/// Turns a `(base, input)` pair into an opaque delta, and a `(base, delta)`
/// pair back into the reconstructed output.
///
/// Implementations may assume `base` and `input`/`delta` are read to
/// completion by a single call; they do not need to support partial reads
/// across multiple invocations.
pub trait DeltaCodec: Send + Sync {
    /// Produces a delta that [`DeltaCodec::decompress`] can turn back into
    /// `input`'s bytes given the same `base`.
    fn compress(
        &self,
        base: &mut dyn Read,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> io::Result<()>;

    /// Reconstructs the original input bytes from `base` and a `delta`
    /// produced by [`DeltaCodec::compress`].
    fn decompress(
        &self,
        base: &mut dyn Read,
        delta: &mut dyn Read,
        output: &mut dyn Write,
    ) -> io::Result<()>;
}

/// Default block size for signature matching: 4 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

const MOD_ADLER: i64 = 65521;
const TAG_COPY: u8 = 1;
const TAG_LITERAL: u8 = 2;

/// A weak, rolling checksum over a sliding window, in the style of rsync's
/// block-matching algorithm: cheap to recompute incrementally as the window
/// slides forward by one byte.
struct RollingChecksum {
    s1: i64,
    s2: i64,
    window_len: i64,
}

impl RollingChecksum {
    fn new(window: &[u8]) -> Self {
        let mut s1 = 0i64;
        let mut s2 = 0i64;
        let n = window.len() as i64;
        for (k, &byte) in window.iter().enumerate() {
            s1 = (s1 + i64::from(byte)) % MOD_ADLER;
            s2 = (s2 + (n - k as i64) * i64::from(byte)) % MOD_ADLER;
        }
        Self { s1, s2, window_len: n }
    }

    fn digest(&self) -> u32 {
        (self.s1 as u32) | ((self.s2 as u32) << 16)
    }

    /// Slides the window forward by one byte: `out_byte` leaves at the front,
    /// `in_byte` enters at the back.
    fn roll(&mut self, out_byte: u8, in_byte: u8) {
        self.s1 = (self.s1 - i64::from(out_byte) + i64::from(in_byte)).rem_euclid(MOD_ADLER);
        self.s2 =
            (self.s2 - self.window_len * i64::from(out_byte) + self.s1).rem_euclid(MOD_ADLER);
    }
}

fn sha1_digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A candidate base block a weak checksum can match against.
struct BlockSignature {
    offset: u64,
    len: u32,
    strong: [u8; 20],
}

fn build_signatures(base: &[u8], block_size: usize) -> HashMap<u32, Vec<BlockSignature>> {
    let mut table: HashMap<u32, Vec<BlockSignature>> = HashMap::new();
    let mut offset = 0usize;
    while offset < base.len() {
        let end = (offset + block_size).min(base.len());
        let block = &base[offset..end];
        let weak = RollingChecksum::new(block).digest();
        table.entry(weak).or_default().push(BlockSignature {
            offset: offset as u64,
            len: block.len() as u32,
            strong: sha1_digest(block),
        });
        offset = end;
    }
    table
}

fn find_match<'a>(
    table: &'a HashMap<u32, Vec<BlockSignature>>,
    weak: u32,
    window: &[u8],
) -> Option<&'a BlockSignature> {
    let candidates = table.get(&weak)?;
    let strong = sha1_digest(window);
    candidates
        .iter()
        .find(|c| c.len as usize == window.len() && c.strong == strong)
}

fn flush_literal(literal: &mut Vec<u8>, output: &mut dyn Write) -> io::Result<()> {
    if literal.is_empty() {
        return Ok(());
    }
    output.write_all(&[TAG_LITERAL])?;
    output.write_all(&(literal.len() as u32).to_le_bytes())?;
    output.write_all(literal)?;
    literal.clear();
    Ok(())
}

fn write_copy(output: &mut dyn Write, offset: u64, len: u64) -> io::Result<()> {
    output.write_all(&[TAG_COPY])?;
    output.write_all(&offset.to_le_bytes())?;
    output.write_all(&len.to_le_bytes())?;
    Ok(())
}

fn compress_bytes(
    table: &HashMap<u32, Vec<BlockSignature>>,
    block_size: usize,
    input: &[u8],
    output: &mut dyn Write,
) -> io::Result<()> {
    let mut literal: Vec<u8> = Vec::new();
    let mut pos = 0usize;

    while pos < input.len() {
        let window_len = block_size.min(input.len() - pos);
        let mut checksum = RollingChecksum::new(&input[pos..pos + window_len]);
        let mut window_start = pos;

        let found = loop {
            let window = &input[window_start..window_start + window_len];
            if let Some(candidate) = find_match(table, checksum.digest(), window) {
                break Some((window_start, candidate.offset, candidate.len));
            }

            let can_slide = window_len == block_size && window_start + window_len < input.len();
            if !can_slide {
                break None;
            }

            let out_byte = input[window_start];
            let in_byte = input[window_start + window_len];
            checksum.roll(out_byte, in_byte);
            window_start += 1;
        };

        match found {
            Some((match_start, base_offset, match_len)) => {
                literal.extend_from_slice(&input[pos..match_start]);
                flush_literal(&mut literal, output)?;
                write_copy(output, base_offset, u64::from(match_len))?;
                pos = match_start + match_len as usize;
            }
            None => {
                literal.push(input[pos]);
                pos += 1;
            }
        }
    }

    flush_literal(&mut literal, output)
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> io::Result<u32> {
    let bytes = buf
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| invalid_data("delta stream truncated reading a u32"))?;
    *cursor += 4;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u64(buf: &[u8], cursor: &mut usize) -> io::Result<u64> {
    let bytes = buf
        .get(*cursor..*cursor + 8)
        .ok_or_else(|| invalid_data("delta stream truncated reading a u64"))?;
    *cursor += 8;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

fn decompress_bytes(base: &[u8], delta: &[u8], output: &mut dyn Write) -> io::Result<()> {
    let mut cursor = 0usize;
    while cursor < delta.len() {
        let tag = delta[cursor];
        cursor += 1;
        match tag {
            TAG_COPY => {
                let offset = read_u64(delta, &mut cursor)? as usize;
                let len = read_u64(delta, &mut cursor)? as usize;
                let end = offset
                    .checked_add(len)
                    .ok_or_else(|| invalid_data("copy range overflows base length"))?;
                let slice = base
                    .get(offset..end)
                    .ok_or_else(|| invalid_data("copy range out of base bounds"))?;
                output.write_all(slice)?;
            }
            TAG_LITERAL => {
                let len = read_u32(delta, &mut cursor)? as usize;
                let end = cursor
                    .checked_add(len)
                    .ok_or_else(|| invalid_data("literal run length overflows delta"))?;
                let slice = delta
                    .get(cursor..end)
                    .ok_or_else(|| invalid_data("literal run truncated"))?;
                output.write_all(slice)?;
                cursor = end;
            }
            other => return Err(invalid_data(format!("unknown delta opcode {other}"))),
        }
    }
    Ok(())
}

/// Rolling-checksum-and-SHA-1 delta codec: the server's built-in default
/// [`DeltaCodec`] implementation.
///
/// Not a VCDIFF implementation — it is intentionally simple, since the
/// codec is defined as swappable. `block_size` controls the granularity of
/// block matching; smaller values find more matches at the cost of a larger
/// signature table and opcode stream.
pub struct RollingSignatureCodec {
    block_size: usize,
}

impl RollingSignatureCodec {
    /// Builds a codec using `block_size`-byte blocks for signature matching.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }
}

impl Default for RollingSignatureCodec {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl DeltaCodec for RollingSignatureCodec {
    fn compress(
        &self,
        base: &mut dyn Read,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        let mut base_bytes = Vec::new();
        base.read_to_end(&mut base_bytes)?;
        let mut input_bytes = Vec::new();
        input.read_to_end(&mut input_bytes)?;

        let table = build_signatures(&base_bytes, self.block_size);
        compress_bytes(&table, self.block_size, &input_bytes, output)
    }

    fn decompress(
        &self,
        base: &mut dyn Read,
        delta: &mut dyn Read,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        let mut base_bytes = Vec::new();
        base.read_to_end(&mut base_bytes)?;
        let mut delta_bytes = Vec::new();
        delta.read_to_end(&mut delta_bytes)?;

        decompress_bytes(&base_bytes, &delta_bytes, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(base: &[u8], input: &[u8], block_size: usize) -> Vec<u8> {
        let codec = RollingSignatureCodec::new(block_size);
        let mut delta = Vec::new();
        codec
            .compress(&mut &base[..], &mut &input[..], &mut delta)
            .unwrap();

        let mut output = Vec::new();
        codec
            .decompress(&mut &base[..], &mut &delta[..], &mut output)
            .unwrap();
        output
    }

    #[test]
    fn identical_base_and_input_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(10);
        let output = round_trip(&data, &data, 16);
        assert_eq!(output, data);
    }

    #[test]
    fn appended_suffix_round_trips() {
        let base = b"hello world, this is the base content block".repeat(5);
        let mut input = base.clone();
        input.extend_from_slice(b" and this part is new");
        let output = round_trip(&base, &input, 16);
        assert_eq!(output, input);
    }

    #[test]
    fn completely_disjoint_content_round_trips_as_all_literal() {
        let base = vec![1u8; 256];
        let input = vec![2u8; 256];
        let output = round_trip(&base, &input, 32);
        assert_eq!(output, input);
    }

    #[test]
    fn empty_input_round_trips_to_empty_output() {
        let output = round_trip(b"some base content", b"", 16);
        assert!(output.is_empty());
    }

    #[test]
    fn reordered_blocks_round_trip() {
        let base = [b"AAAA".repeat(8), b"BBBB".repeat(8), b"CCCC".repeat(8)].concat();
        let input = [b"CCCC".repeat(8), b"AAAA".repeat(8), b"BBBB".repeat(8)].concat();
        let output = round_trip(&base, &input, 8);
        assert_eq!(output, input);
    }

    #[test]
    fn decompress_rejects_copy_range_past_base_end() {
        let mut delta = Vec::new();
        delta.push(TAG_COPY);
        delta.extend_from_slice(&0u64.to_le_bytes());
        delta.extend_from_slice(&100u64.to_le_bytes());

        let codec = RollingSignatureCodec::default();
        let mut output = Vec::new();
        let err = codec
            .decompress(&mut &b"short"[..], &mut &delta[..], &mut output)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn rolling_checksum_roll_matches_fresh_recompute() {
        let data = b"abcdefghij";
        let mut rolling = RollingChecksum::new(&data[0..4]);
        rolling.roll(data[0], data[4]);
        let fresh = RollingChecksum::new(&data[1..5]);
        assert_eq!(rolling.digest(), fresh.digest());
    }
}
