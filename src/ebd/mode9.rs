//! Mode 9: 8-bit color with RLE and vertical back-reference compression.
//!
//! The output stream interleaves literal palette indices with one-byte
//! control codes. A literal followed by `RLE_k` repeats it k more times; a
//! `COPY_L_OFFSET_o` code copies L pixels from the previous row shifted by
//! o. There are no row markers: the decoder knows the image dimensions and
//! wraps at row boundaries, and the encoder never lets a run or copy cross
//! one.

use crate::color::PALETTE_SIZE;

/// Longest run or copy a single step may consume.
const WINDOW: usize = 21;

/// First byte value reserved for control codes (one past the last palette
/// index). The assignment below is part of the wire contract.
const CODE_BASE: u8 = PALETTE_SIZE as u8; // 0xE7

/// `RLE_k` for k in 1..=6. The `RLE_6` form is followed by a byte holding
/// `k - 6`.
#[inline]
fn rle_code(k: usize) -> u8 {
    debug_assert!((1..=6).contains(&k));
    CODE_BASE + (k as u8 - 1)
}

/// `COPY_k_OFFSET_o` for k in 1..=6, o in {-1, 0, +1}. The `COPY_6` forms
/// are followed by a byte holding `k - 6`.
#[inline]
fn copy_code(k: usize, offset: i8) -> u8 {
    debug_assert!((1..=6).contains(&k));
    let group = match offset {
        -1 => 0,
        0 => 1,
        1 => 2,
        _ => unreachable!("offset out of range"),
    };
    CODE_BASE + 6 + group * 6 + (k as u8 - 1)
}

#[inline]
fn is_control(byte: u8) -> bool {
    byte >= CODE_BASE && byte < CODE_BASE + 24
}

/// Candidate emission kinds in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    Rle,
    Copy0,
    CopyMinus1,
    CopyPlus1,
}

impl Candidate {
    fn weight(self) -> f32 {
        match self {
            Candidate::Rle => 1.2,
            Candidate::Copy0 => 1.1,
            Candidate::CopyMinus1 | Candidate::CopyPlus1 => 1.0,
        }
    }

    fn offset(self) -> i8 {
        match self {
            Candidate::CopyMinus1 => -1,
            Candidate::Copy0 => 0,
            Candidate::CopyPlus1 => 1,
            Candidate::Rle => unreachable!("RLE has no offset"),
        }
    }
}

/// Compress a row-major palette-index image.
///
/// Every index must be a valid palette index (< 231); control codes live
/// strictly above that range.
pub fn compress(indices: &[u8], width: usize, height: usize) -> Vec<u8> {
    debug_assert_eq!(indices.len(), width * height);
    debug_assert!(indices.iter().all(|&i| (i as usize) < PALETTE_SIZE));

    let mut buffer = Vec::with_capacity(indices.len() / 2 + width);

    for y in 0..height {
        let row = &indices[y * width..(y + 1) * width];
        let prev = (y > 0).then(|| &indices[(y - 1) * width..y * width]);
        compress_row(row, prev, &mut buffer);
    }

    buffer
}

fn compress_row(row: &[u8], prev: Option<&[u8]>, buffer: &mut Vec<u8>) {
    let width = row.len();
    let mut x = 0usize;

    while x < width {
        let pixel = row[x];
        let window = WINDOW.min(width - x);

        let run = rle_length(row, x, window);
        let (copy_a, copy_b, copy_c) = match prev {
            Some(prev_row) => (
                if x >= 1 { match_length(&row[x..], &prev_row[x - 1..], window) } else { 0 },
                match_length(&row[x..], &prev_row[x..], window),
                if x + 1 < width { match_length(&row[x..], &prev_row[x + 1..], window) } else { 0 },
            ),
            // The first row can only run-length encode against itself.
            None => (0, 0, 0),
        };

        // Highest weighted score wins; on ties the earlier entry stands, so
        // the order here is the tie-break priority.
        let mut best = Candidate::Rle;
        let mut best_len = run;
        let mut best_score = run as f32 * Candidate::Rle.weight();
        for (candidate, len) in [
            (Candidate::Copy0, copy_b),
            (Candidate::CopyMinus1, copy_a),
            (Candidate::CopyPlus1, copy_c),
        ] {
            let score = len as f32 * candidate.weight();
            if score > best_score {
                best = candidate;
                best_len = len;
                best_score = score;
            }
        }

        if best_len == 0 {
            buffer.push(pixel);
            x += 1;
        } else if best == Candidate::Rle {
            // The literal consumes the first pixel of the run; the control
            // code repeats it run - 1 more times.
            buffer.push(pixel);
            let k = best_len - 1;
            if k >= 6 {
                buffer.push(rle_code(6));
                buffer.push((k - 6) as u8);
            } else {
                buffer.push(rle_code(k));
            }
            x += best_len;
        } else {
            let offset = best.offset();
            if best_len >= 6 {
                buffer.push(copy_code(6, offset));
                buffer.push((best_len - 6) as u8);
            } else {
                buffer.push(copy_code(best_len, offset));
            }
            x += best_len;
        }
    }
}

/// Length of the run of `row[x]` starting at x, capped. Runs shorter than 2
/// are reported as 0: a lone pixel is a literal, not a run.
fn rle_length(row: &[u8], x: usize, cap: usize) -> usize {
    if x + 1 >= row.len() || row[x + 1] != row[x] {
        return 0;
    }
    let pixel = row[x];
    let mut len = 0;
    while len < cap && row[x + len] == pixel {
        len += 1;
    }
    len
}

/// Length of the common prefix of two slices, capped.
fn match_length(a: &[u8], b: &[u8], cap: usize) -> usize {
    let limit = cap.min(a.len()).min(b.len());
    let mut len = 0;
    while len < limit && a[len] == b[len] {
        len += 1;
    }
    len
}

/// Error from [`decompress`].
#[derive(Debug, thiserror::Error)]
pub enum Mode9DecodeError {
    #[error("truncated mode 9 stream at byte {0}")]
    Truncated(usize),
    #[error("control code {code:#04x} at byte {offset} has no preceding context")]
    OrphanCode { code: u8, offset: usize },
    #[error("stream overruns the {width}x{height} image at byte {offset}")]
    Overrun { width: usize, height: usize, offset: usize },
}

/// Reconstruct the palette-index image from a mode 9 stream.
pub fn decompress(data: &[u8], width: usize, height: usize) -> Result<Vec<u8>, Mode9DecodeError> {
    let total = width * height;
    let mut out: Vec<u8> = Vec::with_capacity(total);
    let mut pos = 0usize;

    while out.len() < total {
        let byte = *data.get(pos).ok_or(Mode9DecodeError::Truncated(pos))?;

        if !is_control(byte) {
            // Literal; an immediately following RLE code extends it.
            let mut count = 1usize;
            if let Some(&next) = data.get(pos + 1) {
                if is_control(next) && next < CODE_BASE + 6 {
                    let mut k = (next - CODE_BASE + 1) as usize;
                    pos += 1;
                    if k == 6 {
                        pos += 1;
                        let extra = *data.get(pos).ok_or(Mode9DecodeError::Truncated(pos))?;
                        k += extra as usize;
                    }
                    count += k;
                }
            }
            if out.len() + count > total {
                return Err(Mode9DecodeError::Overrun { width, height, offset: pos });
            }
            out.extend(std::iter::repeat_n(byte, count));
            pos += 1;
        } else if byte < CODE_BASE + 6 {
            // An RLE code must trail a literal; reaching one here means the
            // stream is malformed.
            return Err(Mode9DecodeError::OrphanCode { code: byte, offset: pos });
        } else {
            let rel = (byte - CODE_BASE - 6) as usize;
            let offset: i64 = match rel / 6 {
                0 => -1,
                1 => 0,
                _ => 1,
            };
            let mut len = rel % 6 + 1;
            pos += 1;
            if len == 6 {
                let extra = *data.get(pos).ok_or(Mode9DecodeError::Truncated(pos))?;
                len += extra as usize;
                pos += 1;
            }

            let x = out.len() % width;
            let y = out.len() / width;
            let src = (y as i64 - 1) * width as i64 + x as i64 + offset;
            if y == 0
                || out.len() + len > total
                || src < 0
                || src as usize + len > out.len()
            {
                return Err(Mode9DecodeError::Overrun { width, height, offset: pos });
            }
            for j in 0..len {
                let value = out[src as usize + j];
                out.push(value);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_codes_are_disjoint_from_palette() {
        for k in 1..=6 {
            assert!(rle_code(k) as usize >= PALETTE_SIZE);
            for offset in [-1i8, 0, 1] {
                assert!(copy_code(k, offset) as usize >= PALETTE_SIZE);
            }
        }
        // 24 distinct codes.
        let mut all: Vec<u8> = (1..=6).map(rle_code).collect();
        for offset in [-1i8, 0, 1] {
            all.extend((1..=6).map(|k| copy_code(k, offset)));
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 24);
    }

    #[test]
    fn uniform_row_uses_extended_rle() {
        // Ten pixels of index 5: literal, RLE_6, length 9 - 6 = 3.
        let out = compress(&[5u8; 10], 10, 1);
        assert_eq!(out, vec![0x05, rle_code(6), 3]);
        assert_eq!(decompress(&out, 10, 1).unwrap(), vec![5u8; 10]);
    }

    #[test]
    fn short_run_uses_direct_rle_code() {
        // Three equal pixels then a different one.
        let out = compress(&[7, 7, 7, 9], 4, 1);
        assert_eq!(out, vec![7, rle_code(2), 9]);
    }

    #[test]
    fn identical_rows_use_vertical_copy() {
        let row = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut image = Vec::new();
        image.extend_from_slice(&row);
        image.extend_from_slice(&row);
        let out = compress(&image, 8, 2);
        // Second row collapses to one COPY_6_OFFSET_0 with remainder 2.
        let tail = &out[out.len() - 2..];
        assert_eq!(tail, &[copy_code(6, 0), 2]);
        assert_eq!(decompress(&out, 8, 2).unwrap(), image);
    }

    #[test]
    fn first_row_never_references_a_previous_row() {
        let out = compress(&[3, 1, 4, 1, 5, 9, 2, 6], 8, 1);
        assert!(out.iter().all(|&b| !is_control(b) || b < CODE_BASE + 6));
        assert_eq!(decompress(&out, 8, 1).unwrap(), vec![3, 1, 4, 1, 5, 9, 2, 6]);
    }

    #[test]
    fn long_runs_split_at_the_window_cap() {
        let image = vec![42u8; 64];
        let out = compress(&image, 64, 1);
        assert_eq!(decompress(&out, 64, 1).unwrap(), image);
        // 64 = 21 + 21 + 21 + 1: three capped runs and a trailing literal.
        assert_eq!(
            out,
            vec![
                42, rle_code(6), 14,
                42, rle_code(6), 14,
                42, rle_code(6), 14,
                42,
            ]
        );
    }

    #[test]
    fn diagonal_patterns_round_trip() {
        let width = 13;
        let height = 9;
        let image: Vec<u8> = (0..width * height)
            .map(|i| {
                let x = i % width;
                let y = i / width;
                ((x + y * 2) % 230) as u8
            })
            .collect();
        let out = compress(&image, width, height);
        assert_eq!(decompress(&out, width, height).unwrap(), image);
    }

    #[test]
    fn noisy_image_round_trips() {
        let width = 31;
        let height = 17;
        // Deterministic pseudo-noise touching the whole index range.
        let mut state = 0x1234_5678u32;
        let image: Vec<u8> = (0..width * height)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                ((state >> 16) % PALETTE_SIZE as u32) as u8
            })
            .collect();
        let out = compress(&image, width, height);
        assert_eq!(decompress(&out, width, height).unwrap(), image);
    }

    #[test]
    fn shifted_rows_use_offset_copies() {
        // Row 1 equals row 0 shifted right by one: COPY_OFFSET_-1 territory.
        let image = [
            10, 11, 12, 13, 14, 15, 16, 17, //
            99, 10, 11, 12, 13, 14, 15, 16,
        ];
        let out = compress(&image, 8, 2);
        assert!(
            out.contains(&copy_code(6, -1)),
            "expected an offset -1 copy in {out:?}"
        );
        assert_eq!(decompress(&out, 8, 2).unwrap(), image.to_vec());
    }

    #[test]
    fn decoder_rejects_orphan_rle_code() {
        assert!(matches!(
            decompress(&[rle_code(3)], 4, 1),
            Err(Mode9DecodeError::OrphanCode { .. })
        ));
    }
}
