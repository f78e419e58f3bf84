//! Scanline bitmap compression (modes 1, 3, 5).
//!
//! Byte-granularity delta coding against the previous row: every 8-byte
//! window produces one change-mask byte (MSB = first byte of the window)
//! followed by only the bytes that differ from the row above. The first row
//! has no predecessor, so its masks are all-ones and every byte is literal.

/// Compress a packed bitmap laid out as rows of `width_bytes` bytes.
///
/// `data.len()` must be a whole number of rows.
pub fn compress(data: &[u8], width_bytes: usize) -> Vec<u8> {
    assert!(width_bytes > 0, "row width must be non-zero");
    assert_eq!(
        data.len() % width_bytes,
        0,
        "bitmap length {} is not a multiple of the row width {}",
        data.len(),
        width_bytes
    );

    let mut buffer = Vec::with_capacity(data.len() + data.len() / 8 + width_bytes);
    let mut prev: Option<&[u8]> = None;

    for row in data.chunks_exact(width_bytes) {
        compress_row(row, prev, &mut buffer);
        prev = Some(row);
    }

    buffer
}

fn compress_row(row: &[u8], prev: Option<&[u8]>, buffer: &mut Vec<u8>) {
    for (chunk_index, chunk) in row.chunks(8).enumerate() {
        let mut mask = 0u8;
        match prev {
            None => {
                // All bytes change on the first row; a partial trailing
                // chunk keeps its mask high-aligned.
                mask = 0xFFu8 << (8 - chunk.len());
                buffer.push(mask);
                buffer.extend_from_slice(chunk);
            }
            Some(prev_row) => {
                let prev_chunk = &prev_row[chunk_index * 8..chunk_index * 8 + chunk.len()];
                for (k, (&cur, &old)) in chunk.iter().zip(prev_chunk).enumerate() {
                    if cur != old {
                        mask |= 0x80 >> k;
                    }
                }
                buffer.push(mask);
                for (k, &cur) in chunk.iter().enumerate() {
                    if mask & (0x80 >> k) != 0 {
                        buffer.push(cur);
                    }
                }
            }
        }
    }
}

/// Error from [`decompress`].
#[derive(Debug, thiserror::Error)]
#[error("truncated scanline stream at byte {offset}")]
pub struct ScanlineDecodeError {
    pub offset: usize,
}

/// Reverse of [`compress`], reconstructing `rows` rows of `width_bytes`.
pub fn decompress(
    data: &[u8],
    width_bytes: usize,
    rows: usize,
) -> Result<Vec<u8>, ScanlineDecodeError> {
    let mut out: Vec<u8> = Vec::with_capacity(width_bytes * rows);
    let mut pos = 0usize;

    for row_index in 0..rows {
        let row_start = row_index * width_bytes;
        for chunk_start in (0..width_bytes).step_by(8) {
            let chunk_len = (width_bytes - chunk_start).min(8);
            let mask = *data.get(pos).ok_or(ScanlineDecodeError { offset: pos })?;
            pos += 1;
            for k in 0..chunk_len {
                if mask & (0x80 >> k) != 0 {
                    let byte = *data.get(pos).ok_or(ScanlineDecodeError { offset: pos })?;
                    pos += 1;
                    out.push(byte);
                } else {
                    // Unchanged byte: copy from the row above.
                    let above = out[row_start - width_bytes + chunk_start + k];
                    out.push(above);
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_row_is_all_literal() {
        let row = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let out = compress(&row, 8);
        assert_eq!(out, vec![0xFF, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn partial_chunk_mask_is_high_aligned() {
        let row = [9u8, 8, 7];
        let out = compress(&row, 3);
        assert_eq!(out, vec![0xE0, 9, 8, 7]);
    }

    #[test]
    fn unchanged_row_emits_only_masks() {
        let data = [5u8, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5];
        let out = compress(&data, 8);
        // First row: mask + 8 literals. Second row: a single zero mask.
        assert_eq!(out.len(), 1 + 8 + 1);
        assert_eq!(out[9], 0x00);
    }

    #[test]
    fn changed_bytes_follow_their_mask_in_order() {
        let data = [0u8, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 2, 0, 0, 0, 3];
        let out = compress(&data, 8);
        // Bits 0, 3 and 7 of the delta row changed.
        assert_eq!(&out[9..], &[0b1001_0001, 1, 2, 3]);
    }

    #[test]
    fn round_trip_various_widths() {
        for width_bytes in [1usize, 3, 7, 8, 9, 16, 20] {
            let rows = 11;
            let data: Vec<u8> = (0..width_bytes * rows)
                .map(|i| ((i * 31 + i / width_bytes * 7) % 251) as u8)
                .collect();
            let compressed = compress(&data, width_bytes);
            let restored = decompress(&compressed, width_bytes, rows).unwrap();
            assert_eq!(restored, data, "width_bytes = {width_bytes}");
        }
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut compressed = compress(&data, 8);
        compressed.truncate(compressed.len() - 1);
        assert!(decompress(&compressed, 8, 1).is_err());
    }
}
