use crate::error::Error;
use crate::metainfo::{InfoDict, BLOCK_SIZE};

fn invalid(index: u32, offset: u32, length: u32, reason: impl Into<String>) -> Error {
    Error::InvalidBlock {
        index,
        offset,
        length,
        reason: reason.into(),
    }
}

pub fn validate_request(info: &InfoDict, index: u32, offset: u32, length: u32) -> Result<(), Error> {
    if index as usize >= info.pieces.len() {
        return Err(invalid(index, offset, length, "piece index out of range"));
    }
    if length == 0 {
        return Err(invalid(index, offset, length, "zero-length request"));
    }
    let piece_len = info.piece_effective_length(index as usize)?;
    let end = u64::from(offset)
        .checked_add(u64::from(length))
        .ok_or_else(|| invalid(index, offset, length, "offset + length overflow"))?;
    if end > piece_len {
        return Err(invalid(
            index,
            offset,
            length,
            format!("offset + length {end} exceeds piece length {piece_len}"),
        ));
    }
    Ok(())
}

// offset must be block-aligned; block.len() must be BLOCK_SIZE except for
// the final block of the final piece, which is the residual tail
pub fn validate_piece(info: &InfoDict, index: u32, offset: u32, block_len: u32) -> Result<(), Error> {
    validate_request(info, index, offset, block_len)?;
    if u64::from(offset) % BLOCK_SIZE != 0 {
        return Err(invalid(
            index,
            offset,
            block_len,
            "offset is not block-aligned",
        ));
    }

    let piece_len = info.piece_effective_length(index as usize)?;
    let is_last_piece = index as usize == info.pieces.len() - 1;
    let tail = piece_len % BLOCK_SIZE;
    let is_final_block = u64::from(offset) + BLOCK_SIZE >= piece_len;

    let expected = if is_last_piece && is_final_block && tail != 0 {
        tail
    } else {
        BLOCK_SIZE.min(piece_len - u64::from(offset))
    };

    if u64::from(block_len) != expected {
        return Err(invalid(
            index,
            offset,
            block_len,
            format!("block length {block_len} does not match expected {expected}"),
        ));
    }
    Ok(())
}
