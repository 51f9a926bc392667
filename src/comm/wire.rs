//! Fixed little-endian wire helpers for the exchange paths.
//!
//! Plain numeric payloads travel as `bytemuck`-cast slices; variable-size
//! records (mesh chunks, particles) travel as bincode blobs preceded by a
//! byte count. Counts are always `u64` little-endian on the wire.

use crate::error::RedistError;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Copy raw bytes into a typed vector. Received buffers carry no alignment
/// guarantee, so this never reinterprets the input in place.
pub fn cast_vec_from<T: Pod>(bytes: &[u8]) -> Result<Vec<T>, RedistError> {
    let width = std::mem::size_of::<T>();
    if width == 0 || bytes.len() % width != 0 {
        return Err(RedistError::Codec(format!(
            "payload of {} bytes does not tile into {width}-byte values",
            bytes.len()
        )));
    }
    let mut out = vec![T::zeroed(); bytes.len() / width];
    bytemuck::cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out)
}

/// Count header preceding a variable-size payload.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount(u64);

static_assertions::const_assert_eq!(std::mem::size_of::<WireCount>(), 8);

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self((n as u64).to_le())
    }
    pub fn get(self) -> usize {
        u64::from_le(self.0) as usize
    }
}

/// Decode a received count header, checking the byte length.
pub fn decode_count(peer: usize, bytes: &[u8]) -> Result<usize, RedistError> {
    if bytes.len() != std::mem::size_of::<WireCount>() {
        return Err(RedistError::Comm {
            neighbor: peer,
            reason: format!(
                "expected {} bytes for count header, got {}",
                std::mem::size_of::<WireCount>(),
                bytes.len()
            ),
        });
    }
    let mut cnt = WireCount::new(0);
    bytemuck::bytes_of_mut(&mut cnt).copy_from_slice(bytes);
    Ok(cnt.get())
}

/// Serialize a record batch for one peer.
pub fn encode_records<T: Serialize>(records: &[T]) -> Result<Vec<u8>, RedistError> {
    bincode::serialize(records).map_err(RedistError::codec)
}

/// Deserialize a record batch from one peer.
pub fn decode_records<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, RedistError> {
    bincode::deserialize(bytes).map_err(RedistError::codec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_header_roundtrip() {
        let c = WireCount::new(1 << 40);
        let bytes = bytemuck::bytes_of(&c).to_vec();
        assert_eq!(decode_count(0, &bytes).unwrap(), 1 << 40);
    }

    #[test]
    fn short_count_header_is_a_comm_error() {
        let err = decode_count(3, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, RedistError::Comm { neighbor: 3, .. }));
    }

    #[test]
    fn record_batch_roundtrip() {
        let records = vec![(1u64, vec![0.5f64, 1.5]), (2u64, vec![])];
        let bytes = encode_records(&records).unwrap();
        let back: Vec<(u64, Vec<f64>)> = decode_records(&bytes).unwrap();
        assert_eq!(back, records);
    }
}
