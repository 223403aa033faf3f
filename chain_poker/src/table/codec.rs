//! Binary layout of a table account.
//!
//! ```text
//! [0..8)  discriminator  b"cpTABLE\0"
//! [8]     schema version
//! [9..)   table body, bincode legacy layout (little endian, fixed ints)
//! ```

use bincode::config::{Configuration, Fixint, LittleEndian, NoLimit};

use super::entities::Table;
use crate::error::DecodeError;

pub const TABLE_DISCRIMINATOR: [u8; 8] = *b"cpTABLE\0";
pub const SCHEMA_VERSION: u8 = 1;

const HEADER_LEN: usize = TABLE_DISCRIMINATOR.len() + 1;

fn layout() -> Configuration<LittleEndian, Fixint, NoLimit> {
    bincode::config::legacy()
}

/// Decode raw account bytes into a validated [`Table`].
///
/// # Errors
///
/// Fails on a foreign discriminator, an unknown schema version, a short or
/// over-long body, or a body that violates table invariants.
pub fn decode_table(bytes: &[u8]) -> Result<Table, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(bytes.len()));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if header[..TABLE_DISCRIMINATOR.len()] != TABLE_DISCRIMINATOR {
        return Err(DecodeError::Discriminator {
            found: header[..TABLE_DISCRIMINATOR.len()].to_vec(),
        });
    }
    let version = header[TABLE_DISCRIMINATOR.len()];
    if version != SCHEMA_VERSION {
        return Err(DecodeError::SchemaVersion {
            expected: SCHEMA_VERSION,
            found: version,
        });
    }

    let (table, read): (Table, usize) = bincode::serde::decode_from_slice(body, layout())?;
    if read != body.len() {
        return Err(DecodeError::TrailingBytes(body.len() - read));
    }
    table.validate()?;
    Ok(table)
}

/// Encode a table in account layout.
///
/// # Errors
///
/// Propagates bincode encoding failures.
pub fn encode_table(table: &Table) -> Result<Vec<u8>, bincode::error::EncodeError> {
    let mut bytes = Vec::with_capacity(512);
    bytes.extend_from_slice(&TABLE_DISCRIMINATOR);
    bytes.push(SCHEMA_VERSION);
    bytes.extend(bincode::serde::encode_to_vec(table, layout())?);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{ParticipantId, Player};

    fn sample() -> Table {
        let mut table = Table::new(42, ParticipantId([9; 32]), 500, 1000, 6, 20_000);
        table.seats[2] = Some(Player::new(ParticipantId([4; 32]), 2, 20_000));
        table.player_count = 1;
        table.sequence = 17;
        table
    }

    #[test]
    fn test_decode_encoded_table() {
        let table = sample();
        let bytes = encode_table(&table).unwrap();
        assert_eq!(&bytes[..8], b"cpTABLE\0");
        assert_eq!(bytes[8], SCHEMA_VERSION);
        assert_eq!(decode_table(&bytes).unwrap(), table);
    }

    #[test]
    fn test_participant_is_raw_bytes_in_account() {
        let bytes = encode_table(&sample()).unwrap();
        // creator is the first body field
        assert_eq!(&bytes[HEADER_LEN..HEADER_LEN + 32], &[9; 32]);
    }

    #[test]
    fn test_rejects_foreign_discriminator() {
        let mut bytes = encode_table(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            decode_table(&bytes),
            Err(DecodeError::Discriminator { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = encode_table(&sample()).unwrap();
        bytes[8] = 2;
        assert!(matches!(
            decode_table(&bytes),
            Err(DecodeError::SchemaVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_truncated() {
        let bytes = encode_table(&sample()).unwrap();
        assert!(matches!(decode_table(&bytes[..4]), Err(DecodeError::Truncated(4))));
        assert!(matches!(
            decode_table(&bytes[..bytes.len() - 3]),
            Err(DecodeError::Body(_))
        ));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode_table(&sample()).unwrap();
        bytes.extend_from_slice(&[0, 0]);
        assert!(matches!(decode_table(&bytes), Err(DecodeError::TrailingBytes(2))));
    }

    #[test]
    fn test_rejects_invalid_table() {
        let mut table = sample();
        table.player_count = 4;
        let bytes = encode_table(&table).unwrap();
        assert!(matches!(decode_table(&bytes), Err(DecodeError::Invariant(_))));
    }
}
