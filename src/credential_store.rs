//! WiFi credentials kept in the last erase block of flash.
//!
//! A record is a magic number, the postcard payload length, the payload, and a CRC32 over all of
//! it. Erased flash (all `0xFF`) reads back as "nothing stored".
//!
//! ⚠️ The RP2040 keeps firmware and data in the same flash. The block used here sits past the end
//! of the `FLASH` region in `memory-pico1w.x`; keep the two in step.

use crate::provisioning::WifiCredentials;
use crate::{Error, Result};

/// Bytes written per record; a multiple of the flash page size.
pub const RECORD_LEN: usize = 256;

const MAGIC: u32 = 0x4E49_5843; // "NIXC"
const HEADER_LEN: usize = 4 + 2;
const CRC_LEN: usize = 4;
const MAX_PAYLOAD_LEN: usize = RECORD_LEN - HEADER_LEN - CRC_LEN;

/// Serialize `credentials` into a full record.
///
/// # Errors
///
/// Returns [`Error::FormatError`] if the payload does not fit.
pub fn encode_record(credentials: &WifiCredentials) -> Result<[u8; RECORD_LEN]> {
    let mut record = [0xFF; RECORD_LEN];
    let (header, rest) = record.split_at_mut(HEADER_LEN);
    let payload = rest.get_mut(..MAX_PAYLOAD_LEN).ok_or(Error::FormatError)?;
    let payload_len = postcard::to_slice(credentials, payload)
        .map_err(|_| Error::FormatError)?
        .len();
    let len_bytes = u16::try_from(payload_len)
        .map_err(|_| Error::FormatError)?
        .to_le_bytes();
    let [m0, m1, m2, m3] = MAGIC.to_le_bytes();
    let [l0, l1] = len_bytes;
    header.copy_from_slice(&[m0, m1, m2, m3, l0, l1]);

    let crc_offset = HEADER_LEN.checked_add(payload_len).ok_or(Error::FormatError)?;
    let crc = crc32fast::hash(record.get(..crc_offset).ok_or(Error::FormatError)?);
    record
        .get_mut(crc_offset..crc_offset.saturating_add(CRC_LEN))
        .ok_or(Error::FormatError)?
        .copy_from_slice(&crc.to_le_bytes());
    Ok(record)
}

/// Read credentials back from a record.
///
/// # Errors
///
/// Returns [`Error::StorageCorrupted`] if a record is present but its length, checksum or
/// payload is bad.
pub fn decode_record(record: &[u8]) -> Result<Option<WifiCredentials>> {
    let Some(&[m0, m1, m2, m3, l0, l1]) = record.get(..HEADER_LEN) else {
        return Ok(None);
    };
    if u32::from_le_bytes([m0, m1, m2, m3]) != MAGIC {
        return Ok(None);
    }
    let payload_len = usize::from(u16::from_le_bytes([l0, l1]));
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::StorageCorrupted);
    }

    let crc_offset = HEADER_LEN.saturating_add(payload_len);
    let covered = record.get(..crc_offset).ok_or(Error::StorageCorrupted)?;
    let Some(&[c0, c1, c2, c3]) = record.get(crc_offset..crc_offset.saturating_add(CRC_LEN))
    else {
        return Err(Error::StorageCorrupted);
    };
    if crc32fast::hash(covered) != u32::from_le_bytes([c0, c1, c2, c3]) {
        return Err(Error::StorageCorrupted);
    }

    let payload = covered.get(HEADER_LEN..).ok_or(Error::StorageCorrupted)?;
    postcard::from_bytes(payload)
        .map(Some)
        .map_err(|_| Error::StorageCorrupted)
}

#[cfg(feature = "pico1")]
mod device {
    use embassy_rp::Peri;
    use embassy_rp::flash::{Blocking, ERASE_SIZE, Flash};
    use embassy_rp::peripherals::FLASH;

    use super::{RECORD_LEN, decode_record, encode_record};
    use crate::Result;
    use crate::provisioning::WifiCredentials;

    /// Pico W flash size.
    pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

    // the last erase block
    const BLOCK_OFFSET: u32 = 0x001F_F000;
    const BLOCK_END: u32 = 0x0020_0000;
    const _: () = assert!(BLOCK_OFFSET as usize == FLASH_SIZE - ERASE_SIZE);
    const _: () = assert!(BLOCK_END as usize == FLASH_SIZE);

    /// Flash-backed home for the station credentials.
    pub struct CredentialStore {
        flash: Flash<'static, FLASH, Blocking, FLASH_SIZE>,
    }

    impl CredentialStore {
        #[must_use]
        pub fn new(flash: Peri<'static, FLASH>) -> Self {
            Self {
                flash: Flash::new_blocking(flash),
            }
        }

        /// Stored credentials, or `None` if the block is empty.
        ///
        /// # Errors
        ///
        /// Returns an error if flash cannot be read or the record is corrupted.
        pub fn load(&mut self) -> Result<Option<WifiCredentials>> {
            let mut record = [0u8; RECORD_LEN];
            self.flash.blocking_read(BLOCK_OFFSET, &mut record)?;
            decode_record(&record)
        }

        /// Replace the stored credentials.
        ///
        /// # Errors
        ///
        /// Returns an error if the record cannot be encoded or flash cannot be written.
        pub fn save(&mut self, credentials: &WifiCredentials) -> Result<()> {
            let record = encode_record(credentials)?;
            self.flash.blocking_erase(BLOCK_OFFSET, BLOCK_END)?;
            self.flash.blocking_write(BLOCK_OFFSET, &record)?;
            info!("credentials for {} saved", credentials.ssid.as_str());
            Ok(())
        }
    }
}

#[cfg(feature = "pico1")]
pub use device::{CredentialStore, FLASH_SIZE};
