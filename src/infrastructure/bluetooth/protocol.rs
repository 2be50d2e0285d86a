//! GATT payload and advertising data codecs
//!
//! Host stacks render attribute values as lowercase hex strings and hand
//! scan results over as raw advertising data; this module converts both.

use crate::domain::error::GattError;
use uuid::Uuid;

/// AD type: Flags
pub const AD_FLAGS: u8 = 0x01;
/// AD type: Shortened Local Name
pub const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
/// AD type: Complete Local Name
pub const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
/// AD type: Manufacturer Specific Data
pub const AD_MANUFACTURER_SPECIFIC: u8 = 0xFF;

/// Name reported for devices that advertise neither a name nor a beacon id.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown";

/// Apple company id, little-endian, followed by the iBeacon type and length.
const IBEACON_PREFIX: [u8; 4] = [0x4C, 0x00, 0x02, 0x15];

/// Size of a legacy advertising payload.
pub const MAX_ADV_DATA_BYTES: usize = 31;
/// Name space left in an advertisement after the flags structure and the
/// name structure's length and type bytes.
pub const MAX_ADV_NAME_BYTES: usize = MAX_ADV_DATA_BYTES - 3 - 2;

/// Longest value rendered in full by [`display_hex`].
pub const MAX_DISPLAY_BYTES: usize = 49;

/// Encode an attribute value the way the host renders it.
pub fn to_hex(value: &[u8]) -> String {
    hex::encode(value)
}

/// Hex rendering for log lines, truncated with `...` past
/// [`MAX_DISPLAY_BYTES`].
pub fn display_hex(value: &[u8]) -> String {
    if value.len() <= MAX_DISPLAY_BYTES {
        return to_hex(value);
    }
    format!("{}...", to_hex(&value[..MAX_DISPLAY_BYTES]))
}

/// Decode a hex payload typed by a user, e.g. `"010100"` or `"01 01 00"`.
pub fn from_hex(input: &str) -> Result<Vec<u8>, GattError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    hex::decode(digits).map_err(|e| GattError::InvalidPayload(format!("{input:?}: {e}")))
}

/// One AD structure borrowed from an advertising payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub data: &'a [u8],
}

/// Iterate the `[len][type][data..len-1]` structures of an advertising
/// payload, stopping at the first zero length or truncated entry.
pub fn ad_structures(adv: &[u8]) -> impl Iterator<Item = AdStructure<'_>> {
    let mut rest = adv;
    std::iter::from_fn(move || {
        let (&len, tail) = rest.split_first()?;
        let len = len as usize;
        if len == 0 || tail.len() < len {
            rest = &[];
            return None;
        }
        let (entry, remaining) = tail.split_at(len);
        rest = remaining;
        Some(AdStructure {
            ad_type: entry[0],
            data: &entry[1..],
        })
    })
}

fn find(adv: &[u8], ad_type: u8) -> Option<&[u8]> {
    ad_structures(adv)
        .find(|ad| ad.ad_type == ad_type)
        .map(|ad| ad.data)
}

/// Proximity UUID of an iBeacon advertisement.
pub fn ibeacon_uuid(adv: &[u8]) -> Option<Uuid> {
    let data = find(adv, AD_MANUFACTURER_SPECIFIC)?;
    let body = data.strip_prefix(&IBEACON_PREFIX[..])?;
    Uuid::from_slice(body.get(..16)?).ok()
}

/// Display name for a scan result: the complete local name, else the
/// shortened one, else an iBeacon label, else [`UNKNOWN_DEVICE_NAME`].
pub fn local_name(adv: &[u8]) -> String {
    if let Some(name) =
        find(adv, AD_COMPLETE_LOCAL_NAME).or_else(|| find(adv, AD_SHORTENED_LOCAL_NAME))
    {
        return String::from_utf8_lossy(name).into_owned();
    }
    if let Some(uuid) = ibeacon_uuid(adv) {
        return format!("iBeacon ({:X})", uuid);
    }
    UNKNOWN_DEVICE_NAME.to_string()
}

/// Build advertising data carrying flags and a complete local name. Names
/// that do not fit a legacy advertisement are cut at [`MAX_ADV_NAME_BYTES`].
pub fn advertise_name(name: &str) -> Vec<u8> {
    let name = &name.as_bytes()[..name.len().min(MAX_ADV_NAME_BYTES)];
    let mut adv = vec![0x02, AD_FLAGS, 0x06];
    // at most 27, see MAX_ADV_NAME_BYTES
    adv.push(name.len() as u8 + 1);
    adv.push(AD_COMPLETE_LOCAL_NAME);
    adv.extend_from_slice(name);
    adv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_codec() {
        assert_eq!(to_hex(&[0x03, 0xA0, 0x00]), "03a000");
        assert_eq!(from_hex("03A000").unwrap(), vec![0x03, 0xA0, 0x00]);
        assert_eq!(from_hex("0x01 00").unwrap(), vec![0x01, 0x00]);
        assert!(matches!(from_hex("123"), Err(GattError::InvalidPayload(_))));
        assert!(matches!(from_hex("zz"), Err(GattError::InvalidPayload(_))));
    }

    #[test]
    fn test_display_hex_truncates() {
        let long = vec![0xAB; 60];
        let shown = display_hex(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.len(), MAX_DISPLAY_BYTES * 2 + 3);
        assert_eq!(display_hex(&[0x01]), "01");
    }

    #[test]
    fn test_complete_name_preferred() {
        let mut adv = vec![0x02, AD_FLAGS, 0x06];
        adv.extend_from_slice(&[0x04, AD_SHORTENED_LOCAL_NAME, b'B', b'L', b'E']);
        adv.extend_from_slice(&[0x06, AD_COMPLETE_LOCAL_NAME, b'S', b'h', b'i', b'e', b'l']);
        assert_eq!(local_name(&adv), "Shiel");
        assert_eq!(local_name(&adv[..8]), "BLE");
        assert_eq!(local_name(&advertise_name("BLE Shield")), "BLE Shield");
    }

    #[test]
    fn test_long_name_fits_one_advertisement() {
        let adv = advertise_name(&"x".repeat(300));
        assert_eq!(adv.len(), MAX_ADV_DATA_BYTES);
        assert_eq!(adv[3] as usize, MAX_ADV_NAME_BYTES + 1);
        assert_eq!(local_name(&adv), "x".repeat(MAX_ADV_NAME_BYTES));
    }

    #[test]
    fn test_ibeacon_label() {
        let mut adv = vec![0x02, AD_FLAGS, 0x06, 0x1A, AD_MANUFACTURER_SPECIFIC];
        adv.extend_from_slice(&IBEACON_PREFIX);
        adv.extend_from_slice(&[0x11; 16]);
        adv.extend_from_slice(&[0x00, 0x01, 0x00, 0x02, 0xC5]);
        assert_eq!(
            local_name(&adv),
            "iBeacon (11111111-1111-1111-1111-111111111111)"
        );
    }

    #[test]
    fn test_malformed_data() {
        assert_eq!(local_name(&[]), UNKNOWN_DEVICE_NAME);
        // length runs past the end of the buffer
        assert_eq!(local_name(&[0x09, AD_COMPLETE_LOCAL_NAME, b'x']), UNKNOWN_DEVICE_NAME);
        assert_eq!(ad_structures(&[0x00, 0x02, 0x01]).count(), 0);
    }
}
