// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP delimiter (group) and value tags, RFC 8010 §3.5.

// ---------------------------------------------------------------------------
// Delimiter tags (RFC 8010 §3.5.1)
// ---------------------------------------------------------------------------

/// Attribute group delimiter tags.
///
/// `Zero` is not a real group: it is the historical separator byte some
/// clients emit between two groups of the same tag.  It participates in
/// parsing but is ignored by group-ordering checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum GroupTag {
    Zero = 0x00,
    Operation = 0x01,
    Job = 0x02,
    Printer = 0x04,
    Unsupported = 0x05,
    Subscription = 0x06,
    EventNotification = 0x07,
    Resource = 0x08,
    Document = 0x09,
    System = 0x0A,
}

impl GroupTag {
    /// Decode a delimiter byte.  `0x03` (end-of-attributes) is handled by
    /// the message parser and never reaches this function.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Zero),
            0x01 => Some(Self::Operation),
            0x02 => Some(Self::Job),
            0x04 => Some(Self::Printer),
            0x05 => Some(Self::Unsupported),
            0x06 => Some(Self::Subscription),
            0x07 => Some(Self::EventNotification),
            0x08 => Some(Self::Resource),
            0x09 => Some(Self::Document),
            0x0A => Some(Self::System),
            _ => None,
        }
    }
}

/// End-of-attributes-tag terminating the attribute section.
pub const END_OF_ATTRIBUTES: u8 = 0x03;

// ---------------------------------------------------------------------------
// Value tags (RFC 8010 §3.5.2)
// ---------------------------------------------------------------------------

/// Out-of-band: unsupported attribute.
pub const UNSUPPORTED_VALUE: u8 = 0x10;
/// Out-of-band: unknown value.
pub const UNKNOWN: u8 = 0x12;
/// Out-of-band: no value.
pub const NO_VALUE: u8 = 0x13;
/// Out-of-band: not settable (PWG 5100.3).
pub const NOT_SETTABLE: u8 = 0x15;
/// Out-of-band: delete attribute (PWG 5100.3).
pub const DELETE_ATTRIBUTE: u8 = 0x16;
/// Out-of-band: administratively defined (PWG 5100.3).
pub const ADMIN_DEFINE: u8 = 0x17;

/// Integer value (4 bytes, signed big-endian).
pub const INTEGER: u8 = 0x21;
/// Boolean value (1 byte).
pub const BOOLEAN: u8 = 0x22;
/// Enum value (4 bytes, same encoding as integer).
pub const ENUM: u8 = 0x23;

/// octetString with unspecified format.
pub const OCTET_STRING: u8 = 0x30;
/// dateTime (11 bytes, RFC 2579 DateAndTime).
pub const DATE_TIME: u8 = 0x31;
/// resolution (9 bytes: x, y, units).
pub const RESOLUTION: u8 = 0x32;
/// rangeOfInteger (8 bytes: lower, upper).
pub const RANGE_OF_INTEGER: u8 = 0x33;
/// begCollection: opens a collection value.
pub const BEG_COLLECTION: u8 = 0x34;
/// textWithLanguage.
pub const TEXT_WITH_LANGUAGE: u8 = 0x35;
/// nameWithLanguage.
pub const NAME_WITH_LANGUAGE: u8 = 0x36;
/// endCollection: closes a collection value.
pub const END_COLLECTION: u8 = 0x37;

/// textWithoutLanguage (UTF-8 string).
pub const TEXT: u8 = 0x41;
/// nameWithoutLanguage (UTF-8 string).
pub const NAME: u8 = 0x42;
/// keyword (US-ASCII string).
pub const KEYWORD: u8 = 0x44;
/// uri (US-ASCII string).
pub const URI: u8 = 0x45;
/// uriScheme (US-ASCII string).
pub const URI_SCHEME: u8 = 0x46;
/// charset (US-ASCII string, e.g. "utf-8").
pub const CHARSET: u8 = 0x47;
/// naturalLanguage (US-ASCII string, e.g. "en").
pub const NATURAL_LANGUAGE: u8 = 0x48;
/// mimeMediaType (US-ASCII string, e.g. "application/pdf").
pub const MIME_TYPE: u8 = 0x49;
/// memberAttrName: names the next member inside a collection.
pub const MEMBER_ATTR_NAME: u8 = 0x4A;

/// Whether a byte is a delimiter (group) tag rather than a value tag.
pub fn is_delimiter(byte: u8) -> bool {
    byte <= 0x0F
}

/// Whether a value tag is out-of-band (carries no concrete value).
pub fn is_out_of_band(tag: u8) -> bool {
    matches!(
        tag,
        UNSUPPORTED_VALUE | UNKNOWN | NO_VALUE | NOT_SETTABLE | DELETE_ATTRIBUTE | ADMIN_DEFINE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_tag_round_trip() {
        for byte in [0x00u8, 0x01, 0x02, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A] {
            let tag = GroupTag::from_byte(byte).expect("valid delimiter");
            assert_eq!(tag as u8, byte);
        }
        assert_eq!(GroupTag::from_byte(0x03), None);
        assert_eq!(GroupTag::from_byte(0x0B), None);
    }

    #[test]
    fn delimiter_range() {
        assert!(is_delimiter(0x00));
        assert!(is_delimiter(0x0F));
        assert!(!is_delimiter(0x10));
        assert!(!is_delimiter(INTEGER));
    }

    #[test]
    fn out_of_band_tags() {
        assert!(is_out_of_band(NO_VALUE));
        assert!(is_out_of_band(DELETE_ATTRIBUTE));
        assert!(!is_out_of_band(INTEGER));
        assert!(!is_out_of_band(KEYWORD));
    }
}
