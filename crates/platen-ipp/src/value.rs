// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed IPP attribute values.
//
// A value is a tagged sum over the RFC 8010 value syntaxes.  Out-of-band
// values carry only their tag; collections nest a full attribute set on the
// heap.  Group and value tags are deliberately plain data rather than a type
// hierarchy; that matches the wire semantics, where a tag byte is all the
// type information there is.

use crate::attribute::Attributes;
use crate::tag;

/// RFC 2579 DateAndTime, the 11-byte IPP `dateTime` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IppDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub deciseconds: u8,
    /// Direction from UTC: `b'+'` or `b'-'`.
    pub utc_direction: u8,
    pub utc_hours: u8,
    pub utc_minutes: u8,
}

impl IppDateTime {
    /// Encode as the 11-byte wire form.
    pub fn to_bytes(&self) -> [u8; 11] {
        let year = self.year.to_be_bytes();
        [
            year[0],
            year[1],
            self.month,
            self.day,
            self.hour,
            self.minutes,
            self.seconds,
            self.deciseconds,
            self.utc_direction,
            self.utc_hours,
            self.utc_minutes,
        ]
    }

    /// Decode from the 11-byte wire form.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 11 {
            return None;
        }
        Some(Self {
            year: u16::from_be_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            hour: bytes[4],
            minutes: bytes[5],
            seconds: bytes[6],
            deciseconds: bytes[7],
            utc_direction: bytes[8],
            utc_hours: bytes[9],
            utc_minutes: bytes[10],
        })
    }
}

impl std::fmt::Display for IppDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}{:02}{:02}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minutes,
            self.seconds,
            self.utc_direction as char,
            self.utc_hours,
            self.utc_minutes
        )
    }
}

/// A single IPP attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Boolean(bool),
    Enum(i32),
    OctetString(Vec<u8>),
    DateTime(IppDateTime),
    /// Resolution: cross-feed, feed, units (3 = dpi, 4 = dots/cm).
    Resolution { x: i32, y: i32, units: i8 },
    RangeOfInteger { lower: i32, upper: i32 },
    Text(String),
    Name(String),
    TextWithLang { lang: String, text: String },
    NameWithLang { lang: String, name: String },
    Keyword(String),
    Uri(String),
    UriScheme(String),
    Charset(String),
    Language(String),
    MimeType(String),
    Collection(Attributes),
    /// Out-of-band value: carries only its tag (no-value, unknown,
    /// unsupported, not-settable, delete-attribute, admin-define).
    OutOfBand(u8),
}

impl Value {
    /// The wire value tag for this value.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Integer(_) => tag::INTEGER,
            Self::Boolean(_) => tag::BOOLEAN,
            Self::Enum(_) => tag::ENUM,
            Self::OctetString(_) => tag::OCTET_STRING,
            Self::DateTime(_) => tag::DATE_TIME,
            Self::Resolution { .. } => tag::RESOLUTION,
            Self::RangeOfInteger { .. } => tag::RANGE_OF_INTEGER,
            Self::Text(_) => tag::TEXT,
            Self::Name(_) => tag::NAME,
            Self::TextWithLang { .. } => tag::TEXT_WITH_LANGUAGE,
            Self::NameWithLang { .. } => tag::NAME_WITH_LANGUAGE,
            Self::Keyword(_) => tag::KEYWORD,
            Self::Uri(_) => tag::URI,
            Self::UriScheme(_) => tag::URI_SCHEME,
            Self::Charset(_) => tag::CHARSET,
            Self::Language(_) => tag::NATURAL_LANGUAGE,
            Self::MimeType(_) => tag::MIME_TYPE,
            Self::Collection(_) => tag::BEG_COLLECTION,
            Self::OutOfBand(t) => *t,
        }
    }

    /// Integer view of integer and enum values.
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(v) | Self::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of every character-string syntax (keyword, name, text,
    /// uri, charset, language, mimeMediaType, including the *WithLanguage
    /// variants).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s)
            | Self::Name(s)
            | Self::Keyword(s)
            | Self::Uri(s)
            | Self::UriScheme(s)
            | Self::Charset(s)
            | Self::Language(s)
            | Self::MimeType(s) => Some(s),
            Self::TextWithLang { text, .. } => Some(text),
            Self::NameWithLang { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Attributes> {
        match self {
            Self::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_out_of_band(&self) -> bool {
        matches!(self, Self::OutOfBand(_))
    }

    /// Render as the flat "attribute string" form used for transform
    /// environment variables and logs.
    pub fn to_wire_string(&self) -> String {
        match self {
            Self::Integer(v) | Self::Enum(v) => v.to_string(),
            Self::Boolean(v) => if *v { "true" } else { "false" }.to_string(),
            Self::OctetString(bytes) => {
                // Octet strings flatten to hex; they are rare in env output.
                bytes.iter().map(|b| format!("{b:02x}")).collect()
            }
            Self::DateTime(dt) => dt.to_string(),
            Self::Resolution { x, y, units } => {
                let suffix = if *units == 4 { "dpcm" } else { "dpi" };
                if x == y {
                    format!("{x}{suffix}")
                } else {
                    format!("{x}x{y}{suffix}")
                }
            }
            Self::RangeOfInteger { lower, upper } => format!("{lower}-{upper}"),
            Self::Text(s)
            | Self::Name(s)
            | Self::Keyword(s)
            | Self::Uri(s)
            | Self::UriScheme(s)
            | Self::Charset(s)
            | Self::Language(s)
            | Self::MimeType(s) => s.clone(),
            Self::TextWithLang { text, .. } => text.clone(),
            Self::NameWithLang { name, .. } => name.clone(),
            Self::Collection(members) => {
                let inner: Vec<String> = members
                    .iter()
                    .map(|a| format!("{}={}", a.name, a.values_wire_string()))
                    .collect();
                format!("{{{}}}", inner.join(" "))
            }
            Self::OutOfBand(t) => match *t {
                tag::NO_VALUE => "no-value".into(),
                tag::UNKNOWN => "unknown".into(),
                tag::UNSUPPORTED_VALUE => "unsupported".into(),
                tag::NOT_SETTABLE => "not-settable".into(),
                tag::DELETE_ATTRIBUTE => "delete-attribute".into(),
                tag::ADMIN_DEFINE => "admin-define".into(),
                other => format!("out-of-band-{other:02x}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_time_round_trip() {
        let dt = IppDateTime {
            year: 2026,
            month: 8,
            day: 2,
            hour: 13,
            minutes: 30,
            seconds: 5,
            deciseconds: 0,
            utc_direction: b'+',
            utc_hours: 0,
            utc_minutes: 0,
        };
        let bytes = dt.to_bytes();
        assert_eq!(IppDateTime::from_bytes(&bytes), Some(dt));
        assert_eq!(IppDateTime::from_bytes(&bytes[..10]), None);
    }

    #[test]
    fn integer_and_enum_share_accessor() {
        assert_eq!(Value::Integer(42).as_integer(), Some(42));
        assert_eq!(Value::Enum(5).as_integer(), Some(5));
        assert_eq!(Value::Boolean(true).as_integer(), None);
    }

    #[test]
    fn string_accessor_covers_all_character_syntaxes() {
        let values = [
            Value::Text("a".into()),
            Value::Name("a".into()),
            Value::Keyword("a".into()),
            Value::Uri("a".into()),
            Value::Charset("a".into()),
            Value::Language("a".into()),
            Value::MimeType("a".into()),
            Value::NameWithLang { lang: "en".into(), name: "a".into() },
            Value::TextWithLang { lang: "en".into(), text: "a".into() },
        ];
        for value in values {
            assert_eq!(value.as_str(), Some("a"), "{value:?}");
        }
        assert_eq!(Value::Integer(1).as_str(), None);
    }

    #[test]
    fn wire_strings() {
        assert_eq!(Value::Integer(3).to_wire_string(), "3");
        assert_eq!(Value::Boolean(false).to_wire_string(), "false");
        assert_eq!(
            Value::Resolution { x: 300, y: 300, units: 3 }.to_wire_string(),
            "300dpi"
        );
        assert_eq!(
            Value::Resolution { x: 300, y: 600, units: 3 }.to_wire_string(),
            "300x600dpi"
        );
        assert_eq!(
            Value::RangeOfInteger { lower: 1, upper: 5 }.to_wire_string(),
            "1-5"
        );
        assert_eq!(Value::OutOfBand(tag::NO_VALUE).to_wire_string(), "no-value");
    }

    #[test]
    fn out_of_band_keeps_its_tag() {
        let value = Value::OutOfBand(tag::DELETE_ATTRIBUTE);
        assert!(value.is_out_of_band());
        assert_eq!(value.tag(), tag::DELETE_ATTRIBUTE);
    }
}
