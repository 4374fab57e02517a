// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// RFC 8010 binary message parsing and encoding.
//
// The format is:
//
// ```text
// version-number:  2 bytes (major, minor)
// operation-id or status-code: 2 bytes (big-endian u16)
// request-id:      4 bytes (big-endian u32)
// attribute-groups: variable
//   delimiter-tag: 1 byte
//   attributes:    variable
//     value-tag:    1 byte
//     name-length:  2 bytes (big-endian u16)
//     name:         name-length bytes
//     value-length: 2 bytes (big-endian u16)
//     value:        value-length bytes
// end-of-attributes-tag: 1 byte (0x03)
// document-data: remainder
// ```
//
// Additional values of a `1setOf` have name-length zero and attach to the
// preceding attribute.  Collection values span several pseudo-attributes
// (begCollection, memberAttrName, member values, endCollection).

use crate::attribute::{Attribute, Attributes};
use crate::tag::{self, GroupTag};
use crate::value::{IppDateTime, Value};

/// A group of attributes delimited by a group tag.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeGroup {
    pub tag: GroupTag,
    pub attributes: Attributes,
}

/// A fully parsed (or under-construction) IPP message.
///
/// `code` is the operation-id in requests and the status-code in responses;
/// the two fields share wire position.
#[derive(Debug, Clone)]
pub struct Message {
    pub version: (u8, u8),
    pub code: u16,
    pub request_id: u32,
    pub groups: Vec<AttributeGroup>,
    /// Document data: everything after the end-of-attributes tag.
    pub data: Vec<u8>,
}

impl Message {
    /// Start a new request message (IPP 2.0).
    pub fn request(operation: u16, request_id: u32) -> Self {
        Self {
            version: (2, 0),
            code: operation,
            request_id,
            groups: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Start a response message with the standard leading operation
    /// attributes (attributes-charset, attributes-natural-language).
    pub fn response(status: u16, request_id: u32) -> Self {
        let mut msg = Self {
            version: (2, 0),
            code: status,
            request_id,
            groups: Vec::new(),
            data: Vec::new(),
        };
        let op = msg.new_group(GroupTag::Operation);
        op.add("attributes-charset", Value::Charset("utf-8".into()));
        op.add("attributes-natural-language", Value::Language("en".into()));
        msg
    }

    /// Append a new attribute group and return its attribute set.
    pub fn new_group(&mut self, tag: GroupTag) -> &mut Attributes {
        self.groups.push(AttributeGroup { tag, attributes: Attributes::new() });
        let last = self.groups.len() - 1;
        &mut self.groups[last].attributes
    }

    /// The last group with the given tag, created if absent.
    pub fn group_mut(&mut self, tag: GroupTag) -> &mut Attributes {
        if let Some(i) = self.groups.iter().rposition(|g| g.tag == tag) {
            return &mut self.groups[i].attributes;
        }
        self.new_group(tag)
    }

    /// The first group with the given tag.
    pub fn group(&self, tag: GroupTag) -> Option<&Attributes> {
        self.groups.iter().find(|g| g.tag == tag).map(|g| &g.attributes)
    }

    /// All groups with the given tag, in order.
    pub fn groups_tagged(&self, tag: GroupTag) -> impl Iterator<Item = &Attributes> {
        self.groups.iter().filter(move |g| g.tag == tag).map(|g| &g.attributes)
    }

    /// The first operation-attributes group.
    pub fn operation(&self) -> Option<&Attributes> {
        self.group(GroupTag::Operation)
    }

    /// Find an attribute anywhere in the message, in group order.
    pub fn find(&self, name: &str) -> Option<&Attribute> {
        self.groups.iter().find_map(|g| g.attributes.find(name))
    }

    /// Find an attribute anywhere in the message with the given value tag.
    pub fn find_tagged(&self, name: &str, value_tag: u8) -> Option<&Attribute> {
        self.groups.iter().find_map(|g| g.attributes.find_tagged(name, value_tag))
    }

    /// Append a `status-message` text to the operation group.
    pub fn set_status_message(&mut self, message: &str) {
        self.group_mut(GroupTag::Operation)
            .set("status-message", vec![Value::Text(message.into())]);
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    /// Parse a raw IPP message.
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        if data.len() < 8 {
            return Err(format!("IPP message too short: {} bytes (minimum 8)", data.len()));
        }

        let version = (data[0], data[1]);
        let code = u16::from_be_bytes([data[2], data[3]]);
        let request_id = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);

        let mut pos = 8;
        let mut groups: Vec<AttributeGroup> = Vec::new();
        let mut ended = false;

        while pos < data.len() {
            let byte = data[pos];

            if tag::is_delimiter(byte) {
                pos += 1;
                if byte == tag::END_OF_ATTRIBUTES {
                    ended = true;
                    break;
                }
                let group_tag = GroupTag::from_byte(byte)
                    .ok_or_else(|| format!("unknown delimiter tag {byte:#04x}"))?;
                groups.push(AttributeGroup { tag: group_tag, attributes: Attributes::new() });
                continue;
            }

            // A value tag: parse one attribute (or an additional value).
            let value_tag = byte;
            pos += 1;

            let name = read_length_prefixed(data, &mut pos, "attribute name")?;
            let name = String::from_utf8_lossy(name).into_owned();

            let value = if value_tag == tag::BEG_COLLECTION {
                // The begCollection value itself is ignored.
                read_length_prefixed(data, &mut pos, "collection header")?;
                Value::Collection(parse_collection(data, &mut pos)?)
            } else {
                let bytes = read_length_prefixed(data, &mut pos, "attribute value")?;
                decode_value(value_tag, bytes)?
            };

            let group = groups
                .last_mut()
                .ok_or_else(|| "attribute outside of any group".to_string())?;

            if name.is_empty() {
                // Additional value for the previous attribute.
                match group.attributes.iter_mut().last() {
                    Some(prev) => prev.values.push(value),
                    None => return Err("additional value with no preceding attribute".into()),
                }
            } else {
                group.attributes.push(Attribute::new(name, value));
            }
        }

        // Attribute-only messages may omit the end tag; document data can
        // only follow an explicit end-of-attributes.
        let data = if ended && pos < data.len() { data[pos..].to_vec() } else { Vec::new() };

        Ok(Self { version, code, request_id, groups, data })
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Encode to the binary wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256 + self.data.len());
        buf.push(self.version.0);
        buf.push(self.version.1);
        buf.extend_from_slice(&self.code.to_be_bytes());
        buf.extend_from_slice(&self.request_id.to_be_bytes());

        for group in &self.groups {
            buf.push(group.tag as u8);
            for attr in &group.attributes {
                encode_attribute(&mut buf, attr);
            }
        }

        buf.push(tag::END_OF_ATTRIBUTES);
        buf.extend_from_slice(&self.data);
        buf
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Read a 2-byte length and that many bytes.
fn read_length_prefixed<'a>(
    data: &'a [u8],
    pos: &mut usize,
    what: &str,
) -> Result<&'a [u8], String> {
    if *pos + 2 > data.len() {
        return Err(format!("truncated {what} length"));
    }
    let len = u16::from_be_bytes([data[*pos], data[*pos + 1]]) as usize;
    *pos += 2;
    if *pos + len > data.len() {
        return Err(format!("truncated {what}"));
    }
    let bytes = &data[*pos..*pos + len];
    *pos += len;
    Ok(bytes)
}

/// Decode a non-collection value from its payload bytes.
fn decode_value(value_tag: u8, bytes: &[u8]) -> Result<Value, String> {
    if tag::is_out_of_band(value_tag) {
        return Ok(Value::OutOfBand(value_tag));
    }

    let int = |bytes: &[u8], what: &str| -> Result<i32, String> {
        let array: [u8; 4] = bytes.try_into().map_err(|_| format!("bad {what} length"))?;
        Ok(i32::from_be_bytes(array))
    };
    let string = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();

    match value_tag {
        tag::INTEGER => Ok(Value::Integer(int(bytes, "integer")?)),
        tag::ENUM => Ok(Value::Enum(int(bytes, "enum")?)),
        tag::BOOLEAN => match bytes {
            [b] => Ok(Value::Boolean(*b != 0)),
            _ => Err("bad boolean length".into()),
        },
        tag::OCTET_STRING => Ok(Value::OctetString(bytes.to_vec())),
        tag::DATE_TIME => IppDateTime::from_bytes(bytes)
            .map(Value::DateTime)
            .ok_or_else(|| "bad dateTime length".into()),
        tag::RESOLUTION => {
            if bytes.len() != 9 {
                return Err("bad resolution length".into());
            }
            Ok(Value::Resolution {
                x: int(&bytes[0..4], "resolution")?,
                y: int(&bytes[4..8], "resolution")?,
                units: bytes[8] as i8,
            })
        }
        tag::RANGE_OF_INTEGER => {
            if bytes.len() != 8 {
                return Err("bad rangeOfInteger length".into());
            }
            Ok(Value::RangeOfInteger {
                lower: int(&bytes[0..4], "range")?,
                upper: int(&bytes[4..8], "range")?,
            })
        }
        tag::TEXT_WITH_LANGUAGE | tag::NAME_WITH_LANGUAGE => {
            let mut pos = 0;
            let lang = read_length_prefixed(bytes, &mut pos, "language")?;
            let text = read_length_prefixed(bytes, &mut pos, "string")?;
            let lang = string(lang);
            if value_tag == tag::TEXT_WITH_LANGUAGE {
                Ok(Value::TextWithLang { lang, text: string(text) })
            } else {
                Ok(Value::NameWithLang { lang, name: string(text) })
            }
        }
        tag::TEXT => Ok(Value::Text(string(bytes))),
        tag::NAME => Ok(Value::Name(string(bytes))),
        tag::KEYWORD => Ok(Value::Keyword(string(bytes))),
        tag::URI => Ok(Value::Uri(string(bytes))),
        tag::URI_SCHEME => Ok(Value::UriScheme(string(bytes))),
        tag::CHARSET => Ok(Value::Charset(string(bytes))),
        tag::NATURAL_LANGUAGE => Ok(Value::Language(string(bytes))),
        tag::MIME_TYPE => Ok(Value::MimeType(string(bytes))),
        other => Err(format!("unknown value tag {other:#04x}")),
    }
}

/// Parse collection members after a begCollection value, consuming the
/// matching endCollection.
fn parse_collection(data: &[u8], pos: &mut usize) -> Result<Attributes, String> {
    let mut members = Attributes::new();
    let mut pending_name: Option<String> = None;

    loop {
        if *pos >= data.len() {
            return Err("unterminated collection".into());
        }
        let value_tag = data[*pos];
        if tag::is_delimiter(value_tag) {
            return Err("group delimiter inside collection".into());
        }
        *pos += 1;

        // Every collection element carries (possibly empty) name and value
        // fields; member identity travels in memberAttrName values.
        read_length_prefixed(data, pos, "collection member name")?;

        match value_tag {
            tag::END_COLLECTION => {
                read_length_prefixed(data, pos, "endCollection value")?;
                if pending_name.is_some() {
                    return Err("collection member without a value".into());
                }
                return Ok(members);
            }
            tag::MEMBER_ATTR_NAME => {
                let name = read_length_prefixed(data, pos, "member name")?;
                pending_name = Some(String::from_utf8_lossy(name).into_owned());
            }
            tag::BEG_COLLECTION => {
                read_length_prefixed(data, pos, "collection header")?;
                let nested = Value::Collection(parse_collection(data, pos)?);
                push_member(&mut members, &mut pending_name, nested)?;
            }
            other => {
                let bytes = read_length_prefixed(data, pos, "member value")?;
                let value = decode_value(other, bytes)?;
                push_member(&mut members, &mut pending_name, value)?;
            }
        }
    }
}

/// Attach a parsed value to the named member (or as an additional value of
/// the previous member).
fn push_member(
    members: &mut Attributes,
    pending_name: &mut Option<String>,
    value: Value,
) -> Result<(), String> {
    match pending_name.take() {
        Some(name) => {
            members.push(Attribute::new(name, value));
            Ok(())
        }
        None => match members.iter_mut().last() {
            Some(prev) => {
                prev.values.push(value);
                Ok(())
            }
            None => Err("collection value with no member name".into()),
        },
    }
}

/// Encode one attribute: first value carries the name, additional values
/// carry an empty name.
fn encode_attribute(buf: &mut Vec<u8>, attr: &Attribute) {
    for (i, value) in attr.values.iter().enumerate() {
        let name = if i == 0 { attr.name.as_str() } else { "" };
        encode_value(buf, name, value);
    }
}

fn write_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn encode_value(buf: &mut Vec<u8>, name: &str, value: &Value) {
    if let Value::Collection(members) = value {
        buf.push(tag::BEG_COLLECTION);
        write_field(buf, name.as_bytes());
        write_field(buf, b"");
        for member in members {
            for (i, member_value) in member.values.iter().enumerate() {
                if i == 0 {
                    buf.push(tag::MEMBER_ATTR_NAME);
                    write_field(buf, b"");
                    write_field(buf, member.name.as_bytes());
                }
                encode_value(buf, "", member_value);
            }
        }
        buf.push(tag::END_COLLECTION);
        write_field(buf, b"");
        write_field(buf, b"");
        return;
    }

    buf.push(value.tag());
    write_field(buf, name.as_bytes());

    match value {
        Value::Integer(v) | Value::Enum(v) => write_field(buf, &v.to_be_bytes()),
        Value::Boolean(v) => write_field(buf, &[u8::from(*v)]),
        Value::OctetString(bytes) => write_field(buf, bytes),
        Value::DateTime(dt) => write_field(buf, &dt.to_bytes()),
        Value::Resolution { x, y, units } => {
            let mut bytes = Vec::with_capacity(9);
            bytes.extend_from_slice(&x.to_be_bytes());
            bytes.extend_from_slice(&y.to_be_bytes());
            bytes.push(*units as u8);
            write_field(buf, &bytes);
        }
        Value::RangeOfInteger { lower, upper } => {
            let mut bytes = Vec::with_capacity(8);
            bytes.extend_from_slice(&lower.to_be_bytes());
            bytes.extend_from_slice(&upper.to_be_bytes());
            write_field(buf, &bytes);
        }
        Value::TextWithLang { lang, text } | Value::NameWithLang { lang, name: text } => {
            let mut bytes = Vec::with_capacity(4 + lang.len() + text.len());
            write_field(&mut bytes, lang.as_bytes());
            write_field(&mut bytes, text.as_bytes());
            write_field(buf, &bytes);
        }
        Value::Text(s)
        | Value::Name(s)
        | Value::Keyword(s)
        | Value::Uri(s)
        | Value::UriScheme(s)
        | Value::Charset(s)
        | Value::Language(s)
        | Value::MimeType(s) => write_field(buf, s.as_bytes()),
        Value::OutOfBand(_) => write_field(buf, b""),
        Value::Collection(_) => unreachable!("handled above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal request for testing, mirroring what a conforming
    /// client sends: charset, language, then the given extras.
    fn build_request(operation: u16, extra: Vec<Attribute>, data: &[u8]) -> Vec<u8> {
        let mut msg = Message::request(operation, 42);
        let op = msg.new_group(GroupTag::Operation);
        op.add("attributes-charset", Value::Charset("utf-8".into()));
        op.add("attributes-natural-language", Value::Language("en".into()));
        for attr in extra {
            op.push(attr);
        }
        msg.data = data.to_vec();
        msg.encode()
    }

    #[test]
    fn parse_minimal_request() {
        let bytes = build_request(0x000B, vec![], &[]);
        let msg = Message::parse(&bytes).expect("parse should succeed");

        assert_eq!(msg.version, (2, 0));
        assert_eq!(msg.code, 0x000B);
        assert_eq!(msg.request_id, 42);
        assert_eq!(msg.groups.len(), 1);
        assert!(msg.data.is_empty());
        assert_eq!(
            msg.operation().and_then(|g| g.get_string("attributes-charset")),
            Some("utf-8")
        );
    }

    #[test]
    fn parse_rejects_short_input() {
        assert!(Message::parse(&[2, 0, 0]).is_err());
    }

    #[test]
    fn document_data_survives() {
        let doc = b"%PDF-1.7 fake";
        let bytes = build_request(0x0002, vec![], doc);
        let msg = Message::parse(&bytes).expect("parse");
        assert_eq!(msg.data, doc);
    }

    #[test]
    fn every_value_kind_round_trips() {
        let dt = IppDateTime {
            year: 2026,
            month: 1,
            day: 15,
            hour: 9,
            minutes: 30,
            seconds: 0,
            deciseconds: 0,
            utc_direction: b'-',
            utc_hours: 5,
            utc_minutes: 0,
        };
        let extras = vec![
            Attribute::new("a-int", Value::Integer(-7)),
            Attribute::new("a-bool", Value::Boolean(true)),
            Attribute::new("a-enum", Value::Enum(5)),
            Attribute::new("a-octets", Value::OctetString(vec![0, 1, 2, 255])),
            Attribute::new("a-date", Value::DateTime(dt)),
            Attribute::new("a-res", Value::Resolution { x: 600, y: 300, units: 3 }),
            Attribute::new("a-range", Value::RangeOfInteger { lower: 1, upper: 99 }),
            Attribute::new("a-text", Value::Text("hello".into())),
            Attribute::new("a-name", Value::Name("nom".into())),
            Attribute::new(
                "a-text-lang",
                Value::TextWithLang { lang: "fr".into(), text: "bonjour".into() },
            ),
            Attribute::new(
                "a-name-lang",
                Value::NameWithLang { lang: "de".into(), name: "griff".into() },
            ),
            Attribute::new("a-keyword", Value::Keyword("one-sided".into())),
            Attribute::new("a-uri", Value::Uri("ipp://h/ipp/print/p".into())),
            Attribute::new("a-scheme", Value::UriScheme("ipp".into())),
            Attribute::new("a-charset", Value::Charset("utf-8".into())),
            Attribute::new("a-lang", Value::Language("en-us".into())),
            Attribute::new("a-mime", Value::MimeType("application/pdf".into())),
            Attribute::new("a-novalue", Value::OutOfBand(tag::NO_VALUE)),
        ];

        let bytes = build_request(0x0002, extras.clone(), &[]);
        let msg = Message::parse(&bytes).expect("parse");
        let op = msg.operation().expect("operation group");

        for expected in &extras {
            let got = op.find(&expected.name).unwrap_or_else(|| panic!("{} missing", expected.name));
            assert_eq!(got.values, expected.values, "{}", expected.name);
        }
    }

    #[test]
    fn additional_values_merge_into_one_set() {
        let extras = vec![Attribute::with_values(
            "document-format-supported",
            vec![
                Value::MimeType("application/pdf".into()),
                Value::MimeType("image/png".into()),
                Value::MimeType("image/jpeg".into()),
            ],
        )];
        let bytes = build_request(0x000B, extras, &[]);
        let msg = Message::parse(&bytes).expect("parse");

        let attr = msg.find("document-format-supported").expect("attr");
        assert_eq!(attr.values.len(), 3);
    }

    #[test]
    fn collections_round_trip_nested() {
        let mut size = Attributes::new();
        size.add("x-dimension", Value::Integer(21000));
        size.add("y-dimension", Value::Integer(29700));

        let mut media_col = Attributes::new();
        media_col.add("media-size", Value::Collection(size));
        media_col.add("media-type", Value::Keyword("stationery".into()));
        media_col.add_all(
            "media-source",
            vec![Value::Keyword("tray-1".into()), Value::Keyword("tray-2".into())],
        );

        let extras = vec![Attribute::new("media-col", Value::Collection(media_col.clone()))];
        let bytes = build_request(0x0002, extras, &[]);
        let msg = Message::parse(&bytes).expect("parse");

        let attr = msg.find("media-col").expect("media-col");
        let parsed = attr.values[0].as_collection().expect("collection");
        assert_eq!(parsed, &media_col);

        let nested = parsed.find("media-size").expect("media-size").values[0]
            .as_collection()
            .expect("nested collection");
        assert_eq!(nested.get_integer("x-dimension"), Some(21000));
    }

    #[test]
    fn one_set_of_collections_round_trips() {
        let mut first = Attributes::new();
        first.add("x", Value::Integer(1));
        let mut second = Attributes::new();
        second.add("x", Value::Integer(2));

        let extras = vec![Attribute::with_values(
            "finishings-col",
            vec![Value::Collection(first), Value::Collection(second)],
        )];
        let bytes = build_request(0x0002, extras, &[]);
        let msg = Message::parse(&bytes).expect("parse");

        let attr = msg.find("finishings-col").expect("attr");
        assert_eq!(attr.values.len(), 2);
        assert_eq!(
            attr.values[1].as_collection().and_then(|c| c.get_integer("x")),
            Some(2)
        );
    }

    #[test]
    fn multiple_groups_of_same_tag_are_preserved() {
        let mut msg = Message::response(0x0000, 9);
        msg.new_group(GroupTag::Job).add("job-id", Value::Integer(1));
        msg.new_group(GroupTag::Job).add("job-id", Value::Integer(2));

        let parsed = Message::parse(&msg.encode()).expect("parse");
        let jobs: Vec<_> = parsed.groups_tagged(GroupTag::Job).collect();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].get_integer("job-id"), Some(1));
        assert_eq!(jobs[1].get_integer("job-id"), Some(2));
    }

    #[test]
    fn response_builder_emits_charset_first() {
        let msg = Message::response(0x0000, 77);
        let bytes = msg.encode();
        let parsed = Message::parse(&bytes).expect("parse");

        assert_eq!(parsed.code, 0x0000);
        assert_eq!(parsed.request_id, 77);
        let op = parsed.operation().expect("operation group");
        let first = op.iter().next().expect("first attribute");
        assert_eq!(first.name, "attributes-charset");
    }

    #[test]
    fn status_message_is_replaced_not_duplicated() {
        let mut msg = Message::response(0x0400, 1);
        msg.set_status_message("first");
        msg.set_status_message("second");
        let parsed = Message::parse(&msg.encode()).expect("parse");
        let op = parsed.operation().expect("op");
        assert_eq!(op.get_string("status-message"), Some("second"));
        assert_eq!(op.iter().filter(|a| a.name == "status-message").count(), 1);
    }

    #[test]
    fn truncated_attribute_is_an_error() {
        let mut bytes = build_request(0x0002, vec![Attribute::new("a", Value::Integer(1))], &[]);
        // Chop mid-attribute: drop the end tag and the final value bytes.
        bytes.truncate(bytes.len() - 4);
        assert!(Message::parse(&bytes).is_err());
    }

    #[test]
    fn attribute_before_any_group_is_an_error() {
        let mut bytes = vec![2, 0, 0, 0x0B, 0, 0, 0, 1];
        bytes.push(tag::KEYWORD);
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.push(b'x');
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.push(b'y');
        bytes.push(tag::END_OF_ATTRIBUTES);
        assert!(Message::parse(&bytes).is_err());
    }

    #[test]
    fn zero_delimiter_separates_groups() {
        // header, operation group, zero separator, then end.
        let msg = Message::response(0x0000, 5);
        let mut bytes = msg.encode();
        let end = bytes.pop().expect("end tag");
        bytes.push(0x00);
        bytes.push(end);

        let parsed = Message::parse(&bytes).expect("parse");
        assert_eq!(parsed.groups.len(), 2);
        assert_eq!(parsed.groups[1].tag, GroupTag::Zero);
        assert!(parsed.groups[1].attributes.is_empty());
    }
}
