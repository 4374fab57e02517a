// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Attributes and ordered attribute sets.
//
// Attribute names compare byte-exact (US-ASCII per RFC 8011); an attribute
// carries one or more values (`1setOf`).  Out-of-band values carry no
// concrete payload but still participate in find and copy.

use std::collections::HashSet;

use crate::tag;
use crate::value::Value;

/// A single named attribute with one or more values.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Value>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self { name: name.into(), values: vec![value] }
    }

    pub fn with_values(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self { name: name.into(), values }
    }

    /// The value tag of the first value (the attribute's syntax on the wire).
    pub fn value_tag(&self) -> u8 {
        self.values.first().map_or(tag::UNKNOWN, Value::tag)
    }

    pub fn is_out_of_band(&self) -> bool {
        self.values.first().is_some_and(Value::is_out_of_band)
    }

    /// All values joined with commas, the flat "attribute string" form.
    pub fn values_wire_string(&self) -> String {
        self.values
            .iter()
            .map(Value::to_wire_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// An ordered set of attributes.
///
/// Order is preserved because the wire format is order-sensitive (the first
/// three operation attributes are position-checked) and because responses
/// replay attributes in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Attribute> {
        self.0.iter_mut()
    }

    /// Append, keeping any existing attribute of the same name.
    pub fn push(&mut self, attr: Attribute) {
        self.0.push(attr);
    }

    pub fn add(&mut self, name: impl Into<String>, value: Value) {
        self.0.push(Attribute::new(name, value));
    }

    pub fn add_all(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.0.push(Attribute::with_values(name, values));
    }

    /// Replace any existing attribute of the same name (or append).
    pub fn set(&mut self, name: &str, values: Vec<Value>) {
        if let Some(attr) = self.0.iter_mut().find(|a| a.name == name) {
            attr.values = values;
        } else {
            self.0.push(Attribute::with_values(name.to_string(), values));
        }
    }

    /// Remove an attribute by name; reports whether one was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|a| a.name != name);
        self.0.len() != before
    }

    /// Find by byte-exact name.
    pub fn find(&self, name: &str) -> Option<&Attribute> {
        self.0.iter().find(|a| a.name == name)
    }

    /// Find by name, requiring the given value tag.  Out-of-band attributes
    /// never match a concrete tag filter.
    pub fn find_tagged(&self, name: &str, value_tag: u8) -> Option<&Attribute> {
        self.0.iter().find(|a| a.name == name && a.value_tag() == value_tag)
    }

    /// First value of the named attribute as an integer/enum.
    pub fn get_integer(&self, name: &str) -> Option<i32> {
        self.find(name).and_then(|a| a.values.first()).and_then(Value::as_integer)
    }

    /// First value of the named attribute as a boolean.
    pub fn get_boolean(&self, name: &str) -> Option<bool> {
        self.find(name).and_then(|a| a.values.first()).and_then(Value::as_bool)
    }

    /// First value of the named attribute as a string.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.find(name).and_then(|a| a.values.first()).and_then(Value::as_str)
    }

    /// All values of the named attribute as strings.
    pub fn get_strings(&self, name: &str) -> Vec<&str> {
        self.find(name)
            .map(|a| a.values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// All integer/enum values of the named attribute.
    pub fn get_integers(&self, name: &str) -> Vec<i32> {
        self.find(name)
            .map(|a| a.values.iter().filter_map(Value::as_integer).collect())
            .unwrap_or_default()
    }

    /// Whether the named `1setOf` attribute contains the given string value.
    pub fn contains_string(&self, name: &str, value: &str) -> bool {
        self.get_strings(name).iter().any(|v| *v == value)
    }

    /// Deep copy of the whole set.
    pub fn copy_all(&self) -> Self {
        self.clone()
    }

    /// Deep copy filtered by a requested-attributes set and a privacy set.
    ///
    /// An attribute is copied when it is not in `private` and either no
    /// `requested` filter is given or its name is listed.  This is the
    /// filter applied for requested-attributes handling and for hiding job
    /// fields from non-owners.
    pub fn copy_filtered(
        &self,
        requested: Option<&HashSet<String>>,
        private: Option<&HashSet<String>>,
    ) -> Self {
        let mut out = Self::new();
        for attr in &self.0 {
            if let Some(private) = private {
                if private.contains(&attr.name) {
                    continue;
                }
            }
            if let Some(requested) = requested {
                if !requested.contains(&attr.name) {
                    continue;
                }
            }
            out.push(attr.clone());
        }
        out
    }

    /// Structural well-formedness of the set: non-empty ASCII names of
    /// bounded length, at least one value, and a single syntax per
    /// attribute (integer and rangeOfInteger may mix, as may the
    /// with/without-language string forms).
    pub fn validate(&self) -> Result<(), String> {
        for attr in &self.0 {
            if attr.name.is_empty() {
                return Err("attribute with empty name".into());
            }
            if attr.name.len() > 255 {
                return Err(format!("attribute name \"{}\" too long", attr.name));
            }
            if !attr.name.bytes().all(|b| (0x21..=0x7E).contains(&b)) {
                return Err(format!("attribute name \"{}\" is not printable ASCII", attr.name));
            }
            if attr.values.is_empty() {
                return Err(format!("attribute \"{}\" has no values", attr.name));
            }
            let first = attr.values[0].tag();
            for value in &attr.values[1..] {
                if !tags_compatible(first, value.tag()) {
                    return Err(format!(
                        "attribute \"{}\" mixes value syntaxes ({:#04x} and {:#04x})",
                        attr.name,
                        first,
                        value.tag()
                    ));
                }
            }
            // Nested collections validate recursively.
            for value in &attr.values {
                if let Value::Collection(members) = value {
                    members.validate()?;
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Whether two value tags may coexist inside one `1setOf` value list.
fn tags_compatible(a: u8, b: u8) -> bool {
    if a == b {
        return true;
    }
    let pair = |x: u8, y: u8| (a == x && b == y) || (a == y && b == x);
    pair(tag::INTEGER, tag::RANGE_OF_INTEGER)
        || pair(tag::NAME, tag::NAME_WITH_LANGUAGE)
        || pair(tag::TEXT, tag::TEXT_WITH_LANGUAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Attributes {
        let mut attrs = Attributes::new();
        attrs.add("job-id", Value::Integer(7));
        attrs.add("job-name", Value::Name("invoice".into()));
        attrs.add_all(
            "job-state-reasons",
            vec![Value::Keyword("none".into())],
        );
        attrs
    }

    #[test]
    fn find_is_byte_exact() {
        let attrs = sample();
        assert!(attrs.find("job-id").is_some());
        assert!(attrs.find("Job-Id").is_none());
        assert!(attrs.find("job-id ").is_none());
    }

    #[test]
    fn find_tagged_filters_by_syntax() {
        let attrs = sample();
        assert!(attrs.find_tagged("job-id", tag::INTEGER).is_some());
        assert!(attrs.find_tagged("job-id", tag::KEYWORD).is_none());
    }

    #[test]
    fn set_replaces_in_place() {
        let mut attrs = sample();
        attrs.set("job-id", vec![Value::Integer(9)]);
        assert_eq!(attrs.get_integer("job-id"), Some(9));
        assert_eq!(attrs.len(), 3);

        attrs.set("new-attr", vec![Value::Boolean(true)]);
        assert_eq!(attrs.len(), 4);
    }

    #[test]
    fn remove_reports_presence() {
        let mut attrs = sample();
        assert!(attrs.remove("job-name"));
        assert!(!attrs.remove("job-name"));
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn copy_filtered_by_requested() {
        let attrs = sample();
        let requested: HashSet<String> =
            ["job-id".to_string(), "missing".to_string()].into_iter().collect();
        let copied = attrs.copy_filtered(Some(&requested), None);
        assert_eq!(copied.len(), 1);
        assert!(copied.find("job-id").is_some());
    }

    #[test]
    fn copy_filtered_by_privacy() {
        let attrs = sample();
        let private: HashSet<String> = ["job-name".to_string()].into_iter().collect();
        let copied = attrs.copy_filtered(None, Some(&private));
        assert_eq!(copied.len(), 2);
        assert!(copied.find("job-name").is_none());
    }

    #[test]
    fn out_of_band_participates_in_find_and_copy() {
        let mut attrs = Attributes::new();
        attrs.add("job-account-id", Value::OutOfBand(tag::NO_VALUE));
        assert!(attrs.find("job-account-id").is_some());
        let copied = attrs.copy_filtered(None, None);
        assert!(copied.find("job-account-id").is_some_and(Attribute::is_out_of_band));
    }

    #[test]
    fn validate_accepts_well_formed_sets() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn validate_rejects_mixed_syntaxes() {
        let mut attrs = Attributes::new();
        attrs.add_all(
            "bad",
            vec![Value::Integer(1), Value::Keyword("x".into())],
        );
        assert!(attrs.validate().is_err());
    }

    #[test]
    fn validate_allows_integer_range_mix() {
        let mut attrs = Attributes::new();
        attrs.add_all(
            "copies-supported",
            vec![Value::Integer(1), Value::RangeOfInteger { lower: 1, upper: 99 }],
        );
        assert!(attrs.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_names() {
        let mut attrs = Attributes::new();
        attrs.add("", Value::Integer(1));
        assert!(attrs.validate().is_err());

        let mut attrs = Attributes::new();
        attrs.add("has space", Value::Integer(1));
        assert!(attrs.validate().is_err());
    }

    #[test]
    fn filter_preserved_sets_stay_valid() {
        let attrs = sample();
        let copied = attrs.copy_filtered(None, None);
        assert!(copied.validate().is_ok());
    }
}
