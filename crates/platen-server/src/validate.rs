// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Table-driven attribute validation.
//
// Three static tables declare the creatable/settable attributes for jobs,
// printers, and the system: expected value tag, an allowed alternate tag
// (typically an out-of-band no-value), and flags for 1setOf cardinality
// and create-operation placement (the attribute may arrive in the
// operation group of a job-creation request instead of the job group).

use platen_ipp::tag::{self, GroupTag};
use platen_ipp::{Attribute, Attributes, Message, Value};

/// The attribute may carry multiple values.
pub const F_1SETOF: u8 = 0x01;
/// On create operations the attribute may appear in the operation group.
pub const F_CREATEOP: u8 = 0x02;

/// One schema row: attribute name, expected tag, alternate tag (0 = none),
/// flags.
pub struct ValueRow {
    pub name: &'static str,
    pub tag: u8,
    pub alt_tag: u8,
    pub flags: u8,
}

macro_rules! row {
    ($name:literal, $tag:expr) => {
        ValueRow { name: $name, tag: $tag, alt_tag: 0, flags: 0 }
    };
    ($name:literal, $tag:expr, $alt:expr) => {
        ValueRow { name: $name, tag: $tag, alt_tag: $alt, flags: 0 }
    };
    ($name:literal, $tag:expr, $alt:expr, $flags:expr) => {
        ValueRow { name: $name, tag: $tag, alt_tag: $alt, flags: $flags }
    };
}

/// Value tags for job create/set attributes.
pub static JOB_VALUES: &[ValueRow] = &[
    row!("copies", tag::INTEGER),
    row!("cover-back", tag::BEG_COLLECTION),
    row!("cover-front", tag::BEG_COLLECTION),
    row!("document-message", tag::TEXT, 0, F_CREATEOP),
    row!("document-metadata", tag::OCTET_STRING, 0, F_1SETOF | F_CREATEOP),
    row!("document-name", tag::NAME, 0, F_CREATEOP),
    row!("finishings", tag::ENUM, 0, F_1SETOF),
    row!("finishings-col", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("imposition-template", tag::KEYWORD, tag::NAME),
    row!("insert-sheet", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("job-account-id", tag::NAME, tag::NO_VALUE),
    row!("job-account-type", tag::KEYWORD, tag::NAME),
    row!("job-accounting-sheets", tag::BEG_COLLECTION, tag::NO_VALUE),
    row!("job-accounting-user-id", tag::NAME, tag::NO_VALUE),
    row!("job-delay-output-until", tag::KEYWORD, tag::NAME),
    row!("job-delay-output-until-time", tag::DATE_TIME),
    row!("job-error-action", tag::KEYWORD),
    row!("job-error-sheet", tag::BEG_COLLECTION, tag::NO_VALUE),
    row!("job-hold-until", tag::KEYWORD, tag::NAME, F_CREATEOP),
    row!("job-hold-until-time", tag::DATE_TIME, 0, F_CREATEOP),
    row!("job-message-to-operator", tag::TEXT),
    row!("job-name", tag::NAME, 0, F_CREATEOP),
    row!("job-pages-per-set", tag::INTEGER),
    row!("job-phone-number", tag::URI, tag::NO_VALUE),
    row!("job-priority", tag::INTEGER),
    row!("job-recipient-name", tag::NAME, tag::NO_VALUE),
    row!("job-retain-until", tag::KEYWORD, tag::NAME),
    row!("job-retain-until-time", tag::DATE_TIME),
    row!("job-sheet-message", tag::TEXT),
    row!("job-sheets", tag::KEYWORD, tag::NAME),
    row!("job-sheets-col", tag::BEG_COLLECTION),
    row!("media", tag::KEYWORD, tag::NAME),
    row!("media-col", tag::BEG_COLLECTION),
    row!("multiple-document-handling", tag::KEYWORD),
    row!("number-up", tag::INTEGER),
    row!("orientation-requested", tag::ENUM, tag::NO_VALUE),
    row!("output-bin", tag::KEYWORD, tag::NAME),
    row!("overrides", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("page-delivery", tag::KEYWORD),
    row!("page-ranges", tag::RANGE_OF_INTEGER, 0, F_1SETOF),
    row!("presentation-direction-number-up", tag::KEYWORD),
    row!("print-color-mode", tag::KEYWORD),
    row!("print-content-optimize", tag::KEYWORD),
    row!("print-quality", tag::ENUM),
    row!("print-rendering-intent", tag::KEYWORD),
    row!("print-scaling", tag::KEYWORD),
    row!("printer-resolution", tag::RESOLUTION),
    row!("proof-print", tag::BEG_COLLECTION, tag::NO_VALUE),
    row!("separator-sheets", tag::BEG_COLLECTION),
    row!("sides", tag::KEYWORD),
    row!("x-image-position", tag::KEYWORD),
    row!("x-image-shift", tag::INTEGER),
    row!("x-side1-image-shift", tag::INTEGER),
    row!("x-side2-image-shift", tag::INTEGER),
    row!("y-image-position", tag::KEYWORD),
    row!("y-image-shift", tag::INTEGER),
    row!("y-side1-image-shift", tag::INTEGER),
    row!("y-side2-image-shift", tag::INTEGER),
];

/// Value tags for printer create/set attributes.
pub static PRINTER_VALUES: &[ValueRow] = &[
    row!("color-supported", tag::BOOLEAN),
    row!("copies-default", tag::INTEGER),
    row!("copies-supported", tag::RANGE_OF_INTEGER),
    row!("document-creation-attributes-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("document-format-default", tag::MIME_TYPE),
    row!("document-format-supported", tag::MIME_TYPE, 0, F_1SETOF),
    row!("finishings-col-database", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("finishings-col-default", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("finishings-col-ready", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("finishings-col-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("finishings-default", tag::ENUM, 0, F_1SETOF),
    row!("finishings-ready", tag::ENUM, 0, F_1SETOF),
    row!("finishings-supported", tag::ENUM, 0, F_1SETOF),
    row!("imposition-template-default", tag::KEYWORD, tag::NAME),
    row!("imposition-template-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("insert-sheet-default", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("insert-sheet-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("job-account-id-default", tag::NAME, tag::NO_VALUE),
    row!("job-account-id-supported", tag::BOOLEAN),
    row!("job-account-type-default", tag::KEYWORD, tag::NAME),
    row!("job-account-type-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("job-accounting-sheets-default", tag::BEG_COLLECTION, tag::NO_VALUE),
    row!("job-accounting-sheets-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("job-accounting-user-id-default", tag::NAME, tag::NO_VALUE),
    row!("job-accounting-user-id-supported", tag::BOOLEAN),
    row!("job-constraints-supported", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("job-creation-attributes-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("job-delay-output-until-default", tag::KEYWORD, tag::NAME),
    row!("job-delay-output-until-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("job-error-action-default", tag::KEYWORD),
    row!("job-error-action-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("job-error-sheet-default", tag::BEG_COLLECTION, tag::NO_VALUE),
    row!("job-error-sheet-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("job-hold-until-default", tag::KEYWORD, tag::NAME),
    row!("job-hold-until-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("job-message-to-operator-default", tag::TEXT),
    row!("job-pages-per-set-supported", tag::BOOLEAN),
    row!("job-password-encryption-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("job-password-supported", tag::INTEGER),
    row!("job-phone-number-default", tag::URI, tag::NO_VALUE),
    row!("job-phone-number-supported", tag::BOOLEAN),
    row!("job-presets-supported", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("job-priority-default", tag::INTEGER),
    row!("job-recipient-name-default", tag::NAME, tag::NO_VALUE),
    row!("job-recipient-name-supported", tag::BOOLEAN),
    row!("job-resolvers-supported", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("job-retain-until-default", tag::KEYWORD, tag::NAME),
    row!("job-retain-until-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("job-sheet-message-default", tag::TEXT),
    row!("job-sheet-message-supported", tag::BOOLEAN),
    row!("job-sheets-col-default", tag::BEG_COLLECTION),
    row!("job-sheets-col-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("job-sheets-default", tag::KEYWORD, tag::NAME),
    row!("job-sheets-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("media-bottom-margin-supported", tag::INTEGER, 0, F_1SETOF),
    row!("media-col-database", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("media-col-default", tag::BEG_COLLECTION),
    row!("media-col-ready", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("media-color-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("media-default", tag::KEYWORD, tag::NAME),
    row!("media-key-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("media-left-margin-supported", tag::INTEGER, 0, F_1SETOF),
    row!("media-ready", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("media-right-margin-supported", tag::INTEGER, 0, F_1SETOF),
    row!("media-size-supported", tag::BEG_COLLECTION, 0, F_1SETOF),
    row!("media-source-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("media-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("media-top-margin-supported", tag::INTEGER, 0, F_1SETOF),
    row!("media-type-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("multiple-document-handling-default", tag::KEYWORD),
    row!("multiple-document-jobs-supported", tag::BOOLEAN),
    row!("natural-language-configured", tag::NATURAL_LANGUAGE),
    row!("notify-events-default", tag::KEYWORD, 0, F_1SETOF),
    row!("number-up-default", tag::INTEGER),
    row!("number-up-supported", tag::INTEGER, tag::RANGE_OF_INTEGER, F_1SETOF),
    row!("orientation-requested-default", tag::ENUM, tag::NO_VALUE),
    row!("orientation-requested-supported", tag::ENUM, 0, F_1SETOF),
    row!("output-bin-default", tag::KEYWORD, tag::NAME),
    row!("output-bin-supported", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("overrides-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("page-delivery-default", tag::KEYWORD),
    row!("page-delivery-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("page-ranges-supported", tag::BOOLEAN),
    row!("pages-per-minute", tag::INTEGER),
    row!("pages-per-minute-color", tag::INTEGER),
    row!("pdl-override-supported", tag::KEYWORD),
    row!("presentation-direction-number-up-default", tag::KEYWORD),
    row!("presentation-direction-number-up-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("print-color-mode-default", tag::KEYWORD),
    row!("print-color-mode-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("print-content-optimize-default", tag::KEYWORD),
    row!("print-content-optimize-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("print-quality-default", tag::ENUM),
    row!("print-quality-supported", tag::ENUM, 0, F_1SETOF),
    row!("print-rendering-intent-default", tag::KEYWORD),
    row!("print-rendering-intent-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("print-scaling-default", tag::KEYWORD),
    row!("print-scaling-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("printer-charge-info", tag::TEXT),
    row!("printer-charge-info-uri", tag::URI),
    row!("printer-contact-col", tag::BEG_COLLECTION, tag::UNKNOWN),
    row!("printer-device-id", tag::TEXT),
    row!("printer-dns-sd-name", tag::NAME),
    row!("printer-geo-location", tag::URI),
    row!("printer-icc-profiles", tag::BEG_COLLECTION),
    row!("printer-info", tag::TEXT),
    row!("printer-kind", tag::KEYWORD, tag::NAME, F_1SETOF),
    row!("printer-location", tag::TEXT),
    row!("printer-make-and-model", tag::TEXT),
    row!("printer-mandatory-job-attributes", tag::KEYWORD),
    row!("printer-name", tag::NAME),
    row!("printer-organization", tag::TEXT),
    row!("printer-organizational-unit", tag::TEXT),
    row!("printer-resolution-default", tag::RESOLUTION),
    row!("printer-resolution-supported", tag::RESOLUTION, 0, F_1SETOF),
    row!("pwg-raster-document-resolution-supported", tag::RESOLUTION, 0, F_1SETOF),
    row!("pwg-raster-document-sheet-back", tag::KEYWORD),
    row!("pwg-raster-document-type-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("separator-sheets-default", tag::BEG_COLLECTION),
    row!("separator-sheets-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("sides-default", tag::KEYWORD),
    row!("sides-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("smi2699-auth-print-group", tag::NAME, tag::NO_VALUE),
    row!("smi2699-auth-proxy-group", tag::NAME, tag::NO_VALUE),
    row!("smi2699-device-command", tag::NAME, tag::NO_VALUE),
    row!("smi2699-device-format", tag::MIME_TYPE),
    row!("smi2699-device-name", tag::NAME),
    row!("smi2699-device-uri", tag::URI, tag::NO_VALUE),
    row!("smi2699-max-output-device", tag::INTEGER),
    row!("urf-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("x-image-position-default", tag::KEYWORD),
    row!("x-image-position-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("x-image-shift-default", tag::INTEGER),
    row!("x-image-shift-supported", tag::RANGE_OF_INTEGER),
    row!("y-image-position-default", tag::KEYWORD),
    row!("y-image-position-supported", tag::KEYWORD, 0, F_1SETOF),
    row!("y-image-shift-default", tag::INTEGER),
    row!("y-image-shift-supported", tag::RANGE_OF_INTEGER),
];

/// Value tags for system settable attributes.
pub static SYSTEM_VALUES: &[ValueRow] = &[
    row!("system-default-printer-id", tag::INTEGER, tag::NO_VALUE),
    row!("system-dns-sd-name", tag::NAME, tag::NO_VALUE),
    row!("system-geo-location", tag::URI, tag::UNKNOWN),
    row!("system-info", tag::TEXT),
    row!("system-location", tag::TEXT),
    row!("system-make-and-model", tag::TEXT),
    row!("system-name", tag::NAME),
    row!("system-organization", tag::TEXT),
    row!("system-organizational-unit", tag::TEXT),
    row!("system-owner-col", tag::BEG_COLLECTION),
];

/// Copy an offending attribute into the response's unsupported group.
pub fn respond_unsupported(response: &mut Message, attr: &Attribute) {
    response.group_mut(GroupTag::Unsupported).push(attr.clone());
}

/// Mark an attribute as not settable in the unsupported group.
pub fn respond_unsettable(response: &mut Message, name: &str) {
    response
        .group_mut(GroupTag::Unsupported)
        .push(Attribute::new(name, Value::OutOfBand(tag::NOT_SETTABLE)));
}

/// Whether an actual value tag satisfies an expected one, honoring the
/// name↔nameWithLanguage and text↔textWithLanguage equivalences.
fn tag_matches(actual: u8, expected: u8) -> bool {
    if expected == 0 {
        return false;
    }
    actual == expected
        || (expected == tag::NAME && actual == tag::NAME_WITH_LANGUAGE)
        || (expected == tag::TEXT && actual == tag::TEXT_WITH_LANGUAGE)
        || (expected == tag::NAME_WITH_LANGUAGE && actual == tag::NAME)
        || (expected == tag::TEXT_WITH_LANGUAGE && actual == tag::TEXT)
}

/// Validate one attribute group of a request against a schema table.
///
/// Two checks, per the group-validation contract:
///
/// 1. If a "…-attributes-supported" keyword list is given, every attribute
///    present in the group (and, for create operations, every
///    create-op-exempt attribute in the operation group) must be listed.
/// 2. Every schema row present in the request must have the right group
///    placement, a matching value tag (or alternate), and a single value
///    unless flagged 1setOf.
///
/// On failure the response status becomes `attributes-or-values` (or
/// `attributes-not-settable` for set operations), offenders are copied to
/// the unsupported group, and `false` is returned.
pub fn validate_group(
    request: &Message,
    response: &mut Message,
    group: GroupTag,
    rows: &[ValueRow],
    supported: Option<&Attribute>,
    is_create_op: bool,
) -> bool {
    let mut ok = true;
    let empty = Attributes::new();
    let group_attrs = request.group(group).unwrap_or(&empty);
    let op_attrs = request.operation().unwrap_or(&empty);

    let fail_status = if is_create_op {
        platen_ipp::status::ATTRIBUTES_OR_VALUES
    } else {
        platen_ipp::status::ATTRIBUTES_NOT_SETTABLE
    };

    // Check 1: everything in the target group must be a supported keyword.
    if let Some(supported) = supported {
        let listed = |name: &str| {
            supported
                .values
                .iter()
                .filter_map(Value::as_str)
                .any(|v| v == name)
        };
        for attr in group_attrs {
            if !listed(&attr.name) {
                ok = false;
                if is_create_op {
                    respond_unsupported(response, attr);
                } else {
                    respond_unsettable(response, &attr.name);
                }
            }
        }
        if is_create_op {
            for attr in op_attrs {
                let exempt = rows
                    .iter()
                    .any(|row| row.name == attr.name && row.flags & F_CREATEOP != 0);
                if exempt && !listed(&attr.name) {
                    ok = false;
                    respond_unsupported(response, attr);
                }
            }
        }
    }

    // Check 2: tag and cardinality per schema row.
    for row in rows {
        let found = group_attrs.find(row.name).or_else(|| {
            (is_create_op && row.flags & F_CREATEOP != 0)
                .then(|| op_attrs.find(row.name))
                .flatten()
        });
        let Some(attr) = found else { continue };

        let actual = attr.value_tag();
        let tag_ok = tag_matches(actual, row.tag) || tag_matches(actual, row.alt_tag);
        let count_ok = attr.values.len() == 1 || row.flags & F_1SETOF != 0;

        if !tag_ok || !count_ok {
            ok = false;
            if is_create_op {
                respond_unsupported(response, attr);
            } else {
                respond_unsettable(response, &attr.name);
            }
        }
    }

    if !ok && platen_ipp::status::is_success(response.code) {
        response.code = fail_status;
        response.set_status_message("Unsupported or badly typed attributes in request.");
    }

    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use platen_ipp::status;

    fn request_with_job_attr(attr: Attribute) -> Message {
        let mut msg = Message::request(platen_ipp::op::PRINT_JOB, 1);
        let op = msg.new_group(GroupTag::Operation);
        op.add("attributes-charset", Value::Charset("utf-8".into()));
        op.add("attributes-natural-language", Value::Language("en".into()));
        msg.new_group(GroupTag::Job).push(attr);
        msg
    }

    #[test]
    fn well_typed_attribute_passes() {
        let request = request_with_job_attr(Attribute::new("copies", Value::Integer(2)));
        let mut response = Message::response(status::OK, 1);
        assert!(validate_group(
            &request,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            None,
            true
        ));
        assert_eq!(response.code, status::OK);
    }

    #[test]
    fn wrong_tag_is_rejected_with_unsupported_copy() {
        let request =
            request_with_job_attr(Attribute::new("copies", Value::Keyword("two".into())));
        let mut response = Message::response(status::OK, 1);
        assert!(!validate_group(
            &request,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            None,
            true
        ));
        assert_eq!(response.code, status::ATTRIBUTES_OR_VALUES);
        let unsupported = response.group(GroupTag::Unsupported).expect("group");
        assert!(unsupported.find("copies").is_some());
    }

    #[test]
    fn cardinality_enforced_unless_1setof() {
        let request = request_with_job_attr(Attribute::with_values(
            "copies",
            vec![Value::Integer(1), Value::Integer(2)],
        ));
        let mut response = Message::response(status::OK, 1);
        assert!(!validate_group(
            &request,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            None,
            true
        ));

        let request = request_with_job_attr(Attribute::with_values(
            "finishings",
            vec![Value::Enum(3), Value::Enum(4)],
        ));
        let mut response = Message::response(status::OK, 1);
        assert!(validate_group(
            &request,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            None,
            true
        ));
    }

    #[test]
    fn alternate_out_of_band_tag_is_accepted() {
        let request = request_with_job_attr(Attribute::new(
            "job-account-id",
            Value::OutOfBand(tag::NO_VALUE),
        ));
        let mut response = Message::response(status::OK, 1);
        assert!(validate_group(
            &request,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            None,
            true
        ));
    }

    #[test]
    fn name_with_language_matches_name_rows() {
        let request = request_with_job_attr(Attribute::new(
            "job-name",
            Value::NameWithLang { lang: "en".into(), name: "report".into() },
        ));
        let mut response = Message::response(status::OK, 1);
        assert!(validate_group(
            &request,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            None,
            true
        ));
    }

    #[test]
    fn supported_keyword_list_gates_group_members() {
        let request = request_with_job_attr(Attribute::new("copies", Value::Integer(2)));
        let supported = Attribute::with_values(
            "job-creation-attributes-supported",
            vec![Value::Keyword("media".into())],
        );
        let mut response = Message::response(status::OK, 1);
        assert!(!validate_group(
            &request,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            Some(&supported),
            true
        ));
        assert_eq!(response.code, status::ATTRIBUTES_OR_VALUES);
    }

    #[test]
    fn set_op_failures_use_not_settable() {
        let request =
            request_with_job_attr(Attribute::new("copies", Value::Keyword("two".into())));
        let mut response = Message::response(status::OK, 1);
        assert!(!validate_group(
            &request,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            None,
            false
        ));
        assert_eq!(response.code, status::ATTRIBUTES_NOT_SETTABLE);
        let unsupported = response.group(GroupTag::Unsupported).expect("group");
        let marker = unsupported.find("copies").expect("marker");
        assert_eq!(marker.value_tag(), tag::NOT_SETTABLE);
    }

    #[test]
    fn create_op_exempt_names_may_live_in_operation_group() {
        let mut msg = Message::request(platen_ipp::op::PRINT_JOB, 1);
        let op = msg.new_group(GroupTag::Operation);
        op.add("attributes-charset", Value::Charset("utf-8".into()));
        op.add("attributes-natural-language", Value::Language("en".into()));
        // job-name arrives in the operation group on Print-Job.
        op.add("job-name", Value::Name("flyer".into()));

        let mut response = Message::response(status::OK, 1);
        assert!(validate_group(
            &msg,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            None,
            true
        ));

        // But a badly typed one still fails from there.
        let mut msg = Message::request(platen_ipp::op::PRINT_JOB, 1);
        let op = msg.new_group(GroupTag::Operation);
        op.add("attributes-charset", Value::Charset("utf-8".into()));
        op.add("attributes-natural-language", Value::Language("en".into()));
        op.add("job-name", Value::Integer(5));
        let mut response = Message::response(status::OK, 1);
        assert!(!validate_group(
            &msg,
            &mut response,
            GroupTag::Job,
            JOB_VALUES,
            None,
            true
        ));
    }
}
