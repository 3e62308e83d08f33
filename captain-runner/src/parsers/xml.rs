// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ParseFailure;
use quick_xml::events::Event;

pub(super) const NOT_XML: &str = "Unable to parse test results as XML";

/// Returns the name of the document's root element, or an [`Invalid`]
/// failure when the input is not XML at all.
///
/// quick-xml's serde deserializer does not validate the root element name,
/// so format detection checks it up front: a `<foo/>` document is "not XML
/// test results" rather than an empty suite.
///
/// [`Invalid`]: ParseFailure::Invalid
pub(super) fn root_element_name(input: &str) -> Result<String, ParseFailure> {
    let mut reader = quick_xml::Reader::from_str(input);
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                return Ok(String::from_utf8_lossy(element.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(ParseFailure::Invalid(NOT_XML.to_owned())),
            Ok(_) => continue,
            Err(err) => {
                return Err(ParseFailure::Invalid(format!("{NOT_XML}: {err}")));
            }
        }
    }
}
