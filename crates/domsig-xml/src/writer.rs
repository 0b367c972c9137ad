#![forbid(unsafe_code)]

//! XML writing utilities built on quick-xml, used for marshalling.

use domsig_core::Error;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// A small element-oriented writer over `quick_xml::Writer`.
///
/// Text and attribute values are escaped; [`XmlWriter::write_raw`] inserts
/// pre-serialized markup verbatim.
pub struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), Error> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.emit(Event::Start(start))
    }

    /// Write an empty (self-closing) element.
    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), Error> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.emit(Event::Empty(start))
    }

    pub fn end_element(&mut self, name: &str) -> Result<(), Error> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    /// Write escaped text content.
    pub fn write_text(&mut self, text: &str) -> Result<(), Error> {
        self.emit(Event::Text(BytesText::new(text)))
    }

    /// `<name attrs>text</name>` in one call.
    pub fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<(), Error> {
        self.start_element(name, attrs)?;
        self.write_text(text)?;
        self.end_element(name)
    }

    /// Append already-serialized XML without escaping.
    pub fn write_raw(&mut self, markup: &str) -> Result<(), Error> {
        self.emit(Event::Text(BytesText::from_escaped(markup)))
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), Error> {
        self.writer.write_event(event).map_err(Error::Io)
    }

    /// Finish writing and return the XML bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Finish writing and return the XML as a string.
    pub fn into_string(self) -> Result<String, Error> {
        String::from_utf8(self.into_bytes())
            .map_err(|e| Error::Other(format!("writer produced invalid UTF-8: {e}")))
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose `prefix:local`, or just `local` for an empty prefix.
pub fn qualify(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_owned()
    } else {
        format!("{prefix}:{local}")
    }
}
