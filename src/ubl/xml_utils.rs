use std::io::Cursor;
use std::ops::Range;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use rust_decimal::Decimal;

use crate::core::ValidationError;
use crate::core::money::{format_amount, format_quantity};

fn xml_io(e: std::io::Error) -> ValidationError {
    // Only reachable if the in-memory buffer cannot grow.
    ValidationError::new("xml", format!("XML write error: {e}"))
}

pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    /// Indented writer starting with an XML declaration.
    pub fn new() -> Result<Self, ValidationError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_io)?;
        Ok(Self { writer })
    }

    /// Unindented writer without declaration, for fragments spliced into an
    /// existing document.
    pub fn fragment() -> Self {
        Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner().into_inner()
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, ValidationError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn start_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, ValidationError> {
        let mut elem = BytesStart::new(name);
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        self.writer.write_event(Event::Start(elem)).map_err(xml_io)?;
        Ok(self)
    }

    pub fn empty_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, ValidationError> {
        let mut elem = BytesStart::new(name);
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        self.writer.write_event(Event::Empty(elem)).map_err(xml_io)?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, ValidationError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, ValidationError> {
        self.start_element(name)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    pub fn text_element_with_attrs(
        &mut self,
        name: &str,
        text: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, ValidationError> {
        self.start_element_with_attrs(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    /// Write an already serialized fragment verbatim.
    pub fn raw(&mut self, fragment: &str) -> Result<&mut Self, ValidationError> {
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(fragment)))
            .map_err(xml_io)?;
        Ok(self)
    }

    /// Amount with `currencyID`, always two decimals.
    pub fn amount_element(
        &mut self,
        name: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<&mut Self, ValidationError> {
        self.text_element_with_attrs(name, &format_amount(amount), &[("currencyID", currency)])
    }

    /// Quantity with `unitCode`.
    pub fn quantity_element(
        &mut self,
        name: &str,
        qty: Decimal,
        unit: &str,
    ) -> Result<&mut Self, ValidationError> {
        self.text_element_with_attrs(name, &format_quantity(qty), &[("unitCode", unit)])
    }
}

/// Byte range of the first element called `name` (prefix included, e.g.
/// `ext:UBLExtensions`), from its `<` to the end of its closing tag.
pub fn locate_element(xml: &str, name: &str) -> Result<Option<Range<usize>>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let name = name.as_bytes();
    let mut open: Option<(usize, usize)> = None;
    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if open.is_none() && e.name().as_ref() == name {
                    let after = reader.buffer_position() as usize;
                    open = Some((tag_start(xml, after), depth));
                }
                depth += 1;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if let Some((start, open_depth)) = open {
                    if open_depth == depth && e.name().as_ref() == name {
                        return Ok(Some(start..reader.buffer_position() as usize));
                    }
                }
            }
            Event::Empty(e) if open.is_none() && e.name().as_ref() == name => {
                let after = reader.buffer_position() as usize;
                return Ok(Some(tag_start(xml, after)..after));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn tag_start(xml: &str, tag_end: usize) -> usize {
    xml[..tag_end].rfind('<').unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn writes_amounts_with_two_decimals() {
        let mut w = XmlWriter::fragment();
        w.amount_element("cbc:PayableAmount", dec!(119), "COP").unwrap();
        let out = String::from_utf8(w.into_bytes()).unwrap();
        assert_eq!(out, r#"<cbc:PayableAmount currencyID="COP">119.00</cbc:PayableAmount>"#);
    }

    #[test]
    fn escapes_text() {
        let mut w = XmlWriter::fragment();
        w.text_element("cbc:Name", "Pérez & Hijos <SAS>").unwrap();
        let out = String::from_utf8(w.into_bytes()).unwrap();
        assert_eq!(out, "<cbc:Name>Pérez &amp; Hijos &lt;SAS&gt;</cbc:Name>");
    }

    #[test]
    fn locates_nested_element() {
        let xml = "<?xml version=\"1.0\"?>\n<a><b><c/></b><x:ext><x:ext>in</x:ext></x:ext></a>";
        let range = locate_element(xml, "x:ext").unwrap().unwrap();
        assert_eq!(&xml[range], "<x:ext><x:ext>in</x:ext></x:ext>");
        let range = locate_element(xml, "c").unwrap().unwrap();
        assert_eq!(&xml[range], "<c/>");
        assert!(locate_element(xml, "missing").unwrap().is_none());
    }

    #[test]
    fn locate_rejects_malformed() {
        assert!(locate_element("<a><b></a>", "b").is_err());
    }
}
