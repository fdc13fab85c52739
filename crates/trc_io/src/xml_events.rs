//! Neutral SAX-style event stream over `quick_xml`, shared by the database
//! loader here and by `trc_pipeline`'s log ingestion so neither consumer
//! depends on `quick_xml` types directly.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::IoError;

/// One SAX event. `Start` carries `empty: true` for a self-closing element
/// (`<xinclude_start/>`); no matching `End` is ever produced for it, so
/// consumers must not wait for one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum XmlEvent {
    Start { name: String, attrs: Vec<(String, String)>, empty: bool },
    End { name: String },
    Text(String),
}

pub struct XmlEvents<'a> {
    reader: Reader<&'a [u8]>,
    buf: Vec<u8>,
    done: bool,
}

impl<'a> XmlEvents<'a> {
    pub fn new(xml: &'a str) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        XmlEvents { reader, buf: Vec::new(), done: false }
    }

    pub fn position(&self) -> usize {
        self.reader.buffer_position() as usize
    }
}

fn name_of(e: &quick_xml::events::BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attrs_of(e: &quick_xml::events::BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = a.unescape_value().map(|v| v.into_owned()).unwrap_or_default();
            (key, value)
        })
        .collect()
}

impl<'a> Iterator for XmlEvents<'a> {
    type Item = Result<XmlEvent, IoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(IoError::Xml { pos: self.reader.buffer_position() as usize, msg: e.to_string() }));
                }
                Ok(Event::Eof) => {
                    self.done = true;
                    return None;
                }
                Ok(Event::Start(e)) => {
                    return Some(Ok(XmlEvent::Start { name: name_of(&e), attrs: attrs_of(&e), empty: false }));
                }
                Ok(Event::Empty(e)) => {
                    return Some(Ok(XmlEvent::Start { name: name_of(&e), attrs: attrs_of(&e), empty: true }));
                }
                Ok(Event::End(e)) => {
                    return Some(Ok(XmlEvent::End { name: String::from_utf8_lossy(e.name().as_ref()).into_owned() }));
                }
                Ok(Event::Text(e)) => match e.unescape() {
                    Ok(text) if !text.trim().is_empty() => return Some(Ok(XmlEvent::Text(text.into_owned()))),
                    Ok(_) => continue,
                    Err(err) => {
                        self.done = true;
                        return Some(Err(IoError::Xml { pos: self.reader.buffer_position() as usize, msg: err.to_string() }));
                    }
                },
                _ => continue,
            }
        }
    }
}
