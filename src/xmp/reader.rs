use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

use super::{ns, Form, Property, XmpProperties};
use crate::error::{Error, Result};

/// Namespace of an element or attribute, copied out of the reader's scope.
pub(super) fn bound_namespace(result: ResolveResult<'_>) -> Option<Vec<u8>> {
    match result {
        ResolveResult::Bound(Namespace(uri)) => Some(uri.to_vec()),
        _ => None,
    }
}

pub(super) fn xml_error(err: impl std::fmt::Display, position: impl std::fmt::Display) -> Error {
    Error::xmp(format!("{err} (near byte {position})"))
}

/// Value of an understood property while its element is open.
struct OpenProperty {
    property: Property,
    depth: usize,
    text: String,
    has_children: bool,
    items: Vec<(Option<String>, String)>,
    /// `(depth, xml:lang, text)` of the `rdf:li` being read.
    item: Option<(usize, Option<String>, String)>,
}

impl OpenProperty {
    fn new(property: Property, depth: usize) -> Self {
        Self {
            property,
            depth,
            text: String::new(),
            has_children: false,
            items: Vec::new(),
            item: None,
        }
    }

    fn finish(self) -> Vec<String> {
        if !self.has_children {
            return vec![self.text];
        }
        match self.property.form() {
            Form::LangAlt | Form::Simple => {
                let default = self
                    .items
                    .iter()
                    .position(|(lang, _)| lang.as_deref() == Some("x-default"))
                    .unwrap_or(0);
                self.items
                    .into_iter()
                    .nth(default)
                    .map(|(_, text)| vec![text])
                    .unwrap_or_default()
            }
            Form::Seq | Form::Bag => self.items.into_iter().map(|(_, text)| text).collect(),
        }
    }
}

fn is_rdf(namespace: Option<&[u8]>, local: &[u8], name: &str) -> bool {
    namespace == Some(ns::RDF.as_bytes()) && local == name.as_bytes()
}

/// Extract the understood properties of a packet.
///
/// Properties may appear as attributes of `rdf:Description` or as its child elements.
/// When a property occurs more than once the first occurrence wins.
pub(super) fn read_properties(packet: &str) -> Result<XmpProperties> {
    let mut reader = NsReader::from_str(packet);
    let mut properties = XmpProperties::new();
    let mut depth = 0usize;
    let mut descriptions: Vec<usize> = Vec::new();
    let mut open: Option<OpenProperty> = None;

    loop {
        let position = reader.buffer_position();
        let (namespace, event) = reader
            .read_resolved_event()
            .map_err(|e| xml_error(e, position))?;
        let namespace = bound_namespace(namespace);

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = e.local_name();
                let local = local.as_ref();

                if let Some(current) = open.as_mut() {
                    current.has_children = true;
                    if is_rdf(namespace.as_deref(), local, "li") {
                        let lang = attribute_value(e, b"xml:lang")?;
                        if is_empty {
                            current.items.push((lang, String::new()));
                        } else {
                            current.item = Some((depth, lang, String::new()));
                        }
                    }
                } else if descriptions.last().is_some_and(|&d| d + 1 == depth) {
                    if let Some(property) = namespace
                        .as_deref()
                        .and_then(|uri| Property::lookup(uri, local))
                    {
                        let mut current = OpenProperty::new(property, depth);
                        if let Some(resource) = attribute_value(e, b"rdf:resource")? {
                            current.text = resource;
                        }
                        if is_empty {
                            store_first(&mut properties, property, current.finish());
                        } else {
                            open = Some(current);
                        }
                    }
                }

                if open.is_none() && is_rdf(namespace.as_deref(), local, "Description") {
                    for (property, value) in description_attributes(&reader, e)? {
                        store_first(&mut properties, property, vec![value]);
                    }
                    if !is_empty {
                        descriptions.push(depth);
                    }
                }

                if !is_empty {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::xmp("unbalanced end tag"))?;

                if let Some(current) = open.as_mut() {
                    if current.item.as_ref().is_some_and(|(d, _, _)| *d == depth) {
                        if let Some((_, lang, text)) = current.item.take() {
                            current.items.push((lang, text));
                        }
                    }
                }
                if open.as_ref().is_some_and(|p| p.depth == depth) {
                    if let Some(current) = open.take() {
                        let property = current.property;
                        store_first(&mut properties, property, current.finish());
                    }
                }
                if descriptions.last() == Some(&depth) {
                    descriptions.pop();
                }
            }
            Event::Text(ref e) => {
                if let Some(current) = open.as_mut() {
                    let text = e.unescape().map_err(|err| xml_error(err, position))?;
                    append_text(current, &text);
                }
            }
            Event::CData(ref e) => {
                if let Some(current) = open.as_mut() {
                    append_text(current, &String::from_utf8_lossy(e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(Error::xmp(format!(
            "packet ends with {depth} unclosed element(s)"
        )));
    }
    Ok(properties)
}

fn store_first(properties: &mut XmpProperties, property: Property, values: Vec<String>) {
    if !values.is_empty() && !properties.contains(property) {
        properties.set_values(property, values);
    }
}

fn append_text(current: &mut OpenProperty, text: &str) {
    match current.item.as_mut() {
        Some((_, _, item_text)) => item_text.push_str(text),
        None if !current.has_children => current.text.push_str(text),
        // Whitespace between container elements
        None => {}
    }
}

fn attribute_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::xmp(err.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|err| Error::xmp(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Understood properties written in attribute form on an `rdf:Description`.
fn description_attributes(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
) -> Result<Vec<(Property, String)>> {
    let mut found = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::xmp(err.to_string()))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (namespace, local) = reader.resolve_attribute(attr.key);
        let Some(property) =
            bound_namespace(namespace).and_then(|uri| Property::lookup(&uri, local.as_ref()))
        else {
            continue;
        };
        let value = attr
            .unescape_value()
            .map_err(|err| Error::xmp(err.to_string()))?;
        found.push((property, value.into_owned()));
    }
    Ok(found)
}
