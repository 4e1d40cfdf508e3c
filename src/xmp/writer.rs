use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, QName, ResolveResult};
use quick_xml::{NsReader, Writer};

use super::reader::{bound_namespace, xml_error};
use super::{ns, Form, Property, XmpProperties};
use crate::error::{Error, Result};

/// Packet used when an image has no XMP yet.
const EMPTY_PACKET: &str = "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>
<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">
 <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">
  <rdf:Description rdf:about=\"\"/>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end=\"w\"?>";

/// Namespace declarations the target description still needs, and prefixes that
/// are bound to some other namespace there and must be declared per element.
struct Bindings {
    rdf_prefix: Option<String>,
    missing: Vec<(&'static str, &'static str)>,
    conflicting: Vec<&'static str>,
}

impl Bindings {
    fn rdf(&self, local: &str) -> String {
        match &self.rdf_prefix {
            Some(prefix) => format!("{prefix}:{local}"),
            None => local.to_string(),
        }
    }
}

/// Stream `previous` (or a fresh packet) through, replacing every property named in
/// `updates`.
///
/// Updated properties are dropped wherever they occur as a child element or an
/// attribute of an `rdf:Description`; their new values are appended as elements of the
/// first description. Everything else is copied event by event.
pub(super) fn rewrite(previous: Option<&str>, updates: &XmpProperties) -> Result<String> {
    let source = previous
        .filter(|packet| !packet.trim().is_empty())
        .unwrap_or(EMPTY_PACKET);
    let mut reader = NsReader::from_str(source);
    let mut writer = Writer::new(Vec::new());

    // true for each open element that is an rdf:Description
    let mut stack: Vec<bool> = Vec::new();
    let mut skip_depth = 0usize;
    let mut target: Option<(usize, Bindings)> = None;
    let mut inserted = false;

    loop {
        let position = reader.buffer_position();
        let (namespace, event) = reader
            .read_resolved_event()
            .map_err(|e| xml_error(e, position))?;
        let namespace = bound_namespace(namespace);

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                if skip_depth > 0 {
                    if !is_empty {
                        skip_depth += 1;
                    }
                    continue;
                }

                let local = e.local_name();
                let in_description = stack.last() == Some(&true);
                let updated = namespace
                    .as_deref()
                    .and_then(|uri| Property::lookup(uri, local.as_ref()))
                    .is_some_and(|p| updates.contains(p));
                if in_description && updated {
                    if !is_empty {
                        skip_depth = 1;
                    }
                    continue;
                }

                let is_description = namespace.as_deref() == Some(ns::RDF.as_bytes())
                    && local.as_ref() == b"Description";
                if !is_description {
                    write(&mut writer, event.clone())?;
                    if !is_empty {
                        stack.push(false);
                    }
                    continue;
                }

                let mut start = filtered_description(&reader, e, updates)?;
                if target.is_none() && !inserted {
                    let bindings = bindings_for(&reader, e, updates);
                    for (prefix, uri) in &bindings.missing {
                        start.push_attribute((format!("xmlns:{prefix}").as_str(), *uri));
                    }
                    if is_empty {
                        // Expand so the new properties have somewhere to go
                        write(&mut writer, Event::Start(start))?;
                        write_properties(&mut writer, updates, &bindings)?;
                        write(&mut writer, Event::End(BytesEnd::new(element_name(e))))?;
                        inserted = true;
                    } else {
                        write(&mut writer, Event::Start(start))?;
                        target = Some((stack.len(), bindings));
                    }
                } else if is_empty {
                    write(&mut writer, Event::Empty(start))?;
                } else {
                    write(&mut writer, Event::Start(start))?;
                }
                if !is_empty {
                    stack.push(true);
                }
            }
            Event::End(ref e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                stack.pop();
                if let Some((depth, bindings)) = &target {
                    if *depth == stack.len() && !inserted {
                        if updates.iter().any(|(_, values)| !values.is_empty()) {
                            write_properties(&mut writer, updates, bindings)?;
                            write(&mut writer, Event::Text(BytesText::new("\n  ")))?;
                        }
                        inserted = true;
                    }
                }
                if !inserted
                    && namespace.as_deref() == Some(ns::RDF.as_bytes())
                    && e.local_name().as_ref() == b"RDF"
                {
                    // An rdf:RDF without any description
                    let rdf_prefix = prefix_of(e.name());
                    write_new_description(&mut writer, updates, rdf_prefix)?;
                    inserted = true;
                }
                write(&mut writer, event.clone())?;
            }
            Event::Eof => break,
            _ => {
                if skip_depth == 0 {
                    write(&mut writer, event.clone())?;
                }
            }
        }
    }

    if !inserted && !updates.is_empty() {
        return Err(Error::xmp("packet has no rdf:RDF element to hold properties"));
    }

    String::from_utf8(writer.into_inner()).map_err(|e| Error::xmp(e.to_string()))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::xmp(format!("cannot serialize packet: {e}")))
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn prefix_of(name: QName<'_>) -> Option<String> {
    name.prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

/// The description start tag, minus the attributes of updated properties. The
/// original tag is reused as-is when nothing has to go.
fn filtered_description(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
    updates: &XmpProperties,
) -> Result<BytesStart<'static>> {
    let mut kept = Vec::new();
    let mut dropped = false;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::xmp(err.to_string()))?;
        if attr.key.as_namespace_binding().is_none() {
            let (namespace, local) = reader.resolve_attribute(attr.key);
            let updated = bound_namespace(namespace)
                .and_then(|uri| Property::lookup(&uri, local.as_ref()))
                .is_some_and(|p| updates.contains(p));
            if updated {
                dropped = true;
                continue;
            }
        }
        kept.push(attr);
    }

    if !dropped {
        return Ok(e.clone().into_owned());
    }
    let mut start = BytesStart::new(element_name(e));
    for attr in kept {
        start.push_attribute(attr);
    }
    Ok(start.into_owned())
}

fn bindings_for(reader: &NsReader<&[u8]>, e: &BytesStart<'_>, updates: &XmpProperties) -> Bindings {
    let mut bindings = Bindings {
        rdf_prefix: prefix_of(e.name()),
        missing: Vec::new(),
        conflicting: Vec::new(),
    };
    for (property, _) in updates.iter() {
        let (prefix, uri) = (property.prefix(), property.namespace());
        if bindings.missing.iter().any(|(p, _)| *p == prefix) || bindings.conflicting.contains(&prefix) {
            continue;
        }
        let qualified = format!("{prefix}:x");
        match reader.resolve_element(QName(qualified.as_bytes())).0 {
            ResolveResult::Bound(Namespace(bound)) if bound == uri.as_bytes() => {}
            ResolveResult::Bound(_) => bindings.conflicting.push(prefix),
            _ => bindings.missing.push((prefix, uri)),
        }
    }
    bindings
}

fn write_new_description(
    writer: &mut Writer<Vec<u8>>,
    updates: &XmpProperties,
    rdf_prefix: Option<String>,
) -> Result<()> {
    let mut bindings = Bindings {
        rdf_prefix,
        missing: Vec::new(),
        conflicting: Vec::new(),
    };
    for (property, _) in updates.iter() {
        let entry = (property.prefix(), property.namespace());
        if !bindings.missing.contains(&entry) {
            bindings.missing.push(entry);
        }
    }

    let mut start = BytesStart::new(bindings.rdf("Description"));
    start.push_attribute((bindings.rdf("about").as_str(), ""));
    for (prefix, uri) in &bindings.missing {
        start.push_attribute((format!("xmlns:{prefix}").as_str(), *uri));
    }
    write(writer, Event::Text(BytesText::new("  ")))?;
    write(writer, Event::Start(start))?;
    write_properties(writer, updates, &bindings)?;
    write(writer, Event::Text(BytesText::new("\n  ")))?;
    write(writer, Event::End(BytesEnd::new(bindings.rdf("Description"))))?;
    write(writer, Event::Text(BytesText::new("\n ")))
}

/// New property elements, in property table order. Empty value lists are removals
/// and produce nothing.
fn write_properties(
    writer: &mut Writer<Vec<u8>>,
    updates: &XmpProperties,
    bindings: &Bindings,
) -> Result<()> {
    for (property, values) in updates.iter() {
        if values.is_empty() {
            continue;
        }
        let name = property.qualified_name();
        let mut start = BytesStart::new(name.as_str());
        if bindings.conflicting.contains(&property.prefix()) {
            start.push_attribute((
                format!("xmlns:{}", property.prefix()).as_str(),
                property.namespace(),
            ));
        }

        write(writer, Event::Text(BytesText::new("\n   ")))?;
        write(writer, Event::Start(start))?;
        match property.form() {
            Form::Simple => write(writer, Event::Text(BytesText::new(&values[0])))?,
            Form::LangAlt => {
                write_container(writer, bindings, "Alt", &values[..1], Some("x-default"))?
            }
            Form::Seq => write_container(writer, bindings, "Seq", values, None)?,
            Form::Bag => write_container(writer, bindings, "Bag", values, None)?,
        }
        write(writer, Event::End(BytesEnd::new(name)))?;
    }
    Ok(())
}

fn write_container(
    writer: &mut Writer<Vec<u8>>,
    bindings: &Bindings,
    kind: &str,
    values: &[String],
    lang: Option<&str>,
) -> Result<()> {
    let container = bindings.rdf(kind);
    let li = bindings.rdf("li");
    write(writer, Event::Start(BytesStart::new(container.as_str())))?;
    for value in values {
        let mut item = BytesStart::new(li.as_str());
        if let Some(lang) = lang {
            item.push_attribute(("xml:lang", lang));
        }
        write(writer, Event::Start(item))?;
        write(writer, Event::Text(BytesText::new(value)))?;
        write(writer, Event::End(BytesEnd::new(li.as_str())))?;
    }
    write(writer, Event::End(BytesEnd::new(container)))
}
