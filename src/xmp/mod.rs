//! XMP (RDF/XML) packets carried in APP1 segments.
//!
//! Only the properties listed in [`Property`] are interpreted. Everything else in a
//! packet is carried along as text: the writer streams the prior packet through and
//! only replaces the elements and attributes of properties it is asked to update.
//!
//! | Property | XML name | Form |
//! |---|---|---|
//! | Title | `dc:title` | language alternative |
//! | Creator | `dc:creator` | ordered sequence |
//! | Description | `dc:description` | language alternative |
//! | Rights | `dc:rights` | language alternative |
//! | Source | `dc:source` | simple |
//! | Subject | `dc:subject` | unordered bag |
//! | City, Country, State, Headline, DateCreated, AuthorsPosition, CaptionWriter | `photoshop:*` | simple |
//! | Marked | `xmpRights:Marked` | simple (`True`/`False`) |
//! | UsageTerms | `xmpRights:UsageTerms` | language alternative |
//! | WebStatement | `xmpRights:WebStatement` | simple |

mod chunk;
mod reader;
mod writer;

pub use chunk::{join_payloads, split_packet, MAX_CHUNK};

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Namespace URIs used by the understood properties.
pub mod ns {
    pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const DC: &str = "http://purl.org/dc/elements/1.1/";
    pub const PHOTOSHOP: &str = "http://ns.adobe.com/photoshop/1.0/";
    pub const XMP_RIGHTS: &str = "http://ns.adobe.com/xap/1.0/rights/";
}

/// How a property's value is laid out in RDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Simple,
    /// `rdf:Alt` of `xml:lang` tagged items; `x-default` is the canonical one.
    LangAlt,
    Seq,
    Bag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Property {
    Title,
    Creator,
    Description,
    Rights,
    Source,
    Subject,
    City,
    Country,
    State,
    Headline,
    DateCreated,
    AuthorsPosition,
    CaptionWriter,
    Marked,
    UsageTerms,
    WebStatement,
}

impl Property {
    pub const ALL: [Property; 16] = [
        Property::Title,
        Property::Creator,
        Property::Description,
        Property::Rights,
        Property::Source,
        Property::Subject,
        Property::City,
        Property::Country,
        Property::State,
        Property::Headline,
        Property::DateCreated,
        Property::AuthorsPosition,
        Property::CaptionWriter,
        Property::Marked,
        Property::UsageTerms,
        Property::WebStatement,
    ];

    pub fn namespace(self) -> &'static str {
        match self {
            Property::Title
            | Property::Creator
            | Property::Description
            | Property::Rights
            | Property::Source
            | Property::Subject => ns::DC,
            Property::Marked | Property::UsageTerms | Property::WebStatement => ns::XMP_RIGHTS,
            _ => ns::PHOTOSHOP,
        }
    }

    /// Conventional prefix, used when the writer has to declare the namespace.
    pub fn prefix(self) -> &'static str {
        match self.namespace() {
            ns::DC => "dc",
            ns::XMP_RIGHTS => "xmpRights",
            _ => "photoshop",
        }
    }

    pub fn local_name(self) -> &'static str {
        match self {
            Property::Title => "title",
            Property::Creator => "creator",
            Property::Description => "description",
            Property::Rights => "rights",
            Property::Source => "source",
            Property::Subject => "subject",
            Property::City => "City",
            Property::Country => "Country",
            Property::State => "State",
            Property::Headline => "Headline",
            Property::DateCreated => "DateCreated",
            Property::AuthorsPosition => "AuthorsPosition",
            Property::CaptionWriter => "CaptionWriter",
            Property::Marked => "Marked",
            Property::UsageTerms => "UsageTerms",
            Property::WebStatement => "WebStatement",
        }
    }

    pub fn form(self) -> Form {
        match self {
            Property::Title | Property::Description | Property::Rights | Property::UsageTerms => {
                Form::LangAlt
            }
            Property::Creator => Form::Seq,
            Property::Subject => Form::Bag,
            _ => Form::Simple,
        }
    }

    /// Qualified name as written by this crate, e.g. `dc:title`.
    pub fn qualified_name(self) -> String {
        format!("{}:{}", self.prefix(), self.local_name())
    }

    pub(crate) fn lookup(namespace: &[u8], local_name: &[u8]) -> Option<Property> {
        Property::ALL.into_iter().find(|p| {
            p.namespace().as_bytes() == namespace && p.local_name().as_bytes() == local_name
        })
    }
}

/// Values of the understood properties. Simple and language-alternative properties
/// hold one value; arrays hold their items in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmpProperties {
    values: BTreeMap<Property, Vec<String>>,
}

impl XmpProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: Property) -> Option<&str> {
        self.values
            .get(&property)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn values(&self, property: Property) -> &[String] {
        self.values
            .get(&property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, property: Property) -> bool {
        self.values.contains_key(&property)
    }

    pub fn set(&mut self, property: Property, value: impl Into<String>) {
        self.values.insert(property, vec![value.into()]);
    }

    /// Store a full value list. As an update, an empty list removes the property.
    pub fn set_values(&mut self, property: Property, values: Vec<String>) {
        self.values.insert(property, values);
    }

    pub fn remove(&mut self, property: Property) -> Option<Vec<String>> {
        self.values.remove(&property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Property, &[String])> {
        self.values.iter().map(|(p, v)| (*p, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An XMP packet and the properties parsed from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmpDocument {
    packet: Option<String>,
    properties: XmpProperties,
}

impl XmpDocument {
    /// No packet at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a packet. Malformed XML is a [`Error::MetadataParse`] error.
    pub fn parse(packet: impl Into<String>) -> Result<Self> {
        let packet = packet.into();
        let properties = reader::read_properties(&packet)?;
        log::debug!("Parsed XMP packet: {} understood properties", properties.len());
        Ok(Self {
            packet: Some(packet),
            properties,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let packet = std::str::from_utf8(bytes)
            .map_err(|e| Error::xmp(format!("packet is not UTF-8: {e}")))?;
        // Trailing NUL padding shows up in some files
        Self::parse(packet.trim_end_matches('\0'))
    }

    /// Rebuild a document from the APP1 payloads of a JPEG, in stream order.
    /// Returns `None` when there are none.
    pub fn from_app1_payloads<'a>(
        payloads: impl IntoIterator<Item = &'a [u8]>,
    ) -> Result<Option<Self>> {
        match join_payloads(payloads) {
            Some(packet) => Self::from_bytes(&packet).map(Some),
            None => Ok(None),
        }
    }

    pub fn packet(&self) -> Option<&str> {
        self.packet.as_deref()
    }

    pub fn properties(&self) -> &XmpProperties {
        &self.properties
    }

    pub fn is_empty(&self) -> bool {
        self.packet.is_none()
    }

    /// A new document with `updates` applied on top of this one. Properties in
    /// `updates` with an empty value list are removed.
    pub fn with_updates(&self, updates: &XmpProperties) -> Result<Self> {
        let packet = writer::rewrite(self.packet(), updates)?;
        Self::parse(packet)
    }

    /// APP1 payloads (signature included) carrying this packet.
    pub fn to_app1_payloads(&self) -> Vec<Vec<u8>> {
        match &self.packet {
            Some(packet) => split_packet(packet.as_bytes()),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Property table ───────────────────────────────────────────────

    #[test]
    fn lookup_matches_namespace_and_name() {
        assert_eq!(
            Property::lookup(ns::DC.as_bytes(), b"subject"),
            Some(Property::Subject)
        );
        assert_eq!(
            Property::lookup(ns::PHOTOSHOP.as_bytes(), b"City"),
            Some(Property::City)
        );
        assert_eq!(Property::lookup(ns::PHOTOSHOP.as_bytes(), b"subject"), None);
        assert_eq!(Property::lookup(ns::DC.as_bytes(), b"Title"), None);
    }

    #[test]
    fn qualified_names_use_conventional_prefixes() {
        assert_eq!(Property::Title.qualified_name(), "dc:title");
        assert_eq!(Property::AuthorsPosition.qualified_name(), "photoshop:AuthorsPosition");
        assert_eq!(Property::WebStatement.qualified_name(), "xmpRights:WebStatement");
    }

    // ── XmpDocument ──────────────────────────────────────────────────

    #[test]
    fn updates_on_empty_document_create_a_packet() {
        let mut updates = XmpProperties::new();
        updates.set(Property::Title, "X");
        updates.set_values(Property::Subject, vec!["k1".into()]);

        let doc = XmpDocument::empty().with_updates(&updates).unwrap();
        assert!(doc.packet().unwrap().starts_with("<?xpacket"));
        assert_eq!(doc.properties().get(Property::Title), Some("X"));
        assert_eq!(doc.properties().values(Property::Subject), ["k1"]);
    }

    #[test]
    fn from_bytes_rejects_invalid_utf8() {
        assert!(matches!(
            XmpDocument::from_bytes(&[0x3C, 0xFF, 0xFE]).unwrap_err(),
            Error::MetadataParse { .. }
        ));
    }

    #[test]
    fn app1_payloads_round_trip_through_the_document() {
        let mut updates = XmpProperties::new();
        updates.set(Property::Description, "d".repeat(100_000));
        let doc = XmpDocument::empty().with_updates(&updates).unwrap();

        let payloads = doc.to_app1_payloads();
        assert!(payloads.len() >= 2);
        let back = XmpDocument::from_app1_payloads(payloads.iter().map(Vec::as_slice))
            .unwrap()
            .unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn no_payloads_means_no_document() {
        assert_eq!(XmpDocument::from_app1_payloads(std::iter::empty()).unwrap(), None);
    }
}
