use super::{ExtendedMetadata, Field};
use crate::error::Result;
use crate::iptc::{dataset, IptcStore};
use crate::xmp::{Property, XmpDocument, XmpProperties};

fn parse_marked(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Combine both schemas into one view.
///
/// A non-empty XMP value wins over the IPTC one. An empty XMP value only yields to
/// an IPTC value, so an empty XMP-only field reads back as empty. Keywords are the
/// union of both lists, IPTC order first. `marked` follows `xmpRights:Marked` when
/// the packet has it, otherwise it is set when a copyright notice is present.
pub fn merge(iptc: &IptcStore, xmp: Option<&XmpDocument>) -> ExtendedMetadata {
    let empty = XmpProperties::new();
    let props = xmp.map(XmpDocument::properties).unwrap_or(&empty);
    let mut meta = ExtendedMetadata::new();

    for field in Field::ALL {
        let from_xmp = field.xmp_property().and_then(|p| props.get(p));
        let from_iptc = field.iptc_dataset().and_then(|d| iptc.get(d));
        let value = match (from_xmp, from_iptc) {
            (Some(""), Some(i)) => Some(i),
            (Some(x), _) => Some(x),
            (None, i) => i,
        };
        if let Some(value) = value {
            meta.values.insert(field, value.to_string());
        }
    }

    for keyword in iptc
        .values(dataset::KEYWORDS)
        .iter()
        .chain(props.values(Property::Subject))
    {
        if !meta.keywords.contains(keyword) {
            meta.keywords.push(keyword.clone());
        }
    }

    meta.marked = match props.get(Property::Marked) {
        Some(value) => parse_marked(value),
        None => meta.get(Field::Copyright).is_some_and(|c| !c.is_empty()),
    };

    meta
}

/// Project the edited fields of `meta` back onto both schemas.
///
/// Every edited field is written to each schema it maps to, replacing whatever that
/// schema held. Fields that were not edited keep their previous representation.
/// `xmpRights:Marked` is only written when the image is marked or the previous
/// packet already carried the flag.
pub fn split(
    meta: &ExtendedMetadata,
    previous_iptc: &IptcStore,
    previous_xmp: &XmpDocument,
) -> Result<(IptcStore, XmpDocument)> {
    let mut iptc = previous_iptc.clone();
    let mut updates = XmpProperties::new();

    for field in meta.changed_fields() {
        let value = meta.get(field);
        if let Some(number) = field.iptc_dataset() {
            match value {
                Some(v) => iptc.set(number, v),
                None => {
                    iptc.remove(number);
                }
            }
        }
        if let Some(property) = field.xmp_property() {
            updates.set_values(property, value.map(|v| vec![v.to_string()]).unwrap_or_default());
        }
    }

    if meta.keywords_changed() {
        iptc.set_all(dataset::KEYWORDS, meta.keywords().to_vec());
        updates.set_values(Property::Subject, meta.keywords().to_vec());
    }

    let previous_marked = previous_xmp.properties().get(Property::Marked);
    if meta.is_marked() || previous_marked.is_some() {
        let wanted = if meta.is_marked() { "True" } else { "False" };
        if previous_marked.map(parse_marked) != Some(meta.is_marked()) {
            updates.set(Property::Marked, wanted);
        }
    }

    let xmp = if updates.is_empty() {
        previous_xmp.clone()
    } else {
        previous_xmp.with_updates(&updates)?
    };
    log::debug!(
        "Split metadata: {} XMP properties updated, IPTC dirty: {}",
        updates.len(),
        iptc.is_dirty()
    );
    Ok((iptc, xmp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iptc_with(entries: &[(u8, &str)]) -> IptcStore {
        let mut store = IptcStore::new();
        for (number, value) in entries {
            store.push(*number, *value);
        }
        store.mark_clean();
        store
    }

    fn xmp_with(entries: &[(Property, &[&str])]) -> XmpDocument {
        let mut updates = XmpProperties::new();
        for (property, values) in entries {
            updates.set_values(*property, values.iter().map(|v| v.to_string()).collect());
        }
        XmpDocument::empty().with_updates(&updates).unwrap()
    }

    // ── merge ────────────────────────────────────────────────────────

    #[test]
    fn keyword_union_has_no_duplicates() {
        let iptc = iptc_with(&[(dataset::KEYWORDS, "a"), (dataset::KEYWORDS, "b")]);
        let xmp = xmp_with(&[(Property::Subject, &["b", "c"])]);
        let meta = merge(&iptc, Some(&xmp));
        assert_eq!(meta.keywords(), ["a", "b", "c"]);
    }

    #[test]
    fn xmp_wins_when_present_and_non_empty() {
        let iptc = iptc_with(&[
            (dataset::OBJECT_NAME, "iptc title"),
            (dataset::CITY, "Bren"),
            (dataset::CONTACT, "me@example.com"),
        ]);
        let xmp = xmp_with(&[
            (Property::Title, &["xmp title"]),
            (Property::City, &[""]),
            (Property::WebStatement, &["http://example.com"]),
        ]);
        let meta = merge(&iptc, Some(&xmp));

        assert_eq!(meta.title(), Some("xmp title"));
        assert_eq!(meta.city(), Some("Bren"));
        assert_eq!(meta.contact(), Some("me@example.com"));
        assert_eq!(meta.web_statement(), Some("http://example.com"));
        assert!(!meta.is_dirty());
    }

    #[test]
    fn empty_xmp_only_value_reads_back_empty() {
        let xmp = xmp_with(&[(Property::WebStatement, &[""]), (Property::Source, &[""])]);
        let meta = merge(&IptcStore::new(), Some(&xmp));
        assert_eq!(meta.web_statement(), Some(""));
        assert_eq!(meta.source(), Some(""));

        // IPTC still fills in behind an empty XMP value
        let iptc = iptc_with(&[(dataset::SOURCE, "Agence")]);
        assert_eq!(merge(&iptc, Some(&xmp)).source(), Some("Agence"));
    }

    #[test]
    fn author_is_first_creator() {
        let xmp = xmp_with(&[(Property::Creator, &["Clement Escoffier", "Other"])]);
        let meta = merge(&IptcStore::new(), Some(&xmp));
        assert_eq!(meta.author(), Some("Clement Escoffier"));
    }

    #[test]
    fn marked_follows_xmp_then_copyright() {
        let iptc = iptc_with(&[(dataset::COPYRIGHT_NOTICE, "(c) bren")]);
        assert!(merge(&iptc, None).is_marked());

        let xmp = xmp_with(&[(Property::Marked, &["False"])]);
        assert!(!merge(&iptc, Some(&xmp)).is_marked());
        assert!(!merge(&IptcStore::new(), None).is_marked());
    }

    // ── split ────────────────────────────────────────────────────────

    #[test]
    fn edits_land_in_both_schemas() {
        let mut meta = ExtendedMetadata::new();
        meta.set_title("X");
        meta.set_keywords(["k1"]);
        let (iptc, xmp) = split(&meta, &IptcStore::new(), &XmpDocument::empty()).unwrap();

        assert_eq!(iptc.get(dataset::OBJECT_NAME), Some("X"));
        assert_eq!(iptc.values(dataset::KEYWORDS), ["k1"]);
        assert_eq!(xmp.properties().get(Property::Title), Some("X"));
        assert_eq!(xmp.properties().values(Property::Subject), ["k1"]);
    }

    #[test]
    fn untouched_fields_keep_their_previous_values() {
        let iptc = iptc_with(&[(dataset::CITY, "Bren"), (dataset::OBJECT_NAME, "Old")]);
        let mut meta = merge(&iptc, None);
        meta.set_title("New");
        let (iptc, xmp) = split(&meta, &iptc, &XmpDocument::empty()).unwrap();

        assert_eq!(iptc.get(dataset::CITY), Some("Bren"));
        assert_eq!(iptc.get(dataset::OBJECT_NAME), Some("New"));
        assert!(!xmp.properties().contains(Property::City));
    }

    #[test]
    fn split_then_merge_reproduces_edits() {
        let iptc = iptc_with(&[(dataset::KEYWORDS, "bois")]);
        let previous_xmp = xmp_with(&[(Property::Subject, &["bois"]), (Property::Source, &["old"])]);
        let mut meta = merge(&iptc, Some(&previous_xmp));
        meta.add_keyword("noir");
        meta.set_description("Une planche");
        meta.set_source("");
        meta.set_contact("bren@example.com");
        meta.clear(Field::Title);

        let (iptc, xmp) = split(&meta, &iptc, &previous_xmp).unwrap();
        let again = merge(&iptc, Some(&xmp));

        assert_eq!(again.keywords(), ["bois", "noir"]);
        assert_eq!(again.description(), Some("Une planche"));
        assert_eq!(again.source(), Some(""));
        assert_eq!(again.contact(), Some("bren@example.com"));
        assert_eq!(again.title(), None);
    }

    #[test]
    fn copyright_writes_marked_flag() {
        let mut meta = ExtendedMetadata::new();
        meta.set_copyright("(c) Clement Escoffier");
        let (_, xmp) = split(&meta, &IptcStore::new(), &XmpDocument::empty()).unwrap();
        assert_eq!(xmp.properties().get(Property::Marked), Some("True"));
        assert_eq!(xmp.properties().get(Property::Rights), Some("(c) Clement Escoffier"));
    }

    #[test]
    fn unmarked_image_without_flag_gets_no_flag() {
        let mut meta = ExtendedMetadata::new();
        meta.set_city("Bren");
        let (_, xmp) = split(&meta, &IptcStore::new(), &XmpDocument::empty()).unwrap();
        assert!(!xmp.properties().contains(Property::Marked));
    }

    #[test]
    fn clearing_marked_rewrites_existing_flag() {
        let previous = xmp_with(&[(Property::Marked, &["True"])]);
        let mut meta = merge(&IptcStore::new(), Some(&previous));
        meta.set_marked(false);
        let (_, xmp) = split(&meta, &IptcStore::new(), &previous).unwrap();
        assert_eq!(xmp.properties().get(Property::Marked), Some("False"));
    }

    #[test]
    fn no_edits_keep_the_previous_packet() {
        let previous = xmp_with(&[(Property::Title, &["Same"])]);
        let meta = merge(&IptcStore::new(), Some(&previous));
        let (iptc, xmp) = split(&meta, &IptcStore::new(), &previous).unwrap();
        assert_eq!(xmp, previous);
        assert!(!iptc.is_dirty());
    }
}
