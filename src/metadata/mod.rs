//! The merged, schema independent view of an image's descriptive metadata.
//!
//! [`ExtendedMetadata`] is what callers read and edit. It is computed from the IPTC
//! store and the XMP document by [`merge`] and turned back into both by [`split`].
//! Each [`Field`] maps to an IPTC dataset, an XMP property, or both:
//!
//! | Field | IPTC | XMP |
//! |---|---|---|
//! | title | 2:05 Object Name | `dc:title` |
//! | author | 2:80 By-line | `dc:creator` (first item) |
//! | extended author | 2:85 By-line Title | `photoshop:AuthorsPosition` |
//! | copyright | 2:116 Copyright Notice | `dc:rights` |
//! | usage | 2:40 Special Instructions | `xmpRights:UsageTerms` |
//! | description | 2:120 Caption/Abstract | `dc:description` |
//! | synopsis | 2:105 Headline | `photoshop:Headline` |
//! | editor | 2:122 Writer/Editor | `photoshop:CaptionWriter` |
//! | city | 2:90 City | `photoshop:City` |
//! | country | 2:101 Country | `photoshop:Country` |
//! | state | 2:95 Province/State | `photoshop:State` |
//! | creation date | 2:55 Date Created | `photoshop:DateCreated` |
//! | source | 2:115 Source | `dc:source` |
//! | contact | 2:118 Contact | |
//! | web statement | | `xmpRights:WebStatement` |
//! | keywords | 2:25 Keywords | `dc:subject` |
//! | marked | | `xmpRights:Marked` |

mod merge;

pub use merge::{merge, split};

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::iptc::dataset;
use crate::xmp::Property;

/// A single-valued text field of [`ExtendedMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Title,
    Author,
    ExtendedAuthor,
    Copyright,
    Usage,
    Description,
    Synopsis,
    Editor,
    City,
    Country,
    State,
    CreationDate,
    Source,
    Contact,
    WebStatement,
}

impl Field {
    pub const ALL: [Field; 15] = [
        Field::Title,
        Field::Author,
        Field::ExtendedAuthor,
        Field::Copyright,
        Field::Usage,
        Field::Description,
        Field::Synopsis,
        Field::Editor,
        Field::City,
        Field::Country,
        Field::State,
        Field::CreationDate,
        Field::Source,
        Field::Contact,
        Field::WebStatement,
    ];

    pub fn iptc_dataset(self) -> Option<u8> {
        Some(match self {
            Field::Title => dataset::OBJECT_NAME,
            Field::Author => dataset::BYLINE,
            Field::ExtendedAuthor => dataset::BYLINE_TITLE,
            Field::Copyright => dataset::COPYRIGHT_NOTICE,
            Field::Usage => dataset::SPECIAL_INSTRUCTIONS,
            Field::Description => dataset::CAPTION_ABSTRACT,
            Field::Synopsis => dataset::HEADLINE,
            Field::Editor => dataset::WRITER_EDITOR,
            Field::City => dataset::CITY,
            Field::Country => dataset::COUNTRY,
            Field::State => dataset::PROVINCE_STATE,
            Field::CreationDate => dataset::DATE_CREATED,
            Field::Source => dataset::SOURCE,
            Field::Contact => dataset::CONTACT,
            Field::WebStatement => return None,
        })
    }

    pub fn xmp_property(self) -> Option<Property> {
        Some(match self {
            Field::Title => Property::Title,
            Field::Author => Property::Creator,
            Field::ExtendedAuthor => Property::AuthorsPosition,
            Field::Copyright => Property::Rights,
            Field::Usage => Property::UsageTerms,
            Field::Description => Property::Description,
            Field::Synopsis => Property::Headline,
            Field::Editor => Property::CaptionWriter,
            Field::City => Property::City,
            Field::Country => Property::Country,
            Field::State => Property::State,
            Field::CreationDate => Property::DateCreated,
            Field::Source => Property::Source,
            Field::WebStatement => Property::WebStatement,
            Field::Contact => return None,
        })
    }

    /// Name used in JSON output and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Author => "author",
            Field::ExtendedAuthor => "extendedAuthor",
            Field::Copyright => "copyright",
            Field::Usage => "usage",
            Field::Description => "description",
            Field::Synopsis => "synopsis",
            Field::Editor => "editor",
            Field::City => "city",
            Field::Country => "country",
            Field::State => "state",
            Field::CreationDate => "creationDate",
            Field::Source => "source",
            Field::Contact => "contact",
            Field::WebStatement => "webStatement",
        }
    }
}

impl std::str::FromStr for Field {
    type Err = String;

    /// Parse a field by its [`Field::name`], ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown field '{s}'"))
    }
}

/// What has been edited since the view was merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Changes {
    fields: BTreeSet<Field>,
    keywords: bool,
    marked: bool,
}

impl Changes {
    fn any(&self) -> bool {
        !self.fields.is_empty() || self.keywords || self.marked
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedMetadata {
    #[serde(flatten)]
    values: BTreeMap<Field, String>,
    keywords: Vec<String>,
    marked: bool,
    #[serde(skip)]
    changes: Changes,
}

macro_rules! field_accessors {
    ($($field:ident => $get:ident, $set:ident;)*) => {
        impl ExtendedMetadata {
            $(
                pub fn $get(&self) -> Option<&str> {
                    self.get(Field::$field)
                }

                pub fn $set(&mut self, value: impl Into<String>) {
                    self.set(Field::$field, value)
                }
            )*
        }
    };
}

field_accessors! {
    Title => title, set_title;
    Author => author, set_author;
    ExtendedAuthor => extended_author, set_extended_author;
    Copyright => copyright, set_copyright;
    Usage => usage, set_usage;
    Description => description, set_description;
    Synopsis => synopsis, set_synopsis;
    Editor => editor, set_editor;
    City => city, set_city;
    Country => country, set_country;
    State => state, set_state;
    CreationDate => creation_date, set_creation_date;
    Source => source, set_source;
    Contact => contact, set_contact;
    WebStatement => web_statement, set_web_statement;
}

impl ExtendedMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    /// Set a field. An empty string is stored and written as an empty value.
    ///
    /// A non-empty copyright marks the image as rights-reserved.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        if field == Field::Copyright && !value.is_empty() {
            self.set_marked(true);
        }
        self.values.insert(field, value);
        self.changes.fields.insert(field);
    }

    /// Remove a field from both schemas on the next write.
    pub fn clear(&mut self, field: Field) {
        self.values.remove(&field);
        self.changes.fields.insert(field);
    }

    /// Fields that currently have a value, in [`Field::ALL`] order.
    pub fn fields(&self) -> impl Iterator<Item = (Field, &str)> {
        self.values.iter().map(|(f, v)| (*f, v.as_str()))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Replace the keyword list. Duplicates are dropped, first occurrence wins.
    pub fn set_keywords<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.clear();
        for keyword in keywords {
            let keyword = keyword.into();
            if !self.keywords.contains(&keyword) {
                self.keywords.push(keyword);
            }
        }
        self.changes.keywords = true;
    }

    /// Append a keyword unless it is already present. Returns whether it was added.
    pub fn add_keyword(&mut self, keyword: impl Into<String>) -> bool {
        let keyword = keyword.into();
        if self.keywords.contains(&keyword) {
            return false;
        }
        self.keywords.push(keyword);
        self.changes.keywords = true;
        true
    }

    pub fn remove_keyword(&mut self, keyword: &str) -> bool {
        let before = self.keywords.len();
        self.keywords.retain(|k| k != keyword);
        let removed = self.keywords.len() != before;
        if removed {
            self.changes.keywords = true;
        }
        removed
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }

    pub fn set_marked(&mut self, marked: bool) {
        self.marked = marked;
        self.changes.marked = true;
    }

    /// True once any field, the keyword list or the marked flag has been set.
    pub fn is_dirty(&self) -> bool {
        self.changes.any()
    }

    pub fn mark_clean(&mut self) {
        self.changes = Changes::default();
    }

    pub(crate) fn changed_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.changes.fields.iter().copied()
    }

    pub(crate) fn keywords_changed(&self) -> bool {
        self.changes.keywords
    }

    pub(crate) fn marked_changed(&self) -> bool {
        self.changes.marked
    }

    /// True when no field, keyword or mark is present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.keywords.is_empty() && !self.marked
    }
}
