//! Sort criteria and the compiled sibling comparator.

use std::borrow::Cow;
use std::cmp::Ordering;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::collate::{CollationKey, Collator};
use crate::item::{Entry, Item};

lazy_static! {
    static ref SCHEME_PREFIX: Regex = Regex::new(r"^\S+?://").unwrap();
}

/// Item attribute a sort can be keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Title,
    Url,
    Description,
    Keyword,
    DateAdded,
    LastModified,
    LastVisited,
    AccessCount,
    /// Host segments reversed, so `mail.google.com` sorts as `com.google.mail`.
    DomainReversed,
}

impl SortKey {
    /// Keys in preference index order.
    pub const TABLE: [SortKey; 9] = [
        SortKey::Title,
        SortKey::Url,
        SortKey::Description,
        SortKey::Keyword,
        SortKey::DateAdded,
        SortKey::LastModified,
        SortKey::LastVisited,
        SortKey::AccessCount,
        SortKey::DomainReversed,
    ];

    /// Look up a key by its preference index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::TABLE.get(index).copied()
    }

    pub fn index(&self) -> usize {
        Self::TABLE.iter().position(|k| k == self).unwrap_or(0)
    }

    /// Text keys use collation; the rest compare numerically.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            SortKey::Title
                | SortKey::Url
                | SortKey::Description
                | SortKey::Keyword
                | SortKey::DomainReversed
        )
    }

    fn text<'a>(&self, entry: &'a Entry) -> Cow<'a, str> {
        match self {
            SortKey::Title => Cow::Borrowed(&entry.title),
            SortKey::Url => Cow::Borrowed(&entry.url),
            SortKey::Description => Cow::Borrowed(&entry.description),
            SortKey::Keyword => Cow::Borrowed(&entry.keyword),
            SortKey::DomainReversed => Cow::Owned(domain_reversed(&entry.url)),
            _ => Cow::Borrowed(""),
        }
    }

    fn number(&self, entry: &Entry) -> i64 {
        match self {
            SortKey::DateAdded => entry.date_added,
            SortKey::LastModified => entry.last_modified,
            SortKey::LastVisited => entry.last_visited,
            SortKey::AccessCount => entry.access_count,
            _ => 0,
        }
    }

    fn value(&self, entry: &Entry) -> KeyValue {
        if self.is_text() {
            KeyValue::Text(CollationKey::new(&self.text(entry)))
        } else {
            KeyValue::Number(self.number(entry))
        }
    }
}

/// Value of one sort key for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyValue {
    Text(CollationKey),
    Number(i64),
}

/// Key values of one item, extracted once per sort.
#[derive(Debug, Default)]
struct Prepared {
    primary: Option<KeyValue>,
    secondary: Option<KeyValue>,
    /// Only set for plain folders under a distinct folder order.
    folder: Option<KeyValue>,
}

/// Reverse the host segments of a URL.
///
/// The scheme prefix is dropped and only the host-like segment before the
/// first `/` is kept. Empty or host-less URLs yield an empty string.
pub fn domain_reversed(url: &str) -> String {
    let rest = SCHEME_PREFIX.replace(url.trim(), "");
    let host = rest.split('/').next().unwrap_or("");
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return String::new();
    }
    host.split('.').rev().collect::<Vec<_>>().join(".")
}

/// Everything needed to build a [`Comparator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriteria {
    pub primary_key: SortKey,
    pub primary_reverse: bool,
    pub secondary_key: Option<SortKey>,
    pub secondary_reverse: bool,
    /// Order plain folders among themselves by `folder_key` alone.
    pub distinct_folder_order: bool,
    pub folder_key: Option<SortKey>,
    pub folder_reverse: bool,
    pub case_insensitive: bool,
}

impl Default for SortCriteria {
    fn default() -> Self {
        Self {
            primary_key: SortKey::Title,
            primary_reverse: false,
            secondary_key: None,
            secondary_reverse: false,
            distinct_folder_order: false,
            folder_key: None,
            folder_reverse: false,
            case_insensitive: false,
        }
    }
}

/// Total order over sibling items, compiled from [`SortCriteria`].
///
/// Decisions, first one wins:
/// 1. corrupted items sort last and tie with each other
/// 2. lower `type_priority` first, regardless of reverse flags
/// 3. with a distinct folder order, two folders compare by the folder key
///    (or tie when none is set)
/// 4. primary key, then secondary key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    criteria: SortCriteria,
    collator: Collator,
}

impl Comparator {
    pub fn build(criteria: SortCriteria) -> Self {
        let collator = Collator::new(criteria.case_insensitive);
        Self { criteria, collator }
    }

    pub fn criteria(&self) -> &SortCriteria {
        &self.criteria
    }

    fn prepare(&self, item: &Item) -> Prepared {
        let Some(entry) = item.entry() else {
            return Prepared::default();
        };
        let c = &self.criteria;
        let folder = if c.distinct_folder_order && item.is_folder() {
            c.folder_key.map(|key| key.value(entry))
        } else {
            None
        };
        Prepared {
            primary: Some(c.primary_key.value(entry)),
            secondary: c.secondary_key.map(|key| key.value(entry)),
            folder,
        }
    }

    fn compare_values(
        &self,
        a: &Option<KeyValue>,
        b: &Option<KeyValue>,
        reverse: bool,
    ) -> Ordering {
        let ordering = match (a, b) {
            (Some(KeyValue::Text(a)), Some(KeyValue::Text(b))) => self.collator.compare(a, b),
            (Some(KeyValue::Number(a)), Some(KeyValue::Number(b))) => a.cmp(b),
            _ => Ordering::Equal,
        };
        if reverse {
            ordering.reverse()
        } else {
            ordering
        }
    }

    /// Compare two items. Key values are extracted for this call only;
    /// [`Comparator::sort`] extracts them once per item instead.
    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        self.compare_prepared(a, &self.prepare(a), b, &self.prepare(b))
    }

    fn compare_prepared(&self, a: &Item, pa: &Prepared, b: &Item, pb: &Prepared) -> Ordering {
        let (ea, eb) = match (a.entry(), b.entry()) {
            (Some(ea), Some(eb)) => (ea, eb),
            // Separators never reach the comparator; keep the order total anyway.
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
        };

        match (ea.corrupted, eb.corrupted) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        if ea.type_priority != eb.type_priority {
            return ea.type_priority.cmp(&eb.type_priority);
        }

        let c = &self.criteria;
        if c.distinct_folder_order && a.is_folder() && b.is_folder() {
            return self.compare_values(&pa.folder, &pb.folder, c.folder_reverse);
        }

        self.compare_values(&pa.primary, &pb.primary, c.primary_reverse)
            .then_with(|| self.compare_values(&pa.secondary, &pb.secondary, c.secondary_reverse))
    }

    /// Stable sort; ties keep their input order.
    pub fn sort(&self, items: &mut Vec<Item>) {
        let mut keyed: Vec<(Prepared, Item)> = items
            .drain(..)
            .map(|item| (self.prepare(&item), item))
            .collect();
        keyed.sort_by(|(pa, a), (pb, b)| self.compare_prepared(a, pa, b, pb));
        items.extend(keyed.into_iter().map(|(_, item)| item));
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::build(SortCriteria::default())
    }
}
