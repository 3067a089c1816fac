//! Types and functions for parsing and formatting MediaWiki title strings.

use html_escape::decode_html_entities;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use std::{borrow::Cow, sync::LazyLock};
use unicase::UniCase;

/// The title casing strategy for a namespace.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NamespaceCase {
    /// The first letter of the namespace name is capitalised.
    #[default]
    FirstLetter,
    /// The namespace name is case-sensitive.
    CaseSensitive,
}

impl NamespaceCase {
    /// Parses the siteinfo spelling of a case rule.
    pub fn from_siteinfo(case: &str) -> Option<Self> {
        match case {
            "first-letter" => Some(Self::FirstLetter),
            "case-sensitive" => Some(Self::CaseSensitive),
            _ => None,
        }
    }
}

/// An article namespace.
#[derive(Clone, Debug, Eq)]
pub struct Namespace {
    /// The namespace ID.
    pub id: i32,
    /// The display name of the namespace.
    pub name: String,
    /// The canonical name of the namespace.
    ///
    /// For example, the canonical 'Project' namespace, present on all MW
    /// installations, is normally given a display name matching the name of the
    /// wiki.
    pub canonical: Option<String>,
    /// The case folding strategy for titles in the namespace.
    pub case: NamespaceCase,
    /// Whether the namespace supports subpages.
    pub subpages: bool,
    /// Whether pages within this namespace should be considered the ‘main’
    /// content of the wiki.
    pub content: bool,
    /// Named aliases for the namespace.
    pub aliases: Vec<String>,
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Namespace {
    /// The special namespace ID used for direct links to media files.
    pub const MEDIA: i32 = -2;
    /// The special namespace ID used for dynamic pages.
    pub const SPECIAL: i32 = -1;
    /// The main namespace ID.
    pub const MAIN: i32 = 0;
    /// The talk namespace ID.
    pub const TALK: i32 = 1;
    /// The user namespace ID.
    pub const USER: i32 = 2;
    /// The user talk namespace ID.
    pub const USER_TALK: i32 = 3;
    /// The project namespace ID.
    pub const PROJECT: i32 = 4;
    /// The project talk namespace ID.
    pub const PROJECT_TALK: i32 = 5;
    /// The file namespace ID.
    pub const FILE: i32 = 6;
    /// The file talk namespace ID.
    pub const FILE_TALK: i32 = 7;
    /// The system namespace ID.
    pub const MEDIAWIKI: i32 = 8;
    /// The system talk namespace ID.
    pub const MEDIAWIKI_TALK: i32 = 9;
    /// The template namespace ID.
    pub const TEMPLATE: i32 = 10;
    /// The template talk namespace ID.
    pub const TEMPLATE_TALK: i32 = 11;
    /// The help namespace ID.
    pub const HELP: i32 = 12;
    /// The help talk namespace ID.
    pub const HELP_TALK: i32 = 13;
    /// The category namespace ID.
    pub const CATEGORY: i32 = 14;
    /// The category talk namespace ID.
    pub const CATEGORY_TALK: i32 = 15;

    /// Creates a namespace with default flags.
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            canonical: (!name.is_empty()).then(|| name.clone()),
            name,
            case: NamespaceCase::FirstLetter,
            subpages: id > Self::MAIN && id != Self::FILE && id != Self::MEDIAWIKI,
            content: id == Self::MAIN,
            aliases: Vec::new(),
        }
    }

    /// Returns the associated ID (talk -> subject, or subject -> talk) of a
    /// namespace.
    #[inline]
    pub const fn associated_id(id: i32) -> i32 {
        if Self::is_talk_id(id) { id - 1 } else { id + 1 }
    }

    /// Returns true if the ID is a talk namespace ID.
    #[inline]
    pub const fn is_talk_id(id: i32) -> bool {
        id > Namespace::MAIN && id % 2 == 1
    }

    /// Returns true if `name` is the name, canonical name, or an alias of this
    /// namespace, ignoring case and treating underscores as spaces.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.replace('_', " ");
        let name = UniCase::new(name.trim());
        core::iter::once(&*self.name)
            .chain(self.canonical.as_deref())
            .chain(self.aliases.iter().map(String::as_str))
            .any(|candidate| UniCase::new(candidate) == name)
    }
}

/// The namespace table of one site.
#[derive(Clone, Debug, Default)]
pub struct Namespaces(Vec<Namespace>);

impl Namespaces {
    /// Creates a table from a list of namespaces. The list is sorted by ID.
    pub fn new(mut namespaces: Vec<Namespace>) -> Self {
        namespaces.sort_by_key(|ns| ns.id);
        Self(namespaces)
    }

    /// Finds the namespace with the given numeric ID.
    pub fn find_by_id(&self, id: i32) -> Option<&Namespace> {
        self.0
            .binary_search_by_key(&id, |ns| ns.id)
            .ok()
            .map(|index| &self.0[index])
    }

    /// Finds the namespace with the given case-insensitive name. Searches the
    /// name, canonical name, and all aliases. The main namespace has no name
    /// and is never returned.
    pub fn find_by_name(&self, name: &str) -> Option<&Namespace> {
        self.0
            .iter()
            .find(|ns| ns.id != Namespace::MAIN && ns.matches(name))
    }

    /// Iterates over all namespaces, by ascending ID.
    pub fn iter(&self) -> impl Iterator<Item = &Namespace> {
        self.0.iter()
    }

    /// Returns the main namespace.
    pub fn main(&self) -> Option<&Namespace> {
        self.find_by_id(Namespace::MAIN)
    }
}

/// A normalised article title.
///
/// The namespace prefix uses the site’s display name for the namespace.
#[derive(Clone, Debug, Eq)]
pub struct Title {
    /// The location of the fragment delimiter in the title, if one exists.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page#Fragment
    ///                         ^
    /// ```
    fragment_delimiter: Option<usize>,

    /// The namespace ID of the title.
    namespace: i32,

    /// The location of the namespace delimiter in the title, if one exists.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page#Fragment
    ///          ^
    /// ```
    ns_delimiter: Option<usize>,

    /// The full title text.
    text: String,
}

impl PartialEq for Title {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl core::hash::Hash for Title {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl PartialOrd for Title {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Title {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.text.cmp(&other.text)
    }
}

impl Title {
    /// Creates a title from a known namespace plus text parts.
    pub fn from_parts(namespace: &Namespace, title: &str, fragment: Option<&str>) -> Self {
        let mut text = String::with_capacity(namespace.name.len() + title.len() + 1);

        let ns_delimiter = (!namespace.name.is_empty()).then(|| {
            text.push_str(&namespace.name);
            let ns_delimiter = text.len();
            text.push(':');
            ns_delimiter
        });

        text += &apply_case(namespace.case, &normalize(title));

        let fragment_delimiter = fragment.map(|fragment| {
            let fragment_delimiter = text.len();
            text.push('#');
            text += &normalize(fragment);
            fragment_delimiter
        });

        Self {
            fragment_delimiter,
            namespace: namespace.id,
            ns_delimiter,
            text,
        }
    }

    /// The page fragment, if there is one.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page#Fragment
    ///                          ^^^^^^^^
    /// ```
    pub fn fragment(&self) -> Option<&str> {
        self.fragment_delimiter.map(|d| &self.text[d + 1..])
    }

    /// The title without its fragment.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page#Fragment
    /// ^^^^^^^^^^^^^^^^^^^^^^^^
    /// ```
    pub fn key(&self) -> &str {
        let end_at = self.fragment_delimiter.unwrap_or(self.text.len());
        &self.text[..end_at]
    }

    /// The namespace ID of the title.
    pub fn namespace(&self) -> i32 {
        self.namespace
    }

    /// The title without its fragment, in a URI component encoded form with
    /// spaces as underscores.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page#Fragment
    /// ^^^^^^^^^^^^^^^^^^^^^^^^
    ///     (Namespace:Title/Sub/Page)
    /// ```
    pub fn partial_url(&self) -> String {
        utf8_percent_encode(&self.key().replace(' ', "_"), URL_TITLE).to_string()
    }

    /// The path of the page.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page#Fragment
    ///           ^^^^^^^^^^^^^^
    /// ```
    pub fn text(&self) -> &str {
        let start_at = self.ns_delimiter.map_or(0, |d| d + 1);
        let end_at = self.fragment_delimiter.unwrap_or(self.text.len());
        &self.text[start_at..end_at]
    }

    /// The full text of the title.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page#Fragment
    /// ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^
    /// ```
    pub fn full_text(&self) -> &str {
        &self.text
    }
}

impl core::fmt::Display for Title {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Characters which are left alone when a title is put into a URL path, the
/// same set MediaWiki’s `wfUrlencode` leaves alone.
const URL_TITLE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b':')
    .remove(b'@')
    .remove(b'$')
    .remove(b',')
    .remove(b'/');

/// Matches text which may not appear in a title: characters outside the
/// default `$wgLegalTitleChars`, plus percent escapes and HTML entities that
/// survived decoding.
static ILLEGAL_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"[^ %!"$&'()*,\-./0-9:;=?@A-Z\\\^_`a-z~+\x{80}-\x{10FFFF}]"#,
        r"|%[0-9A-Fa-f]{2}",
        r"|&[A-Za-z0-9\x{80}-\x{10FFFF}]+;",
        r"|&#[0-9]+;",
        r"|&#x[0-9A-Fa-f]+;",
    ))
    .unwrap()
});

/// The maximum length of a title, in bytes.
pub const MAX_TITLE_BYTES: usize = 255;

/// Checks that `title`, without namespace prefix or fragment, is legal in
/// namespace `ns`. Returns the reason if it is not.
pub fn check_legal(title: &str, ns: i32) -> Result<(), &'static str> {
    if let Some(m) = ILLEGAL_TITLE.find(title) {
        log::trace!("Illegal title sequence {:?} in {title:?}", m.as_str());
        return Err("contains illegal characters");
    }

    if title.contains('.')
        && (title == "."
            || title == ".."
            || title.starts_with("./")
            || title.starts_with("../")
            || title.contains("/./")
            || title.contains("/../")
            || title.ends_with("/.")
            || title.ends_with("/.."))
    {
        return Err("contains relative path components");
    }

    if title.contains("~~~") {
        return Err("contains a signature sequence");
    }

    if ns != Namespace::SPECIAL && title.len() > MAX_TITLE_BYTES {
        return Err("is too long");
    }

    Ok(())
}

/// Applies a namespace case rule to a title.
pub fn apply_case(case: NamespaceCase, title: &str) -> Cow<'_, str> {
    if case == NamespaceCase::FirstLetter
        && let Some(first) = title.chars().next()
        && first.is_lowercase()
    {
        let rest = &title[first.len_utf8()..];
        Cow::Owned(format!("{}{rest}", first.to_uppercase()))
    } else {
        Cow::Borrowed(title)
    }
}

/// Returns true if the given character `c` is a bidirectional text control
/// character.
fn bidi(c: char) -> bool {
    ('\u{200e}'..='\u{200f}').contains(&c) || ('\u{202a}'..='\u{202e}').contains(&c)
}

/// Normalises a title text part by decoding HTML entities, converting runs of
/// whitespace + underscore to a single space character, and dropping bidi
/// control characters.
pub fn normalize(text: &str) -> Cow<'_, str> {
    let decoded = decode_html_entities(text);

    let trimmed = decoded.trim_matches(trimmable);
    let mut prev = '\0';
    let dirty = trimmed.chars().any(|c| {
        let dirty = bidi(c) || (spacelike(c) && (c != ' ' || prev == ' '));
        prev = c;
        dirty
    });

    if !dirty {
        return match decoded {
            Cow::Borrowed(b) => Cow::Borrowed(b.trim_matches(trimmable)),
            Cow::Owned(ref o) => Cow::Owned(o.trim_matches(trimmable).to_string()),
        };
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut pending_space = false;
    for c in trimmed.chars() {
        if bidi(c) {
            // Bidi markers get stripped because “Sometimes they slip into
            // cut-n-pasted page titles”
            continue;
        } else if spacelike(c) {
            pending_space = true;
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Returns true if the character `c` is considered like whitespace in title
/// text.
fn spacelike(c: char) -> bool {
    c == '_' || c.is_whitespace()
}

/// Returns true if the character `c` is trimmable in title text.
fn trimmable(c: char) -> bool {
    bidi(c) || spacelike(c)
}
