//! Wiki families.
//!
//! A family is a group of wikis which share software configuration and
//! differ mostly by language: every Wikipedia is in the `wikipedia` family,
//! every Wiktionary in `wiktionary`, and so on. The family knows enough about
//! its members to resolve interwiki prefixes and namespace names without
//! talking to any server; everything it knows is static.

use crate::title::{Namespace, NamespaceCase, Namespaces};
use std::collections::HashMap;

/// The default English namespace names shared by every MediaWiki installation.
/// Namespaces 4 and 5 are named after the project and are handled separately.
static DEFAULT_NAMESPACES: &[(i32, &str)] = &[
    (Namespace::MEDIA, "Media"),
    (Namespace::SPECIAL, "Special"),
    (Namespace::MAIN, ""),
    (Namespace::TALK, "Talk"),
    (Namespace::USER, "User"),
    (Namespace::USER_TALK, "User talk"),
    (Namespace::FILE, "File"),
    (Namespace::FILE_TALK, "File talk"),
    (Namespace::MEDIAWIKI, "MediaWiki"),
    (Namespace::MEDIAWIKI_TALK, "MediaWiki talk"),
    (Namespace::TEMPLATE, "Template"),
    (Namespace::TEMPLATE_TALK, "Template talk"),
    (Namespace::HELP, "Help"),
    (Namespace::HELP_TALK, "Help talk"),
    (Namespace::CATEGORY, "Category"),
    (Namespace::CATEGORY_TALK, "Category talk"),
];

/// Aliases which exist on every installation.
static DEFAULT_ALIASES: &[(i32, &str)] = &[
    (Namespace::PROJECT, "Project"),
    (Namespace::PROJECT_TALK, "Project talk"),
    (Namespace::FILE, "Image"),
    (Namespace::FILE_TALK, "Image talk"),
];

/// Localised namespace names, by language code.
static LOCAL_NAMESPACES: phf::Map<&str, &[(i32, &str)]> = phf::phf_map! {
    "de" => &[
        (-2, "Medium"), (-1, "Spezial"), (1, "Diskussion"), (2, "Benutzer"),
        (3, "Benutzer Diskussion"), (6, "Datei"), (7, "Datei Diskussion"),
        (8, "MediaWiki"), (9, "MediaWiki Diskussion"), (10, "Vorlage"),
        (11, "Vorlage Diskussion"), (12, "Hilfe"), (13, "Hilfe Diskussion"),
        (14, "Kategorie"), (15, "Kategorie Diskussion"),
    ],
    "fr" => &[
        (-2, "Média"), (-1, "Spécial"), (1, "Discussion"), (2, "Utilisateur"),
        (3, "Discussion utilisateur"), (6, "Fichier"), (7, "Discussion fichier"),
        (8, "MediaWiki"), (9, "Discussion MediaWiki"), (10, "Modèle"),
        (11, "Discussion modèle"), (12, "Aide"), (13, "Discussion aide"),
        (14, "Catégorie"), (15, "Discussion catégorie"),
    ],
    "nl" => &[
        (-2, "Media"), (-1, "Speciaal"), (1, "Overleg"), (2, "Gebruiker"),
        (3, "Overleg gebruiker"), (6, "Bestand"), (7, "Overleg bestand"),
        (8, "MediaWiki"), (9, "Overleg MediaWiki"), (10, "Sjabloon"),
        (11, "Overleg sjabloon"), (12, "Help"), (13, "Overleg help"),
        (14, "Categorie"), (15, "Overleg categorie"),
    ],
};

/// Localised patterns for the project talk namespace name. `$1` is replaced
/// with the project name.
static PROJECT_TALK: phf::Map<&str, &str> = phf::phf_map! {
    "de" => "$1 Diskussion",
    "fr" => "Discussion $1",
    "nl" => "Overleg $1",
};

/// Interwiki prefixes which name another family.
static KNOWN_FAMILIES: phf::Map<&str, &str> = phf::phf_map! {
    "c" => "commons",
    "commons" => "commons",
    "m" => "meta",
    "meta" => "meta",
    "metawikipedia" => "meta",
    "w" => "wikipedia",
    "wikipedia" => "wikipedia",
    "wikt" => "wiktionary",
    "wiktionary" => "wiktionary",
};

/// Language codes of the built-in Wikipedia family.
static WIKIPEDIA_LANGUAGES: &[&str] = &[
    "ar", "ca", "cs", "da", "de", "en", "eo", "es", "fi", "fr", "he", "hu", "it", "ja", "ko", "nl",
    "no", "pl", "pt", "ro", "ru", "simple", "sv", "uk", "zh", "zh-min-nan",
];

/// Language codes of the built-in Wiktionary family.
static WIKTIONARY_LANGUAGES: &[&str] = &[
    "de", "en", "es", "fr", "it", "ja", "nl", "pl", "pt", "ru", "sv", "zh",
];

/// Language codes which were renamed (`Some`) or removed (`None`).
static OBSOLETE_CODES: phf::Map<&str, Option<&str>> = phf::phf_map! {
    "dk" => Some("da"),
    "jp" => Some("ja"),
    "minnan" => Some("zh-min-nan"),
    "mo" => Some("ro"),
    "nan" => Some("zh-min-nan"),
    "nb" => Some("no"),
    "tokipona" => None,
    "zh-cn" => Some("zh"),
    "zh-tw" => Some("zh"),
};

/// Names of disambiguation templates in Wikipedias.
static WIKIPEDIA_DISAMBIGUATION: phf::Map<&str, &[&str]> = phf::phf_map! {
    "_default" => &["Disambig"],
    "de" => &["Begriffsklärung"],
    "en" => &["Disambig", "Dab", "Disambiguation", "Hndis", "Geodis"],
    "fr" => &["Homonymie", "Bandeau standard pour page d'homonymie"],
    "nl" => &["Dp", "Dpintro", "Dp-lijst"],
};

/// Static configuration shared by a group of wikis.
#[derive(Clone, Debug)]
pub struct Family {
    /// The family name.
    name: String,
    /// Hostname for each language code, in insertion order.
    languages: Vec<(String, String)>,
    /// Namespace names for each namespace ID. The key `_default` holds names
    /// which apply to every language.
    namespaces: HashMap<i32, HashMap<String, Vec<String>>>,
    /// The order in which interwiki links are sorted.
    interwiki_sort_order: Vec<String>,
    /// Interwiki prefixes which name another family.
    known_families: HashMap<String, String>,
    /// The family whose languages resolve interlanguage prefixes, for
    /// families which have no languages of their own.
    interwiki_forward: Option<String>,
    /// Renamed (`Some`) and removed (`None`) language codes.
    obsolete: HashMap<String, Option<String>>,
    /// Disambiguation template names by language code, with `_default` as
    /// the fallback.
    disambiguation_templates: HashMap<String, Vec<String>>,
    /// The case rule of the main namespace.
    case: NamespaceCase,
    /// The URL scheme.
    protocol: String,
    /// The path to `api.php` and `index.php`.
    scriptpath: String,
}

impl PartialEq for Family {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Family {}

impl Family {
    /// Starts building a new family.
    pub fn builder(name: impl Into<String>) -> FamilyBuilder {
        FamilyBuilder::new(name)
    }

    /// The built-in Wikipedia family.
    pub fn wikipedia() -> Self {
        let mut builder = Self::builder("wikipedia").project("Wikipedia");
        for code in WIKIPEDIA_LANGUAGES {
            builder = builder.language(*code, format!("{code}.wikipedia.org"));
        }
        for (code, templates) in &WIKIPEDIA_DISAMBIGUATION {
            builder = builder.disambiguation_templates(*code, templates.iter().copied());
        }
        builder.build()
    }

    /// The built-in Wiktionary family. Titles are case-sensitive.
    pub fn wiktionary() -> Self {
        let mut builder = Self::builder("wiktionary")
            .project("Wiktionary")
            .case(NamespaceCase::CaseSensitive);
        for code in WIKTIONARY_LANGUAGES {
            builder = builder.language(*code, format!("{code}.wiktionary.org"));
        }
        builder.build()
    }

    /// The built-in Wikimedia Commons family.
    pub fn commons() -> Self {
        Self::builder("commons")
            .project("Commons")
            .language("commons", "commons.wikimedia.org")
            .disambiguation_templates("_default", ["Disambig"])
            .interwiki_forward("wikipedia")
            .build()
    }

    /// The built-in Meta-Wiki family.
    pub fn meta() -> Self {
        Self::builder("meta")
            .project("Meta")
            .language("meta", "meta.wikimedia.org")
            .interwiki_forward("wikipedia")
            .build()
    }

    /// All built-in families.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::wikipedia(),
            Self::wiktionary(),
            Self::commons(),
            Self::meta(),
        ]
    }

    /// The family name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The case rule of the main namespace.
    pub fn case(&self) -> NamespaceCase {
        self.case
    }

    /// Iterates over the language codes of the family.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.iter().map(|(code, _)| code.as_str())
    }

    /// Returns true if the family has a wiki for the language code.
    pub fn has_language(&self, code: &str) -> bool {
        self.hostname(code).is_some()
    }

    /// Returns the only language code, if the family has exactly one wiki.
    pub fn sole_language(&self) -> Option<&str> {
        match self.languages.as_slice() {
            [(code, _)] => Some(code.as_str()),
            _ => None,
        }
    }

    /// The hostname of the wiki for a language code.
    pub fn hostname(&self, code: &str) -> Option<&str> {
        self.languages
            .iter()
            .find_map(|(c, host)| (c == code).then_some(host.as_str()))
    }

    /// The URL scheme.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// The script path.
    pub fn scriptpath(&self) -> &str {
        &self.scriptpath
    }

    /// Resolves an obsolete language code.
    ///
    /// Returns `None` if the code is not obsolete, `Some(None)` if the wiki
    /// was removed, and `Some(Some(code))` if it was renamed.
    pub fn obsolete(&self, code: &str) -> Option<Option<&str>> {
        self.obsolete.get(code).map(Option::as_deref)
    }

    /// The family named by an interwiki prefix, if any.
    pub fn known_family(&self, prefix: &str) -> Option<&str> {
        self.known_families.get(prefix).map(String::as_str)
    }

    /// The family which resolves interlanguage prefixes on behalf of this
    /// one, if any.
    pub fn interwiki_forward(&self) -> Option<&str> {
        self.interwiki_forward.as_deref()
    }

    /// The order in which interwiki links are sorted.
    pub fn interwiki_sort_order(&self) -> &[String] {
        &self.interwiki_sort_order
    }

    /// Sorts items by their language code according to the interwiki sort
    /// order. Unknown codes go last, alphabetically.
    pub fn sort_interwiki<T>(&self, items: &mut [T], code: impl Fn(&T) -> &str) {
        let order = |code: &str| {
            self.interwiki_sort_order
                .iter()
                .position(|c| c == code)
                .unwrap_or(usize::MAX)
        };
        items.sort_by(|a, b| {
            let (a, b) = (code(a), code(b));
            order(a).cmp(&order(b)).then_with(|| a.cmp(b))
        });
    }

    /// The names of disambiguation templates for a language code.
    pub fn disambiguation_templates(&self, code: &str) -> &[String] {
        self.disambiguation_templates
            .get(code)
            .or_else(|| self.disambiguation_templates.get("_default"))
            .map_or(&[], Vec::as_slice)
    }

    /// The static namespace names for a language code. The first name is the
    /// display name; the rest are aliases.
    pub fn namespace_names(&self, id: i32, code: &str) -> Vec<&str> {
        let Some(names) = self.namespaces.get(&id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for key in [code, "_default"] {
            for name in names.get(key).into_iter().flatten() {
                if !out.contains(&name.as_str()) {
                    out.push(name.as_str());
                }
            }
        }
        out
    }

    /// Builds the static namespace table for a language code.
    pub fn namespaces(&self, code: &str) -> Namespaces {
        let namespaces = self
            .namespaces
            .keys()
            .filter_map(|&id| {
                let names = self.namespace_names(id, code);
                let (name, aliases) = names.split_first()?;
                let mut ns = Namespace::new(id, *name);
                ns.canonical = self
                    .namespaces
                    .get(&id)
                    .and_then(|names| names.get("_default"))
                    .and_then(|names| names.first().cloned())
                    .filter(|name| !name.is_empty());
                ns.aliases = aliases.iter().map(ToString::to_string).collect();
                if id == Namespace::MAIN || self.case == NamespaceCase::CaseSensitive {
                    ns.case = self.case;
                }
                Some(ns)
            })
            .collect();
        Namespaces::new(namespaces)
    }
}

/// A builder for [`Family`].
#[derive(Debug)]
pub struct FamilyBuilder {
    /// The family under construction.
    family: Family,
    /// Whether an explicit interwiki sort order was given.
    sorted: bool,
}

impl FamilyBuilder {
    /// Creates a family with the default namespaces, the default known
    /// families, and the default obsolete codes.
    fn new(name: impl Into<String>) -> Self {
        let mut namespaces = HashMap::<i32, HashMap<String, Vec<String>>>::new();
        for &(id, name) in DEFAULT_NAMESPACES.iter().chain(DEFAULT_ALIASES) {
            namespaces
                .entry(id)
                .or_default()
                .entry("_default".into())
                .or_default()
                .push(name.into());
        }
        for (code, names) in &LOCAL_NAMESPACES {
            for &(id, name) in *names {
                namespaces
                    .entry(id)
                    .or_default()
                    .entry((*code).into())
                    .or_default()
                    .push(name.into());
            }
        }

        Self {
            family: Family {
                name: name.into(),
                languages: Vec::new(),
                namespaces,
                interwiki_sort_order: Vec::new(),
                known_families: KNOWN_FAMILIES
                    .entries()
                    .map(|(k, v)| ((*k).into(), (*v).into()))
                    .collect(),
                interwiki_forward: None,
                obsolete: OBSOLETE_CODES
                    .entries()
                    .map(|(k, v)| ((*k).into(), v.map(Into::into)))
                    .collect(),
                disambiguation_templates: HashMap::new(),
                case: NamespaceCase::FirstLetter,
                protocol: "https".into(),
                scriptpath: "/w".into(),
            },
            sorted: false,
        }
    }

    /// Finishes the family. Without an explicit interwiki sort order, codes
    /// sort alphabetically.
    pub fn build(mut self) -> Family {
        if !self.sorted {
            let mut order = self.family.languages().map(String::from).collect::<Vec<_>>();
            order.sort();
            self.family.interwiki_sort_order = order;
        }
        self.family
    }

    /// Sets the case rule of the main namespace.
    pub fn case(mut self, case: NamespaceCase) -> Self {
        self.family.case = case;
        self
    }

    /// Sets the disambiguation template names for a language code.
    pub fn disambiguation_templates<I, S>(mut self, code: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.family
            .disambiguation_templates
            .insert(code.into(), names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the interwiki sort order explicitly.
    pub fn interwiki_sort_order<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.family.interwiki_sort_order = codes.into_iter().map(Into::into).collect();
        self.sorted = true;
        self
    }

    /// Resolves interlanguage prefixes against another family.
    pub fn interwiki_forward(mut self, family: impl Into<String>) -> Self {
        self.family.interwiki_forward = Some(family.into());
        self
    }

    /// Adds an interwiki prefix naming another family.
    pub fn known_family(mut self, prefix: impl Into<String>, family: impl Into<String>) -> Self {
        self.family
            .known_families
            .insert(prefix.into(), family.into());
        self
    }

    /// Adds a language and its hostname.
    pub fn language(mut self, code: impl Into<String>, hostname: impl Into<String>) -> Self {
        self.family.languages.push((code.into(), hostname.into()));
        self
    }

    /// Adds a namespace name for a language code (or `_default`). The first
    /// name added for a code becomes its display name.
    pub fn namespace(mut self, id: i32, code: impl Into<String>, name: impl Into<String>) -> Self {
        self.family
            .namespaces
            .entry(id)
            .or_default()
            .entry(code.into())
            .or_default()
            .push(name.into());
        self
    }

    /// Marks a language code as renamed (`Some`) or removed (`None`).
    pub fn obsolete(mut self, code: impl Into<String>, new_code: Option<&str>) -> Self {
        self.family
            .obsolete
            .insert(code.into(), new_code.map(Into::into));
        self
    }

    /// Sets the project namespace names (4 and 5) for every language.
    pub fn project(mut self, name: &str) -> Self {
        let project = self.family.namespaces.entry(Namespace::PROJECT).or_default();
        project
            .entry("_default".into())
            .or_default()
            .insert(0, name.into());
        let talk = self
            .family
            .namespaces
            .entry(Namespace::PROJECT_TALK)
            .or_default();
        talk.entry("_default".into())
            .or_default()
            .insert(0, format!("{name} talk"));
        for (code, pattern) in &PROJECT_TALK {
            talk.entry((*code).into())
                .or_default()
                .push(pattern.replace("$1", name));
        }
        self
    }

    /// Sets the URL scheme.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.family.protocol = protocol.into();
        self
    }

    /// Sets the script path.
    pub fn scriptpath(mut self, scriptpath: impl Into<String>) -> Self {
        self.family.scriptpath = scriptpath.into();
        self
    }
}
