//! Category pages.

use super::Page;
use crate::{
    api::{PageGenerator, Request},
    error::{Error, Result},
    site::Site,
    title::Namespace,
};
use serde::Deserialize;
use std::{collections::HashSet, sync::Arc};

/// Member counts of a category.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct CategoryInfo {
    /// All members.
    #[serde(default)]
    pub size: u64,
    /// Members which are neither files nor subcategories.
    #[serde(default)]
    pub pages: u64,
    /// File members.
    #[serde(default)]
    pub files: u64,
    /// Subcategory members.
    #[serde(default)]
    pub subcats: u64,
}

/// Which members of a category to list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemberKind {
    /// Everything.
    All,
    /// Pages and files, but not subcategories.
    Articles,
    /// Only subcategories.
    Subcategories,
}

impl MemberKind {
    /// The `cmtype` parameter value.
    fn cmtype(self) -> &'static str {
        match self {
            Self::All => "page|subcat|file",
            Self::Articles => "page|file",
            Self::Subcategories => "subcat",
        }
    }
}

/// A page in the category namespace.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Category(Page);

impl TryFrom<Page> for Category {
    type Error = Error;

    fn try_from(page: Page) -> Result<Self> {
        if page.is_category() {
            Ok(Self(page))
        } else {
            Err(Error::InvalidTitle(format!("{} is not a category", page.title())))
        }
    }
}

impl core::ops::Deref for Category {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for Category {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Category> for Page {
    fn from(category: Category) -> Self {
        category.0
    }
}

impl Category {
    /// Creates a category. A title without a namespace prefix is put in the
    /// category namespace.
    pub fn new(site: &Arc<Site>, title: &str) -> Result<Self> {
        Page::with_namespace(site, title, Namespace::CATEGORY)?.try_into()
    }

    /// The direct members of the category.
    pub fn members(&self, kind: MemberKind) -> PageGenerator {
        PageGenerator::new(
            self.site(),
            [
                ("generator", "categorymembers"),
                ("gcmlimit", "max"),
                ("gcmtitle", self.title().key()),
                ("gcmtype", kind.cmtype()),
            ],
        )
    }

    /// The pages and files in the category, and in its subcategories down to
    /// `depth` levels. Each page is yielded once.
    pub fn articles(&self, depth: usize) -> CategoryMembers {
        CategoryMembers::new(self.clone(), MemberKind::Articles, depth)
    }

    /// The subcategories of the category, down to `depth` levels. Each
    /// category is yielded once, so category loops end.
    pub fn subcategories(&self, depth: usize) -> CategoryMembers {
        CategoryMembers::new(self.clone(), MemberKind::Subcategories, depth)
    }

    /// The member counts.
    pub fn category_info(&mut self) -> Result<CategoryInfo> {
        if self.0.cache.category_info.is_none() {
            let response = Request::new(self.site())
                .params([("action", "query"), ("prop", "categoryinfo")])
                .param("titles", self.title().key())
                .submit()?;
            let item = response
                .pointer("/query/pages/0")
                .ok_or_else(|| Error::Protocol(format!("no category info for {}", self.0)))?;
            self.0.update_from_api(item)?;
        }
        // Empty categories have no counts at all.
        Ok(self.0.cache.category_info.unwrap_or_default())
    }
}

/// A walk through a category tree.
///
/// Categories are visited depth-first, with the members of a category
/// yielded before its subcategories are entered.
pub struct CategoryMembers {
    /// What to yield.
    kind: MemberKind,
    /// Categories still to visit, with their depth below the root.
    pending: Vec<(Category, usize)>,
    /// The maximum depth.
    max_depth: usize,
    /// The members of the category being visited.
    current: Option<(PageGenerator, usize)>,
    /// Everything yielded or queued so far.
    seen: HashSet<Page>,
}

impl CategoryMembers {
    /// Creates a walk starting at `root`.
    fn new(root: Category, kind: MemberKind, max_depth: usize) -> Self {
        let mut seen = HashSet::new();
        seen.insert(root.0.clone());
        Self {
            kind,
            pending: vec![(root, 0)],
            max_depth,
            current: None,
            seen,
        }
    }
}

impl Iterator for CategoryMembers {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some((members, depth)) = &mut self.current else {
                let (category, depth) = self.pending.pop()?;
                log::debug!("Listing members of {}", category.0);
                self.current = Some((category.members(MemberKind::All), depth));
                continue;
            };
            let depth = *depth;

            let page = match members.next() {
                None => {
                    self.current = None;
                    continue;
                }
                Some(Err(err)) => return Some(Err(err)),
                Some(Ok(page)) => page,
            };

            if !self.seen.insert(page.clone()) {
                continue;
            }

            if page.is_category() {
                if depth < self.max_depth {
                    self.pending.push((Category(page.clone()), depth + 1));
                }
                if self.kind != MemberKind::Articles {
                    return Some(Ok(page));
                }
            } else if self.kind != MemberKind::Subcategories {
                return Some(Ok(page));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, EN};

    fn titles(pages: impl Iterator<Item = Result<Page>>) -> Vec<String> {
        let mut titles = pages
            .map(|page| page.unwrap().title().to_string())
            .collect::<Vec<_>>();
        titles.sort();
        titles
    }

    fn tree() -> (Arc<Site>, Arc<testing::MockWiki>) {
        let (registry, mock) = testing::registry();
        let site = registry.site("en", "wikipedia").unwrap();
        mock.add_page(EN, "Category:Animals", "");
        mock.add_page(EN, "Category:Cats", "[[Category:Animals]]");
        mock.add_page(EN, "Category:Big cats", "[[Category:Cats]]");
        mock.add_page(EN, "Dog", "[[Category:Animals]]");
        mock.add_page(EN, "Tabby", "[[Category:Cats]]");
        mock.add_page(EN, "Lion", "[[Category:Big cats]] [[Category:Animals]]");
        mock.add_page(EN, "File:Cat.jpg", "[[Category:Cats]]");
        mock.set_categories(EN, "Category:Cats", &["Category:Animals", "Category:Big cats"]);
        mock.set_categories(EN, "Category:Big cats", &["Category:Cats"]);
        mock.set_categories(EN, "Dog", &["Category:Animals"]);
        mock.set_categories(EN, "Tabby", &["Category:Cats"]);
        mock.set_categories(EN, "Lion", &["Category:Big cats", "Category:Animals"]);
        mock.set_categories(EN, "File:Cat.jpg", &["Category:Cats"]);
        (site, mock)
    }

    #[test]
    fn not_a_category() {
        let (site, _) = tree();
        assert!(Category::try_from(Page::new(&site, "Dog").unwrap()).is_err());
        let category = Category::new(&site, "Animals").unwrap();
        assert_eq!(category.title().full_text(), "Category:Animals");
    }

    #[test]
    fn direct_members() {
        let (site, _) = tree();
        let category = Category::new(&site, "Cats").unwrap();
        assert_eq!(
            titles(category.members(MemberKind::All)),
            ["Category:Big cats", "File:Cat.jpg", "Tabby"]
        );
        assert_eq!(titles(category.articles(0)), ["File:Cat.jpg", "Tabby"]);
        assert_eq!(titles(category.subcategories(0)), ["Category:Big cats"]);
    }

    #[test]
    fn recursion_terminates_on_loops() {
        let (site, _) = tree();
        let category = Category::new(&site, "Animals").unwrap();
        assert_eq!(
            titles(category.articles(5)),
            ["Dog", "File:Cat.jpg", "Lion", "Tabby"]
        );
        assert_eq!(
            titles(category.subcategories(5)),
            ["Category:Big cats", "Category:Cats"]
        );
        assert_eq!(titles(category.articles(1)), ["Dog", "File:Cat.jpg", "Lion", "Tabby"]);
        assert_eq!(titles(category.articles(0)), ["Dog", "Lion"]);
    }

    #[test]
    fn counts() {
        let (site, _) = tree();
        let mut category = Category::new(&site, "Cats").unwrap();
        assert_eq!(
            category.category_info().unwrap(),
            CategoryInfo {
                size: 3,
                pages: 1,
                files: 1,
                subcats: 1,
            }
        );
    }
}
