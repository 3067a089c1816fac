//! File description pages.

use super::{Page, parse_timestamp, wire};
use crate::{
    api::{PageGenerator, Request},
    error::{Error, Result},
    site::Site,
    title::Namespace,
};
use std::sync::Arc;
use time::UtcDateTime;

/// Information about the latest version of a file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageInfo {
    /// The URL of the file itself.
    pub url: String,
    /// The file size, in bytes.
    pub size: u64,
    /// The width, in pixels, or 0 for files without one.
    pub width: u64,
    /// The height, in pixels, or 0 for files without one.
    pub height: u64,
    /// The MIME type.
    pub mime: Option<String>,
    /// The SHA-1 hash of the file, in hex.
    pub sha1: Option<String>,
    /// When the version was uploaded.
    pub timestamp: UtcDateTime,
    /// Who uploaded the version.
    pub user: String,
}

impl TryFrom<wire::ImageInfo> for ImageInfo {
    type Error = Error;

    fn try_from(info: wire::ImageInfo) -> Result<Self> {
        Ok(Self {
            url: info.url,
            size: info.size,
            width: info.width,
            height: info.height,
            mime: info.mime,
            sha1: info.sha1,
            timestamp: parse_timestamp(&info.timestamp)?,
            user: info.user,
        })
    }
}

/// A page in the file namespace.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ImagePage(Page);

impl TryFrom<Page> for ImagePage {
    type Error = Error;

    fn try_from(page: Page) -> Result<Self> {
        if page.is_image() {
            Ok(Self(page))
        } else {
            Err(Error::InvalidTitle(format!("{} is not a file page", page.title())))
        }
    }
}

impl core::ops::Deref for ImagePage {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for ImagePage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<ImagePage> for Page {
    fn from(image: ImagePage) -> Self {
        image.0
    }
}

impl ImagePage {
    /// Creates a file page. A title without a namespace prefix is put in the
    /// file namespace.
    pub fn new(site: &Arc<Site>, title: &str) -> Result<Self> {
        Page::with_namespace(site, title, Namespace::FILE)?.try_into()
    }

    /// Information about the latest version of the file.
    ///
    /// Fails with [`Error::NoPage`] if there is no such file.
    pub fn image_info(&mut self) -> Result<ImageInfo> {
        if self.0.cache.image_info.is_none() {
            let response = Request::new(self.site())
                .params([
                    ("action", "query"),
                    ("prop", "imageinfo"),
                    ("iiprop", "url|size|mime|sha1|timestamp|user"),
                ])
                .param("titles", self.title().key())
                .submit()?;
            let item = response
                .pointer("/query/pages/0")
                .ok_or_else(|| Error::Protocol(format!("no file info for {}", self.0)))?;
            self.0.update_from_api(item)?;
        }
        self.0
            .cache
            .image_info
            .clone()
            .ok_or_else(|| Error::NoPage(self.title().to_string()))
    }

    /// The URL of the file itself.
    pub fn file_url(&mut self) -> Result<String> {
        Ok(self.image_info()?.url)
    }

    /// The pages which show the file.
    pub fn using_pages(&self) -> PageGenerator {
        PageGenerator::new(
            self.site(),
            [
                ("generator", "imageusage"),
                ("giulimit", "max"),
                ("giutitle", self.title().key()),
            ],
        )
    }
}
