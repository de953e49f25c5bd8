//! Page-following collection reader.
//!
//! # Design
//! Collections are served a page at a time. A page carries a `link` header
//! with a `rel="next"` entry while more pages exist; its absence is the only
//! end-of-collection signal. Item counts are never used to guess the end,
//! since a last page can be exactly as long as the page size.
//!
//! `CollectionIter` keeps the continuation explicitly as `Option<String>`
//! and fetches the next page only once the current one is drained.

use std::iter::FusedIterator;

use serde_json::Value;

use crate::client::TpmClient;
use crate::error::Result;
use crate::http::Transport;

/// URL of the next page of a collection, taken from a `link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink(String);

impl PageLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Extract the `rel="next"` target from a `link` header value.
///
/// Accepts `<url>; rel="next"` as well as the bare `url; rel=next` form, and
/// multiple comma-separated links.
pub fn next_link(header: &str) -> Option<PageLink> {
    link_entries(header).into_iter().find_map(|entry| {
        let (target, params) = match entry.trim_start().strip_prefix('<') {
            Some(rest) => {
                let (target, params) = rest.split_once('>')?;
                (target, params)
            }
            None => entry.split_once(';').unwrap_or((entry, "")),
        };
        let target = target.trim();
        if target.is_empty() {
            return None;
        }
        let is_next = params.split(';').any(|param| {
            param.trim().split_once('=').is_some_and(|(key, value)| {
                key.trim().eq_ignore_ascii_case("rel")
                    && value
                        .trim()
                        .trim_matches('"')
                        .split_whitespace()
                        .any(|rel| rel.eq_ignore_ascii_case("next"))
            })
        });
        is_next.then(|| PageLink::new(target))
    })
}

/// Split a `link` header on the commas that separate entries, ignoring
/// commas inside `<...>` targets and quoted parameter values.
fn link_entries(header: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut in_target = false;
    let mut in_quotes = false;
    for (i, c) in header.char_indices() {
        match c {
            '<' if !in_quotes => in_target = true,
            '>' if !in_quotes => in_target = false,
            '"' if !in_target => in_quotes = !in_quotes,
            ',' if !in_target && !in_quotes => {
                entries.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&header[start..]);
    entries
}

/// One fetched page: its items and the link to the following page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub next: Option<PageLink>,
}

/// Lazy, in-order iterator over every item of a paginated collection.
///
/// Yields `Err` at most once, after which it is exhausted. Re-invoke
/// `TpmClient::iter_collection` to start over.
pub struct CollectionIter<'a, T> {
    client: &'a TpmClient<T>,
    next: Option<String>,
    items: std::vec::IntoIter<Value>,
    pages: usize,
}

impl<'a, T: Transport> CollectionIter<'a, T> {
    pub(crate) fn new(client: &'a TpmClient<T>, path: impl Into<String>) -> Self {
        Self {
            client,
            next: Some(path.into()),
            items: Vec::new().into_iter(),
            pages: 0,
        }
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

impl<T: Transport> Iterator for CollectionIter<'_, T> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.items.next() {
                return Some(Ok(item));
            }
            let path = self.next.take()?;
            match self.client.fetch_page(&path) {
                Ok(page) => {
                    self.pages += 1;
                    self.items = page.items.into_iter();
                    self.next = page.next.map(PageLink::into_string);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<T: Transport> FusedIterator for CollectionIter<'_, T> {}
