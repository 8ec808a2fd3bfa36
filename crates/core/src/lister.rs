//! Paginated listing
//!
//! The store returns at most one page per request. [`Lister`] keeps asking
//! for the page after the last key it has seen until the store reports no
//! truncation (or hands back an empty page), filtering entries as they
//! arrive.

use std::ops::ControlFlow;
use std::sync::Arc;

use crate::error::Result;
use crate::filter::Filter;
use crate::path::KeyPrefix;
use crate::traits::{ListPage, ListRequest, ListingResult, ObjectDescriptor, ObjectStore};

/// Entries requested per page unless configured otherwise
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

const DELIMITER: &str = "/";

/// What a listing keeps
#[derive(Debug, Clone)]
pub struct ListSpec {
    /// Criteria an entry must pass
    pub filter: Filter,
    /// Retain zero-byte keys ending in `/`
    pub keep_folders: bool,
    /// Entries per backend request
    pub page_size: i32,
}

impl Default for ListSpec {
    fn default() -> Self {
        Self {
            filter: Filter::all(),
            keep_folders: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListSpec {
    pub fn with_filter(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }
}

/// One delimiter-grouped level of a prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderListing {
    /// Sub-prefixes, each ending in `/`
    pub folders: Vec<String>,
    /// Objects directly under the prefix
    pub files: Vec<ObjectDescriptor>,
}

/// Lists keys of one store, scoped by a constant key prefix
#[derive(Clone)]
pub struct Lister {
    store: Arc<dyn ObjectStore>,
    key_prefix: KeyPrefix,
}

impl Lister {
    pub fn new(store: Arc<dyn ObjectStore>, key_prefix: KeyPrefix) -> Self {
        Self { store, key_prefix }
    }

    /// Page-at-a-time cursor over `prefix`
    pub fn pager(&self, bucket: &str, prefix: &str, spec: &ListSpec) -> Pager {
        Pager {
            store: self.store.clone(),
            key_prefix: self.key_prefix.clone(),
            bucket: bucket.to_string(),
            request: ListRequest {
                prefix: self.key_prefix.apply(prefix),
                max_keys: spec.page_size.max(1),
                start_after: None,
                delimiter: None,
            },
            spec: spec.clone(),
            done: false,
        }
    }

    /// Visit every matching object in key order
    ///
    /// Returning `Break` from the callback stops the traversal without
    /// fetching further pages.
    pub async fn walk<F>(&self, bucket: &str, prefix: &str, spec: &ListSpec, mut visit: F) -> Result<()>
    where
        F: FnMut(&ObjectDescriptor) -> ControlFlow<()>,
    {
        let mut pager = self.pager(bucket, prefix, spec);
        while let Some(page) = pager.next_page().await? {
            for item in &page {
                if visit(item).is_break() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Materialize every matching object under `prefix`
    pub async fn list(&self, bucket: &str, prefix: &str, spec: &ListSpec) -> Result<ListingResult> {
        let mut listing = ListingResult::default();
        self.walk(bucket, prefix, spec, |item| {
            listing.push(item.clone());
            ControlFlow::Continue(())
        })
        .await?;
        tracing::debug!(bucket, prefix, count = listing.len(), bytes = listing.total_bytes, "listed");
        Ok(listing)
    }

    /// One `/`-delimited level under `prefix`
    pub async fn list_folders(&self, bucket: &str, prefix: &str) -> Result<FolderListing> {
        let mut request = ListRequest {
            prefix: self.key_prefix.apply(prefix),
            max_keys: DEFAULT_PAGE_SIZE,
            start_after: None,
            delimiter: Some(DELIMITER.to_string()),
        };
        let mut listing = FolderListing::default();

        loop {
            let page = self.fetch(bucket, &request).await?;
            let Some(resume) = resume_point(&page) else {
                break;
            };
            listing.folders.extend(
                page.common_prefixes
                    .iter()
                    .map(|p| self.key_prefix.strip(p).to_string()),
            );
            listing.files.extend(
                page.entries
                    .iter()
                    .filter(|e| !is_folder_marker(e))
                    .map(|e| ObjectDescriptor::new(self.key_prefix.strip(&e.key), e.size, e.mtime)),
            );
            if !page.is_truncated {
                break;
            }
            request.start_after = Some(resume);
        }
        Ok(listing)
    }

    async fn fetch(&self, bucket: &str, request: &ListRequest) -> Result<ListPage> {
        fetch_page(self.store.as_ref(), bucket, request).await
    }
}

async fn fetch_page(store: &dyn ObjectStore, bucket: &str, request: &ListRequest) -> Result<ListPage> {
    let page = store
        .list_objects(bucket, request)
        .await
        .inspect_err(|e| e.log("err_list", &request.prefix))?;
    tracing::debug!(
        bucket,
        prefix = %request.prefix,
        entries = page.entries.len(),
        prefixes = page.common_prefixes.len(),
        truncated = page.is_truncated,
        "list page"
    );
    Ok(page)
}

/// Key after which the next delimited page starts, `None` for an empty page
///
/// A grouped prefix stands for every key below it, so resuming right after
/// the prefix string itself would return the same group again.
fn resume_point(page: &ListPage) -> Option<String> {
    let last_key = page.entries.last().map(|e| e.key.clone());
    let last_group = page.common_prefixes.last().map(|p| format!("{p}\u{10FFFF}"));
    match (last_key, last_group) {
        (Some(key), Some(group)) => Some(key.max(group)),
        (key, group) => key.or(group),
    }
}

fn is_folder_marker(item: &ObjectDescriptor) -> bool {
    item.size == 0 && item.key.ends_with(DELIMITER)
}

/// Page-at-a-time cursor returned by [`Lister::pager`]
pub struct Pager {
    store: Arc<dyn ObjectStore>,
    key_prefix: KeyPrefix,
    bucket: String,
    request: ListRequest,
    spec: ListSpec,
    done: bool,
}

impl Pager {
    /// Matching entries of the next page, `None` once the listing is exhausted
    ///
    /// A page may come back empty after filtering while more pages remain.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ObjectDescriptor>>> {
        if self.done {
            return Ok(None);
        }

        let page = fetch_page(self.store.as_ref(), &self.bucket, &self.request).await?;
        let Some(last) = page.entries.last() else {
            self.done = true;
            return Ok(None);
        };
        self.request.start_after = Some(last.key.clone());
        self.done = !page.is_truncated;

        let items = page
            .entries
            .into_iter()
            .filter(|e| self.spec.keep_folders || !is_folder_marker(e))
            .map(|e| ObjectDescriptor::new(self.key_prefix.strip(&e.key), e.size, e.mtime))
            .filter(|e| self.spec.filter.matches_object(e))
            .collect();
        Ok(Some(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::memory::MemoryStore;
    use crate::perf::OpKind;

    async fn store_with(keys: &[(&str, usize)]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt"));
        for (key, size) in keys {
            store.insert("bkt", key, vec![b'x'; *size]).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_list_skips_folder_markers() {
        let store = store_with(&[("dir/", 0), ("dir/a.txt", 3), ("dir/b.txt", 4)]).await;
        let lister = Lister::new(store, KeyPrefix::default());

        let listing = lister.list("bkt", "dir/", &ListSpec::default()).await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing.total_bytes, 7);

        let spec = ListSpec {
            keep_folders: true,
            ..Default::default()
        };
        let listing = lister.list("bkt", "dir/", &spec).await.unwrap();
        assert_eq!(listing.files[0].key, "dir/");
    }

    #[tokio::test]
    async fn test_list_empty_prefix_is_not_an_error() {
        let store = store_with(&[("a", 1)]).await;
        let lister = Lister::new(store, KeyPrefix::default());
        let listing = lister.list("bkt", "nothing/", &ListSpec::default()).await.unwrap();
        assert!(listing.is_empty());
        assert_eq!(listing.total_bytes, 0);
    }

    #[tokio::test]
    async fn test_walk_break_stops_paging() {
        let keys: Vec<String> = (0..10).map(|i| format!("k{i:02}")).collect();
        let refs: Vec<(&str, usize)> = keys.iter().map(|k| (k.as_str(), 1)).collect();
        let store = store_with(&refs).await;
        let lister = Lister::new(store.clone(), KeyPrefix::default());
        let spec = ListSpec {
            page_size: 2,
            ..Default::default()
        };

        let mut seen = Vec::new();
        lister
            .walk("bkt", "", &spec, |item| {
                seen.push(item.key.clone());
                if seen.len() == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await
            .unwrap();
        assert_eq!(seen, vec!["k00", "k01", "k02"]);
        assert_eq!(store.calls(OpKind::List), 2);
    }

    #[tokio::test]
    async fn test_key_prefix_stripped_before_filtering() {
        let store = store_with(&[("tenant/a.json", 2), ("tenant/b.txt", 2), ("other/c.json", 2)]).await;
        let lister = Lister::new(store, KeyPrefix::new("tenant/"));
        let spec = ListSpec::with_filter(Filter::builder().include("^a").build().unwrap());

        let listing = lister.list("bkt", "", &spec).await.unwrap();
        let keys: Vec<_> = listing.files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["a.json"]);
    }

    #[tokio::test]
    async fn test_list_folders_across_pages() {
        let store = store_with(&[
            ("root/a/1", 1),
            ("root/a/2", 1),
            ("root/b/1", 1),
            ("root/file.txt", 5),
            ("root/z/1", 1),
        ])
        .await;
        store.set_page_limit(Some(1));
        let lister = Lister::new(store, KeyPrefix::default());

        let listing = lister.list_folders("bkt", "root/").await.unwrap();
        assert_eq!(listing.folders, vec!["root/a/", "root/b/", "root/z/"]);
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].key, "root/file.txt");
    }

    #[test]
    fn test_resume_point() {
        let page = ListPage {
            entries: vec![ObjectDescriptor::new("p/a.txt", 1, 0)],
            common_prefixes: vec!["p/b/".into()],
            is_truncated: true,
        };
        assert_eq!(resume_point(&page).unwrap(), "p/b/\u{10FFFF}");
        assert_eq!(resume_point(&ListPage::default()), None);
    }
}
