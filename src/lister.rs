use tracing::{debug, warn};

use crate::config::{DEFAULT_MAX_PAGES, DEFAULT_START_PAGE};
use crate::domain::{DatasetFilter, DatasetInfo};
use crate::error::HaggleError;
use crate::index::PagedIndex;
use crate::kaggle::KaggleClient;

/// Lazily walks the listing pages matching a filter.
///
/// Walking stops at the first empty page or after `max_pages` requests,
/// whichever comes first. Every call to [`DatasetLister::pages`] or
/// [`DatasetLister::iter`] starts over from `start_page`; [`DatasetLister::index`]
/// walks once and keeps the result until [`DatasetLister::reset`].
pub struct DatasetLister<C> {
    client: C,
    filter: DatasetFilter,
    start_page: u32,
    max_pages: u32,
    warn_if_more: bool,
    index: Option<PagedIndex>,
    max_pages_reached: Option<bool>,
    last_page: Option<u32>,
}

impl<C: KaggleClient> DatasetLister<C> {
    pub fn new(client: C, filter: DatasetFilter) -> Self {
        Self {
            client,
            filter,
            start_page: DEFAULT_START_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            warn_if_more: false,
            index: None,
            max_pages_reached: None,
            last_page: None,
        }
    }

    pub fn start_page(mut self, start_page: u32) -> Self {
        self.start_page = start_page;
        self
    }

    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn warn_if_more(mut self, warn_if_more: bool) -> Self {
        self.warn_if_more = warn_if_more;
        self
    }

    pub fn filter(&self) -> &DatasetFilter {
        &self.filter
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn pages(&self) -> Pages<'_, C> {
        Pages {
            client: &self.client,
            filter: &self.filter,
            next_page: self.start_page,
            requested: 0,
            max_pages: self.max_pages,
            done: false,
            max_pages_reached: false,
        }
    }

    pub fn iter(&self) -> Records<'_, C> {
        Records {
            pages: self.pages(),
            current: Vec::new().into_iter(),
        }
    }

    /// Walks every page once and keeps the accumulated index.
    pub fn index(&mut self) -> Result<&PagedIndex, HaggleError> {
        let index = match self.index.take() {
            Some(index) => index,
            None => self.walk()?,
        };
        Ok(self.index.insert(index))
    }

    fn walk(&mut self) -> Result<PagedIndex, HaggleError> {
        let mut index = PagedIndex::new();
        let mut pages = self.pages();
        for page in pages.by_ref() {
            index.append(page?);
        }
        let reached = pages.max_pages_reached();
        let last_page = pages.next_page;
        debug!(
            pages = index.page_count(),
            refs = index.len(),
            max_pages_reached = reached,
            "listing complete"
        );
        self.max_pages_reached = Some(reached);
        self.last_page = Some(last_page);
        Ok(index)
    }

    /// Forgets the accumulated index; the next access walks the pages again.
    pub fn reset(&mut self) {
        self.index = None;
        self.max_pages_reached = None;
        self.last_page = None;
    }

    /// Number of distinct refs found. Walks the pages if needed.
    pub fn size(&mut self) -> Result<usize, HaggleError> {
        let count = self.index()?.len();
        if self.max_pages_reached == Some(true) && self.warn_if_more {
            warn!(
                count,
                max_pages = self.max_pages,
                "the page cap was reached, Kaggle may hold more datasets than listed here; \
                 raise max_pages to see them (and mind your API quota)"
            );
        }
        Ok(count)
    }

    /// Looks `reference` up among everything fetched so far, whether or not it
    /// matches this lister's filter.
    pub fn get(&mut self, reference: &str) -> Result<&DatasetInfo, HaggleError> {
        self.index()?.lookup(reference)
    }

    /// `None` until the pages have been walked through [`DatasetLister::index`].
    pub fn max_pages_reached(&self) -> Option<bool> {
        self.max_pages_reached
    }

    /// The page number after the last one requested.
    pub fn last_page(&self) -> Option<u32> {
        self.last_page
    }
}

/// Iterator over listing pages; see [`DatasetLister::pages`].
pub struct Pages<'a, C> {
    client: &'a C,
    filter: &'a DatasetFilter,
    next_page: u32,
    requested: u32,
    max_pages: u32,
    done: bool,
    max_pages_reached: bool,
}

impl<C> Pages<'_, C> {
    pub fn requested(&self) -> u32 {
        self.requested
    }

    pub fn max_pages_reached(&self) -> bool {
        self.max_pages_reached
    }
}

impl<C: KaggleClient> Iterator for Pages<'_, C> {
    type Item = Result<Vec<DatasetInfo>, HaggleError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.requested >= self.max_pages {
            self.done = true;
            self.max_pages_reached = true;
            return None;
        }
        let page = self.next_page;
        self.requested += 1;
        match self.client.list(page, self.filter) {
            Ok(records) if records.is_empty() => {
                self.done = true;
                None
            }
            Ok(records) => {
                self.next_page += 1;
                Some(Ok(records))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Iterator over listing records; see [`DatasetLister::iter`].
pub struct Records<'a, C> {
    pages: Pages<'a, C>,
    current: std::vec::IntoIter<DatasetInfo>,
}

impl<C: KaggleClient> Iterator for Records<'_, C> {
    type Item = Result<DatasetInfo, HaggleError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.current.next() {
                return Some(Ok(record));
            }
            match self.pages.next()? {
                Ok(page) => self.current = page.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
