//! Offset-cursor pagination over the passages of one section.

use super::error::{StoreError, StoreResult};
use super::lifecycle::{DatasetStore, LifecyclePhase};
use crate::model::passage::Passage;
use crate::repo::passage_repo::PassageRepository;

/// Finite, forward-only page sequence.
///
/// Ends after a short or empty page, and ends quietly (no error) once the
/// dataset starts closing.
pub struct PassagePages<'a> {
    store: &'a DatasetStore,
    document: i64,
    section: i64,
    page_size: u32,
    offset: u64,
    started: bool,
    finished: bool,
}

impl<'a> PassagePages<'a> {
    pub(crate) fn new(store: &'a DatasetStore, document: i64, section: i64, page_size: u32) -> Self {
        Self {
            store,
            document,
            section,
            page_size: page_size.max(1),
            offset: 0,
            started: false,
            finished: false,
        }
    }

    /// Resumes a sequence at `offset`, as returned by [`Self::offset`] from
    /// an earlier cursor.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Rows consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn next_page(&mut self) -> StoreResult<Option<Vec<Passage>>> {
        if self.finished {
            return Ok(None);
        }
        if self.should_abort() {
            self.finished = true;
            return Ok(None);
        }

        let (document, section, limit, offset) =
            (self.document, self.section, self.page_size, self.offset);
        self.started = true;
        let page = match self
            .store
            .query("get_passage_page", |repo| {
                repo.passage_page(document, section, limit, offset)
            })
            .await
        {
            Ok(page) => page,
            Err(StoreError::DatabaseClosing) => {
                self.finished = true;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        if page.len() < limit as usize {
            self.finished = true;
        }
        if page.is_empty() {
            return Ok(None);
        }
        self.offset += page.len() as u64;
        Ok(Some(page))
    }

    /// Drains the remaining pages into one list.
    pub async fn collect_remaining(mut self) -> StoreResult<Vec<Passage>> {
        let mut passages = Vec::new();
        while let Some(page) = self.next_page().await? {
            passages.extend(page);
        }
        Ok(passages)
    }

    fn should_abort(&self) -> bool {
        match self.store.phase() {
            LifecyclePhase::Closing => true,
            // a close finished between pages; do not reopen mid-sequence
            LifecyclePhase::Closed => self.started,
            _ => false,
        }
    }
}
