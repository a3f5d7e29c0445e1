//! Incremental case-insensitive search over a text snapshot.
//!
//! [`Searcher`] answers repeated "find next" requests with wraparound and
//! reports matches through a caller-supplied [`Highlighter`]. The core never
//! keeps highlight state itself; it only computes ranges.
//!
//! All offsets are counted in characters (Unicode scalar values), so they
//! line up with caret positions stored in a note container.
//!
//! [`SearchSession`] wraps the searcher lifecycle a text editor needs: a new
//! searcher per query, short queries ignored while typing, and highlights
//! cleared whenever the searcher is thrown away.

use crate::error::{NoteError, Result};
use tracing::trace;

/// Rendering capability implemented by the caller.
///
/// Adding a highlight for a range that is already highlighted replaces its
/// state, so at most one range is current at any time.
pub trait Highlighter {
    fn clear_highlights(&mut self);
    fn add_highlight(&mut self, start: usize, end: usize, is_current: bool);
}

impl<H: Highlighter + ?Sized> Highlighter for &mut H {
    fn clear_highlights(&mut self) {
        (**self).clear_highlights();
    }

    fn add_highlight(&mut self, start: usize, end: usize, is_current: bool) {
        (**self).add_highlight(start, end, is_current);
    }
}

/// Simple case mapping. Characters whose lowercase form is longer than one
/// character are kept as-is so offsets stay aligned with the original text.
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn fold_str(s: &str) -> Vec<char> {
    s.chars().map(fold).collect()
}

/// Stateful find-next over one query and one text snapshot.
///
/// Replace it rather than mutate it when the query or the text changes.
pub struct Searcher<H> {
    needle: Vec<char>,
    /// Start offsets of every occurrence, ascending.
    matches: Vec<usize>,
    cursor: usize,
    current: Option<usize>,
    highlighter: H,
}

impl<H: Highlighter> Searcher<H> {
    /// Lower-case `query` and `text` once and index every occurrence.
    ///
    /// An empty query is rejected rather than matching every position.
    pub fn new(query: &str, text: &str, start_offset: usize, highlighter: H) -> Result<Self> {
        if query.is_empty() {
            return Err(NoteError::invalid_query("query is empty"));
        }
        Ok(Self::build(query, text, start_offset, highlighter))
    }

    fn build(query: &str, text: &str, start_offset: usize, highlighter: H) -> Self {
        let needle = fold_str(query);
        let haystack = fold_str(text);
        let matches = if needle.len() > haystack.len() {
            Vec::new()
        } else {
            haystack
                .windows(needle.len())
                .enumerate()
                .filter(|(_, window)| *window == needle.as_slice())
                .map(|(i, _)| i)
                .collect()
        };

        trace!(
            needle_len = needle.len(),
            haystack_len = haystack.len(),
            matches = matches.len(),
            "searcher built"
        );

        Self {
            needle,
            matches,
            cursor: start_offset.min(haystack.len()),
            current: None,
            highlighter,
        }
    }

    /// Start offset of the next match, or `None` when the query does not
    /// occur anywhere.
    ///
    /// The first call searches from the start offset inclusive; later calls
    /// search after the previous match. When nothing is found before the end
    /// of the text the search wraps once to the beginning.
    pub fn find_next(&mut self) -> Option<usize> {
        let from = match self.current {
            Some(prev) => prev + 1,
            None => self.cursor,
        };

        let idx = self.matches.partition_point(|&m| m < from);
        let found = self
            .matches
            .get(idx)
            .or_else(|| self.matches.first())
            .copied()?;

        let len = self.needle.len();
        match self.current {
            None => {
                for &other in self.matches.iter().filter(|&&m| m != found) {
                    self.highlighter.add_highlight(other, other + len, false);
                }
            }
            Some(prev) if prev != found => {
                self.highlighter.add_highlight(prev, prev + len, false);
            }
            Some(_) => {}
        }
        self.highlighter.add_highlight(found, found + len, true);

        self.cursor = found;
        self.current = Some(found);
        Some(found)
    }

    /// Lower-cased query.
    pub fn needle(&self) -> String {
        self.needle.iter().collect()
    }

    /// True when `query` folds to this searcher's needle.
    pub fn matches_query(&self, query: &str) -> bool {
        fold_str(query) == self.needle
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Last match start, or the start offset before any match.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Length of a match in characters.
    pub fn match_len(&self) -> usize {
        self.needle.len()
    }

    pub fn highlighter(&self) -> &H {
        &self.highlighter
    }

    pub fn into_highlighter(self) -> H {
        self.highlighter
    }
}

/// Result of a search request made through [`SearchSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The query was too short to search yet.
    Skipped,
    Found(usize),
    NotFound,
}

enum Slot<H> {
    Idle(H),
    Active(Searcher<H>),
    /// Only observable if a highlighter call panicked mid-transition.
    Vacant,
}

/// Search lifecycle for one text view.
pub struct SearchSession<H> {
    min_query_len: usize,
    slot: Slot<H>,
}

impl<H: Highlighter> SearchSession<H> {
    pub fn new(highlighter: H, min_query_len: usize) -> Self {
        Self {
            min_query_len,
            slot: Slot::Idle(highlighter),
        }
    }

    /// Query text edited. Any running search is discarded; queries shorter
    /// than the minimum are not searched.
    pub fn on_query_change(&mut self, query: &str, text: &str, caret: usize) -> Result<SearchOutcome> {
        self.stop();
        if query.chars().count() < self.min_query_len {
            return Ok(SearchOutcome::Skipped);
        }
        self.find(query, text, caret)
    }

    /// Query submitted explicitly ("find next"). Reuses the running searcher
    /// when the query is unchanged ignoring case.
    pub fn on_query_submit(&mut self, query: &str, text: &str, caret: usize) -> Result<SearchOutcome> {
        if let Slot::Active(searcher) = &self.slot {
            if !searcher.matches_query(query) {
                self.stop();
            }
        }
        if query.is_empty() {
            return Ok(SearchOutcome::Skipped);
        }
        self.find(query, text, caret)
    }

    /// The searched text changed; offsets are stale.
    pub fn on_text_changed(&mut self) {
        self.stop();
    }

    /// Search closed by the user.
    pub fn close(&mut self) {
        self.stop();
    }

    pub fn is_active(&self) -> bool {
        matches!(self.slot, Slot::Active(_))
    }

    pub fn searcher(&self) -> Option<&Searcher<H>> {
        match &self.slot {
            Slot::Active(searcher) => Some(searcher),
            _ => None,
        }
    }

    pub fn highlighter(&self) -> Option<&H> {
        match &self.slot {
            Slot::Idle(h) => Some(h),
            Slot::Active(searcher) => Some(searcher.highlighter()),
            Slot::Vacant => None,
        }
    }

    fn find(&mut self, query: &str, text: &str, caret: usize) -> Result<SearchOutcome> {
        if let Slot::Idle(_) = self.slot {
            if query.is_empty() {
                return Err(NoteError::invalid_query("query is empty"));
            }
            if let Slot::Idle(highlighter) = std::mem::replace(&mut self.slot, Slot::Vacant) {
                self.slot = Slot::Active(Searcher::build(query, text, caret, highlighter));
            }
        }

        match &mut self.slot {
            Slot::Active(searcher) => Ok(match searcher.find_next() {
                Some(offset) => SearchOutcome::Found(offset),
                None => SearchOutcome::NotFound,
            }),
            _ => Err(NoteError::InvalidState(
                "search session lost its highlighter".into(),
            )),
        }
    }

    fn stop(&mut self) {
        let mut highlighter = match std::mem::replace(&mut self.slot, Slot::Vacant) {
            Slot::Idle(h) => h,
            Slot::Active(searcher) => searcher.into_highlighter(),
            Slot::Vacant => return,
        };
        highlighter.clear_highlights();
        self.slot = Slot::Idle(highlighter);
    }
}
