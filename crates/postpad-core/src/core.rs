use serde::Deserialize;

use crate::document::{BlockKind, Document, Marks};
use crate::error::Error;
use crate::keymap::{KeyPress, Platform, mark_for_key};
use crate::normalize::Normalizer;
use crate::query::{active_block_kinds, effective_marks, is_block_active, is_mark_active};
use crate::selection::{Selection, first_point};
use crate::toggle::{Change, insert_text_with, toggle_block_with, toggle_mark_with};

pub const DEFAULT_MAX_UNDO: usize = 200;
pub const DEFAULT_MAX_NORMALIZE_ITERATIONS: usize = 100;

/// Zero in either field means "use the default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = DEFAULT_MAX_UNDO;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = DEFAULT_MAX_NORMALIZE_ITERATIONS;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ToggleMark(String),
    ToggleBlock(BlockKind),
    InsertText(String),
    Undo,
    Redo,
}

#[derive(Debug, Clone)]
struct Snapshot {
    doc: Document,
    selection: Option<Selection>,
}

#[derive(Debug, Clone)]
struct UndoRecord {
    before: Snapshot,
    after: Snapshot,
}

pub struct Editor {
    doc: Document,
    selection: Option<Selection>,
    pending_marks: Option<Marks>,
    config: EditorConfig,
    normalizer: Normalizer,
    platform: Platform,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
}

impl Editor {
    pub fn new(doc: Document, selection: Option<Selection>) -> Self {
        Self::with_config(doc, selection, EditorConfig::default())
    }

    pub fn with_config(mut doc: Document, selection: Option<Selection>, config: EditorConfig) -> Self {
        let config = config.with_defaults();
        Normalizer::structural(config.max_normalize_iterations).run(&mut doc);
        let selection = selection.and_then(|s| s.clamped(&doc));
        Self {
            doc,
            selection,
            pending_marks: None,
            normalizer: Normalizer::full(config.max_normalize_iterations),
            config,
            platform: Platform::current(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    /// An empty paragraph with the caret inside it.
    pub fn empty() -> Self {
        Self::at_start(Document::empty())
    }

    pub fn from_html(html: &str) -> Self {
        Self::at_start(crate::html::load(html))
    }

    pub fn restore(serialized: &str) -> Self {
        Self::at_start(crate::serialize::restore(serialized))
    }

    fn at_start(doc: Document) -> Self {
        let selection = first_point(&doc).map(Selection::collapsed);
        Self::new(doc, selection)
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn pending_marks(&self) -> Option<&Marks> {
        self.pending_marks.as_ref()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Moves the selection, snapping it onto existing text. Any pending marks are dropped.
    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection.and_then(|s| s.clamped(&self.doc));
        self.pending_marks = None;
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn is_block_active(&self, kind: BlockKind) -> bool {
        is_block_active(&self.doc, self.selection.as_ref(), kind)
    }

    pub fn is_mark_active(&self, mark: &str) -> bool {
        is_mark_active(
            &self.doc,
            self.selection.as_ref(),
            self.pending_marks.as_ref(),
            mark,
        )
    }

    pub fn active_marks(&self) -> Marks {
        effective_marks(&self.doc, self.selection.as_ref(), self.pending_marks.as_ref())
    }

    pub fn active_blocks(&self) -> Vec<BlockKind> {
        active_block_kinds(&self.doc, self.selection.as_ref())
            .into_iter()
            .collect()
    }

    pub fn toggle_mark(&mut self, mark: &str) -> bool {
        let change = toggle_mark_with(
            &self.normalizer,
            &self.doc,
            self.selection.as_ref(),
            self.pending_marks.as_ref(),
            mark,
        );
        change.is_some_and(|change| self.commit(change))
    }

    pub fn toggle_block(&mut self, kind: BlockKind) -> bool {
        let change = toggle_block_with(&self.normalizer, &self.doc, self.selection.as_ref(), kind);
        change.is_some_and(|change| self.commit(change))
    }

    /// Types at the caret. An expanded selection is left alone.
    pub fn insert_text(&mut self, text: &str) -> bool {
        let change = insert_text_with(
            &self.normalizer,
            &self.doc,
            self.selection.as_ref(),
            self.pending_marks.as_ref(),
            text,
        );
        change.is_some_and(|change| self.commit(change))
    }

    /// Runs the formatting shortcut bound to `press`. Returns `false` for unbound keys.
    pub fn handle_key(&mut self, press: &KeyPress) -> bool {
        let Some(mark) = mark_for_key(press, self.platform) else {
            return false;
        };
        tracing::debug!(key = %press.key, mark, "formatting shortcut");
        self.toggle_mark(mark);
        true
    }

    pub fn run(&mut self, command: Command) -> bool {
        match command {
            Command::ToggleMark(mark) => self.toggle_mark(&mark),
            Command::ToggleBlock(kind) => self.toggle_block(kind),
            Command::InsertText(text) => self.insert_text(&text),
            Command::Undo => self.undo(),
            Command::Redo => self.redo(),
        }
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };
        self.doc = record.before.doc.clone();
        self.selection = record.before.selection.clone();
        self.pending_marks = None;
        self.redo_stack.push(record);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };
        self.doc = record.after.doc.clone();
        self.selection = record.after.selection.clone();
        self.pending_marks = None;
        self.undo_stack.push(record);
        true
    }

    pub fn save(&self) -> Result<String, Error> {
        crate::serialize::save(&self.doc)
    }

    pub fn to_html(&self) -> String {
        crate::html::to_html(&self.doc)
    }

    /// Adopts `change`, recording history only when the document itself changed.
    fn commit(&mut self, change: Change) -> bool {
        let Change {
            doc,
            selection,
            pending_marks,
        } = change;
        let selection = selection.or_else(|| self.selection.as_ref().and_then(|s| s.clamped(&doc)));

        if doc == self.doc {
            let changed = selection != self.selection || pending_marks != self.pending_marks;
            self.selection = selection;
            self.pending_marks = pending_marks;
            return changed;
        }

        let before = Snapshot {
            doc: std::mem::replace(&mut self.doc, doc),
            selection: std::mem::replace(&mut self.selection, selection),
        };
        self.pending_marks = pending_marks;
        let after = Snapshot {
            doc: self.doc.clone(),
            selection: self.selection.clone(),
        };

        self.undo_stack.push(UndoRecord { before, after });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }
        tracing::trace!(undo_depth = self.undo_stack.len(), "recorded edit");
        true
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::empty()
    }
}
