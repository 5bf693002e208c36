//! Per-request resolution state
//!
//! A [`SearchContext`] is created for one request and dropped with it. It
//! carries the project, the place the request came from, the set of keys
//! whose resolution is in flight (the recursion guard) and an optional
//! cancellation token. Contexts are cheap and must not be shared across
//! threads; the project they point at can be.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::config::ResolveOptions;
use crate::index::{LuaClass, ShortNamesIndex, TypeDef};
use crate::infer;
use crate::project::Project;
use crate::syntax::{FileId, NodeRef, SyntaxNode};
use crate::ty::ITy;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    #[error("resolution was cancelled")]
    Cancelled,
}

/// Shared flag a caller flips to abandon work in progress
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a resolution step is working on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GuardKey {
    Node(NodeRef),
    Decl(NodeRef),
    Alias(String),
}

/// Where the request originated; a position, never a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub file: FileId,
    pub offset: usize,
}

pub struct SearchContext<'p> {
    project: &'p Project,
    origin: Option<Origin>,
    in_flight: RefCell<FxHashSet<GuardKey>>,
    classes: RefCell<FxHashMap<String, Option<Rc<LuaClass>>>>,
    cancel: Option<CancellationToken>,
}

/// Removes its key from the guard set when dropped
pub struct InFlight<'c> {
    set: &'c RefCell<FxHashSet<GuardKey>>,
    key: Option<GuardKey>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.set.borrow_mut().remove(&key);
        }
    }
}

impl<'p> SearchContext<'p> {
    pub fn new(project: &'p Project) -> Self {
        Self {
            project,
            origin: None,
            in_flight: RefCell::new(FxHashSet::default()),
            classes: RefCell::new(FxHashMap::default()),
            cancel: None,
        }
    }

    pub fn with_origin(mut self, node: SyntaxNode<'_>) -> Self {
        self.origin = Some(Origin {
            file: node.file_id(),
            offset: node.start(),
        });
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn project(&self) -> &'p Project {
        self.project
    }

    pub fn index(&self) -> &'p ShortNamesIndex {
        self.project.index()
    }

    pub fn options(&self) -> &'p ResolveOptions {
        self.project.options()
    }

    pub fn origin(&self) -> Option<Origin> {
        self.origin
    }

    /// Mark `key` as in flight; `None` when it already is
    pub fn enter(&self, key: GuardKey) -> Option<InFlight<'_>> {
        if !self.in_flight.borrow_mut().insert(key.clone()) {
            tracing::trace!(?key, "recursion guard hit");
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            key: Some(key),
        })
    }

    pub fn is_in_flight(&self, key: &GuardKey) -> bool {
        self.in_flight.borrow().contains(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.borrow().len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub fn check_cancelled(&self) -> Result<(), ResolveError> {
        if self.is_cancelled() {
            tracing::debug!("resolution cancelled");
            Err(ResolveError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Merged class `name`, memoized for the life of this context
    pub fn find_class(&self, name: &str) -> Option<Rc<LuaClass>> {
        if let Some(found) = self.classes.borrow().get(name) {
            return found.clone();
        }
        let found = self.index().find_class(name).map(Rc::new);
        self.classes
            .borrow_mut()
            .insert(name.to_string(), found.clone());
        found
    }

    pub fn find_type(&self, name: &str) -> Option<TypeDef> {
        self.index().find_type(name)
    }

    /// Resolve many nodes, checking for cancellation between them
    pub fn guess_types<I>(&self, nodes: I) -> Result<Vec<ITy>, ResolveError>
    where
        I: IntoIterator<Item = SyntaxNode<'p>>,
    {
        let mut types = Vec::new();
        for node in nodes {
            self.check_cancelled()?;
            types.push(infer::guess_type(self, node));
        }
        self.check_cancelled()?;
        Ok(types)
    }
}
