//! Removal of one file's contribution from an aggregate.
//!
//! The walk is post-order. Each named scope drops the locations, facets,
//! signatures, parent types and initializers that came from the file; a
//! node left without locations is pruned (the root never is). Statements
//! other than named scopes come from a single file and are kept or
//! discarded whole.
//!
//! Surviving children of a pruned node become orphans. An orphan attaches
//! to the nearest surviving ancestor, except that a child that reached its
//! parent only through prefix relocation first climbs back to the scope
//! that relocated it. Attached orphans lose their relocated mark and the
//! receiving scope is restructured, which reproduces the tree that would
//! exist had the file never been merged.

use std::collections::HashSet;

use crate::merge::restructure;
use crate::model::{ExpressionId, ScopeTree, Statement, StatementId, StatementKind};

/// Summary of one removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalStats {
    /// Statements removed from the tree, counting subtrees.
    pub pruned: usize,
    /// Surviving statements moved to a new parent.
    pub reattached: usize,
}

#[derive(Debug, Clone, Copy)]
struct Orphan {
    id: StatementId,
    /// Levels still to climb before attaching.
    climb: usize,
}

struct Outcome {
    survived: bool,
    /// Orphans to place at the parent or above.
    passing: Vec<Orphan>,
}

/// Remove every trace of `file` from `tree`. Unknown files are a no-op.
pub fn remove_file(tree: &mut ScopeTree, file: &str) -> RemovalStats {
    if !tree.files().contains(file) {
        tracing::debug!(file, "file not present in tree, nothing to remove");
        return RemovalStats::default();
    }
    let mut remover = Remover {
        tree,
        file,
        stats: RemovalStats::default(),
    };
    let root = remover.tree.root();
    remover.visit(root, true);
    let stats = remover.stats;
    tracing::info!(
        file,
        pruned = stats.pruned,
        reattached = stats.reattached,
        statements = tree.statement_count(),
        "removed file from scope tree"
    );
    stats
}

struct Remover<'t> {
    tree: &'t mut ScopeTree,
    file: &'t str,
    stats: RemovalStats,
}

impl Remover<'_> {
    fn visit(&mut self, id: StatementId, is_root: bool) -> Outcome {
        let Some(stmt) = self.tree.statement(id) else {
            return Outcome {
                survived: false,
                passing: Vec::new(),
            };
        };

        if !stmt.is_named_scope() {
            if stmt.locations.iter().all(|l| l.file == self.file) {
                self.stats.pruned += self.tree.descendants_and_self(id).len();
                self.tree.discard_statement(id);
                return Outcome {
                    survived: false,
                    passing: Vec::new(),
                };
            }
            return Outcome {
                survived: true,
                passing: Vec::new(),
            };
        }

        let children = stmt.children.clone();
        let mut kept = Vec::with_capacity(children.len());
        let mut arriving = Vec::new();
        for child in children {
            let outcome = self.visit(child, false);
            if outcome.survived {
                kept.push(child);
            }
            arriving.extend(outcome.passing);
        }

        self.strip(id);
        let survives = is_root
            || self
                .tree
                .statement(id)
                .is_some_and(|s| !s.locations.is_empty());

        if survives {
            let mut passing = Vec::new();
            let mut attach = Vec::new();
            for orphan in arriving {
                if orphan.climb == 0 || is_root {
                    attach.push(orphan.id);
                } else {
                    passing.push(Orphan {
                        id: orphan.id,
                        climb: orphan.climb - 1,
                    });
                }
            }
            if let Some(stmt) = self.tree.statement_mut(id) {
                stmt.children = kept;
            }
            if !attach.is_empty() {
                for orphan in attach {
                    self.attach(id, orphan);
                }
                restructure(self.tree, id);
            }
            return Outcome {
                survived: true,
                passing,
            };
        }

        let mut passing: Vec<Orphan> = kept
            .into_iter()
            .map(|child| Orphan {
                id: child,
                climb: self.floating_climb(child),
            })
            .collect();
        passing.extend(arriving.into_iter().map(|o| Orphan {
            id: o.id,
            climb: o.climb.saturating_sub(1),
        }));
        if let Some(stmt) = self.tree.take_statement(id) {
            for expr in stmt.expression_ids() {
                self.tree.discard_expression(expr);
            }
        }
        self.stats.pruned += 1;
        Outcome {
            survived: false,
            passing,
        }
    }

    /// Levels a child of a pruned node must climb above that node's parent.
    fn floating_climb(&self, child: StatementId) -> usize {
        let Some(header) = self.tree.statement(child).and_then(Statement::header) else {
            return 0;
        };
        if !header.is_floating() {
            return 0;
        }
        header
            .prefix()
            .map(|p| self.tree.prefix_names(p).len().saturating_sub(1))
            .unwrap_or(0)
    }

    fn attach(&mut self, parent: StatementId, orphan: StatementId) {
        if let Some(header) = self.tree.statement_mut(orphan).and_then(Statement::header_mut) {
            for facet in &mut header.facets {
                facet.relocated = false;
            }
        }
        self.tree.append_child(parent, orphan);
        self.stats.reattached += 1;
    }

    /// Drop the file's share of a named scope's data.
    fn strip(&mut self, id: StatementId) {
        let file = self.file;
        let Some(stmt) = self.tree.statement(id) else {
            return;
        };
        let from_file = |e: &ExpressionId| {
            self.tree
                .expression(*e)
                .and_then(|x| x.location.as_ref())
                .is_some_and(|l| l.file == file)
        };

        let mut dropped: HashSet<ExpressionId> = HashSet::new();
        if let Some(header) = stmt.header() {
            dropped.extend(
                header
                    .facets
                    .iter()
                    .filter(|f| f.file == file)
                    .filter_map(|f| f.prefix),
            );
        }
        match &stmt.kind {
            StatementKind::Type(data) => dropped.extend(data.parent_types.iter().copied().filter(from_file)),
            StatementKind::Method(data) => {
                for sig in data.signatures.iter().filter(|s| s.file == file) {
                    dropped.extend(sig.return_type);
                    dropped.extend(sig.parameters.iter().copied());
                }
                dropped.extend(data.initializers.iter().copied().filter(from_file));
            }
            StatementKind::Property(data) => {
                dropped.extend(data.property_types.iter().copied().filter(from_file))
            }
            _ => {}
        }

        if let Some(stmt) = self.tree.statement_mut(id) {
            stmt.locations.retain(|l| l.file != file);
            if let Some(header) = stmt.header_mut() {
                header.facets.retain(|f| f.file != file);
            }
            let keep = |e: &ExpressionId| !dropped.contains(e);
            match &mut stmt.kind {
                StatementKind::Type(data) => data.parent_types.retain(keep),
                StatementKind::Method(data) => {
                    data.signatures.retain(|s| s.file != file);
                    data.initializers.retain(keep);
                }
                StatementKind::Property(data) => data.property_types.retain(keep),
                _ => {}
            }
        }
        for expr in dropped {
            self.tree.discard_expression(expr);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
