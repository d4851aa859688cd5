//! Splits a source unit into budget-sized chunks along class and method boundaries.
//!
//! Chunks partition the unit's text: concatenating every chunk in index order
//! reproduces the source exactly, and no boundary ever falls inside a method.
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::analysis::SourceUnit;

/// What a budget limit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    Chars,
    /// Estimated as one token per four characters.
    #[default]
    Tokens,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub limit: usize,
    pub unit: BudgetUnit,
}

impl Budget {
    pub fn chars(limit: usize) -> Self {
        Self {
            limit,
            unit: BudgetUnit::Chars,
        }
    }

    pub fn tokens(limit: usize) -> Self {
        Self {
            limit,
            unit: BudgetUnit::Tokens,
        }
    }

    pub fn measure(&self, text: &str) -> usize {
        let chars = text.chars().count();
        match self.unit {
            BudgetUnit::Chars => chars,
            BudgetUnit::Tokens => chars.div_ceil(4),
        }
    }

    pub fn fits(&self, text: &str) -> bool {
        self.measure(text) <= self.limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    /// A whole unit or a whole top-level class.
    WholeClass,
    /// One or more whole methods of a class that did not fit.
    MethodGroup,
    /// A piece that exceeds the budget on its own and was emitted whole.
    Partial,
}

#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub unit: &'a SourceUnit,
    pub index: usize,
    pub total: usize,
    pub range: Range<usize>,
    pub text: &'a str,
    pub kind: BoundaryKind,
    pub oversized: bool,
}

impl Chunk<'_> {
    /// Package, imports and enclosing class declaration, for prompting a
    /// chunk that does not carry them itself.
    pub fn context(&self) -> String {
        let facts = &self.unit.facts;
        let mut lines = Vec::new();
        if let Some(package) = &facts.package {
            lines.push(format!("package {package};"));
        }
        for import in &facts.imports {
            lines.push(format!("import {import};"));
        }
        let enclosing = facts
            .classes
            .iter()
            .find(|c| c.span.start <= self.range.start && self.range.start < c.span.end)
            .or_else(|| {
                facts
                    .classes
                    .iter()
                    .find(|c| c.span.start < self.range.end && self.range.end <= c.span.end)
            });
        if let Some(class) = enclosing {
            lines.push(format!("{} {{ ... }}", class.declaration));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Planned {
    range: Range<usize>,
    kind: BoundaryKind,
    oversized: bool,
}

/// Lazy, restartable chunk sequence for one unit. Clone it to iterate again.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    unit: &'a SourceUnit,
    plan: Vec<Planned>,
    next: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let planned = self.plan.get(self.next)?;
        let unit: &'a SourceUnit = self.unit;
        let chunk = Chunk {
            unit,
            index: self.next,
            total: self.plan.len(),
            range: planned.range.clone(),
            text: &unit.text[planned.range.clone()],
            kind: planned.kind,
            oversized: planned.oversized,
        };
        self.next += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.plan.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// Chunks `unit` so that each piece fits `budget` wherever method boundaries allow.
pub fn chunk(unit: &SourceUnit, budget: Budget) -> Chunks<'_> {
    Chunks {
        unit,
        plan: plan(unit, budget),
        next: 0,
    }
}

fn plan(unit: &SourceUnit, budget: Budget) -> Vec<Planned> {
    let text = unit.text.as_str();
    let whole = 0..text.len();

    if budget.fits(text) {
        return vec![Planned {
            range: whole,
            kind: BoundaryKind::WholeClass,
            oversized: false,
        }];
    }

    let classes = &unit.facts.classes;
    if classes.is_empty() {
        return vec![Planned {
            range: whole,
            kind: BoundaryKind::Partial,
            oversized: true,
        }];
    }

    let mut plan = Vec::new();
    let mut start = 0;
    for (i, class) in classes.iter().enumerate() {
        // Leading text joins the next class, trailing text joins the last one.
        let end = if i + 1 == classes.len() {
            text.len()
        } else {
            class.span.end
        };
        let piece = start..end;
        if budget.fits(&text[piece.clone()]) {
            plan.push(Planned {
                range: piece,
                kind: BoundaryKind::WholeClass,
                oversized: false,
            });
        } else {
            split_by_methods(unit, piece, budget, &mut plan);
        }
        start = end;
    }
    plan
}

fn split_by_methods(unit: &SourceUnit, piece: Range<usize>, budget: Budget, plan: &mut Vec<Planned>) {
    let text = unit.text.as_str();

    // Cut after every method but the last, whose segment also takes the class tail.
    let mut cuts: Vec<usize> = unit
        .methods()
        .iter()
        .filter(|m| m.span.start >= piece.start && m.span.end <= piece.end)
        .map(|m| m.span.end)
        .collect();
    cuts.pop();

    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(piece.start);
    bounds.extend(cuts);
    bounds.push(piece.end);

    let mut current: Option<Range<usize>> = None;
    for pair in bounds.windows(2) {
        let segment = pair[0]..pair[1];
        current = match current {
            None => Some(segment),
            Some(open) => {
                let joined = open.start..segment.end;
                if budget.fits(&text[joined.clone()]) {
                    Some(joined)
                } else {
                    plan.push(packed(text, open, budget));
                    Some(segment)
                }
            }
        };
    }
    if let Some(open) = current {
        plan.push(packed(text, open, budget));
    }
}

fn packed(text: &str, range: Range<usize>, budget: Budget) -> Planned {
    if budget.fits(&text[range.clone()]) {
        Planned {
            range,
            kind: BoundaryKind::MethodGroup,
            oversized: false,
        }
    } else {
        Planned {
            range,
            kind: BoundaryKind::Partial,
            oversized: true,
        }
    }
}
