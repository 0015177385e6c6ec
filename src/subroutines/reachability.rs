use crate::jvm::code::{BranchInstruction, CodeNode, MethodBody, SynLabel};
use crate::jvm::Error;
use crate::util::BitSet;
use std::collections::HashMap;

/// Code reachable from the entry of a subroutine (or from the start of the method)
#[derive(Debug)]
pub struct Subroutine {
    /// Label at the start of the subroutine (`None` for the main body of the method)
    pub entry: Option<SynLabel>,

    /// Indices in the method body nodes of everything reachable without going through `jsr`
    ///
    /// This includes exception handlers protecting any of that code.
    pub nodes: BitSet,

    /// Subroutines invoked with a `jsr` from inside this subroutine (no duplicates)
    pub calls: Vec<usize>,
}

/// Which nodes of a method body belong to which subroutine
///
/// Subroutine `0` is always the main body of the method. The others are numbered in order of
/// the first `jsr` targetting them. A node may be reachable from several subroutines (eg. a
/// `finally` block nested in another one, or a `ret` reached by falling through from the end of
/// some other code): those are _dual citizens_.
#[derive(Debug)]
pub struct SubroutineMap {
    subroutines: Vec<Subroutine>,
    by_entry: HashMap<SynLabel, usize>,
    dual_citizens: BitSet,
}

impl SubroutineMap {
    /// Index of the main body of the method
    pub const MAIN: usize = 0;

    /// Find the subroutines in a method body
    ///
    /// Fails if a label is used without being placed, or if a subroutine can end up invoking
    /// itself.
    pub fn compute(body: &MethodBody) -> Result<SubroutineMap, Error> {
        let walker = Walker::new(body)?;

        let mut subroutines = vec![Subroutine {
            entry: None,
            nodes: BitSet::with_capacity(body.nodes.len()),
            calls: vec![],
        }];
        let mut by_entry = HashMap::new();
        for node in &body.nodes {
            if let CodeNode::Branch(BranchInstruction::Jsr(entry)) = node {
                if !by_entry.contains_key(entry) {
                    by_entry.insert(*entry, subroutines.len());
                    subroutines.push(Subroutine {
                        entry: Some(*entry),
                        nodes: BitSet::with_capacity(body.nodes.len()),
                        calls: vec![],
                    });
                }
            }
        }

        // Main body first, so that it never shows up as a dual citizen of itself
        let mut visited = BitSet::with_capacity(body.nodes.len());
        let mut dual_citizens = BitSet::new();
        for subroutine in &mut subroutines {
            let start = match subroutine.entry {
                None => 0,
                Some(entry) => walker.position(entry)?,
            };
            walker.mark(start, subroutine, &mut visited, &mut dual_citizens)?;
            log::trace!(
                "Subroutine {:?} covers {} nodes",
                subroutine.entry,
                subroutine.nodes.count()
            );
        }

        // Call graph
        for subroutine in &mut subroutines {
            for index in subroutine.nodes.iter() {
                if let Some(CodeNode::Branch(BranchInstruction::Jsr(entry))) = body.nodes.get(index)
                {
                    if let Some(callee) = by_entry.get(entry) {
                        if !subroutine.calls.contains(callee) {
                            subroutine.calls.push(*callee);
                        }
                    }
                }
            }
        }

        let map = SubroutineMap {
            subroutines,
            by_entry,
            dual_citizens,
        };
        map.check_not_recursive()?;
        log::debug!(
            "Found {} subroutine(s) and {} dual citizen node(s)",
            map.subroutines.len() - 1,
            map.dual_citizens.count()
        );
        Ok(map)
    }

    /// Number of subroutines (including the main body)
    pub fn count(&self) -> usize {
        self.subroutines.len()
    }

    /// Are there any subroutines besides the main body?
    pub fn has_subroutines(&self) -> bool {
        self.subroutines.len() > 1
    }

    pub fn subroutine(&self, index: usize) -> &Subroutine {
        &self.subroutines[index]
    }

    pub fn subroutines(&self) -> &[Subroutine] {
        &self.subroutines
    }

    /// Subroutine starting at a label (if that label is the target of a `jsr`)
    pub fn subroutine_for_entry(&self, entry: SynLabel) -> Option<usize> {
        self.by_entry.get(&entry).copied()
    }

    /// Is the node at this index reachable from more than one subroutine?
    pub fn is_dual_citizen(&self, index: usize) -> bool {
        self.dual_citizens.contains(index)
    }

    /// Subroutines that can reach the node at this index
    pub fn owners(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.subroutines
            .iter()
            .enumerate()
            .filter(move |(_, subroutine)| subroutine.nodes.contains(index))
            .map(|(subroutine_idx, _)| subroutine_idx)
    }

    /// Make sure that no subroutine reachable from the main body can invoke itself
    ///
    /// Subroutines which are never called from live code are not checked, since they will never
    /// be instantiated.
    fn check_not_recursive(&self) -> Result<(), Error> {
        // Stack of (subroutine, next call to explore)
        let mut path: Vec<(usize, usize)> = vec![(Self::MAIN, 0)];
        let mut finished = vec![false; self.subroutines.len()];

        while let Some((current, next_call)) = path.last_mut() {
            let current = *current;
            match self.subroutines[current].calls.get(*next_call) {
                None => {
                    finished[current] = true;
                    path.pop();
                }
                Some(&callee) => {
                    *next_call += 1;
                    if path.iter().any(|(active, _)| *active == callee) {
                        let entry = self.subroutines[callee].entry;
                        return Err(Error::RecursiveSubroutine(
                            entry.unwrap_or(SynLabel::START),
                        ));
                    }
                    if !finished[callee] {
                        path.push((callee, 0));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Depth-first traversal of the control flow of a method body
struct Walker<'a> {
    body: &'a MethodBody,
    positions: HashMap<SynLabel, usize>,
}

impl<'a> Walker<'a> {
    fn new(body: &'a MethodBody) -> Result<Walker<'a>, Error> {
        let positions = body.label_positions();
        for range in &body.exception_ranges {
            for label in [range.start, range.end, range.handler] {
                if !positions.contains_key(&label) {
                    return Err(Error::UnplacedLabel(label));
                }
            }
        }
        Ok(Walker { body, positions })
    }

    fn position(&self, label: SynLabel) -> Result<usize, Error> {
        self.positions
            .get(&label)
            .copied()
            .ok_or(Error::UnplacedLabel(label))
    }

    /// Mark everything reachable from `start` as belonging to the subroutine, then keep adding
    /// handlers of exception ranges covering any of the subroutine until nothing changes
    fn mark(
        &self,
        start: usize,
        subroutine: &mut Subroutine,
        visited: &mut BitSet,
        dual_citizens: &mut BitSet,
    ) -> Result<(), Error> {
        self.walk(start, &mut subroutine.nodes, visited, dual_citizens)?;

        loop {
            let mut changed = false;
            for range in &self.body.exception_ranges {
                let handler = self.position(range.handler)?;
                if subroutine.nodes.contains(handler) {
                    continue;
                }
                let start = self.position(range.start)?;
                let end = self.position(range.end)?;
                let covered = match subroutine.nodes.next_set_bit(start) {
                    Some(index) => index < end,
                    None => false,
                };
                if covered {
                    self.walk(handler, &mut subroutine.nodes, visited, dual_citizens)?;
                    changed = true;
                }
            }
            if !changed {
                return Ok(());
            }
        }
    }

    fn walk(
        &self,
        start: usize,
        nodes: &mut BitSet,
        visited: &mut BitSet,
        dual_citizens: &mut BitSet,
    ) -> Result<(), Error> {
        let mut pending = vec![start];

        while let Some(mut index) = pending.pop() {
            while index < self.body.nodes.len() {
                if !nodes.insert(index) {
                    break;
                }
                if !visited.insert(index) {
                    dual_citizens.insert(index);
                }

                if let CodeNode::Branch(branch) = &self.body.nodes[index] {
                    // `jsr` returns to the next instruction, and its target is another subroutine
                    if !matches!(branch, BranchInstruction::Jsr(_)) {
                        for target in branch.jump_targets().targets() {
                            pending.push(self.position(*target)?);
                        }
                    }
                    if !branch.falls_through() {
                        break;
                    }
                }
                index += 1;
            }
        }

        Ok(())
    }
}
