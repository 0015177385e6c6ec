use super::{InlinerSettings, SubroutineMap};
use crate::jvm::code::{CodeNode, LabelGenerator, MethodBody, SynLabel};
use crate::jvm::Error;
use std::collections::HashMap;

/// One copy of a subroutine, specific to the `jsr` that led to it
#[derive(Debug)]
pub struct Instantiation {
    /// Index of the subroutine in the `SubroutineMap`
    pub subroutine: usize,

    /// Instantiations active when this one was created, outermost first
    pub ancestors: Vec<usize>,

    /// Where to resume once the subroutine returns (`None` for the main body)
    pub return_label: Option<SynLabel>,

    /// Copy of every label in the original code
    ///
    /// Consecutive labels with nothing from this instantiation in between share a copy.
    pub cloned_labels: HashMap<SynLabel, SynLabel>,
}

/// Every instantiation created while inlining one method body
///
/// Instantiations are referred to by their index in the arena. The first one is always the main
/// body of the method.
pub struct Instantiations<'a> {
    body: &'a MethodBody,
    map: &'a SubroutineMap,
    settings: &'a InlinerSettings,
    positions: HashMap<SynLabel, usize>,
    arena: Vec<Instantiation>,
}

impl<'a> Instantiations<'a> {
    pub fn new(
        body: &'a MethodBody,
        map: &'a SubroutineMap,
        settings: &'a InlinerSettings,
    ) -> Instantiations<'a> {
        Instantiations {
            body,
            map,
            settings,
            positions: body.label_positions(),
            arena: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn get(&self, instantiation: usize) -> &Instantiation {
        &self.arena[instantiation]
    }

    /// Create a new instantiation of a subroutine, invoked from `parent`
    pub fn instantiate<G: LabelGenerator<SynLabel> + ?Sized>(
        &mut self,
        parent: Option<usize>,
        subroutine: usize,
        labels: &mut G,
    ) -> Result<usize, Error> {
        let ancestors = match parent {
            None => vec![],
            Some(parent) => {
                let mut ancestors = self.arena[parent].ancestors.clone();
                ancestors.push(parent);
                ancestors
            }
        };

        if let Some(limit) = self.settings.max_instantiations {
            if self.arena.len() >= limit {
                return Err(Error::InliningLimitExceeded {
                    limit: "max_instantiations",
                    value: self.arena.len() + 1,
                });
            }
        }
        if let Some(limit) = self.settings.max_nesting_depth {
            if ancestors.len() > limit {
                return Err(Error::InliningLimitExceeded {
                    limit: "max_nesting_depth",
                    value: ancestors.len(),
                });
            }
        }

        let return_label = parent.map(|_| labels.fresh_label());
        let index = self.arena.len();
        self.arena.push(Instantiation {
            subroutine,
            ancestors,
            return_label,
            cloned_labels: HashMap::new(),
        });

        // Owners are resolved relative to the new instantiation, so it must be in the arena first
        let mut cloned_labels = HashMap::new();
        let mut current_clone: Option<SynLabel> = None;
        for (node_idx, node) in self.body.nodes.iter().enumerate() {
            if let CodeNode::Label(label) = node {
                let clone = match current_clone {
                    Some(clone) => clone,
                    None => {
                        let clone = labels.fresh_label();
                        current_clone = Some(clone);
                        clone
                    }
                };
                cloned_labels.insert(*label, clone);
            } else if self.resolve_owner(index, node_idx) == Some(index) {
                current_clone = None;
            }
        }
        self.arena[index].cloned_labels = cloned_labels;

        log::debug!(
            "Instantiation #{} of subroutine {:?} (depth {}, returns to {:?})",
            index,
            self.map.subroutine(subroutine).entry,
            self.arena[index].ancestors.len(),
            return_label
        );
        Ok(index)
    }

    /// Which instantiation emits the node at this index, as seen from `instantiation`
    ///
    /// Nodes outside the instantiation's subroutine have no owner. Nodes shared between
    /// subroutines belong to the outermost active instantiation that can reach them, since
    /// that is where they were (or will be) emitted.
    pub fn resolve_owner(&self, instantiation: usize, node_idx: usize) -> Option<usize> {
        let this = &self.arena[instantiation];
        if !self.owns(instantiation, node_idx) {
            None
        } else if !self.map.is_dual_citizen(node_idx) {
            Some(instantiation)
        } else {
            let outermost = this
                .ancestors
                .iter()
                .copied()
                .find(|ancestor| self.owns(*ancestor, node_idx));
            Some(outermost.unwrap_or(instantiation))
        }
    }

    /// Label to resume at after a `ret` at this index, emitted by `instantiation`
    ///
    /// This is the return label of the outermost instantiation on the chain whose subroutine can
    /// reach the `ret` (a `ret` reached by falling through from a parent subroutine returns from
    /// that parent).
    pub fn return_label(&self, instantiation: usize, node_idx: usize) -> Result<SynLabel, Error> {
        let this = &self.arena[instantiation];
        let owner = this
            .ancestors
            .iter()
            .copied()
            .chain(std::iter::once(instantiation))
            .find(|candidate| self.owns(*candidate, node_idx));
        match owner.and_then(|owner| self.arena[owner].return_label) {
            Some(label) => Ok(label),
            None => {
                log::error!(
                    "`ret` at node #{} in instantiation #{} has no subroutine to return from",
                    node_idx,
                    instantiation
                );
                Err(Error::UnownedRet(node_idx))
            }
        }
    }

    /// Copy of a label in this instantiation's own label table
    ///
    /// This is what to use for the bounds of ranges: the same position may be in several
    /// instantiations, but each one only covers the code it emitted.
    pub fn cloned_label(&self, instantiation: usize, label: SynLabel) -> Result<SynLabel, Error> {
        self.arena[instantiation]
            .cloned_labels
            .get(&label)
            .copied()
            .ok_or(Error::MissingLabelRemap(label))
    }

    /// Copy of a label, when jumping to it from code emitted by `instantiation`
    ///
    /// The jump must go to wherever the code at the label is actually emitted, which may be in
    /// an ancestor instantiation.
    pub fn jump_label(&self, instantiation: usize, label: SynLabel) -> Result<SynLabel, Error> {
        let position = self
            .positions
            .get(&label)
            .copied()
            .ok_or(Error::UnplacedLabel(label))?;
        let owner = self
            .resolve_owner(instantiation, position)
            .ok_or(Error::MissingLabelRemap(label))?;
        self.cloned_label(owner, label)
    }

    fn owns(&self, instantiation: usize, node_idx: usize) -> bool {
        let subroutine = self.arena[instantiation].subroutine;
        self.map.subroutine(subroutine).nodes.contains(node_idx)
    }
}
