use super::{InlinerSettings, Instantiations, SubroutineMap};
use crate::jvm::code::{
    BranchInstruction, CodeNode, CodeVisitor, ExceptionRange, Instruction, LabelGenerator,
    LocalVariable, MethodBody, SynLabel,
};
use crate::jvm::verifier::StackMapFrame;
use crate::jvm::Error;
use std::collections::VecDeque;

/// Filter which replaces `jsr`/`ret` subroutines with inlined copies of their code
///
/// The whole method body is buffered until `visit_end`. If it turns out to contain no `jsr` or
/// `ret`, it is forwarded as is. Otherwise, each `jsr` becomes a `goto` into a fresh copy of the
/// subroutine (after pushing `null` where the return address would have been), and each `ret`
/// becomes a `goto` back to right after the `jsr` that led to that copy.
///
/// Fresh labels are requested from the next visitor, which must not hand out any label that shows
/// up in the code fed to this filter.
pub struct SubroutineInliner<V> {
    next: V,
    settings: InlinerSettings,
    body: MethodBody,
}

impl<V: CodeVisitor> SubroutineInliner<V> {
    pub fn new(next: V) -> SubroutineInliner<V> {
        SubroutineInliner::with_settings(next, InlinerSettings::default())
    }

    pub fn with_settings(next: V, settings: InlinerSettings) -> SubroutineInliner<V> {
        SubroutineInliner {
            next,
            settings,
            body: MethodBody::new(),
        }
    }

    pub fn get_ref(&self) -> &V {
        &self.next
    }

    pub fn into_inner(self) -> V {
        self.next
    }
}

impl<V: CodeVisitor> LabelGenerator<SynLabel> for SubroutineInliner<V> {
    fn fresh_label(&mut self) -> SynLabel {
        self.next.fresh_label()
    }
}

impl<V: CodeVisitor> CodeVisitor for SubroutineInliner<V> {
    fn visit_label(&mut self, label: SynLabel) -> Result<(), Error> {
        self.body.visit_label(label)
    }

    fn visit_instruction(&mut self, insn: &Instruction) -> Result<(), Error> {
        self.body.visit_instruction(insn)
    }

    fn visit_branch(&mut self, insn: &BranchInstruction<SynLabel>) -> Result<(), Error> {
        self.body.visit_branch(insn)
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        self.body.visit_frame(frame)
    }

    fn visit_exception_range(&mut self, range: &ExceptionRange) -> Result<(), Error> {
        self.body.visit_exception_range(range)
    }

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<(), Error> {
        self.body.visit_local_variable(variable)
    }

    fn visit_line_number(&mut self, line: u16, start: SynLabel) -> Result<(), Error> {
        self.body.visit_line_number(line, start)
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.body.visit_maxs(max_stack, max_locals)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.body.visit_end()?;
        if self.body.has_subroutines() {
            emit_inlined(&self.body, &self.settings, &mut self.next)
        } else {
            log::trace!("No subroutines to inline");
            self.body.accept(&mut self.next)
        }
    }
}

/// Inline all of the subroutines in a method body
///
/// Returns a new method body without any `jsr` or `ret` instructions (or a copy of the input if
/// there were none to start with). Labels in the output never clash with labels in the input.
pub fn inline_subroutines(
    body: &MethodBody,
    settings: &InlinerSettings,
) -> Result<MethodBody, Error> {
    let mut inlined = MethodBody::continuing(body);
    if body.has_subroutines() {
        emit_inlined(body, settings, &mut inlined)?;
    } else {
        body.accept(&mut inlined)?;
    }
    Ok(inlined)
}

/// Emit a method body into a visitor, with subroutines inlined
///
/// Every instantiation of a subroutine goes through the whole body once, emitting the nodes it
/// owns and a copy of every label. Instantiations are processed in the order they are created,
/// so the main body comes first, followed by the subroutines it calls, etc.
fn emit_inlined<V: CodeVisitor + ?Sized>(
    body: &MethodBody,
    settings: &InlinerSettings,
    next: &mut V,
) -> Result<(), Error> {
    let map = SubroutineMap::compute(body)?;
    let mut instantiations = Instantiations::new(body, &map, settings);
    let main = instantiations.instantiate(None, SubroutineMap::MAIN, &mut *next)?;

    let mut emitted_nodes: usize = 0;
    let mut worklist = VecDeque::from([main]);
    while let Some(current) = worklist.pop_front() {
        let mut previous_label = None;

        for (node_idx, node) in body.nodes.iter().enumerate() {
            match node {
                CodeNode::Label(label) => {
                    let clone = instantiations.cloned_label(current, *label)?;
                    if previous_label != Some(clone) {
                        next.visit_label(clone)?;
                        previous_label = Some(clone);
                        emitted_nodes += 1;
                    }
                    continue;
                }
                _ if instantiations.resolve_owner(current, node_idx) != Some(current) => continue,
                CodeNode::Instruction(insn) => next.visit_instruction(insn)?,
                CodeNode::Branch(BranchInstruction::Ret(_)) => {
                    let return_label = instantiations.return_label(current, node_idx)?;
                    next.visit_branch(&BranchInstruction::Goto(return_label))?;
                }
                CodeNode::Branch(BranchInstruction::Jsr(entry)) => {
                    let subroutine = map
                        .subroutine_for_entry(*entry)
                        .ok_or(Error::MissingLabelRemap(*entry))?;
                    let callee = instantiations.instantiate(Some(current), subroutine, &mut *next)?;
                    let target = instantiations.jump_label(callee, *entry)?;

                    // `null` stands in for the return address, which would have been stored away
                    next.visit_instruction(&Instruction::AConstNull)?;
                    next.visit_branch(&BranchInstruction::Goto(target))?;
                    if let Some(return_label) = instantiations.get(callee).return_label {
                        next.visit_label(return_label)?;
                        emitted_nodes += 2;
                    }
                    worklist.push_back(callee);
                }
                CodeNode::Branch(insn) => {
                    let insn = insn.map_labels(|label| instantiations.jump_label(current, *label))?;
                    next.visit_branch(&insn)?;
                }
                CodeNode::Frame(frame) => {
                    let frame = frame
                        .map_uninitialized(|label| instantiations.jump_label(current, *label))?;
                    next.visit_frame(&frame)?;
                }
                CodeNode::LineNumber(line, start) => {
                    let start = instantiations.jump_label(current, *start)?;
                    next.visit_line_number(*line, start)?;
                }
            }
            emitted_nodes += 1;
        }
    }

    // Ranges only cover code that each instantiation emitted itself
    for instantiation in 0..instantiations.len() {
        for range in &body.exception_ranges {
            let start = instantiations.cloned_label(instantiation, range.start)?;
            let end = instantiations.cloned_label(instantiation, range.end)?;
            if start == end {
                continue;
            }
            let handler = instantiations
                .jump_label(instantiation, range.handler)
                .map_err(|_| {
                    log::error!(
                        "Handler {:?} is not reachable from instantiation #{}",
                        range.handler,
                        instantiation
                    );
                    Error::UnresolvedHandler(range.handler)
                })?;
            next.visit_exception_range(&ExceptionRange {
                start,
                end,
                handler,
                catch_type: range.catch_type.clone(),
            })?;
        }

        for variable in &body.local_variables {
            let start = instantiations.cloned_label(instantiation, variable.start)?;
            let end = instantiations.cloned_label(instantiation, variable.end)?;
            if start == end {
                continue;
            }
            next.visit_local_variable(&LocalVariable {
                start,
                end,
                ..variable.clone()
            })?;
        }
    }

    log::debug!(
        "Inlined {} subroutine(s) into {} instantiation(s), emitting {} nodes (from {})",
        map.count() - 1,
        instantiations.len(),
        emitted_nodes,
        body.nodes.len()
    );
    next.visit_maxs(body.max_stack, body.max_locals)?;
    next.visit_end()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::Instruction::*;
    use crate::jvm::{BaseType, BinaryName, FieldType, Name, UnqualifiedName};
    use BranchInstruction::*;

    /// `try { x = 1; } finally { x = 2; }` with a single exit
    fn single_finally() -> MethodBody {
        let mut body = MethodBody::new();
        let start = body.fresh_label();
        let end = body.fresh_label();
        let handler = body.fresh_label();
        let fin = body.fresh_label();
        let after = body.fresh_label();
        body.visit_exception_range(&ExceptionRange {
            start,
            end,
            handler,
            catch_type: None,
        })
        .unwrap();
        body.visit_label(start).unwrap();
        body.visit_instruction(&IConst1).unwrap();
        body.visit_instruction(&IStore(0)).unwrap();
        body.visit_label(end).unwrap();
        body.visit_branch(&Jsr(fin)).unwrap();
        body.visit_branch(&Goto(after)).unwrap();
        body.visit_label(handler).unwrap();
        body.visit_instruction(&AStore(1)).unwrap();
        body.visit_branch(&Jsr(fin)).unwrap();
        body.visit_instruction(&ALoad(1)).unwrap();
        body.visit_branch(&AThrow).unwrap();
        body.visit_label(fin).unwrap();
        body.visit_instruction(&AStore(2)).unwrap();
        body.visit_instruction(&IConst2).unwrap();
        body.visit_instruction(&IStore(0)).unwrap();
        body.visit_branch(&Ret(2)).unwrap();
        body.visit_label(after).unwrap();
        body.visit_branch(&Return).unwrap();
        body.visit_local_variable(&LocalVariable {
            name: UnqualifiedName::from_str("x").unwrap(),
            descriptor: FieldType::Base(BaseType::Int),
            signature: None,
            start,
            end: after,
            index: 0,
        })
        .unwrap();
        body.visit_maxs(1, 3).unwrap();
        body.visit_end().unwrap();
        body
    }

    fn branches(body: &MethodBody) -> Vec<&BranchInstruction<SynLabel>> {
        body.nodes
            .iter()
            .filter_map(|node| match node {
                CodeNode::Branch(branch) => Some(branch),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn subroutines_are_gone() {
        let body = single_finally();
        let inlined = inline_subroutines(&body, &InlinerSettings::default()).unwrap();

        assert!(!inlined.has_subroutines());
        assert!(inlined.is_ended());
        assert_eq!((inlined.max_stack, inlined.max_locals), (1, 3));

        // Every jump lands on a placed label
        let positions = inlined.label_positions();
        for branch in branches(&inlined) {
            for target in branch.jump_targets().targets() {
                assert!(positions.contains_key(target), "{:?} is not placed", target);
            }
        }

        // One copy of `x = 2` per `jsr`
        let copies = inlined
            .nodes
            .iter()
            .filter(|node| **node == CodeNode::Instruction(IConst2))
            .count();
        assert_eq!(copies, 2);
    }

    #[test]
    fn ret_returns_after_its_own_jsr() {
        let body = single_finally();
        let inlined = inline_subroutines(&body, &InlinerSettings::default()).unwrap();
        let positions = inlined.label_positions();

        // Each `aconst_null; goto sub` is followed by the label that the copy's `ret` goes to
        let mut return_labels = vec![];
        for window in inlined.nodes.windows(3) {
            if let [CodeNode::Instruction(AConstNull), CodeNode::Branch(Goto(_)), CodeNode::Label(resume)] = window {
                return_labels.push(*resume);
            }
        }
        assert_eq!(return_labels.len(), 2);

        let mut ret_targets: Vec<SynLabel> = vec![];
        for (idx, node) in inlined.nodes.iter().enumerate() {
            if let CodeNode::Instruction(IStore(0)) = node {
                if inlined.nodes[idx - 1] == CodeNode::Instruction(IConst2) {
                    match &inlined.nodes[idx + 1] {
                        CodeNode::Branch(Goto(target)) => ret_targets.push(*target),
                        other => panic!("expected a goto, got {:?}", other),
                    }
                }
            }
        }
        assert_eq!(ret_targets, return_labels);
        assert!(ret_targets.iter().all(|target| positions.contains_key(target)));
    }

    #[test]
    fn ranges_and_variables_are_cloned() {
        let body = single_finally();
        let inlined = inline_subroutines(&body, &InlinerSettings::default()).unwrap();

        // The protected code is only in the main body
        assert_eq!(inlined.exception_ranges.len(), 1);
        assert_eq!(inlined.exception_ranges[0].catch_type, None);
        let positions = inlined.label_positions();
        let range = &inlined.exception_ranges[0];
        assert!(positions[&range.start] < positions[&range.end]);
        assert!(positions.contains_key(&range.handler));

        // `x` spans the main body and the subroutine copies
        assert!(!inlined.local_variables.is_empty());
        for variable in &inlined.local_variables {
            assert_eq!(variable.index, 0);
            assert!(positions[&variable.start] < positions[&variable.end]);
        }
    }

    #[test]
    fn filter_matches_function() {
        let body = single_finally();
        let expected = inline_subroutines(&body, &InlinerSettings::default()).unwrap();

        let mut sink = MethodBody::continuing(&body);
        let mut inliner = SubroutineInliner::new(&mut sink);
        body.accept(&mut inliner).unwrap();
        drop(inliner);

        assert_eq!(sink.nodes, expected.nodes);
        assert_eq!(sink.exception_ranges, expected.exception_ranges);
        assert_eq!(sink.local_variables, expected.local_variables);
    }

    #[test]
    fn no_subroutines_passes_through() {
        let mut body = MethodBody::new();
        let target = body.fresh_label();
        body.visit_label(target).unwrap();
        body.visit_instruction(&New(BinaryName::OBJECT)).unwrap();
        body.visit_branch(&Goto(target)).unwrap();
        body.visit_maxs(7, 7).unwrap();
        body.visit_end().unwrap();

        let mut sink = MethodBody::continuing(&body);
        let mut inliner = SubroutineInliner::new(&mut sink);
        body.accept(&mut inliner).unwrap();
        drop(inliner);

        assert_eq!(sink.nodes, body.nodes);
        assert_eq!((sink.max_stack, sink.max_locals), (7, 7));
    }

    #[test]
    fn instantiation_limit() {
        let body = single_finally();
        let settings = InlinerSettings {
            max_instantiations: Some(2),
            max_nesting_depth: None,
        };
        match inline_subroutines(&body, &settings) {
            Err(Error::InliningLimitExceeded { limit, value }) => {
                assert_eq!(limit, "max_instantiations");
                assert_eq!(value, 3);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn nesting_limit() {
        let body = single_finally();
        let settings = InlinerSettings {
            max_instantiations: None,
            max_nesting_depth: Some(0),
        };
        assert!(matches!(
            inline_subroutines(&body, &settings),
            Err(Error::InliningLimitExceeded {
                limit: "max_nesting_depth",
                value: 1
            })
        ));
    }

    #[test]
    fn ret_without_jsr_is_unowned() {
        let mut body = MethodBody::new();
        body.visit_instruction(&AConstNull).unwrap();
        body.visit_instruction(&AStore(0)).unwrap();
        body.visit_branch(&Ret(0)).unwrap();
        body.visit_end().unwrap();

        assert!(matches!(
            inline_subroutines(&body, &InlinerSettings::default()),
            Err(Error::UnownedRet(2))
        ));
    }
}
