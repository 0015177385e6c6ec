use super::*;
use crate::jvm::code::{
    BranchInstruction, CodeVisitor, ExceptionRange, Instruction, LabelGenerator, LocalVariable,
    SynLabel,
};
use crate::jvm::{BinaryName, Error, MethodHeader};
use crate::util::Width;
use std::collections::HashMap;
use std::convert::TryFrom;

/// Filter which tracks the types in the stack and locals as the code goes by
///
/// Everything visited is forwarded unchanged to the next visitor (except `visit_maxs`, which is
/// widened to cover what was observed, and a label which may be inserted right before a `new`
/// that has no label of its own). In between callbacks, the current frame can be inspected with
/// [`Simulator::locals`], [`Simulator::stack`], or [`Simulator::frame`].
///
/// The frame becomes unknown after any instruction that doesn't fall through, and stays unknown
/// until the next explicit frame. Frames must be [`StackMapFrame::Expanded`], and `jsr`/`ret` are
/// not supported (see [`crate::subroutines`] for getting rid of them).
pub struct Simulator<V> {
    next: V,

    /// Class declaring the method (`this` once `<init>` has been called)
    this_class: BinaryName,

    /// Current frame (`None` if unreachable or not yet known)
    frame: Option<SlotFrame>,

    /// Class being constructed by each `new`, keyed by the labels right before it
    uninitialized: HashMap<SynLabel, BinaryName>,

    /// Labels visited since the last instruction
    pending_labels: Vec<SynLabel>,

    max_stack: usize,
    max_locals: usize,
    ended: bool,
}

impl<V: CodeVisitor> Simulator<V> {
    pub fn new(header: &MethodHeader, next: V) -> Simulator<V> {
        let frame = SlotFrame::method_entry(header);
        log::trace!(
            "Simulating {:?}.{:?} starting with locals {:?}",
            header.class,
            header.name,
            frame.locals
        );
        Simulator {
            next,
            this_class: header.class.clone(),
            max_locals: frame.locals.len(),
            max_stack: 0,
            frame: Some(frame),
            uninitialized: HashMap::new(),
            pending_labels: vec![],
            ended: false,
        }
    }

    /// Local variables (one entry per slot), or `None` if the current frame is unknown
    pub fn locals(&self) -> Option<&[VType]> {
        self.frame.as_ref().map(|frame| frame.locals.as_slice())
    }

    /// Stack (one entry per slot), or `None` if the current frame is unknown
    pub fn stack(&self) -> Option<&[VType]> {
        self.frame.as_ref().map(|frame| frame.stack.as_slice())
    }

    /// Current frame in compact form
    pub fn frame(&self) -> Option<VerifierFrame> {
        self.frame.as_ref().map(SlotFrame::to_frame)
    }

    /// Largest stack observed so far
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Largest local variables observed so far
    pub fn max_locals(&self) -> usize {
        self.max_locals
    }

    pub fn get_ref(&self) -> &V {
        &self.next
    }

    pub fn into_inner(self) -> V {
        self.next
    }

    fn check_not_ended(&self) -> Result<(), Error> {
        if self.ended {
            Err(Error::VisitAfterEnd)
        } else {
            Ok(())
        }
    }

    fn update_maximums(&mut self) {
        if let Some(frame) = &self.frame {
            self.max_stack = self.max_stack.max(frame.stack.len());
            self.max_locals = self.max_locals.max(frame.locals.len());
        }
    }
}

impl<V: CodeVisitor> LabelGenerator<SynLabel> for Simulator<V> {
    fn fresh_label(&mut self) -> SynLabel {
        self.next.fresh_label()
    }
}

impl<V: CodeVisitor> CodeVisitor for Simulator<V> {
    fn visit_label(&mut self, label: SynLabel) -> Result<(), Error> {
        self.check_not_ended()?;
        self.pending_labels.push(label);
        self.next.visit_label(label)
    }

    fn visit_instruction(&mut self, insn: &Instruction) -> Result<(), Error> {
        self.check_not_ended()?;

        // `new` needs a label to identify the uninitialized value it creates
        let mut new_label = None;
        if let Instruction::New(class) = insn {
            if self.pending_labels.is_empty() {
                let label = self.next.fresh_label();
                log::trace!("Inserting label {:?} to identify {:?}", label, insn);
                self.next.visit_label(label)?;
                self.pending_labels.push(label);
            }
            for label in &self.pending_labels {
                self.uninitialized.insert(*label, class.clone());
            }
            new_label = self.pending_labels.first().copied();
        }

        if let Some(frame) = &mut self.frame {
            frame
                .simulate_instruction(insn, &self.this_class, &self.uninitialized, new_label)
                .map_err(|kind| Error::VerifierError {
                    instruction: format!("{:?}", insn),
                    kind,
                })?;
            log::trace!("{:?} leaves stack {:?}", insn, frame.stack);
        }
        self.pending_labels.clear();
        self.update_maximums();

        self.next.visit_instruction(insn)
    }

    fn visit_branch(&mut self, insn: &BranchInstruction<SynLabel>) -> Result<(), Error> {
        self.check_not_ended()?;
        if insn.is_subroutine_instruction() {
            return Err(Error::UnsupportedSubroutineInstruction(insn.clone()));
        }

        if let Some(frame) = &mut self.frame {
            frame
                .simulate_branch(insn)
                .map_err(|kind| Error::VerifierError {
                    instruction: format!("{:?}", insn),
                    kind,
                })?;
        }
        if !insn.falls_through() {
            self.frame = None;
        }
        self.pending_labels.clear();

        self.next.visit_branch(insn)
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        self.check_not_ended()?;
        match frame {
            StackMapFrame::Expanded(expanded) => {
                self.frame = Some(SlotFrame::from_frame(expanded));
            }
            other => return Err(Error::CompressedFrame(other.kind())),
        }
        self.update_maximums();

        self.next.visit_frame(frame)
    }

    fn visit_exception_range(&mut self, range: &ExceptionRange) -> Result<(), Error> {
        self.check_not_ended()?;
        self.next.visit_exception_range(range)
    }

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<(), Error> {
        self.check_not_ended()?;
        let end_slot = variable.index as usize + variable.descriptor.width();
        self.max_locals = self.max_locals.max(end_slot);
        self.next.visit_local_variable(variable)
    }

    fn visit_line_number(&mut self, line: u16, start: SynLabel) -> Result<(), Error> {
        self.check_not_ended()?;
        self.next.visit_line_number(line, start)
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.check_not_ended()?;
        let observed_stack = u16::try_from(self.max_stack).unwrap_or(u16::MAX);
        let observed_locals = u16::try_from(self.max_locals).unwrap_or(u16::MAX);
        self.next.visit_maxs(
            max_stack.max(observed_stack),
            max_locals.max(observed_locals),
        )
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.check_not_ended()?;
        self.ended = true;
        self.next.visit_end()
    }
}
