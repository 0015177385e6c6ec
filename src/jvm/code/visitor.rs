use super::{BranchInstruction, Instruction, LabelGenerator, SynLabel};
use crate::jvm::verifier::StackMapFrame;
use crate::jvm::{BinaryName, Error, FieldType, UnqualifiedName};

/// Consumer of a method body, delivered one element at a time
///
/// A method body is visited in order: labels, instructions, frames, and line numbers in the
/// order they appear in the code, with exception ranges and local variables visited any time
/// (usually before and after the code, respectively). After that comes `visit_maxs` and finally
/// `visit_end`. Once `visit_end` has been called, every other callback fails with
/// [`Error::VisitAfterEnd`].
///
/// Visitors are usually chained: a filter receives the body, does something with it, and
/// forwards it on to the next visitor. When a filter needs new labels, it asks the next visitor
/// (see [`LabelGenerator`]) so that the last visitor in the chain is the only source of labels.
/// That last visitor must never hand out labels that the original producer of the body uses.
pub trait CodeVisitor: LabelGenerator<SynLabel> {
    /// Mark the position of the next element with a label
    fn visit_label(&mut self, label: SynLabel) -> Result<(), Error>;

    fn visit_instruction(&mut self, insn: &Instruction) -> Result<(), Error>;

    fn visit_branch(&mut self, insn: &BranchInstruction<SynLabel>) -> Result<(), Error>;

    /// Declare the types of the stack and locals at this position
    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error>;

    fn visit_exception_range(&mut self, range: &ExceptionRange) -> Result<(), Error>;

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<(), Error>;

    /// Associate a source line number with the code starting at a label
    fn visit_line_number(&mut self, line: u16, start: SynLabel) -> Result<(), Error>;

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error>;

    fn visit_end(&mut self) -> Result<(), Error>;
}

impl<V: CodeVisitor + ?Sized> CodeVisitor for &mut V {
    fn visit_label(&mut self, label: SynLabel) -> Result<(), Error> {
        (**self).visit_label(label)
    }

    fn visit_instruction(&mut self, insn: &Instruction) -> Result<(), Error> {
        (**self).visit_instruction(insn)
    }

    fn visit_branch(&mut self, insn: &BranchInstruction<SynLabel>) -> Result<(), Error> {
        (**self).visit_branch(insn)
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        (**self).visit_frame(frame)
    }

    fn visit_exception_range(&mut self, range: &ExceptionRange) -> Result<(), Error> {
        (**self).visit_exception_range(range)
    }

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<(), Error> {
        (**self).visit_local_variable(variable)
    }

    fn visit_line_number(&mut self, line: u16, start: SynLabel) -> Result<(), Error> {
        (**self).visit_line_number(line, start)
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        (**self).visit_maxs(max_stack, max_locals)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        (**self).visit_end()
    }
}

/// Exception handler
///
/// Exceptions thrown by instructions in `[start, end)` go to `handler`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExceptionRange {
    pub start: SynLabel,
    pub end: SynLabel,
    pub handler: SynLabel,

    /// Type of exception caught (`None` catches everything, as for `finally`)
    pub catch_type: Option<BinaryName>,
}

/// Debug information about a local variable
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalVariable {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,

    /// Generic signature, if there is one
    pub signature: Option<String>,

    /// Range of code `[start, end)` where the variable is live
    pub start: SynLabel,
    pub end: SynLabel,

    /// Local variable slot
    pub index: u16,
}
